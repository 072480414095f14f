//! Reductions over several axes, folded one axis at a time.

use tensorjit::array::{Array, Value};
use tensorjit::dtype::DType;
use tensorjit::scalar::Scalar;
use tensorjit::scalar_op::ScalarOp;
use tensorjit::utils::normalize_axis_tuple;

use super::inplace::InPlaceUpdate;
use super::reducer::{create_axis_reducer, AxisReducer};
use super::utils::push_line;
use crate::compiler::{compile, CompileOptions};
use crate::config::JitConfig;
use crate::error::KernelResult;
use crate::kernel::{take_inputs, Kernel, KernelDef};
use crate::labels::LABEL_LOOP_REDUCE_AXES;

/// Chain of compiled single-axis reducers applied in strictly descending axis order.
#[derive(Debug, Clone)]
pub struct MultiAxisReducer {
    name: String,
    input_name: String,
    axes: Vec<usize>,
    steps: Vec<Kernel>,
    return_scalar: bool,
}

/// Reduction definition produced by [`create_multiaxis_reducer`].
#[derive(Debug, Clone)]
pub enum Reducer {
    Axis(AxisReducer),
    Axes(MultiAxisReducer),
}

/// Builds a reduction of `axes` of a rank-`ndim` input.
///
/// A single axis yields the plain [`AxisReducer`]. Otherwise axes are normalized and reduced
/// from the highest index down, so the remaining axis indices stay valid as the rank shrinks.
/// Each step is compiled without bounds checks and with the configured fast-math mode. An empty
/// axis set passes the input through.
#[allow(clippy::too_many_arguments)]
pub fn create_multiaxis_reducer(
    scalar_op: &ScalarOp,
    identity: Scalar,
    axes: &[isize],
    ndim: usize,
    dtype: DType,
    input_name: &str,
    return_scalar: bool,
    config: &JitConfig,
) -> KernelResult<Reducer> {
    if let [axis] = axes {
        let reducer = create_axis_reducer(scalar_op, identity, *axis, ndim, dtype, false, false)?;
        return Ok(Reducer::Axis(reducer));
    }

    let mut to_reduce = normalize_axis_tuple(axes, ndim)?;
    to_reduce.sort_unstable_by(|a, b| b.cmp(a));
    InPlaceUpdate::for_op(scalar_op, dtype)?;

    let options = CompileOptions::from_config(config).with_boundscheck(false);
    let mut steps = Vec::with_capacity(to_reduce.len());
    let mut step_ndim = ndim;
    for (i, &axis) in to_reduce.iter().enumerate() {
        let reducer =
            create_axis_reducer(scalar_op, identity, axis as isize, step_ndim, dtype, false, false)?
                .with_name(format!("careduce_axes_fn_{i}"));
        steps.push(compile(reducer, None, options)?);
        step_ndim -= 1;
    }

    Ok(Reducer::Axes(MultiAxisReducer {
        name: format!("careduce_{}", scalar_op.name()),
        input_name: input_name.to_string(),
        axes: to_reduce,
        steps,
        return_scalar,
    }))
}

impl MultiAxisReducer {
    /// Reduced axes in the order they are folded.
    pub fn axes(&self) -> &[usize] {
        &self.axes
    }

    pub fn steps(&self) -> &[Kernel] {
        &self.steps
    }

    pub fn reduce(&self, input: Array) -> KernelResult<Value> {
        let mut var = input;
        for step in &self.steps {
            var = step.call(vec![var])?.into_array();
        }
        if self.return_scalar {
            return Ok(Value::Scalar {
                value: var.item()?,
                dtype: var.dtype(),
            });
        }
        Ok(Value::Array(var))
    }

    fn emit(&self) -> String {
        let mut module = String::new();
        for step in &self.steps {
            module.push_str(step.source());
            module.push('\n');
        }
        push_line(
            &mut module,
            0,
            &format!("{}({}) {{", self.name, self.input_name),
        );
        let mut var_name = self.input_name.clone();
        for (i, step) in self.steps.iter().enumerate() {
            let next = format!("axis_{i}_res");
            push_line(
                &mut module,
                1,
                &format!("{next} = {}({var_name});", step.name()),
            );
            var_name = next;
        }
        let post = if self.return_scalar { ".item()" } else { "" };
        push_line(&mut module, 1, &format!("return asarray({var_name}){post};"));
        push_line(&mut module, 0, "}");
        module
    }
}

impl KernelDef for Reducer {
    fn name(&self) -> &str {
        match self {
            Reducer::Axis(reducer) => reducer.name(),
            Reducer::Axes(reducer) => &reducer.name,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Reducer::Axis(reducer) => reducer.label(),
            Reducer::Axes(_) => LABEL_LOOP_REDUCE_AXES,
        }
    }

    fn source(&self) -> String {
        match self {
            Reducer::Axis(reducer) => reducer.source(),
            Reducer::Axes(reducer) => reducer.emit(),
        }
    }

    fn invoke(&self, inputs: Vec<Array>, options: &CompileOptions) -> KernelResult<Value> {
        match self {
            Reducer::Axis(reducer) => reducer.invoke(inputs, options),
            Reducer::Axes(reducer) => {
                let [x] = take_inputs::<1>(inputs, &reducer.name)?;
                reducer.reduce(x)
            }
        }
    }
}
