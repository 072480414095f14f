//! `Argmax` kernels: reduced axes are moved last and flattened into one lane.

use tensorjit::array::{element_count, Array, Value};
use tensorjit::dtype::DType;
use tensorjit::graph::Node;
use tensorjit::scalar::Scalar;
use tensorjit::utils::AxisError;

use super::super::axis_apply::{create_axis_apply_fn, AxisApply};
use super::super::utils::push_block;
use super::{single_input, single_output};
use crate::compiler::{compile, CompileOptions};
use crate::config::JitConfig;
use crate::error::{KernelError, KernelResult};
use crate::kernel::{take_inputs, Kernel, KernelDef};
use crate::labels::LABEL_LOOP_ARGMAX;

/// Index of the first maximum of a 1-D lane; the first NaN wins over every number.
pub fn argmax_lane(lane: &Array) -> KernelResult<Scalar> {
    let mut values = lane.iter().enumerate();
    let (_, mut best) = values
        .next()
        .ok_or_else(|| KernelError::execution("attempt to get argmax of an empty sequence"))?;
    if best.is_nan() {
        return Ok(Scalar::Int(0));
    }
    let mut best_idx = 0;
    for (idx, value) in values {
        if value.is_nan() {
            return Ok(Scalar::Int(idx as i64));
        }
        if value.gt(best) {
            best = value;
            best_idx = idx;
        }
    }
    Ok(Scalar::Int(best_idx as i64))
}

#[derive(Debug, Clone)]
enum ArgmaxDef {
    /// Rank-0 input: the only position is 0.
    Rank0,
    Reduce {
        reaxis_order: Vec<usize>,
        kept: usize,
        argmax_axis: AxisApply,
    },
}

impl ArgmaxDef {
    fn reduce(
        x: Array,
        reaxis_order: &[usize],
        kept: usize,
        argmax_axis: &AxisApply,
    ) -> KernelResult<Array> {
        if x.ndim() != reaxis_order.len() {
            return Err(KernelError::shape(format!(
                "argmax expects a rank-{} input, got shape {:?}",
                reaxis_order.len(),
                x.shape()
            )));
        }
        let transposed_x = x.transpose(reaxis_order)?;
        let (kept_shape, reduced_shape) = transposed_x.shape().split_at(kept);
        let mut new_shape = kept_shape.to_vec();
        new_shape.push(element_count(reduced_shape));
        let reshaped_x = transposed_x.reshape(new_shape)?;
        argmax_axis.apply(&reshaped_x)
    }
}

impl KernelDef for ArgmaxDef {
    fn name(&self) -> &str {
        "argmax"
    }

    fn label(&self) -> &'static str {
        LABEL_LOOP_ARGMAX
    }

    fn source(&self) -> String {
        let mut module = String::new();
        match self {
            ArgmaxDef::Rank0 => {
                push_block(
                    &mut module,
                    0,
                    r#"
                        argmax(x) {
                          return 0;
                        }
                    "#,
                );
            }
            ArgmaxDef::Reduce {
                reaxis_order,
                kept,
                argmax_axis,
            } => {
                module.push_str(&argmax_axis.source());
                module.push('\n');
                let order: Vec<String> = reaxis_order.iter().map(usize::to_string).collect();
                let block = format!(
                    r#"
                        argmax(x) {{
                          transposed_x = ascontiguousarray(transpose(x, ({order})));
                          kept_shape = transposed_x.shape[:{kept}];
                          reduced_shape = transposed_x.shape[{kept}:];
                          reduced_size = 1;
                          for (s : reduced_shape) {{
                            reduced_size *= s;
                          }}
                          reshaped_x = transposed_x.reshape((*kept_shape, reduced_size));
                          return {apply}(reshaped_x);
                        }}
                    "#,
                    order = order.join(", "),
                    apply = argmax_axis.name(),
                );
                push_block(&mut module, 0, &block);
            }
        }
        module
    }

    fn invoke(&self, inputs: Vec<Array>, _options: &CompileOptions) -> KernelResult<Value> {
        let [x] = take_inputs::<1>(inputs, "argmax")?;
        match self {
            ArgmaxDef::Rank0 => Ok(Value::Scalar {
                value: Scalar::Int(0),
                dtype: DType::I64,
            }),
            ArgmaxDef::Reduce {
                reaxis_order,
                kept,
                argmax_axis,
            } => Ok(Value::Array(Self::reduce(
                x,
                reaxis_order,
                *kept,
                argmax_axis,
            )?)),
        }
    }
}

/// Compiles an `Argmax` over `axis` (every axis when `None`).
///
/// Several axes are reduced jointly: the result is the position of the maximum in the row-major
/// flattening of the reduced axes.
pub fn funcify_argmax(
    node: &Node,
    axis: Option<&[usize]>,
    config: &JitConfig,
) -> KernelResult<Kernel> {
    let x = single_input(node, "Argmax")?;
    single_output(node, "Argmax")?;
    let x_ndim = x.ndim();
    let def = if x_ndim == 0 {
        ArgmaxDef::Rank0
    } else {
        let mut axes: Vec<usize> = match axis {
            Some(axes) => axes.to_vec(),
            None => (0..x_ndim).collect(),
        };
        axes.sort_unstable();
        axes.dedup();
        if let Some(&bad) = axes.iter().find(|&&a| a >= x_ndim) {
            return Err(AxisError::OutOfBounds {
                axis: bad as isize,
                ndim: x_ndim,
            }
            .into());
        }
        let keep_axes: Vec<usize> = (0..x_ndim).filter(|a| !axes.contains(a)).collect();
        let reduced_x_ndim = x_ndim - axes.len() + 1;
        let argmax_axis = create_axis_apply_fn(
            "argmax",
            argmax_lane,
            reduced_x_ndim as isize - 1,
            reduced_x_ndim,
            DType::I64,
        )?;
        let kept = keep_axes.len();
        let mut reaxis_order = keep_axes;
        reaxis_order.extend(axes);
        ArgmaxDef::Reduce {
            reaxis_order,
            kept,
            argmax_axis,
        }
    };
    compile(def, None, CompileOptions::from_config(config))
}
