//! `Sum` and `CAReduce` kernels.

use tensorjit::array::{Array, Value};
use tensorjit::dtype::{DType, Storage};
use tensorjit::graph::{CAReduce, Node, Sum};
use tensorjit::scalar::Scalar;
use tensorjit::scalar_op::ScalarOp;
use tensorjit::utils::normalize_axis_tuple;

use super::super::inplace::InPlaceUpdate;
use super::super::multiaxis::create_multiaxis_reducer;
use super::super::reducer::clamp_identity;
use super::super::utils::push_block;
use super::{single_input, single_output};
use crate::compiler::{compile, jit_compile_reducer, CompileOptions};
use crate::config::JitConfig;
use crate::error::{KernelError, KernelResult};
use crate::kernel::{take_inputs, Kernel, KernelDef};
use crate::labels::LABEL_LOOP_SUM;

/// Shortcuts for sums that need no per-axis loops.
#[derive(Debug, Clone, PartialEq)]
enum SumShortcut {
    /// Every axis is reduced: total in the input's own sum dtype, then converted to the
    /// accumulator dtype and finally to the output dtype.
    All {
        sum_dtype: DType,
        acc_dtype: DType,
        out_dtype: DType,
    },
    /// No axis is reduced: a converted copy.
    Copy { out_dtype: DType },
}

impl SumShortcut {
    fn fn_name(&self) -> &'static str {
        match self {
            SumShortcut::All { .. } => "impl_sum_all",
            SumShortcut::Copy { .. } => "impl_sum_copy",
        }
    }
}

impl KernelDef for SumShortcut {
    fn name(&self) -> &str {
        self.fn_name()
    }

    fn label(&self) -> &'static str {
        LABEL_LOOP_SUM
    }

    fn source(&self) -> String {
        let body = match self {
            SumShortcut::All {
                sum_dtype,
                acc_dtype,
                out_dtype,
            } => format!(
                "return asarray(sum(array, {}), {}).astype({});",
                sum_dtype.name(),
                acc_dtype.name(),
                out_dtype.name()
            ),
            SumShortcut::Copy { out_dtype } => {
                format!("return asarray(array, {});", out_dtype.name())
            }
        };
        let mut module = String::new();
        let block = format!(
            r#"
                {name}(array) {{
                  {body}
                }}
            "#,
            name = self.fn_name(),
        );
        push_block(&mut module, 0, &block);
        module
    }

    fn invoke(&self, inputs: Vec<Array>, _options: &CompileOptions) -> KernelResult<Value> {
        let [array] = take_inputs::<1>(inputs, self.fn_name())?;
        match *self {
            SumShortcut::All {
                sum_dtype,
                acc_dtype,
                out_dtype,
            } => {
                let mut total = Scalar::Int(0).cast(sum_dtype);
                for (i, value) in array.iter().enumerate() {
                    total = InPlaceUpdate::Add.apply(total, value, i, sum_dtype);
                }
                let total = total.cast(acc_dtype).cast(out_dtype);
                Ok(Value::Array(Array::scalar(total, out_dtype)))
            }
            SumShortcut::Copy { out_dtype } => Ok(Value::Array(array.astype(out_dtype))),
        }
    }
}

/// Compiles a `Sum` node.
///
/// Full and empty reductions use fast-math shortcuts; partial reductions go through
/// [`funcify_careduce`] with addition.
pub fn funcify_sum(node: &Node, op: &Sum, config: &JitConfig) -> KernelResult<Kernel> {
    let input = single_input(node, "Sum")?;
    let output = single_output(node, "Sum")?;
    let ndim = input.ndim();
    let axes = reduced_axes(op.axis.as_deref(), ndim)?;
    let acc_dtype = op.acc_dtype.unwrap_or(output.dtype);

    let shortcut = if axes.len() == ndim {
        SumShortcut::All {
            sum_dtype: native_sum_dtype(input.dtype),
            acc_dtype,
            out_dtype: output.dtype,
        }
    } else if axes.is_empty() {
        SumShortcut::Copy {
            out_dtype: output.dtype,
        }
    } else {
        return funcify_careduce(node, &ScalarOp::Add, op.axis.as_deref(), op.acc_dtype, config);
    };
    let options = CompileOptions::from_config(config).with_fastmath(true);
    compile(shortcut, None, options)
}

/// Dtype a plain array sum runs in: booleans and narrow integers widen to 64 bits, floats keep
/// their width.
fn native_sum_dtype(dtype: DType) -> DType {
    match dtype.storage() {
        Storage::Bool | Storage::Signed => DType::I64,
        Storage::Unsigned => DType::U64,
        Storage::Float => dtype,
    }
}

pub fn funcify_careduce_op(
    node: &Node,
    op: &CAReduce,
    config: &JitConfig,
) -> KernelResult<Kernel> {
    funcify_careduce(node, &op.scalar_op, op.axis.as_deref(), op.acc_dtype, config)
}

/// Compiles a commutative-associative reduction of `axis` (every axis when `None`).
///
/// The operator's identity is clamped to the accumulator dtype and the loops run in the output
/// dtype.
pub fn funcify_careduce(
    node: &Node,
    scalar_op: &ScalarOp,
    axis: Option<&[isize]>,
    acc_dtype: Option<DType>,
    config: &JitConfig,
) -> KernelResult<Kernel> {
    let input = single_input(node, "CAReduce")?;
    let output = single_output(node, "CAReduce")?;
    let ndim = input.ndim();
    let identity = scalar_op.identity().ok_or_else(|| {
        KernelError::unimplemented(scalar_op.name(), "reduction operator without an identity")
    })?;
    let acc_dtype = acc_dtype.unwrap_or(output.dtype);
    let identity = clamp_identity(Scalar::Float(identity), acc_dtype);

    let axes: Vec<isize> = match axis {
        Some(axes) => axes.to_vec(),
        None => (0..ndim as isize).collect(),
    };
    let reducer = create_multiaxis_reducer(
        scalar_op,
        identity,
        &axes,
        ndim,
        output.dtype,
        "x",
        false,
        config,
    )?;
    jit_compile_reducer(node, reducer, false, true, config)
}

fn reduced_axes(axis: Option<&[isize]>, ndim: usize) -> KernelResult<Vec<usize>> {
    match axis {
        Some(axes) => Ok(normalize_axis_tuple(axes, ndim)?),
        None => Ok((0..ndim).collect()),
    }
}
