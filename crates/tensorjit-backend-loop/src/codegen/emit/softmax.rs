//! `Softmax`, `LogSoftmax` and `SoftmaxGrad` kernels.
//!
//! With an axis, the max and sum are single-axis reducers that keep the reduced dimension so
//! they broadcast back against the input. Without one they fold the whole array.

use tensorjit::array::{Array, Value};
use tensorjit::dtype::DType;
use tensorjit::graph::Node;
use tensorjit::scalar::{binary_arith, Scalar};
use tensorjit::scalar_op::ScalarOp;
use tensorjit::utils::normalize_axis_index;

use super::super::inplace::InPlaceUpdate;
use super::super::reducer::{clamp_identity, create_axis_reducer};
use super::super::utils::push_block;
use super::{single_input, single_output};
use crate::compiler::{compile, jit_compile_reducer, CompileOptions};
use crate::config::JitConfig;
use crate::error::{KernelError, KernelResult};
use crate::kernel::{take_inputs, Kernel, KernelDef};
use crate::labels::{LABEL_LOOP_LOG_SOFTMAX, LABEL_LOOP_SOFTMAX, LABEL_LOOP_SOFTMAX_GRAD};

#[derive(Debug, Clone)]
enum Reduction {
    Axis(Kernel),
    Whole {
        update: InPlaceUpdate,
        identity: Scalar,
        dtype: DType,
    },
}

impl Reduction {
    fn new(
        scalar_op: &ScalarOp,
        identity: f64,
        axis: Option<isize>,
        ndim: usize,
        dtype: DType,
        config: &JitConfig,
    ) -> KernelResult<Self> {
        match axis {
            Some(axis) => {
                let reducer = create_axis_reducer(
                    scalar_op,
                    Scalar::Float(identity),
                    axis,
                    ndim,
                    dtype,
                    true,
                    false,
                )?;
                let options = CompileOptions::from_config(config).with_boundscheck(false);
                Ok(Reduction::Axis(compile(reducer, None, options)?))
            }
            None => Ok(Reduction::Whole {
                update: InPlaceUpdate::for_op(scalar_op, dtype)?,
                identity: clamp_identity(Scalar::Float(identity), dtype),
                dtype,
            }),
        }
    }

    fn call_name(&self, whole: &'static str) -> String {
        match self {
            Reduction::Axis(kernel) => kernel.name().to_string(),
            Reduction::Whole { .. } => whole.to_string(),
        }
    }

    fn listing(&self) -> String {
        match self {
            Reduction::Axis(kernel) => format!("{}\n", kernel.source()),
            Reduction::Whole { .. } => String::new(),
        }
    }

    fn apply(&self, x: &Array) -> KernelResult<Array> {
        match self {
            Reduction::Axis(kernel) => Ok(kernel.call(vec![x.clone()])?.into_array()),
            Reduction::Whole {
                update,
                identity,
                dtype,
            } => {
                let mut acc = *identity;
                for (i, value) in x.iter().enumerate() {
                    acc = update.apply(acc, value, i, *dtype);
                }
                Ok(Array::scalar(acc, *dtype))
            }
        }
    }
}

fn sub(lhs: &Array, rhs: &Array, dtype: DType) -> KernelResult<Array> {
    Ok(lhs.zip_with(rhs, dtype, |a, b| {
        binary_arith(a, b, dtype, i64::wrapping_sub, u64::wrapping_sub, |a, b| a - b)
    })?)
}

fn mul(lhs: &Array, rhs: &Array, dtype: DType) -> KernelResult<Array> {
    Ok(lhs.zip_with(rhs, dtype, |a, b| {
        binary_arith(a, b, dtype, i64::wrapping_mul, u64::wrapping_mul, |a, b| a * b)
    })?)
}

fn div(lhs: &Array, rhs: &Array, dtype: DType) -> KernelResult<Array> {
    Ok(lhs.zip_with(rhs, dtype, |a, b| Scalar::Float(a.as_f64() / b.as_f64()))?)
}

fn exp(x: &Array, dtype: DType) -> Array {
    x.map(dtype, |v| Scalar::Float(v.as_f64().exp()))
}

fn log(x: &Array, dtype: DType) -> Array {
    x.map(dtype, |v| Scalar::Float(v.as_f64().ln()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SoftmaxKind {
    Softmax,
    LogSoftmax,
}

#[derive(Debug, Clone)]
struct SoftmaxDef {
    kind: SoftmaxKind,
    reduce_max: Reduction,
    reduce_sum: Reduction,
    x_dtype: DType,
    out_dtype: DType,
}

impl SoftmaxDef {
    fn fn_name(&self) -> &'static str {
        match self.kind {
            SoftmaxKind::Softmax => "softmax",
            SoftmaxKind::LogSoftmax => "log_softmax",
        }
    }

    fn softmax(&self, x: &Array) -> KernelResult<Array> {
        let z = self.reduce_max.apply(x)?;
        let e_x = exp(&sub(x, &z, self.x_dtype)?, self.out_dtype);
        let w = self.reduce_sum.apply(&e_x)?;
        div(&e_x, &w, self.out_dtype)
    }

    fn log_softmax(&self, x: &Array) -> KernelResult<Array> {
        let xdev = sub(x, &self.reduce_max.apply(x)?, self.x_dtype)?;
        let total = self.reduce_sum.apply(&exp(&xdev, self.out_dtype))?;
        sub(&xdev, &log(&total, self.out_dtype), self.out_dtype)
    }
}

impl KernelDef for SoftmaxDef {
    fn name(&self) -> &str {
        self.fn_name()
    }

    fn label(&self) -> &'static str {
        match self.kind {
            SoftmaxKind::Softmax => LABEL_LOOP_SOFTMAX,
            SoftmaxKind::LogSoftmax => LABEL_LOOP_LOG_SOFTMAX,
        }
    }

    fn source(&self) -> String {
        let mut module = self.reduce_max.listing();
        module.push_str(&self.reduce_sum.listing());
        let reduce_max = self.reduce_max.call_name("max");
        let reduce_sum = self.reduce_sum.call_name("sum");
        let body = match self.kind {
            SoftmaxKind::Softmax => format!(
                r#"
                    softmax(x) {{
                      z = {reduce_max}(x);
                      e_x = exp(x - z);
                      w = {reduce_sum}(e_x);
                      sm = e_x / w;
                      return sm;
                    }}
                "#
            ),
            SoftmaxKind::LogSoftmax => format!(
                r#"
                    log_softmax(x) {{
                      xdev = x - {reduce_max}(x);
                      lsm = xdev - log({reduce_sum}(exp(xdev)));
                      return lsm;
                    }}
                "#
            ),
        };
        push_block(&mut module, 0, &body);
        module
    }

    fn invoke(&self, inputs: Vec<Array>, _options: &CompileOptions) -> KernelResult<Value> {
        let [x] = take_inputs::<1>(inputs, self.fn_name())?;
        let out = match self.kind {
            SoftmaxKind::Softmax => self.softmax(&x)?,
            SoftmaxKind::LogSoftmax => self.log_softmax(&x)?,
        };
        Ok(Value::Array(out))
    }
}

#[derive(Debug, Clone)]
struct SoftmaxGradDef {
    reduce_sum: Reduction,
    out_dtype: DType,
}

impl KernelDef for SoftmaxGradDef {
    fn name(&self) -> &str {
        "softmax_grad"
    }

    fn label(&self) -> &'static str {
        LABEL_LOOP_SOFTMAX_GRAD
    }

    fn source(&self) -> String {
        let mut module = self.reduce_sum.listing();
        let block = format!(
            r#"
                softmax_grad(dy, sm) {{
                  dy_times_sm = dy * sm;
                  sum_dy_times_sm = {reduce_sum}(dy_times_sm);
                  dx = dy_times_sm - sum_dy_times_sm * sm;
                  return dx;
                }}
            "#,
            reduce_sum = self.reduce_sum.call_name("sum"),
        );
        push_block(&mut module, 0, &block);
        module
    }

    fn invoke(&self, inputs: Vec<Array>, _options: &CompileOptions) -> KernelResult<Value> {
        let [dy, sm] = take_inputs::<2>(inputs, "softmax_grad")?;
        let dtype = self.out_dtype;
        let dy_times_sm = mul(&dy, &sm, dtype)?;
        let sum_dy_times_sm = self.reduce_sum.apply(&dy_times_sm)?;
        let dx = sub(&dy_times_sm, &mul(&sum_dy_times_sm, &sm, dtype)?, dtype)?;
        Ok(Value::Array(dx))
    }
}

fn build_softmax(
    node: &Node,
    kind: SoftmaxKind,
    op: &'static str,
    axis: Option<isize>,
    config: &JitConfig,
) -> KernelResult<Kernel> {
    let x = single_input(node, op)?;
    let output = single_output(node, op)?;
    let ndim = x.ndim();
    let axis = axis
        .map(|axis| normalize_axis_index(axis, ndim).map(|a| a as isize))
        .transpose()?;
    let def = SoftmaxDef {
        kind,
        reduce_max: Reduction::new(
            &ScalarOp::Maximum,
            f64::NEG_INFINITY,
            axis,
            ndim,
            x.dtype,
            config,
        )?,
        reduce_sum: Reduction::new(&ScalarOp::Add, 0.0, axis, ndim, output.dtype, config)?,
        x_dtype: x.dtype,
        out_dtype: output.dtype,
    };
    jit_compile_reducer(node, def, false, true, config)
}

/// Compiles `exp(x - max(x)) / sum(exp(x - max(x)))` along `axis` (the whole array when `None`).
pub fn funcify_softmax(
    node: &Node,
    axis: Option<isize>,
    config: &JitConfig,
) -> KernelResult<Kernel> {
    build_softmax(node, SoftmaxKind::Softmax, "Softmax", axis, config)
}

pub fn funcify_log_softmax(
    node: &Node,
    axis: Option<isize>,
    config: &JitConfig,
) -> KernelResult<Kernel> {
    build_softmax(node, SoftmaxKind::LogSoftmax, "LogSoftmax", axis, config)
}

/// Compiles the softmax gradient `dy * sm - sum(dy * sm) * sm` for inputs `(dy, sm)`.
pub fn funcify_softmax_grad(
    node: &Node,
    axis: Option<isize>,
    config: &JitConfig,
) -> KernelResult<Kernel> {
    let [_, sm] = node.inputs.as_slice() else {
        return Err(KernelError::unimplemented(
            "SoftmaxGrad",
            format!("expected inputs (dy, sm), node has {}", node.nin()),
        ));
    };
    let output = single_output(node, "SoftmaxGrad")?;
    let ndim = sm.ndim();
    let axis = axis
        .map(|axis| normalize_axis_index(axis, ndim).map(|a| a as isize))
        .transpose()?;
    let def = SoftmaxGradDef {
        reduce_sum: Reduction::new(&ScalarOp::Add, 0.0, axis, ndim, output.dtype, config)?,
        out_dtype: output.dtype,
    };
    jit_compile_reducer(node, def, false, false, config)
}
