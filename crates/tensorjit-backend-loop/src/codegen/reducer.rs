//! Single-axis reduction kernels.

use smallvec::SmallVec;
use tensorjit::array::{Array, Coords, NdIndex, Value};
use tensorjit::dtype::DType;
use tensorjit::scalar::Scalar;
use tensorjit::scalar_op::ScalarOp;
use tensorjit::utils::normalize_axis_index;

use super::inplace::InPlaceUpdate;
use super::utils::{
    emit_loops_with_indices, emit_named_loops, format_literal, index_expr, push_line,
    shape_tuple, LOOP_COUNTER,
};
use super::Loader;
use crate::compiler::CompileOptions;
use crate::error::{KernelError, KernelResult};
use crate::kernel::{take_inputs, KernelDef};
use crate::labels::LABEL_LOOP_REDUCE_AXIS;

/// Reduction of one axis of a rank-`ndim` input.
///
/// The result is filled with the identity and every output element is updated along the reduced
/// axis in increasing index order.
#[derive(Debug, Clone, PartialEq)]
pub struct AxisReducer {
    name: String,
    op_name: &'static str,
    update: InPlaceUpdate,
    identity: Scalar,
    axis: usize,
    ndim: usize,
    dtype: DType,
    keepdims: bool,
    return_scalar: bool,
}

/// Builds the reduction of `axis` (negative values count from the end) with `scalar_op`.
///
/// Infinite identities are clamped to the extremes of integer and bool `dtype`s. With a rank-1
/// input the result is a one-element array (`keepdims`), a plain scalar (`return_scalar`) or a
/// zero-dimensional array.
pub fn create_axis_reducer(
    scalar_op: &ScalarOp,
    identity: Scalar,
    axis: isize,
    ndim: usize,
    dtype: DType,
    keepdims: bool,
    return_scalar: bool,
) -> KernelResult<AxisReducer> {
    let axis = normalize_axis_index(axis, ndim)?;
    let update = InPlaceUpdate::for_op(scalar_op, dtype)?;
    Ok(AxisReducer {
        name: format!("careduce_{}_axis{axis}", scalar_op.name()),
        op_name: scalar_op.name(),
        update,
        identity: clamp_identity(identity, dtype),
        axis,
        ndim,
        dtype,
        keepdims,
        return_scalar,
    })
}

pub(crate) fn clamp_identity(identity: Scalar, dtype: DType) -> Scalar {
    match identity {
        Scalar::Float(value) => Scalar::clamped_identity(value, dtype),
        other => other.cast(dtype),
    }
}

impl AxisReducer {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn axis(&self) -> usize {
        self.axis
    }

    pub fn ndim(&self) -> usize {
        self.ndim
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn identity(&self) -> Scalar {
        self.identity
    }

    pub fn keepdims(&self) -> bool {
        self.keepdims
    }

    pub fn update(&self) -> InPlaceUpdate {
        self.update
    }

    pub fn op_name(&self) -> &'static str {
        self.op_name
    }

    pub fn reduce(&self, x: &Array, boundscheck: bool) -> KernelResult<Value> {
        if x.ndim() != self.ndim {
            return Err(KernelError::shape(format!(
                "{} expects a rank-{} input, got shape {:?}",
                self.name,
                self.ndim,
                x.shape()
            )));
        }
        let axis_len = x.shape()[self.axis];
        let load = Loader::new(x, boundscheck);

        if self.ndim > 1 {
            let res_shape: Vec<usize> = x
                .shape()
                .iter()
                .enumerate()
                .filter(|(axis, _)| *axis != self.axis)
                .map(|(_, &len)| len)
                .collect();
            let mut res = Array::full(res_shape.clone(), self.identity, self.dtype);
            let mut coords: Coords = SmallVec::from_elem(0, self.ndim);
            for (flat, idx_arr) in NdIndex::new(&res_shape).enumerate() {
                let kept = (0..self.ndim).filter(|&axis| axis != self.axis);
                for (pos, axis) in kept.enumerate() {
                    coords[axis] = idx_arr[pos];
                }
                let mut acc = self.identity;
                for i in 0..axis_len {
                    coords[self.axis] = i;
                    acc = self.update.apply(acc, load.at(&coords)?, i, self.dtype);
                }
                res.set_flat(flat, acc)?;
            }
            let res = if self.keepdims {
                res.expand_dims(self.axis)?
            } else {
                res
            };
            return Ok(Value::Array(res));
        }

        let mut acc = self.identity;
        for i in 0..axis_len {
            acc = self.update.apply(acc, load.at(&[i])?, i, self.dtype);
        }
        Ok(if self.keepdims {
            Value::Array(Array::full(vec![1], acc, self.dtype))
        } else if self.return_scalar {
            Value::Scalar {
                value: acc,
                dtype: self.dtype,
            }
        } else {
            Value::Array(Array::scalar(acc, self.dtype))
        })
    }

    fn emit(&self) -> String {
        let mut module = String::new();
        let identity = format_literal(self.identity, self.dtype);
        let dtype = self.dtype.name();
        push_line(&mut module, 0, &format!("{}(x) {{", self.name));

        if self.ndim > 1 {
            let res_dims: Vec<String> = (0..self.ndim)
                .filter(|&axis| axis != self.axis)
                .map(|axis| format!("x.shape[{axis}]"))
                .collect();
            push_line(
                &mut module,
                1,
                &format!("res_shape = {};", shape_tuple(&res_dims)),
            );
            push_line(
                &mut module,
                1,
                &format!("res = full(res_shape, {identity}, {dtype});"),
            );
            push_line(
                &mut module,
                1,
                &format!("axis_shape = x.shape[{}];", self.axis),
            );
            let bounds: Vec<String> = (0..self.ndim - 1)
                .map(|k| format!("res_shape[{k}]"))
                .collect();
            emit_loops_with_indices(&mut module, &bounds, 1, "o", |module, out_idx, indent| {
                let mut kept = out_idx.iter();
                let arr_idx: Vec<String> = (0..self.ndim)
                    .map(|axis| {
                        if axis == self.axis {
                            LOOP_COUNTER.to_string()
                        } else {
                            kept.next().cloned().unwrap_or_default()
                        }
                    })
                    .collect();
                let res_idx = out_idx.join(", ");
                let arr = index_expr("x", &arr_idx);
                emit_named_loops(
                    module,
                    &["axis_shape".to_string()],
                    &[LOOP_COUNTER.to_string()],
                    indent,
                    |module, _, indent| {
                        push_line(module, indent, &self.update.render(&res_idx, "res", &arr));
                    },
                );
            });
            let ret = if self.keepdims {
                format!("expand_dims(res, {})", self.axis)
            } else {
                "res".to_string()
            };
            push_line(&mut module, 1, &format!("return {ret};"));
        } else {
            push_line(
                &mut module,
                1,
                &format!("res = full((1,), {identity}, {dtype});"),
            );
            push_line(
                &mut module,
                1,
                &format!("axis_shape = x.shape[{}];", self.axis),
            );
            let arr = index_expr("x", &[LOOP_COUNTER.to_string()]);
            emit_named_loops(
                &mut module,
                &["axis_shape".to_string()],
                &[LOOP_COUNTER.to_string()],
                1,
                |module, _, indent| {
                    push_line(module, indent, &self.update.render("0", "res", &arr));
                },
            );
            let ret = if self.keepdims {
                "res"
            } else if self.return_scalar {
                "res.item()"
            } else {
                "asarray(res.item())"
            };
            push_line(&mut module, 1, &format!("return {ret};"));
        }
        push_line(&mut module, 0, "}");
        module
    }
}

impl KernelDef for AxisReducer {
    fn name(&self) -> &str {
        &self.name
    }

    fn label(&self) -> &'static str {
        LABEL_LOOP_REDUCE_AXIS
    }

    fn source(&self) -> String {
        self.emit()
    }

    fn invoke(&self, inputs: Vec<Array>, options: &CompileOptions) -> KernelResult<Value> {
        let [x] = take_inputs::<1>(inputs, &self.name)?;
        self.reduce(&x, options.boundscheck)
    }
}
