//! Apply a lane-reducing function along one axis.

use std::fmt;
use std::sync::Arc;

use tensorjit::array::{element_count, Array, Value};
use tensorjit::dtype::DType;
use tensorjit::scalar::Scalar;
use tensorjit::utils::normalize_axis_index;

use super::utils::push_block;
use crate::compiler::CompileOptions;
use crate::error::{KernelError, KernelResult};
use crate::kernel::{take_inputs, KernelDef};
use crate::labels::LABEL_LOOP_AXIS_APPLY;

/// Function reducing one contiguous 1-D lane to a scalar.
pub type LaneFn = dyn Fn(&Array) -> KernelResult<Scalar> + Send + Sync;

/// Moves `axis` last and applies a lane function at every remaining coordinate, producing an
/// array one rank lower.
#[derive(Clone)]
pub struct AxisApply {
    name: String,
    fn_name: String,
    func: Arc<LaneFn>,
    axis: usize,
    ndim: usize,
    dtype: DType,
}

pub fn create_axis_apply_fn<F>(
    fn_name: &str,
    func: F,
    axis: isize,
    ndim: usize,
    dtype: DType,
) -> KernelResult<AxisApply>
where
    F: Fn(&Array) -> KernelResult<Scalar> + Send + Sync + 'static,
{
    let axis = normalize_axis_index(axis, ndim)?;
    Ok(AxisApply {
        name: format!("axis_apply_{fn_name}"),
        fn_name: fn_name.to_string(),
        func: Arc::new(func),
        axis,
        ndim,
        dtype,
    })
}

impl AxisApply {
    fn reaxis_last(&self) -> Vec<usize> {
        (0..self.ndim)
            .filter(|&axis| axis != self.axis)
            .chain(std::iter::once(self.axis))
            .collect()
    }

    pub fn apply(&self, x: &Array) -> KernelResult<Array> {
        if x.ndim() != self.ndim {
            return Err(KernelError::shape(format!(
                "{} expects a rank-{} input, got shape {:?}",
                self.name,
                self.ndim,
                x.shape()
            )));
        }
        let x_reaxis = x.transpose(&self.reaxis_last())?;
        let (lanes_shape, lane) = x_reaxis.shape().split_at(self.ndim - 1);
        let lane_len = lane[0];
        let values = (0..element_count(lanes_shape))
            .map(|m| (self.func)(&x_reaxis.lane(m * lane_len, lane_len)))
            .collect::<KernelResult<Vec<_>>>()?;
        Ok(Array::from_scalars(
            self.dtype,
            lanes_shape.to_vec(),
            values,
        )?)
    }
}

impl fmt::Debug for AxisApply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AxisApply")
            .field("name", &self.name)
            .field("fn_name", &self.fn_name)
            .field("axis", &self.axis)
            .field("ndim", &self.ndim)
            .field("dtype", &self.dtype)
            .finish()
    }
}

impl KernelDef for AxisApply {
    fn name(&self) -> &str {
        &self.name
    }

    fn label(&self) -> &'static str {
        LABEL_LOOP_AXIS_APPLY
    }

    fn source(&self) -> String {
        let perm: Vec<String> = self.reaxis_last().iter().map(usize::to_string).collect();
        let mut module = String::new();
        let block = format!(
            r#"
                {name}(x) {{
                  x_reaxis = transpose(x, ({perm}));
                  res = zeros(x_reaxis.shape[:-1], {dtype});
                  for (size_t m = 0; m < size(res); ++m) {{
                    res[m] = {func}(x_reaxis[m]);
                  }}
                  return res;
                }}
            "#,
            name = self.name,
            perm = perm.join(", "),
            dtype = self.dtype.name(),
            func = self.fn_name,
        );
        push_block(&mut module, 0, &block);
        module
    }

    fn invoke(&self, inputs: Vec<Array>, _options: &CompileOptions) -> KernelResult<Value> {
        let [x] = take_inputs::<1>(inputs, &self.name)?;
        Ok(Value::Array(self.apply(&x)?))
    }
}
