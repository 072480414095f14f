//! Batched elementwise execution.
//!
//! A [`ScalarKernel`] computes one output element from one element of every input.
//! [`vectorized`] drives it over broadcast inputs using patterns fixed when the kernel is built;
//! [`elemwise_reference`] is the straightforward broadcasting loop used to validate it.

use rayon::prelude::*;
use serde::Serialize;
use smallvec::SmallVec;
use tensorjit::array::{
    broadcast_shapes, element_count, linear_offset, unravel_index, Array, NdIndex,
};
use tensorjit::dtype::DType;
use tensorjit::scalar::Scalar;
use tensorjit::scalar_op::ScalarOp;

use super::reducer::create_axis_reducer;
use crate::config::VectorizeTarget;
use crate::error::{KernelError, KernelResult};

/// Per-element function derived from a scalar operator and the node's dtypes.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarKernel {
    op: ScalarOp,
    input_dtypes: Vec<DType>,
    output_dtype: DType,
}

impl ScalarKernel {
    pub fn new(op: ScalarOp, input_dtypes: Vec<DType>, output_dtype: DType) -> KernelResult<Self> {
        op.check_arity(input_dtypes.len())?;
        let float_operand = output_dtype.is_float() || input_dtypes.iter().any(|d| d.is_float());
        if op.is_bitwise() && float_operand {
            return Err(KernelError::unimplemented(
                op.name(),
                "bitwise scalar op on floating-point operands",
            ));
        }
        Ok(Self {
            op,
            input_dtypes,
            output_dtype,
        })
    }

    pub fn nin(&self) -> usize {
        self.input_dtypes.len()
    }

    pub fn output_dtype(&self) -> DType {
        self.output_dtype
    }

    pub fn op(&self) -> &ScalarOp {
        &self.op
    }

    pub fn eval(&self, args: &[Scalar]) -> KernelResult<Scalar> {
        Ok(self.op.eval(args, self.output_dtype)?)
    }

    pub fn render(&self, args: &[String]) -> String {
        self.op.render(args)
    }
}

/// Scalar kernel wrapped to write its result into caller-provided output slots.
#[derive(Debug, Clone, PartialEq)]
pub struct CoreOutputStore {
    kernel: ScalarKernel,
    nin: usize,
    nout: usize,
}

pub fn store_core_outputs(
    kernel: ScalarKernel,
    nin: usize,
    nout: usize,
) -> KernelResult<CoreOutputStore> {
    if nout != 1 {
        return Err(KernelError::unsupported(format!(
            "core output store supports a single output, got {nout}"
        )));
    }
    if nin != kernel.nin() {
        return Err(KernelError::shape(format!(
            "scalar kernel takes {} input(s), store was built for {nin}",
            kernel.nin()
        )));
    }
    Ok(CoreOutputStore { kernel, nin, nout })
}

impl CoreOutputStore {
    pub fn kernel(&self) -> &ScalarKernel {
        &self.kernel
    }

    pub fn store(&self, inputs: &[Scalar], outputs: &mut [Scalar]) -> KernelResult<()> {
        let slot = outputs
            .first_mut()
            .ok_or_else(|| KernelError::execution("core output store called without outputs"))?;
        *slot = self.kernel.eval(inputs)?;
        Ok(())
    }

    pub fn render(&self) -> String {
        let inputs: Vec<String> = (0..self.nin).map(|i| format!("i{i}")).collect();
        let outputs: Vec<String> = (0..self.nout).map(|o| format!("o{o}")).collect();
        let mut params = inputs.clone();
        params.extend(outputs);
        format!(
            "store_core_outputs({}) {{\n  o0[()] = {};\n}}\n",
            params.join(", "),
            self.kernel.render(&inputs)
        )
    }
}

/// Broadcast patterns, output dtypes and aliasing fixed when an elementwise kernel is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VectorizeConstants {
    pub input_bc_patterns: Vec<Vec<bool>>,
    pub output_bc_patterns: Vec<Vec<bool>>,
    pub output_dtypes: Vec<DType>,
    /// `(output, input)` pairs: the output may overwrite the input's buffer.
    pub inplace_pattern: Vec<(usize, usize)>,
}

/// Flat textual encoding of a nested constant.
pub fn encode_literals<T: Serialize + ?Sized>(value: &T) -> KernelResult<String> {
    Ok(serde_json::to_string(value)?)
}

/// Output shape for inputs of equal rank: axes flagged broadcastable must have length 1 and the
/// remaining lengths must agree.
pub fn vectorized_shape(
    inputs: &[Array],
    input_bc_patterns: &[Vec<bool>],
) -> KernelResult<Vec<usize>> {
    let ndim = match (inputs.first(), input_bc_patterns.first()) {
        (Some(first), _) => first.ndim(),
        (None, Some(pattern)) => pattern.len(),
        (None, None) => 0,
    };
    for (n, (input, pattern)) in inputs.iter().zip(input_bc_patterns).enumerate() {
        if input.ndim() != ndim || pattern.len() != ndim {
            return Err(KernelError::shape(format!(
                "input {n} has shape {:?} and broadcast pattern of length {}, expected rank {ndim}",
                input.shape(),
                pattern.len()
            )));
        }
    }
    let mut shape = Vec::with_capacity(ndim);
    for axis in 0..ndim {
        let mut known: Option<usize> = None;
        for (n, (input, pattern)) in inputs.iter().zip(input_bc_patterns).enumerate() {
            let len = input.shape()[axis];
            if pattern[axis] {
                if len != 1 {
                    return Err(KernelError::broadcast(format!(
                        "input {n} axis {axis} is broadcastable but has length {len}"
                    )));
                }
                continue;
            }
            match known {
                None => known = Some(len),
                Some(expected) if expected != len => {
                    return Err(KernelError::broadcast(format!(
                        "incompatible vectorized shapes: input {n} has length {len} on \
                         non-broadcastable axis {axis}, expected {expected}"
                    )))
                }
                Some(_) => {}
            }
        }
        shape.push(known.unwrap_or(1));
    }
    Ok(shape)
}

/// Runs `core` over every output position, serially or on the rayon pool.
///
/// When the in-place map designates an input with the output's shape and dtype, the result is
/// written into that input's buffer.
pub fn vectorized(
    core: &CoreOutputStore,
    constants: &VectorizeConstants,
    inputs: Vec<Array>,
    target: VectorizeTarget,
) -> KernelResult<Array> {
    let nin = constants.input_bc_patterns.len();
    if inputs.len() != nin {
        return Err(KernelError::execution(format!(
            "vectorized kernel expects {nin} input(s), got {}",
            inputs.len()
        )));
    }
    let out_dtype = *constants
        .output_dtypes
        .first()
        .ok_or_else(|| KernelError::unsupported("vectorized kernel without outputs"))?;
    let shape = vectorized_shape(&inputs, &constants.input_bc_patterns)?;
    let strides = inputs
        .iter()
        .map(|input| input.broadcast_strides(&shape))
        .collect::<Result<Vec<_>, _>>()?;

    let compute = |flat: usize| -> KernelResult<Scalar> {
        let coords = unravel_index(flat, &shape);
        let args = inputs
            .iter()
            .zip(&strides)
            .map(|(input, strides)| {
                let offset = linear_offset(&coords, strides);
                input.get_flat(offset).ok_or_else(|| {
                    KernelError::execution(format!("input read at offset {offset} out of range"))
                })
            })
            .collect::<KernelResult<SmallVec<[Scalar; 4]>>>()?;
        let mut out = [Scalar::Int(0)];
        core.store(&args, &mut out)?;
        Ok(out[0])
    };

    let size = element_count(&shape);
    let values: Vec<Scalar> = match target {
        VectorizeTarget::Cpu => (0..size).map(&compute).collect::<KernelResult<_>>()?,
        VectorizeTarget::Parallel => (0..size)
            .into_par_iter()
            .map(&compute)
            .collect::<KernelResult<_>>()?,
    };

    let reuse = constants
        .inplace_pattern
        .iter()
        .find(|(output, _)| *output == 0)
        .map(|&(_, input)| input)
        .filter(|&input| {
            inputs.get(input).is_some_and(|array| {
                array.shape() == shape.as_slice() && array.dtype() == out_dtype
            })
        });
    match reuse {
        Some(input) => {
            tracing::debug!(input, "elemwise output reuses input buffer");
            let mut inputs = inputs;
            let mut buffer = inputs.swap_remove(input);
            for (flat, value) in values.into_iter().enumerate() {
                buffer.set_flat(flat, value)?;
            }
            Ok(buffer)
        }
        None => Ok(Array::from_scalars(out_dtype, shape, values)?),
    }
}

/// Reference elementwise evaluation used to cross-check [`vectorized`].
///
/// Inputs are broadcast to their common shape; a length-1 axis that is not flagged broadcastable
/// against a longer common axis is rejected before anything is computed. The result is finally
/// summed, with kept dimensions, over every axis flagged broadcastable in `output_bc_pattern`.
pub fn elemwise_reference(
    kernel: &ScalarKernel,
    input_bc_patterns: &[Vec<bool>],
    output_bc_pattern: &[bool],
    inputs: &[Array],
) -> KernelResult<Array> {
    if inputs.len() != input_bc_patterns.len() {
        return Err(KernelError::execution(format!(
            "reference elemwise expects {} input(s), got {}",
            input_bc_patterns.len(),
            inputs.len()
        )));
    }
    let shapes: Vec<&[usize]> = inputs.iter().map(Array::shape).collect();
    let shape =
        broadcast_shapes(&shapes).map_err(|err| KernelError::broadcast(err.to_string()))?;
    for (n, (input, pattern)) in inputs.iter().zip(input_bc_patterns).enumerate() {
        if pattern.len() != input.ndim() {
            return Err(KernelError::shape(format!(
                "input {n} has rank {} but a broadcast pattern of length {}",
                input.ndim(),
                pattern.len()
            )));
        }
        let lead = shape.len() - input.ndim();
        for (axis, (&len, &allow_bc)) in input.shape().iter().zip(pattern).enumerate() {
            let iter_len = shape[lead + axis];
            if len == 1 && iter_len != 1 && !allow_bc {
                return Err(KernelError::broadcast(format!(
                    "broadcast not allowed: input {n} axis {axis} has length 1 and is not \
                     broadcastable against length {iter_len}"
                )));
            }
        }
    }

    let inputs_bc = inputs
        .iter()
        .map(|input| input.broadcast_to(&shape))
        .collect::<Result<Vec<_>, _>>()?;
    let mut values = Vec::with_capacity(element_count(&shape));
    let mut args: SmallVec<[Scalar; 4]> = SmallVec::with_capacity(inputs_bc.len());
    for idx in NdIndex::new(&shape) {
        args.clear();
        for input in &inputs_bc {
            args.push(input.get(&idx)?);
        }
        values.push(kernel.eval(&args)?);
    }
    let ndim = shape.len();
    let mut output = Array::from_scalars(kernel.output_dtype(), shape, values)?;

    let summed_axes: Vec<usize> = output_bc_pattern
        .iter()
        .enumerate()
        .filter(|&(axis, &bc)| bc && axis < ndim)
        .map(|(axis, _)| axis)
        .collect();
    for axis in summed_axes {
        let sum = create_axis_reducer(
            &ScalarOp::Add,
            Scalar::Int(0),
            axis as isize,
            ndim,
            output.dtype(),
            true,
            false,
        )?;
        output = sum.reduce(&output, true)?.into_array();
    }
    Ok(output)
}
