//! Per-operator kernel assembly on top of the reduction, elementwise and axis-apply primitives.

pub mod argmax;
pub mod elementwise;
pub mod reduce;
pub mod shape;
pub mod softmax;

use tensorjit::graph::{Node, TensorType};

use crate::error::{KernelError, KernelResult};

pub(crate) fn single_input<'a>(node: &'a Node, op: &'static str) -> KernelResult<&'a TensorType> {
    match node.inputs.as_slice() {
        [input] => Ok(input),
        inputs => Err(KernelError::unimplemented(
            op,
            format!("expected one input, node has {}", inputs.len()),
        )),
    }
}

pub(crate) fn single_output<'a>(node: &'a Node, op: &'static str) -> KernelResult<&'a TensorType> {
    match node.outputs.as_slice() {
        [output] => Ok(output),
        outputs => Err(KernelError::unsupported(format!(
            "{op} expects one output, node has {}",
            outputs.len()
        ))),
    }
}
