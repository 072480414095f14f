//! Loop-nest kernel backend for tensorjit graph nodes.
//!
//! Every supported node is turned into a [`Kernel`]: a listing of the loops it runs plus an
//! executable form of exactly those loops.

pub mod codegen;
pub mod compiler;
pub mod config;
pub mod error;
pub mod kernel;
mod labels;

use tensorjit::graph::{Node, Op};

pub use codegen::axis_apply::{create_axis_apply_fn, AxisApply};
pub use codegen::emit::argmax::{argmax_lane, funcify_argmax};
pub use codegen::emit::elementwise::{funcify_elemwise, ElemwiseKernel};
pub use codegen::emit::reduce::{funcify_careduce, funcify_careduce_op, funcify_sum};
pub use codegen::emit::shape::funcify_dimshuffle;
pub use codegen::emit::softmax::{funcify_log_softmax, funcify_softmax, funcify_softmax_grad};
pub use codegen::inplace::{scalar_in_place_fn, InPlaceUpdate};
pub use codegen::multiaxis::{create_multiaxis_reducer, MultiAxisReducer, Reducer};
pub use codegen::reducer::{create_axis_reducer, AxisReducer};
pub use codegen::vectorize::{
    elemwise_reference, encode_literals, store_core_outputs, vectorized, CoreOutputStore,
    ScalarKernel, VectorizeConstants,
};
pub use codegen::LOOP_COUNTER;
pub use compiler::{
    compile, compile_shared, jit_compile_reducer, ArgType, CompileOptions, OptLevel, Signature,
};
pub use config::{JitConfig, VectorizeTarget};
pub use error::{KernelError, KernelResult};
pub use kernel::{Kernel, KernelDef};

/// Compiles `node` with `config`. Elementwise nodes yield their vectorized kernel; use
/// [`funcify_elemwise`] to also get the reference kernel.
pub fn funcify(node: &Node, config: &JitConfig) -> KernelResult<Kernel> {
    let kind = node.op.kind();
    tracing::debug!(
        op = %kind,
        label = labels::op_label(kind),
        nin = node.nin(),
        nout = node.nout(),
        "funcify node"
    );
    match &node.op {
        Op::Elemwise(op) => Ok(funcify_elemwise(node, op, config)?.vectorized),
        Op::CaReduce(op) => funcify_careduce_op(node, op, config),
        Op::Sum(op) => funcify_sum(node, op, config),
        Op::DimShuffle(op) => funcify_dimshuffle(node, op, config),
        Op::Softmax { axis } => funcify_softmax(node, *axis, config),
        Op::LogSoftmax { axis } => funcify_log_softmax(node, *axis, config),
        Op::SoftmaxGrad { axis } => funcify_softmax_grad(node, *axis, config),
        Op::Argmax { axis } => funcify_argmax(node, axis.as_deref(), config),
    }
}

/// Node compiler bound to one configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopBackend {
    config: JitConfig,
}

impl LoopBackend {
    pub fn new(config: JitConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &JitConfig {
        &self.config
    }

    pub fn compile_node(&self, node: &Node) -> KernelResult<Kernel> {
        funcify(node, &self.config)
    }

    pub fn compile_elemwise(&self, node: &Node) -> KernelResult<ElemwiseKernel> {
        match &node.op {
            Op::Elemwise(op) => funcify_elemwise(node, op, &self.config),
            other => Err(KernelError::unsupported(format!(
                "compile_elemwise called on a {} node",
                other.kind()
            ))),
        }
    }
}

impl Default for LoopBackend {
    /// Uses the process configuration read from the environment.
    fn default() -> Self {
        Self::new(*JitConfig::global())
    }
}
