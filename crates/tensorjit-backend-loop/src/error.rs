use tensorjit::array::ArrayError;
use tensorjit::graph::GraphError;
use tensorjit::scalar_op::ScalarError;
use tensorjit::utils::{AxisError, SignatureError, StaticBroadcastError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KernelError {
    #[error("{op} is not implemented: {reason}")]
    Unimplemented { op: &'static str, reason: String },
    #[error("unsupported kernel configuration: {0}")]
    UnsupportedConfig(String),
    #[error(transparent)]
    InvalidAxis(#[from] AxisError),
    #[error("broadcast violation: {0}")]
    BroadcastViolation(String),
    #[error("kernel signature mismatch: {0}")]
    Signature(String),
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),
    #[error("kernel execution failure: {0}")]
    Execution(String),
    #[error(transparent)]
    Array(#[from] ArrayError),
    #[error(transparent)]
    Scalar(#[from] ScalarError),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    SignatureFormat(#[from] SignatureError),
    #[error(transparent)]
    StaticBroadcast(#[from] StaticBroadcastError),
    #[error(transparent)]
    Encode(#[from] serde_json::Error),
}

impl KernelError {
    pub fn unimplemented(op: &'static str, reason: impl Into<String>) -> Self {
        KernelError::Unimplemented {
            op,
            reason: reason.into(),
        }
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        KernelError::UnsupportedConfig(message.into())
    }

    pub fn broadcast(message: impl Into<String>) -> Self {
        KernelError::BroadcastViolation(message.into())
    }

    pub fn shape(message: impl Into<String>) -> Self {
        KernelError::ShapeMismatch(message.into())
    }

    pub fn execution(message: impl Into<String>) -> Self {
        KernelError::Execution(message.into())
    }
}

pub type KernelResult<T> = Result<T, KernelError>;
