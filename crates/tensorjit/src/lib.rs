//! Graph-side building blocks shared by tensorjit kernel backends: dtypes, scalar values and
//! operators, contiguous host arrays and the node description backends compile from.

pub mod array;
pub mod dtype;
pub mod graph;
pub mod scalar;
pub mod scalar_op;
pub mod utils;

pub use array::{Array, ArrayData, ArrayError, NdIndex, Value};
pub use dtype::DType;
pub use graph::{Node, Op, OpKind, TensorType};
pub use scalar::Scalar;
pub use scalar_op::{Composite, CompositeArg, CompositeNode, ScalarError, ScalarOp};
