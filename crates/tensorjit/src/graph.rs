//! Graph node description consumed by kernel backends.
//!
//! Backends only read these types: input/output arity, dtypes, static shapes, broadcast patterns
//! and the operator payload.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dtype::DType;
use crate::scalar_op::ScalarOp;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("invalid dimshuffle: {0}")]
    InvalidDimShuffle(String),
    #[error("tensor type broadcast pattern has {pattern} entries for rank {ndim}")]
    PatternRank { pattern: usize, ndim: usize },
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Static type of one tensor edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TensorType {
    pub dtype: DType,
    /// Per-axis length when known at graph-build time.
    pub shape: Vec<Option<usize>>,
    /// Per-axis flag: the axis has length 1 and may broadcast against a longer peer.
    pub broadcastable: Vec<bool>,
}

impl TensorType {
    /// Builds a type whose broadcast pattern follows the static shape (length 1 is broadcastable).
    pub fn new(dtype: DType, shape: Vec<Option<usize>>) -> Self {
        let broadcastable = shape.iter().map(|d| *d == Some(1)).collect();
        Self {
            dtype,
            shape,
            broadcastable,
        }
    }

    /// Fully static type.
    pub fn fixed(dtype: DType, shape: &[usize]) -> Self {
        Self::new(dtype, shape.iter().copied().map(Some).collect())
    }

    /// Type of rank `ndim` with unknown lengths and no broadcastable axes.
    pub fn dynamic(dtype: DType, ndim: usize) -> Self {
        Self::new(dtype, vec![None; ndim])
    }

    pub fn with_broadcastable(mut self, pattern: Vec<bool>) -> Result<Self, GraphError> {
        if pattern.len() != self.shape.len() {
            return Err(GraphError::PatternRank {
                pattern: pattern.len(),
                ndim: self.shape.len(),
            });
        }
        self.broadcastable = pattern;
        Ok(self)
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn static_shape(&self) -> Option<Vec<usize>> {
        self.shape.iter().copied().collect()
    }
}

/// Elementwise application of a scalar operator with optional output/input buffer aliasing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Elemwise {
    pub scalar_op: ScalarOp,
    /// Output index -> input index whose buffer the output may overwrite.
    #[serde(default, with = "index_pairs")]
    pub inplace_pattern: BTreeMap<usize, usize>,
}

/// Integer-keyed maps as `[[key, value], ...]`: object keys inside a tagged `Op` do not read
/// back as integers.
mod index_pairs {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        map: &BTreeMap<usize, usize>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(map.iter().map(|(&key, &value)| (key, value)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<usize, usize>, D::Error> {
        let pairs = Vec::<(usize, usize)>::deserialize(deserializer)?;
        Ok(pairs.into_iter().collect())
    }
}

/// Commutative-associative reduction over `axis` (all axes when `None`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CAReduce {
    pub scalar_op: ScalarOp,
    #[serde(default)]
    pub axis: Option<Vec<isize>>,
    #[serde(default)]
    pub acc_dtype: Option<DType>,
}

/// Sum reduction with an optional accumulator dtype.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sum {
    #[serde(default)]
    pub axis: Option<Vec<isize>>,
    #[serde(default)]
    pub acc_dtype: Option<DType>,
}

/// One entry of a dimshuffle order: an input axis or a new broadcastable axis (`'x'`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DimEntry {
    Axis(usize),
    Augment,
}

/// Axis permutation with insertion of broadcastable axes and removal of length-1 axes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DimShuffle {
    pub input_ndim: usize,
    pub new_order: Vec<DimEntry>,
    #[serde(default)]
    pub inplace: bool,
}

impl DimShuffle {
    pub fn new(
        input_ndim: usize,
        new_order: Vec<DimEntry>,
        inplace: bool,
    ) -> Result<Self, GraphError> {
        let shuffle = Self {
            input_ndim,
            new_order,
            inplace,
        };
        shuffle.validate()?;
        Ok(shuffle)
    }

    /// Checks that every referenced input axis exists and appears at most once.
    pub fn validate(&self) -> Result<(), GraphError> {
        let mut seen = vec![false; self.input_ndim];
        for entry in &self.new_order {
            if let DimEntry::Axis(axis) = *entry {
                if axis >= self.input_ndim {
                    return Err(GraphError::InvalidDimShuffle(format!(
                        "axis {axis} out of range for input of rank {}",
                        self.input_ndim
                    )));
                }
                if std::mem::replace(&mut seen[axis], true) {
                    return Err(GraphError::InvalidDimShuffle(format!(
                        "axis {axis} appears more than once"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Input axes kept, in output order.
    pub fn shuffle(&self) -> Vec<usize> {
        self.new_order
            .iter()
            .filter_map(|entry| match entry {
                DimEntry::Axis(axis) => Some(*axis),
                DimEntry::Augment => None,
            })
            .collect()
    }

    /// Input axes dropped; they must have length 1 at runtime.
    pub fn drop(&self) -> Vec<usize> {
        let kept = self.shuffle();
        (0..self.input_ndim).filter(|a| !kept.contains(a)).collect()
    }

    /// Kept axes followed by dropped axes: a full permutation of the input axes.
    pub fn transposition(&self) -> Vec<usize> {
        let mut perm = self.shuffle();
        perm.extend(self.drop());
        perm
    }

    /// Output positions holding inserted broadcastable axes.
    pub fn augment(&self) -> Vec<usize> {
        self.new_order
            .iter()
            .enumerate()
            .filter(|(_, entry)| matches!(entry, DimEntry::Augment))
            .map(|(pos, _)| pos)
            .collect()
    }
}

/// Tensor-level operator payload, one variant per supported kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Op {
    Elemwise(Elemwise),
    CaReduce(CAReduce),
    Sum(Sum),
    DimShuffle(DimShuffle),
    Softmax { axis: Option<isize> },
    LogSoftmax { axis: Option<isize> },
    SoftmaxGrad { axis: Option<isize> },
    /// Joint argmax over `axis` (all axes when `None`).
    Argmax { axis: Option<Vec<usize>> },
}

/// Payload-free tag for [`Op`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    Elemwise,
    CaReduce,
    Sum,
    DimShuffle,
    Softmax,
    LogSoftmax,
    SoftmaxGrad,
    Argmax,
}

impl Op {
    pub fn kind(&self) -> OpKind {
        match self {
            Op::Elemwise(_) => OpKind::Elemwise,
            Op::CaReduce(_) => OpKind::CaReduce,
            Op::Sum(_) => OpKind::Sum,
            Op::DimShuffle(_) => OpKind::DimShuffle,
            Op::Softmax { .. } => OpKind::Softmax,
            Op::LogSoftmax { .. } => OpKind::LogSoftmax,
            Op::SoftmaxGrad { .. } => OpKind::SoftmaxGrad,
            Op::Argmax { .. } => OpKind::Argmax,
        }
    }
}

impl OpKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OpKind::Elemwise => "elemwise",
            OpKind::CaReduce => "careduce",
            OpKind::Sum => "sum",
            OpKind::DimShuffle => "dimshuffle",
            OpKind::Softmax => "softmax",
            OpKind::LogSoftmax => "log_softmax",
            OpKind::SoftmaxGrad => "softmax_grad",
            OpKind::Argmax => "argmax",
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Applied operator: the op plus the static types of its inputs and outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub op: Op,
    pub inputs: Vec<TensorType>,
    pub outputs: Vec<TensorType>,
}

impl Node {
    pub fn new(op: Op, inputs: Vec<TensorType>, outputs: Vec<TensorType>) -> Self {
        Self {
            op,
            inputs,
            outputs,
        }
    }

    pub fn nin(&self) -> usize {
        self.inputs.len()
    }

    pub fn nout(&self) -> usize {
        self.outputs.len()
    }

    pub fn to_json(&self) -> Result<String, GraphError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(src: &str) -> Result<Self, GraphError> {
        Ok(serde_json::from_str(src)?)
    }
}
