//! Axis normalization, static broadcasting and gufunc-style core signatures.

use std::collections::{BTreeSet, HashMap};

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AxisError {
    #[error("axis {axis} is out of bounds for array of dimension {ndim}")]
    OutOfBounds { axis: isize, ndim: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("not a valid gufunc signature: {0}")]
    Format(String),
    #[error("signature {signature} expects {expected} operand(s), got {got}")]
    OperandCount {
        signature: String,
        expected: usize,
        got: usize,
    },
    #[error(
        "operand {operand} of signature {signature} needs at least {expected} core dims, got {got}"
    )]
    CoreRank {
        signature: String,
        operand: usize,
        expected: usize,
        got: usize,
    },
    #[error("inconsistent size for core dimension '{name}': {first} vs {second}")]
    InconsistentDim {
        name: String,
        first: usize,
        second: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("incompatible static dimension lengths {lengths:?}")]
pub struct StaticBroadcastError {
    pub lengths: Vec<Option<usize>>,
}

/// Resolves a possibly negative axis against `ndim`.
pub fn normalize_axis_index(axis: isize, ndim: usize) -> Result<usize, AxisError> {
    let resolved = if axis < 0 { axis + ndim as isize } else { axis };
    if resolved < 0 || resolved as usize >= ndim {
        return Err(AxisError::OutOfBounds { axis, ndim });
    }
    Ok(resolved as usize)
}

/// Normalizes a set of axes: negatives resolved, duplicates dropped, first-appearance order kept.
pub fn normalize_axis_tuple(axes: &[isize], ndim: usize) -> Result<Vec<usize>, AxisError> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::with_capacity(axes.len());
    for &axis in axes {
        let resolved = normalize_axis_index(axis, ndim)?;
        if seen.insert(resolved) {
            out.push(resolved);
        }
    }
    Ok(out)
}

/// Static broadcast of per-input lengths for one axis (`None` = unknown at graph-build time).
///
/// Returns the common length, `None` when it can only be known at runtime, or an error when two
/// distinct non-unit lengths meet.
pub fn broadcast_static_dim_lengths(
    lengths: &[Option<usize>],
) -> Result<Option<usize>, StaticBroadcastError> {
    let distinct: BTreeSet<Option<usize>> = lengths.iter().copied().collect();
    if distinct.len() == 1 {
        return Ok(distinct.into_iter().next().flatten());
    }
    if distinct.len() == 2 && distinct.contains(&None) && distinct.contains(&Some(1)) {
        return Ok(None);
    }
    let known: BTreeSet<usize> = distinct
        .into_iter()
        .flatten()
        .filter(|&len| len != 1)
        .collect();
    if known.len() > 1 {
        return Err(StaticBroadcastError {
            lengths: lengths.to_vec(),
        });
    }
    Ok(known.into_iter().next())
}

const DIMENSION_NAME: &str = r"\w+";

static CORE_DIMENSION_LIST: Lazy<String> =
    Lazy::new(|| format!("(?:{DIMENSION_NAME}(?:,{DIMENSION_NAME})*)?"));
static ARGUMENT: Lazy<String> = Lazy::new(|| format!(r"\({}\)", *CORE_DIMENSION_LIST));
static ARGUMENT_LIST: Lazy<String> = Lazy::new(|| format!("{0}(?:,{0})*", *ARGUMENT));

static SIGNATURE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!("^(?:{0})?->{0}$", *ARGUMENT_LIST)).expect("gufunc signature grammar")
});
static ARGUMENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(&ARGUMENT).expect("gufunc argument"));
static DIMENSION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(DIMENSION_NAME).expect("gufunc dimension"));
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace"));

/// Core dimension names per operand, e.g. `(m,n),(n,p)->(m,p)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreSignature {
    pub inputs: Vec<Vec<String>>,
    pub outputs: Vec<Vec<String>>,
}

/// Parses a generalized-ufunc signature; whitespace is ignored and inputs may be empty.
pub fn parse_gufunc_signature(signature: &str) -> Result<CoreSignature, SignatureError> {
    let compact = WHITESPACE_RE.replace_all(signature, "").into_owned();
    if !SIGNATURE_RE.is_match(&compact) {
        return Err(SignatureError::Format(signature.to_string()));
    }
    let (lhs, rhs) = compact
        .split_once("->")
        .ok_or_else(|| SignatureError::Format(signature.to_string()))?;
    let parse_list = |list: &str| -> Vec<Vec<String>> {
        ARGUMENT_RE
            .find_iter(list)
            .map(|arg| {
                DIMENSION_RE
                    .find_iter(arg.as_str())
                    .map(|dim| dim.as_str().to_string())
                    .collect()
            })
            .collect()
    };
    Ok(CoreSignature {
        inputs: parse_list(lhs),
        outputs: parse_list(rhs),
    })
}

/// Builds a signature with unique dimension names for the given core ranks.
pub fn safe_signature(core_inputs_ndim: &[usize], core_outputs_ndim: &[usize]) -> String {
    fn operand_sig(ndim: usize, prefix: &str) -> String {
        let dims: Vec<String> = (0..ndim).map(|i| format!("{prefix}{i}")).collect();
        format!("({})", dims.join(","))
    }
    let inputs: Vec<String> = core_inputs_ndim
        .iter()
        .enumerate()
        .map(|(n, &ndim)| operand_sig(ndim, &format!("i{n}")))
        .collect();
    let outputs: Vec<String> = core_outputs_ndim
        .iter()
        .enumerate()
        .map(|(n, &ndim)| operand_sig(ndim, &format!("o{n}")))
        .collect();
    format!("{}->{}", inputs.join(","), outputs.join(","))
}

impl CoreSignature {
    pub fn parse(signature: &str) -> Result<Self, SignatureError> {
        parse_gufunc_signature(signature)
    }

    pub fn render(&self) -> String {
        let side = |ops: &[Vec<String>]| {
            ops.iter()
                .map(|dims| format!("({})", dims.join(",")))
                .collect::<Vec<_>>()
                .join(",")
        };
        format!("{}->{}", side(&self.inputs), side(&self.outputs))
    }

    /// Binds core dimension names to the trailing dims of the given input shapes.
    ///
    /// A name used by several operands must bind to the same length everywhere.
    pub fn bind(&self, shapes: &[&[usize]]) -> Result<HashMap<String, usize>, SignatureError> {
        if shapes.len() != self.inputs.len() {
            return Err(SignatureError::OperandCount {
                signature: self.render(),
                expected: self.inputs.len(),
                got: shapes.len(),
            });
        }
        let mut sizes: HashMap<String, usize> = HashMap::new();
        for (operand, (dims, shape)) in self.inputs.iter().zip(shapes).enumerate() {
            if shape.len() < dims.len() {
                return Err(SignatureError::CoreRank {
                    signature: self.render(),
                    operand,
                    expected: dims.len(),
                    got: shape.len(),
                });
            }
            let core = &shape[shape.len() - dims.len()..];
            for (name, &len) in dims.iter().zip(core) {
                match sizes.get(name) {
                    Some(&first) if first != len => {
                        return Err(SignatureError::InconsistentDim {
                            name: name.clone(),
                            first,
                            second: len,
                        })
                    }
                    Some(_) => {}
                    None => {
                        sizes.insert(name.clone(), len);
                    }
                }
            }
        }
        Ok(sizes)
    }
}
