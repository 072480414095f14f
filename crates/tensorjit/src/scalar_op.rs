//! Scalar operator catalogue: semantics, reduction identities and code fragments.
//!
//! Tensor-level ops (elemwise, reductions) are parameterized by one of these operators.
//! Backends consume [`ScalarOp::eval`] for per-element evaluation and [`ScalarOp::render`]
//! for the matching expression text in kernel listings.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dtype::DType;
use crate::scalar::{binary_arith, floor_div, Scalar};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScalarError {
    #[error("scalar op {op} expects {expected} argument(s), got {got}")]
    Arity {
        op: &'static str,
        expected: String,
        got: usize,
    },
    #[error("scalar op {op} does not support dtype {dtype}")]
    DTypeNotSupported { op: &'static str, dtype: DType },
    #[error("composite references undefined {what} {index}")]
    CompositeReference { what: &'static str, index: usize },
}

/// Binary and unary scalar operators available to elemwise and reduction nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarOp {
    Add,
    Sub,
    Mul,
    TrueDiv,
    IntDiv,
    /// Arithmetic mean of the operands; as a reduction it accumulates a running mean.
    Mean,
    /// Multiplication treating zero as "absent" rather than as an annihilator.
    MulWithoutZeros,
    Maximum,
    Minimum,
    And,
    Or,
    Xor,
    Neg,
    Abs,
    Exp,
    Log,
    Sqrt,
    Tanh,
    Pow,
    Identity,
    Composite(Composite),
}

/// Single-output fused expression over `nin` scalar inputs.
///
/// Nodes are evaluated in order; a node may reference inputs, earlier nodes or constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Composite {
    pub nin: usize,
    pub nodes: Vec<CompositeNode>,
    pub output: CompositeArg,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeNode {
    pub op: ScalarOp,
    pub args: Vec<CompositeArg>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositeArg {
    Input(usize),
    Node(usize),
    Const(f64),
}

enum Arity {
    Exactly(usize),
    AtLeast(usize),
}

impl ScalarOp {
    pub fn name(&self) -> &'static str {
        match self {
            ScalarOp::Add => "add",
            ScalarOp::Sub => "sub",
            ScalarOp::Mul => "mul",
            ScalarOp::TrueDiv => "true_div",
            ScalarOp::IntDiv => "int_div",
            ScalarOp::Mean => "mean",
            ScalarOp::MulWithoutZeros => "mul_without_zeros",
            ScalarOp::Maximum => "maximum",
            ScalarOp::Minimum => "minimum",
            ScalarOp::And => "and",
            ScalarOp::Or => "or",
            ScalarOp::Xor => "xor",
            ScalarOp::Neg => "neg",
            ScalarOp::Abs => "abs",
            ScalarOp::Exp => "exp",
            ScalarOp::Log => "log",
            ScalarOp::Sqrt => "sqrt",
            ScalarOp::Tanh => "tanh",
            ScalarOp::Pow => "pow",
            ScalarOp::Identity => "identity",
            ScalarOp::Composite(_) => "composite",
        }
    }

    fn arity(&self) -> Arity {
        match self {
            ScalarOp::Add
            | ScalarOp::Mul
            | ScalarOp::Mean
            | ScalarOp::MulWithoutZeros
            | ScalarOp::Maximum
            | ScalarOp::Minimum
            | ScalarOp::And
            | ScalarOp::Or
            | ScalarOp::Xor => Arity::AtLeast(1),
            ScalarOp::Sub | ScalarOp::TrueDiv | ScalarOp::IntDiv | ScalarOp::Pow => {
                Arity::Exactly(2)
            }
            ScalarOp::Neg
            | ScalarOp::Abs
            | ScalarOp::Exp
            | ScalarOp::Log
            | ScalarOp::Sqrt
            | ScalarOp::Tanh
            | ScalarOp::Identity => Arity::Exactly(1),
            ScalarOp::Composite(composite) => Arity::Exactly(composite.nin),
        }
    }

    pub fn check_arity(&self, got: usize) -> Result<(), ScalarError> {
        let (ok, expected) = match self.arity() {
            Arity::Exactly(n) => (got == n, n.to_string()),
            Arity::AtLeast(n) => (got >= n, format!("at least {n}")),
        };
        if ok {
            Ok(())
        } else {
            Err(ScalarError::Arity {
                op: self.name(),
                expected,
                got,
            })
        }
    }

    /// Neutral element used to seed reductions; `None` when the operator has none.
    ///
    /// Infinite identities are clamped per accumulator dtype by the consumer.
    pub fn identity(&self) -> Option<f64> {
        match self {
            ScalarOp::Add | ScalarOp::Mean | ScalarOp::Or | ScalarOp::Xor => Some(0.0),
            ScalarOp::MulWithoutZeros => Some(0.0),
            ScalarOp::Mul => Some(1.0),
            ScalarOp::And => Some(-1.0),
            ScalarOp::Maximum => Some(f64::NEG_INFINITY),
            ScalarOp::Minimum => Some(f64::INFINITY),
            _ => None,
        }
    }

    pub fn is_bitwise(&self) -> bool {
        matches!(self, ScalarOp::And | ScalarOp::Or | ScalarOp::Xor)
    }

    /// Evaluates the operator on `args`, producing a value of `out`.
    pub fn eval(&self, args: &[Scalar], out: DType) -> Result<Scalar, ScalarError> {
        self.check_arity(args.len())?;
        if self.is_bitwise() && (out.is_float() || args.iter().any(|a| a.is_float())) {
            return Err(ScalarError::DTypeNotSupported {
                op: self.name(),
                dtype: out,
            });
        }
        let first = args[0];
        let value = match self {
            ScalarOp::Add => fold(args, out, |a, b| {
                binary_arith(a, b, out, i64::wrapping_add, u64::wrapping_add, |x, y| x + y)
            }),
            ScalarOp::Mul => fold(args, out, |a, b| {
                binary_arith(a, b, out, i64::wrapping_mul, u64::wrapping_mul, |x, y| x * y)
            }),
            ScalarOp::Sub => {
                binary_arith(first, args[1], out, i64::wrapping_sub, u64::wrapping_sub, |x, y| {
                    x - y
                })
            }
            ScalarOp::TrueDiv => Scalar::Float(first.as_f64() / args[1].as_f64()).cast(out),
            ScalarOp::IntDiv => floor_div(first, args[1], out),
            ScalarOp::Mean => {
                let total: f64 = args.iter().map(|a| a.as_f64()).sum();
                Scalar::Float(total / args.len() as f64).cast(out)
            }
            ScalarOp::MulWithoutZeros => fold(args, out, |a, b| mul_without_zeros(a, b, out)),
            ScalarOp::Maximum => fold(args, out, |a, b| {
                if a.is_nan() || b.is_nan() {
                    Scalar::Float(f64::NAN).cast(out)
                } else if a.lt(b) {
                    b.cast(out)
                } else {
                    a.cast(out)
                }
            }),
            ScalarOp::Minimum => fold(args, out, |a, b| {
                if a.is_nan() || b.is_nan() {
                    Scalar::Float(f64::NAN).cast(out)
                } else if a.gt(b) {
                    b.cast(out)
                } else {
                    a.cast(out)
                }
            }),
            ScalarOp::And => fold(args, out, |a, b| {
                binary_arith(a, b, out, |x, y| x & y, |x, y| x & y, |x, _| x)
            }),
            ScalarOp::Or => fold(args, out, |a, b| {
                binary_arith(a, b, out, |x, y| x | y, |x, y| x | y, |x, _| x)
            }),
            ScalarOp::Xor => fold(args, out, |a, b| {
                binary_arith(a, b, out, |x, y| x ^ y, |x, y| x ^ y, |x, _| x)
            }),
            ScalarOp::Neg => match first {
                Scalar::Float(v) => Scalar::Float(-v).cast(out),
                Scalar::UInt(v) => Scalar::UInt(v.wrapping_neg()).cast(out),
                other => Scalar::Int(other.as_i64().wrapping_neg()).cast(out),
            },
            ScalarOp::Abs => match first {
                Scalar::Float(v) => Scalar::Float(v.abs()).cast(out),
                Scalar::Int(v) => Scalar::Int(v.wrapping_abs()).cast(out),
                other => other.cast(out),
            },
            ScalarOp::Exp => Scalar::Float(first.as_f64().exp()).cast(out),
            ScalarOp::Log => Scalar::Float(first.as_f64().ln()).cast(out),
            ScalarOp::Sqrt => Scalar::Float(first.as_f64().sqrt()).cast(out),
            ScalarOp::Tanh => Scalar::Float(first.as_f64().tanh()).cast(out),
            ScalarOp::Pow => pow(first, args[1], out),
            ScalarOp::Identity => first.cast(out),
            ScalarOp::Composite(composite) => composite.eval(args, out)?,
        };
        Ok(value)
    }

    /// Renders the operator applied to argument expressions as listing text.
    pub fn render(&self, args: &[String]) -> String {
        let arg = |i: usize| args.get(i).map(String::as_str).unwrap_or("?");
        match self {
            ScalarOp::Add => infix(args, "+"),
            ScalarOp::Sub => infix(args, "-"),
            ScalarOp::Mul => infix(args, "*"),
            ScalarOp::TrueDiv => infix(args, "/"),
            ScalarOp::And => infix(args, "&"),
            ScalarOp::Or => infix(args, "|"),
            ScalarOp::Xor => infix(args, "^"),
            ScalarOp::IntDiv => format!("floor_divide({}, {})", arg(0), arg(1)),
            ScalarOp::Mean => format!("({}) / {}", args.join(" + "), args.len()),
            ScalarOp::Neg => format!("(-{})", arg(0)),
            ScalarOp::Identity => arg(0).to_string(),
            ScalarOp::Composite(composite) => composite.render(args),
            other => format!("{}({})", other.name(), args.join(", ")),
        }
    }
}

fn infix(args: &[String], op: &str) -> String {
    format!("({})", args.join(&format!(" {op} ")))
}

fn fold(args: &[Scalar], out: DType, step: impl Fn(Scalar, Scalar) -> Scalar) -> Scalar {
    let mut acc = args[0].cast(out);
    for &value in &args[1..] {
        acc = step(acc, value);
    }
    acc
}

/// `rhs` when `lhs` is zero, `lhs` when `rhs` is zero, otherwise the product.
pub fn mul_without_zeros(lhs: Scalar, rhs: Scalar, out: DType) -> Scalar {
    if lhs.is_zero() {
        rhs.cast(out)
    } else if rhs.is_zero() {
        lhs.cast(out)
    } else {
        binary_arith(lhs, rhs, out, i64::wrapping_mul, u64::wrapping_mul, |x, y| x * y)
    }
}

fn pow(base: Scalar, exp: Scalar, out: DType) -> Scalar {
    if out.is_float() || base.is_float() || exp.is_float() || exp.as_i64() < 0 {
        return Scalar::Float(base.as_f64().powf(exp.as_f64())).cast(out);
    }
    let e = u32::try_from(exp.as_u64()).unwrap_or(u32::MAX);
    if out.is_unsigned_integer() {
        Scalar::UInt(base.as_u64().wrapping_pow(e)).cast(out)
    } else {
        Scalar::Int(base.as_i64().wrapping_pow(e)).cast(out)
    }
}

impl Composite {
    fn resolve(
        &self,
        arg: CompositeArg,
        inputs: &[Scalar],
        values: &[Scalar],
    ) -> Result<Scalar, ScalarError> {
        match arg {
            CompositeArg::Input(i) => inputs
                .get(i)
                .copied()
                .ok_or(ScalarError::CompositeReference { what: "input", index: i }),
            CompositeArg::Node(i) => values
                .get(i)
                .copied()
                .ok_or(ScalarError::CompositeReference { what: "node", index: i }),
            CompositeArg::Const(v) => Ok(Scalar::Float(v)),
        }
    }

    pub fn eval(&self, inputs: &[Scalar], out: DType) -> Result<Scalar, ScalarError> {
        let mut values = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            let args = node
                .args
                .iter()
                .map(|&arg| self.resolve(arg, inputs, &values))
                .collect::<Result<Vec<_>, _>>()?;
            values.push(node.op.eval(&args, out)?);
        }
        self.resolve(self.output, inputs, &values)
            .map(|value| value.cast(out))
    }

    pub fn render(&self, inputs: &[String]) -> String {
        let mut rendered: Vec<String> = Vec::with_capacity(self.nodes.len());
        let text = |arg: CompositeArg, rendered: &[String]| match arg {
            CompositeArg::Input(i) => inputs.get(i).cloned().unwrap_or_else(|| format!("in{i}")),
            CompositeArg::Node(i) => rendered.get(i).cloned().unwrap_or_else(|| format!("n{i}")),
            CompositeArg::Const(v) => Scalar::Float(v).to_string(),
        };
        for node in &self.nodes {
            let args: Vec<String> = node.args.iter().map(|&a| text(a, &rendered)).collect();
            rendered.push(node.op.render(&args));
        }
        text(self.output, &rendered)
    }
}

impl fmt::Display for ScalarOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
