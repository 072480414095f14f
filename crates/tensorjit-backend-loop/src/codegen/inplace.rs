//! In-place accumulation statements for binary scalar operators.
//!
//! Each registered operator maps to one statement of the form `res[idx] = res[idx] <op> arr`.
//! [`InPlaceUpdate::render`] produces the listing text and [`InPlaceUpdate::apply`] executes the
//! same statement. The running mean reads the enclosing loop counter [`LOOP_COUNTER`], which the
//! reduction loop always binds starting from zero; `apply` receives it explicitly.

use tensorjit::dtype::DType;
use tensorjit::scalar::{binary_arith, floor_div, Scalar};
use tensorjit::scalar_op::{mul_without_zeros, ScalarOp};

use super::utils::LOOP_COUNTER;
use crate::error::{KernelError, KernelResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InPlaceUpdate {
    Add,
    Sub,
    Mean,
    Mul,
    MulWithoutZeros,
    And,
    Or,
    Xor,
    TrueDiv,
    IntDiv,
    Max,
    Min,
}

impl InPlaceUpdate {
    /// Looks up the update rule for `op` accumulating into `dtype`.
    pub fn for_op(op: &ScalarOp, dtype: DType) -> KernelResult<Self> {
        let update = match op {
            ScalarOp::Add => InPlaceUpdate::Add,
            ScalarOp::Sub => InPlaceUpdate::Sub,
            ScalarOp::Mean => InPlaceUpdate::Mean,
            ScalarOp::Mul => InPlaceUpdate::Mul,
            ScalarOp::MulWithoutZeros => InPlaceUpdate::MulWithoutZeros,
            ScalarOp::And => InPlaceUpdate::And,
            ScalarOp::Or => InPlaceUpdate::Or,
            ScalarOp::Xor => InPlaceUpdate::Xor,
            ScalarOp::TrueDiv => InPlaceUpdate::TrueDiv,
            ScalarOp::IntDiv => InPlaceUpdate::IntDiv,
            ScalarOp::Maximum => InPlaceUpdate::Max,
            ScalarOp::Minimum => InPlaceUpdate::Min,
            other => {
                return Err(KernelError::unimplemented(
                    other.name(),
                    "no in-place update statement is registered for this scalar op",
                ))
            }
        };
        if update.is_bitwise() && dtype.is_float() {
            return Err(KernelError::unimplemented(
                op.name(),
                format!("bitwise in-place update on {dtype}"),
            ));
        }
        Ok(update)
    }

    pub fn is_bitwise(self) -> bool {
        matches!(
            self,
            InPlaceUpdate::And | InPlaceUpdate::Or | InPlaceUpdate::Xor
        )
    }

    /// Statement text updating `res[idx]` with `arr`.
    pub fn render(self, idx: &str, res: &str, arr: &str) -> String {
        let slot = format!("{res}[{idx}]");
        match self {
            InPlaceUpdate::Add => format!("{slot} += {arr};"),
            InPlaceUpdate::Sub => format!("{slot} -= {arr};"),
            InPlaceUpdate::Mean => {
                format!("{slot} += ({arr} - {slot}) / ({LOOP_COUNTER} + 1);")
            }
            InPlaceUpdate::Mul => format!("{slot} *= {arr};"),
            InPlaceUpdate::MulWithoutZeros => format!(
                "{slot} = {slot} == 0 ? {arr} : ({arr} == 0 ? {slot} : {slot} * {arr});"
            ),
            InPlaceUpdate::And => format!("{slot} &= {arr};"),
            InPlaceUpdate::Or => format!("{slot} |= {arr};"),
            InPlaceUpdate::Xor => format!("{slot} ^= {arr};"),
            InPlaceUpdate::TrueDiv => format!("{slot} /= {arr};"),
            InPlaceUpdate::IntDiv => format!("{slot} = floor_divide({slot}, {arr});"),
            InPlaceUpdate::Max => format!("if ({slot} < {arr}) {{\n  {slot} = {arr};\n}}"),
            InPlaceUpdate::Min => format!("if ({slot} > {arr}) {{\n  {slot} = {arr};\n}}"),
        }
    }

    /// Executes the statement: `acc` is the current `res[idx]`, `value` is `arr` and `i` is the
    /// zero-based position along the reduced axis.
    pub fn apply(self, acc: Scalar, value: Scalar, i: usize, dtype: DType) -> Scalar {
        match self {
            InPlaceUpdate::Add => {
                binary_arith(acc, value, dtype, i64::wrapping_add, u64::wrapping_add, |a, b| {
                    a + b
                })
            }
            InPlaceUpdate::Sub => {
                binary_arith(acc, value, dtype, i64::wrapping_sub, u64::wrapping_sub, |a, b| {
                    a - b
                })
            }
            InPlaceUpdate::Mean => {
                let current = acc.as_f64();
                let step = (value.as_f64() - current) / (i as f64 + 1.0);
                Scalar::Float(current + step).cast(dtype)
            }
            InPlaceUpdate::Mul => {
                binary_arith(acc, value, dtype, i64::wrapping_mul, u64::wrapping_mul, |a, b| {
                    a * b
                })
            }
            InPlaceUpdate::MulWithoutZeros => mul_without_zeros(acc, value, dtype),
            InPlaceUpdate::And => {
                binary_arith(acc, value, dtype, |a, b| a & b, |a, b| a & b, |a, _| a)
            }
            InPlaceUpdate::Or => {
                binary_arith(acc, value, dtype, |a, b| a | b, |a, b| a | b, |a, _| a)
            }
            InPlaceUpdate::Xor => {
                binary_arith(acc, value, dtype, |a, b| a ^ b, |a, b| a ^ b, |a, _| a)
            }
            InPlaceUpdate::TrueDiv => Scalar::Float(acc.as_f64() / value.as_f64()).cast(dtype),
            InPlaceUpdate::IntDiv => floor_div(acc, value, dtype),
            InPlaceUpdate::Max => {
                if acc.lt(value) {
                    value.cast(dtype)
                } else {
                    acc
                }
            }
            InPlaceUpdate::Min => {
                if acc.gt(value) {
                    value.cast(dtype)
                } else {
                    acc
                }
            }
        }
    }
}

/// Statement text for `op`; fails for operators without a registered update.
pub fn scalar_in_place_fn(
    op: &ScalarOp,
    dtype: DType,
    idx: &str,
    res: &str,
    arr: &str,
) -> KernelResult<String> {
    Ok(InPlaceUpdate::for_op(op, dtype)?.render(idx, res, arr))
}
