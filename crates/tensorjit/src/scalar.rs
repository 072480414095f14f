//! Dynamically typed scalar values and dtype-aware arithmetic.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::dtype::{DType, Storage};

/// One element read from (or written to) an [`crate::Array`].
///
/// Values are held in the widest representation of their storage family; the owning dtype
/// decides wrapping and rounding through [`Scalar::cast`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
}

/// Arithmetic domain an operation is carried out in before the result is cast back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    Signed,
    Unsigned,
    Float,
}

impl Scalar {
    pub fn is_float(self) -> bool {
        matches!(self, Scalar::Float(_))
    }

    pub fn is_zero(self) -> bool {
        match self {
            Scalar::Bool(v) => !v,
            Scalar::Int(v) => v == 0,
            Scalar::UInt(v) => v == 0,
            Scalar::Float(v) => v == 0.0,
        }
    }

    pub fn is_nan(self) -> bool {
        matches!(self, Scalar::Float(v) if v.is_nan())
    }

    pub fn as_f64(self) -> f64 {
        match self {
            Scalar::Bool(v) => u8::from(v) as f64,
            Scalar::Int(v) => v as f64,
            Scalar::UInt(v) => v as f64,
            Scalar::Float(v) => v,
        }
    }

    /// Integer view; floats truncate toward zero (saturating), unsigned values wrap.
    pub fn as_i64(self) -> i64 {
        match self {
            Scalar::Bool(v) => i64::from(v),
            Scalar::Int(v) => v,
            Scalar::UInt(v) => v as i64,
            Scalar::Float(v) => v as i64,
        }
    }

    pub fn as_u64(self) -> u64 {
        match self {
            Scalar::Bool(v) => u64::from(v),
            Scalar::Int(v) => v as u64,
            Scalar::UInt(v) => v,
            Scalar::Float(v) if v < 0.0 => (v as i64) as u64,
            Scalar::Float(v) => v as u64,
        }
    }

    fn as_i128(self) -> i128 {
        match self {
            Scalar::Bool(v) => i128::from(v),
            Scalar::Int(v) => i128::from(v),
            Scalar::UInt(v) => i128::from(v),
            Scalar::Float(v) => v as i128,
        }
    }

    /// Converts the value into the representation of `dtype`, wrapping integers to the dtype width
    /// and rounding to single precision for `F32`.
    pub fn cast(self, dtype: DType) -> Scalar {
        match dtype {
            DType::Bool => Scalar::Bool(!self.is_zero()),
            DType::I8 => Scalar::Int(self.as_i64() as i8 as i64),
            DType::I16 => Scalar::Int(self.as_i64() as i16 as i64),
            DType::I32 => Scalar::Int(self.as_i64() as i32 as i64),
            DType::I64 => Scalar::Int(self.as_i64()),
            DType::U8 => Scalar::UInt(self.as_u64() as u8 as u64),
            DType::U16 => Scalar::UInt(self.as_u64() as u16 as u64),
            DType::U32 => Scalar::UInt(self.as_u64() as u32 as u64),
            DType::U64 => Scalar::UInt(self.as_u64()),
            DType::F32 => Scalar::Float(self.as_f64() as f32 as f64),
            DType::F64 => Scalar::Float(self.as_f64()),
        }
    }

    /// Builds a value of `dtype` from a nominal (possibly infinite) identity, clamping `±inf` to
    /// the dtype's representable extreme when the dtype has no infinities.
    pub fn clamped_identity(value: f64, dtype: DType) -> Scalar {
        if value.is_infinite() {
            if let Some((min, max)) = dtype.int_bounds() {
                let bound = if value.is_sign_positive() { max } else { min };
                return match dtype.storage() {
                    Storage::Bool => Scalar::Bool(bound != 0),
                    Storage::Unsigned => Scalar::UInt(bound as u64),
                    _ => Scalar::Int(bound as i64),
                };
            }
        }
        if value.fract() == 0.0 && !dtype.is_float() {
            return Scalar::Int(value as i64).cast(dtype);
        }
        Scalar::Float(value).cast(dtype)
    }

    /// Orders two values the way a mixed-type comparison would, `None` when either is NaN.
    pub fn compare(self, other: Scalar) -> Option<Ordering> {
        if self.is_float() || other.is_float() {
            self.as_f64().partial_cmp(&other.as_f64())
        } else {
            Some(self.as_i128().cmp(&other.as_i128()))
        }
    }

    pub fn lt(self, other: Scalar) -> bool {
        matches!(self.compare(other), Some(Ordering::Less))
    }

    pub fn gt(self, other: Scalar) -> bool {
        matches!(self.compare(other), Some(Ordering::Greater))
    }
}

impl Domain {
    /// Picks the domain for a binary update whose result is stored as `dtype`.
    pub fn for_operands(dtype: DType, lhs: Scalar, rhs: Scalar) -> Domain {
        if dtype.is_float() || lhs.is_float() || rhs.is_float() {
            Domain::Float
        } else if dtype.is_unsigned_integer() {
            Domain::Unsigned
        } else {
            Domain::Signed
        }
    }
}

/// Applies a binary arithmetic rule in the domain selected for `dtype` and casts the result back.
pub fn binary_arith(
    lhs: Scalar,
    rhs: Scalar,
    dtype: DType,
    signed: impl Fn(i64, i64) -> i64,
    unsigned: impl Fn(u64, u64) -> u64,
    float: impl Fn(f64, f64) -> f64,
) -> Scalar {
    let raw = match Domain::for_operands(dtype, lhs, rhs) {
        Domain::Float => Scalar::Float(float(lhs.as_f64(), rhs.as_f64())),
        Domain::Unsigned => Scalar::UInt(unsigned(lhs.as_u64(), rhs.as_u64())),
        Domain::Signed => Scalar::Int(signed(lhs.as_i64(), rhs.as_i64())),
    };
    raw.cast(dtype)
}

/// Division rounding toward negative infinity; integer division by zero yields zero.
pub fn floor_div(lhs: Scalar, rhs: Scalar, dtype: DType) -> Scalar {
    binary_arith(
        lhs,
        rhs,
        dtype,
        |a, b| {
            if b == 0 {
                return 0;
            }
            let q = a.wrapping_div(b);
            if (a.wrapping_rem(b) != 0) && ((a < 0) != (b < 0)) {
                q - 1
            } else {
                q
            }
        },
        |a, b| a.checked_div(b).unwrap_or(0),
        |a, b| (a / b).floor(),
    )
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(v) => write!(f, "{v}"),
            Scalar::Int(v) => write!(f, "{v}"),
            Scalar::UInt(v) => write!(f, "{v}"),
            Scalar::Float(v) if v.is_nan() => f.write_str("NAN"),
            Scalar::Float(v) if v.is_infinite() => {
                if v.is_sign_negative() {
                    f.write_str("-INFINITY")
                } else {
                    f.write_str("INFINITY")
                }
            }
            Scalar::Float(v) => {
                let base = v.to_string();
                if base.contains('.') || base.contains('e') {
                    f.write_str(&base)
                } else {
                    write!(f, "{base}.0")
                }
            }
        }
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Float(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Int(value)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}
