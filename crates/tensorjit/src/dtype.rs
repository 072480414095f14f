//! Enumerates the scalar element types understood by graph nodes and host arrays.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Logical dtype identifier shared between graph types, arrays and kernels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
}

/// Physical storage family backing a dtype inside [`crate::Array`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Storage {
    Bool,
    Signed,
    Unsigned,
    Float,
}

impl DType {
    pub fn storage(self) -> Storage {
        match self {
            DType::Bool => Storage::Bool,
            DType::I8 | DType::I16 | DType::I32 | DType::I64 => Storage::Signed,
            DType::U8 | DType::U16 | DType::U32 | DType::U64 => Storage::Unsigned,
            DType::F32 | DType::F64 => Storage::Float,
        }
    }

    /// Returns `true` for signed and unsigned integers (bool excluded).
    pub fn is_integer(self) -> bool {
        matches!(self.storage(), Storage::Signed | Storage::Unsigned)
    }

    pub fn is_signed_integer(self) -> bool {
        self.storage() == Storage::Signed
    }

    pub fn is_unsigned_integer(self) -> bool {
        self.storage() == Storage::Unsigned
    }

    pub fn is_float(self) -> bool {
        self.storage() == Storage::Float
    }

    pub fn is_bool(self) -> bool {
        self == DType::Bool
    }

    /// Storage bit-width of one element.
    pub fn bitwidth(self) -> u32 {
        match self {
            DType::Bool => 1,
            DType::I8 | DType::U8 => 8,
            DType::I16 | DType::U16 => 16,
            DType::I32 | DType::U32 | DType::F32 => 32,
            DType::I64 | DType::U64 | DType::F64 => 64,
        }
    }

    /// Representable `(min, max)` for integer and bool dtypes, `None` for floats.
    ///
    /// Mirrors `iinfo`; bool reports `(0, 1)`.
    pub fn int_bounds(self) -> Option<(i128, i128)> {
        match self.storage() {
            Storage::Bool => Some((0, 1)),
            Storage::Signed => {
                let bits = self.bitwidth();
                Some((-(1i128 << (bits - 1)), (1i128 << (bits - 1)) - 1))
            }
            Storage::Unsigned => Some((0, (1i128 << self.bitwidth()) - 1)),
            Storage::Float => None,
        }
    }

    /// Canonical lowercase name (`float64`, `int32`, ...).
    pub fn name(self) -> &'static str {
        match self {
            DType::Bool => "bool",
            DType::I8 => "int8",
            DType::I16 => "int16",
            DType::I32 => "int32",
            DType::I64 => "int64",
            DType::U8 => "uint8",
            DType::U16 => "uint16",
            DType::U32 => "uint32",
            DType::U64 => "uint64",
            DType::F32 => "float32",
            DType::F64 => "float64",
        }
    }

    /// Smallest dtype able to hold values of both operands, following numpy's promotion lattice
    /// restricted to the dtypes supported here.
    pub fn promote(self, other: DType) -> DType {
        if self == other {
            return self;
        }
        match (self.storage(), other.storage()) {
            (Storage::Bool, _) => other,
            (_, Storage::Bool) => self,
            (Storage::Float, Storage::Float) => {
                if self.bitwidth() >= other.bitwidth() {
                    self
                } else {
                    other
                }
            }
            (Storage::Float, _) | (_, Storage::Float) => DType::F64,
            (Storage::Signed, Storage::Signed) | (Storage::Unsigned, Storage::Unsigned) => {
                if self.bitwidth() >= other.bitwidth() {
                    self
                } else {
                    other
                }
            }
            _ => {
                let (signed, unsigned) = if self.is_signed_integer() {
                    (self, other)
                } else {
                    (other, self)
                };
                if signed.bitwidth() > unsigned.bitwidth() {
                    signed
                } else {
                    match unsigned.bitwidth() {
                        8 => DType::I16,
                        16 => DType::I32,
                        32 => DType::I64,
                        _ => DType::F64,
                    }
                }
            }
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
