//! Contiguous host arrays used as kernel arguments and results.

use smallvec::SmallVec;
use thiserror::Error;

use crate::dtype::{DType, Storage};
use crate::scalar::Scalar;

/// Coordinate tuple produced by [`NdIndex`].
pub type Coords = SmallVec<[usize; 6]>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArrayError {
    #[error("array data length ({len}) does not match shape {shape:?}")]
    LengthMismatch { len: usize, shape: Vec<usize> },
    #[error("array storage does not match dtype {dtype}")]
    Storage { dtype: DType },
    #[error("cannot reshape array of shape {from:?} into shape {to:?}")]
    Reshape { from: Vec<usize>, to: Vec<usize> },
    #[error("shapes {shapes:?} cannot be broadcast together")]
    Broadcast { shapes: Vec<Vec<usize>> },
    #[error("axis {axis} is out of bounds for array of dimension {ndim}")]
    Axis { axis: isize, ndim: usize },
    #[error("{perm:?} is not a permutation of {ndim} axes")]
    Permutation { perm: Vec<usize>, ndim: usize },
    #[error("array of shape {shape:?} cannot be converted to a scalar")]
    NotScalar { shape: Vec<usize> },
    #[error("index {index:?} is out of bounds for shape {shape:?}")]
    Index { index: Vec<usize>, shape: Vec<usize> },
}

pub type ArrayResult<T> = Result<T, ArrayError>;

/// Typed element storage; narrower dtypes are held widened and kept in range by [`Scalar::cast`].
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayData {
    Bool(Vec<bool>),
    Signed(Vec<i64>),
    Unsigned(Vec<u64>),
    Float(Vec<f64>),
}

impl ArrayData {
    fn filled(storage: Storage, len: usize, value: Scalar) -> Self {
        match storage {
            Storage::Bool => ArrayData::Bool(vec![!value.is_zero(); len]),
            Storage::Signed => ArrayData::Signed(vec![value.as_i64(); len]),
            Storage::Unsigned => ArrayData::Unsigned(vec![value.as_u64(); len]),
            Storage::Float => ArrayData::Float(vec![value.as_f64(); len]),
        }
    }

    fn collect(storage: Storage, values: impl Iterator<Item = Scalar>) -> Self {
        match storage {
            Storage::Bool => ArrayData::Bool(values.map(|v| !v.is_zero()).collect()),
            Storage::Signed => ArrayData::Signed(values.map(Scalar::as_i64).collect()),
            Storage::Unsigned => ArrayData::Unsigned(values.map(Scalar::as_u64).collect()),
            Storage::Float => ArrayData::Float(values.map(Scalar::as_f64).collect()),
        }
    }

    pub fn storage(&self) -> Storage {
        match self {
            ArrayData::Bool(_) => Storage::Bool,
            ArrayData::Signed(_) => Storage::Signed,
            ArrayData::Unsigned(_) => Storage::Unsigned,
            ArrayData::Float(_) => Storage::Float,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ArrayData::Bool(v) => v.len(),
            ArrayData::Signed(v) => v.len(),
            ArrayData::Unsigned(v) => v.len(),
            ArrayData::Float(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<Scalar> {
        match self {
            ArrayData::Bool(v) => v.get(index).map(|&x| Scalar::Bool(x)),
            ArrayData::Signed(v) => v.get(index).map(|&x| Scalar::Int(x)),
            ArrayData::Unsigned(v) => v.get(index).map(|&x| Scalar::UInt(x)),
            ArrayData::Float(v) => v.get(index).map(|&x| Scalar::Float(x)),
        }
    }

    fn set(&mut self, index: usize, value: Scalar) -> bool {
        match self {
            ArrayData::Bool(v) => v.get_mut(index).map(|slot| *slot = !value.is_zero()),
            ArrayData::Signed(v) => v.get_mut(index).map(|slot| *slot = value.as_i64()),
            ArrayData::Unsigned(v) => v.get_mut(index).map(|slot| *slot = value.as_u64()),
            ArrayData::Float(v) => v.get_mut(index).map(|slot| *slot = value.as_f64()),
        }
        .is_some()
    }

    fn gather(&self, offsets: impl Iterator<Item = usize>) -> Self {
        match self {
            ArrayData::Bool(v) => ArrayData::Bool(offsets.map(|o| v[o]).collect()),
            ArrayData::Signed(v) => ArrayData::Signed(offsets.map(|o| v[o]).collect()),
            ArrayData::Unsigned(v) => ArrayData::Unsigned(offsets.map(|o| v[o]).collect()),
            ArrayData::Float(v) => ArrayData::Float(offsets.map(|o| v[o]).collect()),
        }
    }
}

/// Dense, C-contiguous array with a logical dtype.
#[derive(Debug, Clone, PartialEq)]
pub struct Array {
    dtype: DType,
    shape: Vec<usize>,
    data: ArrayData,
}

impl Array {
    /// Wraps existing storage, validating its family and length against `dtype` and `shape`.
    pub fn new(dtype: DType, shape: Vec<usize>, data: ArrayData) -> ArrayResult<Self> {
        if data.storage() != dtype.storage() {
            return Err(ArrayError::Storage { dtype });
        }
        if data.len() != element_count(&shape) {
            return Err(ArrayError::LengthMismatch {
                len: data.len(),
                shape,
            });
        }
        Ok(Self { dtype, shape, data })
    }

    pub fn from_f64(shape: Vec<usize>, values: Vec<f64>) -> ArrayResult<Self> {
        Self::new(DType::F64, shape, ArrayData::Float(values))
    }

    pub fn from_f32(shape: Vec<usize>, values: Vec<f32>) -> ArrayResult<Self> {
        let widened = values.into_iter().map(f64::from).collect();
        Self::new(DType::F32, shape, ArrayData::Float(widened))
    }

    pub fn from_i64(shape: Vec<usize>, values: Vec<i64>) -> ArrayResult<Self> {
        Self::new(DType::I64, shape, ArrayData::Signed(values))
    }

    pub fn from_i32(shape: Vec<usize>, values: Vec<i32>) -> ArrayResult<Self> {
        let widened = values.into_iter().map(i64::from).collect();
        Self::new(DType::I32, shape, ArrayData::Signed(widened))
    }

    pub fn from_bool(shape: Vec<usize>, values: Vec<bool>) -> ArrayResult<Self> {
        Self::new(DType::Bool, shape, ArrayData::Bool(values))
    }

    /// Builds an array of `dtype`, casting every value into range.
    pub fn from_scalars(dtype: DType, shape: Vec<usize>, values: Vec<Scalar>) -> ArrayResult<Self> {
        let data = ArrayData::collect(dtype.storage(), values.into_iter().map(|v| v.cast(dtype)));
        Self::new(dtype, shape, data)
    }

    pub fn full(shape: Vec<usize>, value: Scalar, dtype: DType) -> Self {
        let len = element_count(&shape);
        Self {
            dtype,
            data: ArrayData::filled(dtype.storage(), len, value.cast(dtype)),
            shape,
        }
    }

    pub fn zeros(shape: Vec<usize>, dtype: DType) -> Self {
        Self::full(shape, Scalar::Int(0), dtype)
    }

    /// Zero-dimensional array holding `value`.
    pub fn scalar(value: Scalar, dtype: DType) -> Self {
        Self::full(Vec::new(), value, dtype)
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &ArrayData {
        &self.data
    }

    pub fn into_data(self) -> ArrayData {
        self.data
    }

    pub fn strides(&self) -> Vec<usize> {
        contiguous_strides(&self.shape)
    }

    pub fn get_flat(&self, index: usize) -> Option<Scalar> {
        self.data.get(index)
    }

    /// Stores `value` (cast to the array dtype) at a flat position.
    pub fn set_flat(&mut self, index: usize, value: Scalar) -> ArrayResult<()> {
        if self.data.set(index, value.cast(self.dtype)) {
            Ok(())
        } else {
            Err(ArrayError::Index {
                index: vec![index],
                shape: self.shape.clone(),
            })
        }
    }

    pub fn offset_of(&self, index: &[usize]) -> ArrayResult<usize> {
        if index.len() != self.shape.len() || index.iter().zip(&self.shape).any(|(i, d)| i >= d) {
            return Err(ArrayError::Index {
                index: index.to_vec(),
                shape: self.shape.clone(),
            });
        }
        Ok(linear_offset(index, &self.strides()))
    }

    pub fn get(&self, index: &[usize]) -> ArrayResult<Scalar> {
        let offset = self.offset_of(index)?;
        self.data.get(offset).ok_or_else(|| ArrayError::Index {
            index: index.to_vec(),
            shape: self.shape.clone(),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = Scalar> + '_ {
        (0..self.len()).filter_map(move |i| self.data.get(i))
    }

    pub fn to_f64_vec(&self) -> Vec<f64> {
        self.iter().map(Scalar::as_f64).collect()
    }

    pub fn to_i64_vec(&self) -> Vec<i64> {
        self.iter().map(Scalar::as_i64).collect()
    }

    /// Extracts the sole element of a size-1 array.
    pub fn item(&self) -> ArrayResult<Scalar> {
        match (self.len(), self.data.get(0)) {
            (1, Some(value)) => Ok(value),
            _ => Err(ArrayError::NotScalar {
                shape: self.shape.clone(),
            }),
        }
    }

    pub fn astype(&self, dtype: DType) -> Array {
        if dtype == self.dtype {
            return self.clone();
        }
        Array {
            dtype,
            shape: self.shape.clone(),
            data: ArrayData::collect(dtype.storage(), self.iter().map(|v| v.cast(dtype))),
        }
    }

    /// Permutes axes, returning a contiguous copy.
    pub fn transpose(&self, perm: &[usize]) -> ArrayResult<Array> {
        let ndim = self.ndim();
        let mut seen = vec![false; ndim];
        for &axis in perm {
            if axis >= ndim || std::mem::replace(&mut seen[axis], true) {
                return Err(ArrayError::Permutation {
                    perm: perm.to_vec(),
                    ndim,
                });
            }
        }
        if perm.len() != ndim {
            return Err(ArrayError::Permutation {
                perm: perm.to_vec(),
                ndim,
            });
        }
        if perm.iter().enumerate().all(|(i, &p)| i == p) {
            return Ok(self.clone());
        }
        let src_strides = self.strides();
        let shape: Vec<usize> = perm.iter().map(|&p| self.shape[p]).collect();
        let strides: Vec<usize> = perm.iter().map(|&p| src_strides[p]).collect();
        let data = self
            .data
            .gather(NdIndex::new(&shape).map(|c| linear_offset(&c, &strides)));
        Ok(Array {
            dtype: self.dtype,
            shape,
            data,
        })
    }

    pub fn reshape(self, shape: Vec<usize>) -> ArrayResult<Array> {
        if element_count(&shape) != self.len() {
            return Err(ArrayError::Reshape {
                from: self.shape,
                to: shape,
            });
        }
        Ok(Array { shape, ..self })
    }

    /// Inserts a length-1 axis at `axis` (`0..=ndim`).
    pub fn expand_dims(self, axis: usize) -> ArrayResult<Array> {
        if axis > self.ndim() {
            return Err(ArrayError::Axis {
                axis: axis as isize,
                ndim: self.ndim(),
            });
        }
        let mut shape = self.shape.clone();
        shape.insert(axis, 1);
        self.reshape(shape)
    }

    /// Materializes the array stretched to `shape` under numpy broadcasting rules.
    pub fn broadcast_to(&self, shape: &[usize]) -> ArrayResult<Array> {
        if shape == self.shape.as_slice() {
            return Ok(self.clone());
        }
        let strides = self.broadcast_strides(shape)?;
        let data = self
            .data
            .gather(NdIndex::new(shape).map(|c| linear_offset(&c, &strides)));
        Ok(Array {
            dtype: self.dtype,
            shape: shape.to_vec(),
            data,
        })
    }

    /// Strides that read this array as if it had `shape`; stretched axes get stride zero.
    pub fn broadcast_strides(&self, shape: &[usize]) -> ArrayResult<Vec<usize>> {
        let incompatible = || ArrayError::Broadcast {
            shapes: vec![self.shape.clone(), shape.to_vec()],
        };
        if shape.len() < self.ndim() {
            return Err(incompatible());
        }
        let lead = shape.len() - self.ndim();
        let own = self.strides();
        let mut strides = vec![0; shape.len()];
        for (axis, &len) in self.shape.iter().enumerate() {
            let target = shape[lead + axis];
            if len == target {
                strides[lead + axis] = own[axis];
            } else if len != 1 {
                return Err(incompatible());
            }
        }
        Ok(strides)
    }

    pub fn map(&self, dtype: DType, f: impl Fn(Scalar) -> Scalar) -> Array {
        Array {
            dtype,
            shape: self.shape.clone(),
            data: ArrayData::collect(dtype.storage(), self.iter().map(|v| f(v).cast(dtype))),
        }
    }

    /// Combines two arrays elementwise after broadcasting them together.
    pub fn zip_with(
        &self,
        other: &Array,
        dtype: DType,
        f: impl Fn(Scalar, Scalar) -> Scalar,
    ) -> ArrayResult<Array> {
        let shape = broadcast_shapes(&[self.shape(), other.shape()])?;
        let lhs_strides = self.broadcast_strides(&shape)?;
        let rhs_strides = other.broadcast_strides(&shape)?;
        let values = NdIndex::new(&shape).map(|c| {
            let lhs = self.data.get(linear_offset(&c, &lhs_strides));
            let rhs = other.data.get(linear_offset(&c, &rhs_strides));
            match (lhs, rhs) {
                (Some(a), Some(b)) => f(a, b).cast(dtype),
                _ => Scalar::Int(0),
            }
        });
        Ok(Array {
            dtype,
            data: ArrayData::collect(dtype.storage(), values),
            shape,
        })
    }

    /// Copies `len` consecutive elements starting at flat position `start` into a 1-D array.
    pub fn lane(&self, start: usize, len: usize) -> Array {
        Array {
            dtype: self.dtype,
            shape: vec![len],
            data: self.data.gather(start..start + len),
        }
    }
}

/// Result of a kernel call: an array, or a plain scalar when the kernel reduces to one.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Array(Array),
    Scalar { value: Scalar, dtype: DType },
}

impl Value {
    pub fn dtype(&self) -> DType {
        match self {
            Value::Array(array) => array.dtype(),
            Value::Scalar { dtype, .. } => *dtype,
        }
    }

    pub fn shape(&self) -> &[usize] {
        match self {
            Value::Array(array) => array.shape(),
            Value::Scalar { .. } => &[],
        }
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, Value::Scalar { .. })
    }

    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Value::Array(array) => Some(array),
            Value::Scalar { .. } => None,
        }
    }

    /// Coerces into an array; plain scalars become zero-dimensional arrays.
    pub fn into_array(self) -> Array {
        match self {
            Value::Array(array) => array,
            Value::Scalar { value, dtype } => Array::scalar(value, dtype),
        }
    }

    pub fn cast(self, dtype: DType) -> Value {
        match self {
            Value::Array(array) if array.dtype() == dtype => Value::Array(array),
            Value::Array(array) => Value::Array(array.astype(dtype)),
            Value::Scalar { value, .. } => Value::Scalar {
                value: value.cast(dtype),
                dtype,
            },
        }
    }
}

impl From<Array> for Value {
    fn from(array: Array) -> Self {
        Value::Array(array)
    }
}

pub fn element_count(shape: &[usize]) -> usize {
    shape.iter().product()
}

pub fn contiguous_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; shape.len()];
    for axis in (0..shape.len().saturating_sub(1)).rev() {
        strides[axis] = strides[axis + 1] * shape[axis + 1];
    }
    strides
}

pub fn linear_offset(index: &[usize], strides: &[usize]) -> usize {
    index.iter().zip(strides).map(|(i, s)| i * s).sum()
}

/// Converts a flat C-order position into coordinates.
pub fn unravel_index(mut flat: usize, shape: &[usize]) -> Coords {
    let mut coords: Coords = SmallVec::from_elem(0, shape.len());
    for axis in (0..shape.len()).rev() {
        let len = shape[axis].max(1);
        coords[axis] = flat % len;
        flat /= len;
    }
    coords
}

/// Broadcast result shape of several shapes (numpy rules, ranks aligned to the right).
pub fn broadcast_shapes(shapes: &[&[usize]]) -> ArrayResult<Vec<usize>> {
    let ndim = shapes.iter().map(|s| s.len()).max().unwrap_or(0);
    let mut out = vec![1usize; ndim];
    for shape in shapes {
        let lead = ndim - shape.len();
        for (axis, &len) in shape.iter().enumerate() {
            let slot = &mut out[lead + axis];
            if *slot == 1 {
                *slot = len;
            } else if len != 1 && len != *slot {
                return Err(ArrayError::Broadcast {
                    shapes: shapes.iter().map(|s| s.to_vec()).collect(),
                });
            }
        }
    }
    Ok(out)
}

/// Iterates every coordinate of a shape in C order; a zero-length axis yields nothing and a
/// rank-0 shape yields the empty coordinate once.
pub struct NdIndex {
    shape: Vec<usize>,
    current: Coords,
    first: bool,
    done: bool,
}

impl NdIndex {
    pub fn new(shape: &[usize]) -> Self {
        Self {
            shape: shape.to_vec(),
            current: SmallVec::from_elem(0, shape.len()),
            first: true,
            done: shape.contains(&0),
        }
    }
}

impl Iterator for NdIndex {
    type Item = Coords;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.first {
            self.first = false;
            if self.shape.is_empty() {
                self.done = true;
            }
            return Some(self.current.clone());
        }
        for i in (0..self.current.len()).rev() {
            self.current[i] += 1;
            if self.current[i] < self.shape[i] {
                return Some(self.current.clone());
            }
            self.current[i] = 0;
        }
        self.done = true;
        None
    }
}
