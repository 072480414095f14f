pub mod axis_apply;
pub mod emit;
pub mod inplace;
pub mod multiaxis;
pub mod reducer;
pub(crate) mod utils;
pub mod vectorize;

use tensorjit::array::{linear_offset, Array};
use tensorjit::scalar::Scalar;

use crate::error::{KernelError, KernelResult};

pub use utils::LOOP_COUNTER;

/// Element reads for one kernel argument; `checked` validates every coordinate against the shape.
pub(crate) struct Loader<'a> {
    array: &'a Array,
    strides: Vec<usize>,
    checked: bool,
}

impl<'a> Loader<'a> {
    pub(crate) fn new(array: &'a Array, checked: bool) -> Self {
        Self {
            array,
            strides: array.strides(),
            checked,
        }
    }

    pub(crate) fn at(&self, coords: &[usize]) -> KernelResult<Scalar> {
        if self.checked {
            return Ok(self.array.get(coords)?);
        }
        let offset = linear_offset(coords, &self.strides);
        self.array.get_flat(offset).ok_or_else(|| {
            KernelError::execution(format!(
                "load at offset {offset} past the end of an array of shape {:?}",
                self.array.shape()
            ))
        })
    }
}
