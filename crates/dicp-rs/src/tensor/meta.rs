use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::DType;

pub type Dims = SmallVec<[usize; 4]>;

/// Shape and element type of a tensor, without any storage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TensorMeta {
    pub dtype: DType,
    pub dims: Dims,
}

impl TensorMeta {
    pub fn new(dtype: DType, dims: impl IntoIterator<Item = usize>) -> Self {
        Self {
            dtype,
            dims: dims.into_iter().collect(),
        }
    }

    pub fn scalar(dtype: DType) -> Self {
        Self {
            dtype,
            dims: Dims::new(),
        }
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Element count, saturating at `usize::MAX`. Shape rules reject such
    /// shapes through [`TensorMeta::checked_numel`].
    pub fn numel(&self) -> usize {
        self.checked_numel().unwrap_or(usize::MAX)
    }

    pub fn checked_numel(&self) -> Option<usize> {
        self.dims
            .iter()
            .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
    }

    pub fn with_dtype(&self, dtype: DType) -> Self {
        Self {
            dtype,
            dims: self.dims.clone(),
        }
    }

    /// Writes the bracketed dimension list, e.g. `[3, 4]`.
    pub fn write_dims(&self, f: &mut impl fmt::Write) -> fmt::Result {
        f.write_char('[')?;
        for (idx, dim) in self.dims.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{dim}")?;
        }
        f.write_char(']')
    }
}

impl fmt::Display for TensorMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.dtype)?;
        self.write_dims(f)
    }
}

pub fn compute_strides(dims: &[usize]) -> Vec<usize> {
    let mut strides = vec![0; dims.len()];
    let mut acc = 1usize;
    for (i, dim) in dims.iter().enumerate().rev() {
        strides[i] = acc;
        acc *= *dim;
    }
    strides
}
