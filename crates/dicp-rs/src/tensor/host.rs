use std::sync::Arc;

use super::{DType, TensorMeta};
use crate::error::{RuntimeError, RuntimeResult};

/// Storage backing a [`HostTensor`].
///
/// Floating dtypes share `F32` storage, integer dtypes share `I64` storage.
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    F32(Arc<[f32]>),
    I64(Arc<[i64]>),
    Bool(Arc<[bool]>),
}

impl TensorData {
    pub fn len(&self) -> usize {
        match self {
            TensorData::F32(values) => values.len(),
            TensorData::I64(values) => values.len(),
            TensorData::Bool(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Gathers elements by flat index, preserving the storage kind.
    pub(crate) fn gather(&self, indices: &[usize]) -> TensorData {
        match self {
            TensorData::F32(values) => {
                TensorData::F32(indices.iter().map(|&idx| values[idx]).collect())
            }
            TensorData::I64(values) => {
                TensorData::I64(indices.iter().map(|&idx| values[idx]).collect())
            }
            TensorData::Bool(values) => {
                TensorData::Bool(indices.iter().map(|&idx| values[idx]).collect())
            }
        }
    }
}

fn storage_matches(dtype: DType, data: &TensorData) -> bool {
    match data {
        TensorData::F32(_) => dtype.is_float(),
        TensorData::I64(_) => dtype.is_integer(),
        TensorData::Bool(_) => dtype == DType::Bool,
    }
}

/// Dense row-major tensor living in host memory.
#[derive(Debug, Clone, PartialEq)]
pub struct HostTensor {
    meta: TensorMeta,
    data: TensorData,
}

impl HostTensor {
    pub fn new(meta: TensorMeta, data: TensorData) -> RuntimeResult<Self> {
        if !storage_matches(meta.dtype, &data) {
            return Err(RuntimeError::new(format!(
                "storage does not match dtype {}",
                meta.dtype
            )));
        }
        if meta.numel() != data.len() {
            return Err(RuntimeError::new(format!(
                "tensor {meta} expects {} elements, got {}",
                meta.numel(),
                data.len()
            )));
        }
        Ok(Self { meta, data })
    }

    pub fn from_f32(dims: &[usize], values: Vec<f32>) -> RuntimeResult<Self> {
        Self::new(
            TensorMeta::new(DType::F32, dims.iter().copied()),
            TensorData::F32(Arc::from(values)),
        )
    }

    pub fn from_i64(dims: &[usize], values: Vec<i64>) -> RuntimeResult<Self> {
        Self::new(
            TensorMeta::new(DType::I64, dims.iter().copied()),
            TensorData::I64(Arc::from(values)),
        )
    }

    pub fn from_bool(dims: &[usize], values: Vec<bool>) -> RuntimeResult<Self> {
        Self::new(
            TensorMeta::new(DType::Bool, dims.iter().copied()),
            TensorData::Bool(Arc::from(values)),
        )
    }

    pub fn zeros(meta: TensorMeta) -> Self {
        let len = meta.numel();
        let data = if meta.dtype.is_float() {
            TensorData::F32(Arc::from(vec![0.0f32; len]))
        } else if meta.dtype.is_integer() {
            TensorData::I64(Arc::from(vec![0i64; len]))
        } else {
            TensorData::Bool(Arc::from(vec![false; len]))
        };
        Self { meta, data }
    }

    /// Builds a tensor of `meta.dtype` from `f64` values, rounding them into
    /// the dtype's storage.
    pub fn from_values(meta: TensorMeta, values: &[f64]) -> RuntimeResult<Self> {
        let data = if meta.dtype.is_float() {
            TensorData::F32(values.iter().map(|&v| v as f32).collect())
        } else if meta.dtype.is_integer() {
            TensorData::I64(values.iter().map(|&v| v.trunc() as i64).collect())
        } else {
            TensorData::Bool(values.iter().map(|&v| v != 0.0).collect())
        };
        Self::new(meta, data)
    }

    pub fn meta(&self) -> &TensorMeta {
        &self.meta
    }

    pub fn dtype(&self) -> DType {
        self.meta.dtype
    }

    pub fn dims(&self) -> &[usize] {
        &self.meta.dims
    }

    pub fn numel(&self) -> usize {
        self.meta.numel()
    }

    pub fn data(&self) -> &TensorData {
        &self.data
    }

    pub fn as_f32(&self) -> Option<&[f32]> {
        match &self.data {
            TensorData::F32(values) => Some(values.as_ref()),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<&[i64]> {
        match &self.data {
            TensorData::I64(values) => Some(values.as_ref()),
            _ => None,
        }
    }

    /// Widens every element to `f64`.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        match &self.data {
            TensorData::F32(values) => values.iter().map(|&v| f64::from(v)).collect(),
            TensorData::I64(values) => values.iter().map(|&v| v as f64).collect(),
            TensorData::Bool(values) => values.iter().map(|&v| f64::from(u8::from(v))).collect(),
        }
    }

    /// Same storage viewed under a different shape with equal element count.
    pub fn reshaped(&self, dims: &[usize]) -> RuntimeResult<Self> {
        let meta = TensorMeta::new(self.meta.dtype, dims.iter().copied());
        if meta.numel() != self.numel() {
            return Err(RuntimeError::new(format!(
                "cannot view {} as {meta}",
                self.meta
            )));
        }
        Ok(Self {
            meta,
            data: self.data.clone(),
        })
    }
}
