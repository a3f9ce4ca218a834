//! Tensor descriptors and host-resident tensors.

mod dtype;
mod host;
mod meta;

pub use dtype::DType;
pub use host::{HostTensor, TensorData};
pub use meta::{compute_strides, Dims, TensorMeta};
