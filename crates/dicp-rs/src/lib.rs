//! Compiler bridge from traced operation graphs to vendor kernels.
//!
//! A traced [`graph::GraphModule`] is lowered into a vendor operator set
//! ([`vendor`]), annotated with shapes ([`infer`]), rendered and scanned for its
//! output shapes ([`extract`]), turned into kernel source by the vendor code
//! generator and finally loaded through a content-addressed
//! [`kernel::KernelCache`]. [`compile::CompileContext`] drives the pipeline.

pub mod compile;
mod env;
pub mod error;
pub mod extract;
pub mod graph;
pub mod infer;
pub mod kernel;
pub mod ops;
pub mod profiling;
pub mod runtime;
pub mod tensor;
pub mod vendor;

pub use compile::{CompileContext, CompiledFn, PipelineConfig};
pub use error::{CompileError, CompileResult, RuntimeError, RuntimeResult};
pub use graph::{Graph, GraphModule};
pub use runtime::Value;
pub use tensor::{DType, HostTensor, TensorMeta};
pub use vendor::{Backend, VendorBackend};
