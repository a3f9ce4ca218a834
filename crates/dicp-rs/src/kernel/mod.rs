//! Generated kernel source: text format, parser, loader and cache.
//!
//! Vendor code generators emit a small textual module:
//!
//! ```text
//! // aten ops: add
//! target topsgraph
//! kernel kernel_3f2a(arg0_1: f32[3, 4], s0: sym) -> (add: [3, 4]) {
//!     _tensor_constant0: f32[4] = const [1.0, 2.0, 3.0, 4.0]
//!     add: f32[3, 4] = tops.Add(arg0_1, _tensor_constant0)
//!     return (add)
//! }
//! ```
//!
//! The `target` line and the `-> (...)` output declaration are optional.

mod ast;
mod cache;
mod loaded;
mod parse;
mod source;

pub use ast::{KernelExpr, KernelModule, KernelOutput, KernelParam, KernelStatement, KernelType};
pub use cache::KernelCache;
pub use loaded::LoadedKernel;
pub use parse::{parse_kernel, KernelParseError};
pub use source::KernelWriter;
