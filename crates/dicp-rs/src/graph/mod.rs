//! Traced operation graphs.
//!
//! A [`Graph`] is an ordered node list in which every argument refers to an
//! earlier node and a single `output` node terminates the sequence. Graphs are
//! owned by a [`GraphModule`] together with the [`AttributeStore`] that
//! `get_attr` nodes read from.

mod attrs;
#[allow(clippy::module_inception)]
mod graph;
mod module;
mod node;
mod render;
mod value;

pub use attrs::{Attribute, AttributeStore};
pub use graph::{Graph, GraphError};
pub use module::GraphModule;
pub use node::{Argument, Node, NodeId, NodeKind};
pub use value::{NodeValue, SymInt};
