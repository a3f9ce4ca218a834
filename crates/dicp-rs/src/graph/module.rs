use std::sync::Arc;

use super::{render, AttributeStore, Graph};

/// A traced graph together with the attributes its `get_attr` nodes read.
///
/// The attribute store is shared between a module and every module derived
/// from it by a transform; it is never mutated after construction.
#[derive(Debug, Clone)]
pub struct GraphModule {
    name: String,
    graph: Graph,
    attrs: Arc<AttributeStore>,
}

impl GraphModule {
    pub fn new(name: impl Into<String>, graph: Graph) -> Self {
        Self {
            name: name.into(),
            graph,
            attrs: Arc::new(AttributeStore::default()),
        }
    }

    pub fn with_attributes(name: impl Into<String>, graph: Graph, attrs: AttributeStore) -> Self {
        Self {
            name: name.into(),
            graph,
            attrs: Arc::new(attrs),
        }
    }

    /// Derives a module around `graph` that shares this module's attributes.
    pub fn with_graph(&self, graph: Graph) -> Self {
        Self {
            name: self.name.clone(),
            graph,
            attrs: Arc::clone(&self.attrs),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }

    pub fn attrs(&self) -> &AttributeStore {
        &self.attrs
    }

    pub fn attrs_arc(&self) -> &Arc<AttributeStore> {
        &self.attrs
    }

    /// Python-like listing of the graph with `name: dtype[dims]` annotations.
    pub fn print_readable(&self) -> String {
        render::render_module(self)
    }
}
