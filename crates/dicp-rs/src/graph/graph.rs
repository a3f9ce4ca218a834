use std::collections::HashSet;

use thiserror::Error;

use super::{Argument, Node, NodeId, NodeKind, NodeValue};
use crate::ops::Target;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("node `{node}` reads `{input}` before it is defined")]
    ForwardReference { node: String, input: String },
    #[error("node `{node}` reads unknown node id {input}")]
    UnknownNode { node: String, input: usize },
    #[error("graph must have exactly one output node, found {0}")]
    OutputCount(usize),
    #[error("output node must be the last node of the graph")]
    OutputNotLast,
    #[error("duplicate node name `{0}`")]
    DuplicateName(String),
    #[error("invalid attribute path `{0}`")]
    InvalidAttributePath(String),
    #[error("attribute path `{0}` passes through a tensor")]
    AttributeConflict(String),
}

/// Ordered operation graph; see the [module docs](super) for the invariants.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Graph {
    nodes: Vec<Node>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: String, kind: NodeKind, meta: Option<NodeValue>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            id,
            name,
            kind,
            meta,
        });
        id
    }

    pub fn placeholder(&mut self, name: impl Into<String>, meta: Option<NodeValue>) -> NodeId {
        self.push(name.into(), NodeKind::Placeholder, meta)
    }

    pub fn call(&mut self, name: impl Into<String>, target: Target, args: Vec<Argument>) -> NodeId {
        self.push(name.into(), NodeKind::CallFunction { target, args }, None)
    }

    pub fn get_attr(&mut self, name: impl Into<String>, path: impl Into<String>) -> NodeId {
        self.push(
            name.into(),
            NodeKind::GetAttr {
                target: path.into(),
            },
            None,
        )
    }

    pub fn output(&mut self, values: Vec<NodeId>) -> NodeId {
        self.push("output".to_string(), NodeKind::Output { args: values }, None)
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0)
    }

    pub fn set_meta(&mut self, id: NodeId, meta: Option<NodeValue>) {
        if let Some(node) = self.node_mut(id) {
            node.meta = meta;
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.nodes.iter().find(|node| node.name == name).map(|node| node.id)
    }

    pub fn placeholders(&self) -> impl Iterator<Item = &Node> {
        self.nodes
            .iter()
            .filter(|node| matches!(node.kind, NodeKind::Placeholder))
    }

    pub fn output_node(&self) -> Option<&Node> {
        self.nodes
            .iter()
            .rev()
            .find(|node| matches!(node.kind, NodeKind::Output { .. }))
    }

    /// Values returned by the output node, empty when the graph has none.
    pub fn output_values(&self) -> &[NodeId] {
        match self.output_node().map(|node| &node.kind) {
            Some(NodeKind::Output { args }) => args,
            _ => &[],
        }
    }

    /// Number of consumers of every node, indexed by [`NodeId::index`].
    pub fn user_counts(&self) -> Vec<usize> {
        let mut counts = vec![0usize; self.nodes.len()];
        for node in &self.nodes {
            for input in node.inputs() {
                if let Some(count) = counts.get_mut(input.0) {
                    *count += 1;
                }
            }
        }
        counts
    }

    pub fn count_calls(&self) -> usize {
        self.nodes.iter().filter(|node| node.is_call()).count()
    }

    /// Returns `base` if unused, otherwise the first free `base_N`.
    pub fn fresh_name(&self, base: &str) -> String {
        let taken: HashSet<&str> = self.nodes.iter().map(|node| node.name.as_str()).collect();
        if !taken.contains(base) {
            return base.to_string();
        }
        let mut suffix = 1usize;
        loop {
            let candidate = format!("{base}_{suffix}");
            if !taken.contains(candidate.as_str()) {
                return candidate;
            }
            suffix += 1;
        }
    }

    pub fn validate(&self) -> Result<(), GraphError> {
        let mut names = HashSet::new();
        for node in &self.nodes {
            if !names.insert(node.name.as_str()) {
                return Err(GraphError::DuplicateName(node.name.clone()));
            }
            for input in node.inputs() {
                let Some(source) = self.nodes.get(input.0) else {
                    return Err(GraphError::UnknownNode {
                        node: node.name.clone(),
                        input: input.0,
                    });
                };
                if input.0 >= node.id.0 {
                    return Err(GraphError::ForwardReference {
                        node: node.name.clone(),
                        input: source.name.clone(),
                    });
                }
            }
        }

        let outputs = self
            .nodes
            .iter()
            .filter(|node| matches!(node.kind, NodeKind::Output { .. }))
            .count();
        if outputs != 1 {
            return Err(GraphError::OutputCount(outputs));
        }
        match self.nodes.last().map(|node| &node.kind) {
            Some(NodeKind::Output { .. }) => Ok(()),
            _ => Err(GraphError::OutputNotLast),
        }
    }
}
