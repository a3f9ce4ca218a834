use std::fmt;

use super::NodeValue;
use crate::ops::{Operand, Target};
use crate::tensor::DType;

/// Position of a node inside its [`Graph`](super::Graph).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A call argument: either a reference to an earlier node or an inline literal.
#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    Node(NodeId),
    Int(i64),
    Float(f64),
    Bool(bool),
    IntList(Vec<i64>),
    DType(DType),
}

impl Argument {
    pub fn as_node(&self) -> Option<NodeId> {
        match self {
            Argument::Node(id) => Some(*id),
            _ => None,
        }
    }

    /// Converts to an operation operand, resolving node references with
    /// `resolve`.
    pub fn to_operand<T, E>(
        &self,
        resolve: impl FnOnce(NodeId) -> Result<T, E>,
    ) -> Result<Operand<T>, E> {
        Ok(match self {
            Argument::Node(id) => Operand::Value(resolve(*id)?),
            Argument::Int(value) => Operand::Int(*value),
            Argument::Float(value) => Operand::Float(*value),
            Argument::Bool(value) => Operand::Bool(*value),
            Argument::IntList(values) => Operand::IntList(values.clone()),
            Argument::DType(dtype) => Operand::DType(*dtype),
        })
    }
}

impl From<NodeId> for Argument {
    fn from(id: NodeId) -> Self {
        Argument::Node(id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Placeholder,
    CallFunction { target: Target, args: Vec<Argument> },
    GetAttr { target: String },
    Output { args: Vec<NodeId> },
}

impl NodeKind {
    pub fn opcode(&self) -> &'static str {
        match self {
            NodeKind::Placeholder => "placeholder",
            NodeKind::CallFunction { .. } => "call_function",
            NodeKind::GetAttr { .. } => "get_attr",
            NodeKind::Output { .. } => "output",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub kind: NodeKind,
    pub meta: Option<NodeValue>,
}

impl Node {
    /// Nodes this node reads, in argument order.
    pub fn inputs(&self) -> Vec<NodeId> {
        match &self.kind {
            NodeKind::CallFunction { args, .. } => {
                args.iter().filter_map(Argument::as_node).collect()
            }
            NodeKind::Output { args } => args.clone(),
            NodeKind::Placeholder | NodeKind::GetAttr { .. } => Vec::new(),
        }
    }

    pub fn is_call(&self) -> bool {
        matches!(self.kind, NodeKind::CallFunction { .. })
    }

    pub fn target(&self) -> Option<Target> {
        match &self.kind {
            NodeKind::CallFunction { target, .. } => Some(*target),
            _ => None,
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
