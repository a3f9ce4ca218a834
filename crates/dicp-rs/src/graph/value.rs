use std::fmt;

use serde::{Deserialize, Serialize};

use crate::tensor::TensorMeta;

/// A scalar shape parameter (`s0`, `s0*2`, ...) with an optional concrete hint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SymInt {
    pub expr: String,
    pub hint: Option<i64>,
}

impl SymInt {
    pub fn new(expr: impl Into<String>, hint: Option<i64>) -> Self {
        Self {
            expr: expr.into(),
            hint,
        }
    }

    pub fn constant(value: i64) -> Self {
        Self {
            expr: value.to_string(),
            hint: Some(value),
        }
    }
}

/// Metadata attached to a node once its result is known.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeValue {
    Tensor(TensorMeta),
    SymInt(SymInt),
}

impl NodeValue {
    pub fn as_tensor(&self) -> Option<&TensorMeta> {
        match self {
            NodeValue::Tensor(meta) => Some(meta),
            NodeValue::SymInt(_) => None,
        }
    }

    pub fn as_sym_int(&self) -> Option<&SymInt> {
        match self {
            NodeValue::SymInt(sym) => Some(sym),
            NodeValue::Tensor(_) => None,
        }
    }

    pub fn is_sym_int(&self) -> bool {
        matches!(self, NodeValue::SymInt(_))
    }
}

impl From<TensorMeta> for NodeValue {
    fn from(meta: TensorMeta) -> Self {
        NodeValue::Tensor(meta)
    }
}

impl fmt::Display for NodeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeValue::Tensor(meta) => write!(f, "{meta}"),
            NodeValue::SymInt(sym) => write!(f, "Sym({})", sym.expr),
        }
    }
}
