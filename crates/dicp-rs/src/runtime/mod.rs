//! Reference host execution.
//!
//! Used to run graphs that are not worth compiling and to execute loaded
//! kernels; every operation is computed in `f64` and rounded into the result
//! dtype.

mod eval;
mod interpret;

use std::fmt;

pub use eval::evaluate;
pub use interpret::interpret;

use crate::graph::{NodeValue, SymInt};
use crate::tensor::HostTensor;

/// A runtime value flowing through an executed graph.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Tensor(HostTensor),
    SymInt(i64),
}

impl Value {
    pub fn as_tensor(&self) -> Option<&HostTensor> {
        match self {
            Value::Tensor(tensor) => Some(tensor),
            Value::SymInt(_) => None,
        }
    }

    pub fn as_sym_int(&self) -> Option<i64> {
        match self {
            Value::SymInt(value) => Some(*value),
            Value::Tensor(_) => None,
        }
    }

    /// Metadata of this value as the shape rules see it.
    pub fn describe(&self) -> NodeValue {
        match self {
            Value::Tensor(tensor) => NodeValue::Tensor(tensor.meta().clone()),
            Value::SymInt(value) => NodeValue::SymInt(SymInt::constant(*value)),
        }
    }

    /// Like [`Value::describe`], but names a sym-int after the placeholder it
    /// binds to.
    pub fn describe_as(&self, name: &str) -> NodeValue {
        match self {
            Value::Tensor(tensor) => NodeValue::Tensor(tensor.meta().clone()),
            Value::SymInt(value) => NodeValue::SymInt(SymInt::new(name, Some(*value))),
        }
    }
}

impl From<HostTensor> for Value {
    fn from(tensor: HostTensor) -> Self {
        Value::Tensor(tensor)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Tensor(tensor) => write!(f, "{}", tensor.meta()),
            Value::SymInt(value) => write!(f, "{value}"),
        }
    }
}
