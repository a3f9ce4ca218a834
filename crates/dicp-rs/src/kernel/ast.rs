use std::fmt;

use crate::graph::NodeValue;
use crate::ops::{Operand, Target};
use crate::runtime::Value;
use crate::tensor::{HostTensor, TensorMeta};

/// Declared type of a kernel parameter or statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KernelType {
    Tensor(TensorMeta),
    Sym,
}

impl KernelType {
    pub fn of(value: &NodeValue) -> Self {
        match value {
            NodeValue::Tensor(meta) => KernelType::Tensor(meta.clone()),
            NodeValue::SymInt(_) => KernelType::Sym,
        }
    }

    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (KernelType::Tensor(meta), Value::Tensor(tensor)) => tensor.meta() == meta,
            (KernelType::Sym, Value::SymInt(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for KernelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelType::Tensor(meta) => write!(f, "{meta}"),
            KernelType::Sym => f.write_str("sym"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct KernelParam {
    pub name: String,
    pub ty: KernelType,
}

/// A returned value with the static shape the kernel promises for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelOutput {
    pub name: String,
    pub dims: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum KernelExpr {
    Const(HostTensor),
    Call {
        target: Target,
        args: Vec<Operand<String>>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct KernelStatement {
    pub name: String,
    pub ty: KernelType,
    pub expr: KernelExpr,
}

/// A parsed kernel source file.
#[derive(Debug, Clone, PartialEq)]
pub struct KernelModule {
    pub target: Option<String>,
    pub name: String,
    pub params: Vec<KernelParam>,
    pub outputs: Option<Vec<KernelOutput>>,
    pub body: Vec<KernelStatement>,
    pub returns: Vec<String>,
}
