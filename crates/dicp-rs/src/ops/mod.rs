//! Operator vocabulary shared by traced graphs and vendor graphs.
//!
//! Every operation is an [`OpKind`]; a [`Target`] pairs it with the
//! [`Namespace`] it is spelled in. The generic `aten` namespace covers the full
//! vocabulary, vendor namespaces only the subset their hardware accepts.

pub mod shape;
mod table;

use std::fmt;

use crate::error::RuntimeResult;
use crate::graph::NodeValue;
use crate::tensor::DType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Aten,
    Tops,
    Ascend,
}

impl Namespace {
    pub const ALL: [Namespace; 3] = [Namespace::Aten, Namespace::Tops, Namespace::Ascend];

    pub fn prefix(self) -> &'static str {
        match self {
            Namespace::Aten => "aten",
            Namespace::Tops => "tops",
            Namespace::Ascend => "ascend",
        }
    }

    pub fn from_prefix(prefix: &str) -> Option<Self> {
        Namespace::ALL
            .into_iter()
            .find(|namespace| namespace.prefix() == prefix)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    Add,
    Sub,
    Mul,
    Div,
    Maximum,
    AddScalar,
    MulScalar,
    Neg,
    Relu,
    Exp,
    Sqrt,
    Rsqrt,
    Reciprocal,
    Abs,
    MatMul,
    Addmm,
    Reshape,
    Permute,
    Sum,
    Amax,
    Softmax,
    Convert,
    SymSize,
    SymAdd,
    SymMul,
}

/// What an operation produces, known without looking at its operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultKind {
    Tensor,
    SymInt,
}

impl OpKind {
    pub const ALL: [OpKind; 25] = [
        OpKind::Add,
        OpKind::Sub,
        OpKind::Mul,
        OpKind::Div,
        OpKind::Maximum,
        OpKind::AddScalar,
        OpKind::MulScalar,
        OpKind::Neg,
        OpKind::Relu,
        OpKind::Exp,
        OpKind::Sqrt,
        OpKind::Rsqrt,
        OpKind::Reciprocal,
        OpKind::Abs,
        OpKind::MatMul,
        OpKind::Addmm,
        OpKind::Reshape,
        OpKind::Permute,
        OpKind::Sum,
        OpKind::Amax,
        OpKind::Softmax,
        OpKind::Convert,
        OpKind::SymSize,
        OpKind::SymAdd,
        OpKind::SymMul,
    ];

    /// Scalar shape arithmetic evaluated on the host, never lowered.
    pub fn is_host_scalar(self) -> bool {
        matches!(self, OpKind::SymSize | OpKind::SymAdd | OpKind::SymMul)
    }

    pub fn result_kind(self) -> ResultKind {
        if self.is_host_scalar() {
            ResultKind::SymInt
        } else {
            ResultKind::Tensor
        }
    }
}

/// A namespaced operation, e.g. `aten.add` or `tops.Dot`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Target {
    namespace: Namespace,
    op: OpKind,
    name: &'static str,
}

impl Target {
    pub fn aten(op: OpKind) -> Self {
        Self {
            namespace: Namespace::Aten,
            op,
            name: table::aten_name(op),
        }
    }

    /// `None` when `namespace` has no spelling for `op`.
    pub fn new(namespace: Namespace, op: OpKind) -> Option<Self> {
        table::name_in(namespace, op).map(|name| Self {
            namespace,
            op,
            name,
        })
    }

    /// Parses a qualified name such as `aten.add.Scalar` or `ascend.MatMul`.
    pub fn parse(qualified: &str) -> Option<Self> {
        let (prefix, name) = qualified.split_once('.')?;
        let namespace = Namespace::from_prefix(prefix)?;
        OpKind::ALL
            .into_iter()
            .filter_map(|op| Target::new(namespace, op))
            .find(|target| target.name == name)
    }

    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    pub fn op(&self) -> OpKind {
        self.op
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.namespace.prefix(), self.name)
    }

    pub fn result_kind(&self) -> ResultKind {
        self.op.result_kind()
    }

    /// Runs the shape rule of this operation on operand metadata.
    pub fn infer(&self, operands: &[Operand<&NodeValue>]) -> RuntimeResult<NodeValue> {
        shape::infer(self.op, operands)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.namespace.prefix(), self.name)
    }
}

/// An operation input: a value produced elsewhere or an inline literal.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand<T> {
    Value(T),
    Int(i64),
    Float(f64),
    Bool(bool),
    IntList(Vec<i64>),
    DType(DType),
}

impl<T> Operand<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Operand<U> {
        match self {
            Operand::Value(value) => Operand::Value(f(value)),
            Operand::Int(v) => Operand::Int(v),
            Operand::Float(v) => Operand::Float(v),
            Operand::Bool(v) => Operand::Bool(v),
            Operand::IntList(v) => Operand::IntList(v),
            Operand::DType(v) => Operand::DType(v),
        }
    }

    pub fn try_map<U, E>(self, f: impl FnOnce(T) -> Result<U, E>) -> Result<Operand<U>, E> {
        Ok(match self {
            Operand::Value(value) => Operand::Value(f(value)?),
            Operand::Int(v) => Operand::Int(v),
            Operand::Float(v) => Operand::Float(v),
            Operand::Bool(v) => Operand::Bool(v),
            Operand::IntList(v) => Operand::IntList(v),
            Operand::DType(v) => Operand::DType(v),
        })
    }

    pub fn as_ref(&self) -> Operand<&T> {
        match self {
            Operand::Value(value) => Operand::Value(value),
            Operand::Int(v) => Operand::Int(*v),
            Operand::Float(v) => Operand::Float(*v),
            Operand::Bool(v) => Operand::Bool(*v),
            Operand::IntList(v) => Operand::IntList(v.clone()),
            Operand::DType(v) => Operand::DType(*v),
        }
    }
}
