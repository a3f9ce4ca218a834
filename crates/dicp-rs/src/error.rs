use thiserror::Error;

use crate::graph::GraphError;

/// Failure while evaluating an operation on host data or checking its shapes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct RuntimeError {
    message: String,
}

impl RuntimeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Errors surfaced by a compilation request. None of them is recovered
/// locally; the caller decides whether to fall back to eager execution.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("node referenced nonexistent attribute `{path}`")]
    MissingAttribute { path: String },
    #[error("attribute `{path}` is a submodule, not a tensor")]
    AttributeNotTensor { path: String },
    #[error("no shape annotation found for returned value `{ident}`")]
    ShapeNotFound { ident: String },
    #[error("malformed graph rendering: {0}")]
    MalformedRendering(String),
    #[error("unsupported backend `{name}`")]
    UnsupportedBackend { name: String },
    #[error("code generation failed: {0}")]
    Codegen(String),
    #[error("shape inference failed at node `{node}`: {message}")]
    Inference { node: String, message: String },
    #[error("static inputs of backward graph are not a prefix: {positions:?}")]
    StaticInputsNotPrefix { positions: Vec<usize> },
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl CompileError {
    pub fn codegen(message: impl Into<String>) -> Self {
        CompileError::Codegen(message.into())
    }
}

pub type CompileResult<T> = Result<T, CompileError>;
