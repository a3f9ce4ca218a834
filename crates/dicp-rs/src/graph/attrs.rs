use std::collections::BTreeMap;

use super::GraphError;
use crate::error::{CompileError, CompileResult};
use crate::tensor::{HostTensor, TensorMeta};

/// An entry of the attribute tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Attribute {
    Module(AttributeStore),
    Tensor(HostTensor),
}

/// Submodules and constant tensors owned by a traced module, addressed by
/// dotted paths such as `layer.weight`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeStore {
    entries: BTreeMap<String, Attribute>,
}

fn split_path(path: &str) -> Result<Vec<&str>, GraphError> {
    let segments: Vec<&str> = path.split('.').collect();
    if segments.iter().any(|segment| segment.is_empty()) {
        return Err(GraphError::InvalidAttributePath(path.to_string()));
    }
    Ok(segments)
}

impl AttributeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `tensor` at `path`, creating intermediate submodules on the way.
    pub fn insert_tensor(&mut self, path: &str, tensor: HostTensor) -> Result<(), GraphError> {
        self.insert(path, Attribute::Tensor(tensor))
    }

    pub fn insert_module(&mut self, path: &str, module: AttributeStore) -> Result<(), GraphError> {
        self.insert(path, Attribute::Module(module))
    }

    fn insert(&mut self, path: &str, attribute: Attribute) -> Result<(), GraphError> {
        let segments = split_path(path)?;
        let (leaf, parents) = segments
            .split_last()
            .ok_or_else(|| GraphError::InvalidAttributePath(path.to_string()))?;

        let mut store = self;
        for segment in parents {
            let entry = store
                .entries
                .entry((*segment).to_string())
                .or_insert_with(|| Attribute::Module(AttributeStore::default()));
            store = match entry {
                Attribute::Module(module) => module,
                Attribute::Tensor(_) => {
                    return Err(GraphError::AttributeConflict(path.to_string()));
                }
            };
        }
        store.entries.insert((*leaf).to_string(), attribute);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Attribute> {
        self.entries.get(name)
    }

    /// Walks `path` one segment at a time.
    ///
    /// A missing segment reports the prefix up to and including that segment,
    /// so `layer.weight.data` with no `weight` under `layer` names `layer.weight`.
    pub fn resolve_attribute(&self, path: &str) -> CompileResult<&Attribute> {
        let segments = split_path(path)?;
        let mut store = self;
        let mut found = None;
        let mut consumed = 0usize;
        for (idx, segment) in segments.iter().enumerate() {
            consumed += segment.len() + usize::from(idx > 0);
            let attribute = store
                .entries
                .get(*segment)
                .ok_or_else(|| CompileError::MissingAttribute {
                    path: path[..consumed].to_string(),
                })?;
            found = Some(attribute);
            if idx + 1 < segments.len() {
                store = match attribute {
                    Attribute::Module(module) => module,
                    Attribute::Tensor(_) => {
                        return Err(CompileError::MissingAttribute {
                            path: path[..consumed + 1 + segments[idx + 1].len()].to_string(),
                        });
                    }
                };
            }
        }
        found.ok_or_else(|| CompileError::MissingAttribute {
            path: path.to_string(),
        })
    }

    pub fn resolve(&self, path: &str) -> CompileResult<&HostTensor> {
        match self.resolve_attribute(path)? {
            Attribute::Tensor(tensor) => Ok(tensor),
            Attribute::Module(_) => Err(CompileError::AttributeNotTensor {
                path: path.to_string(),
            }),
        }
    }

    pub fn resolve_meta(&self, path: &str) -> CompileResult<TensorMeta> {
        self.resolve(path).map(|tensor| tensor.meta().clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
