//! Shape and dtype annotation of graph nodes.

use crate::error::{CompileError, CompileResult};
use crate::graph::{AttributeStore, Graph, GraphModule, NodeKind, NodeValue};
use crate::ops::Operand;

/// Fills the metadata slot of every `call_function` and `get_attr` node.
///
/// Nodes are visited in graph order, so the metadata of every argument is
/// already known when a node is reached. Only descriptors are computed; no
/// tensor data is read besides the attribute tensors' dtype and dims.
pub fn infer_node_values(graph: &mut Graph, attrs: &AttributeStore) -> CompileResult<()> {
    for idx in 0..graph.len() {
        let node = &graph.nodes()[idx];
        let value = match &node.kind {
            NodeKind::Placeholder | NodeKind::Output { .. } => continue,
            NodeKind::GetAttr { target } => NodeValue::Tensor(attrs.resolve_meta(target)?),
            NodeKind::CallFunction { target, args } => {
                let operands = args
                    .iter()
                    .map(|arg| {
                        arg.to_operand(|id| {
                            graph
                                .node(id)
                                .and_then(|input| input.meta.as_ref())
                                .ok_or_else(|| CompileError::Inference {
                                    node: node.name.clone(),
                                    message: format!(
                                        "argument `{}` has no metadata",
                                        graph
                                            .node(id)
                                            .map(|input| input.name.as_str())
                                            .unwrap_or("?")
                                    ),
                                })
                        })
                    })
                    .collect::<CompileResult<Vec<Operand<&NodeValue>>>>()?;
                target
                    .infer(&operands)
                    .map_err(|err| CompileError::Inference {
                        node: node.name.clone(),
                        message: format!("{target}: {}", err.message()),
                    })?
            }
        };
        tracing::trace!(node = %node.name, value = %value, "inferred node value");
        let id = node.id;
        graph.set_meta(id, Some(value));
    }
    Ok(())
}

/// Runs [`infer_node_values`] against the module's own attributes.
pub fn infer_module(module: &mut GraphModule) -> CompileResult<()> {
    let attrs = std::sync::Arc::clone(module.attrs_arc());
    infer_node_values(module.graph_mut(), &attrs)
}
