use super::{evaluate, Value};
use crate::error::{RuntimeError, RuntimeResult};
use crate::graph::{GraphModule, NodeId, NodeKind};

/// Runs `module` eagerly on `inputs`, one node at a time.
///
/// Placeholders bind the inputs in order; the returned vector holds the output
/// node's values.
pub fn interpret(module: &GraphModule, inputs: Vec<Value>) -> RuntimeResult<Vec<Value>> {
    let graph = module.graph();
    let expected = graph.placeholders().count();
    if inputs.len() != expected {
        return Err(RuntimeError::new(format!(
            "{} expects {expected} inputs, got {}",
            module.name(),
            inputs.len()
        )));
    }

    let mut inputs = inputs.into_iter();
    let mut env: Vec<Option<Value>> = Vec::with_capacity(graph.len());
    for node in graph.nodes() {
        let value = match &node.kind {
            NodeKind::Placeholder => inputs.next(),
            NodeKind::GetAttr { target } => {
                let tensor = module
                    .attrs()
                    .resolve(target)
                    .map_err(|err| RuntimeError::new(err.to_string()))?;
                Some(Value::Tensor(tensor.clone()))
            }
            NodeKind::CallFunction { target, args } => {
                let operands = args
                    .iter()
                    .map(|arg| arg.to_operand(|id| lookup(&env, id, &node.name)))
                    .collect::<RuntimeResult<Vec<_>>>()?;
                let value = evaluate(*target, &operands).map_err(|err| {
                    RuntimeError::new(format!("{} ({target}): {}", node.name, err.message()))
                })?;
                Some(value)
            }
            NodeKind::Output { args } => {
                return args
                    .iter()
                    .map(|id| lookup(&env, *id, &node.name).cloned())
                    .collect();
            }
        };
        env.push(value);
    }
    Err(RuntimeError::new(format!(
        "{} has no output node",
        module.name()
    )))
}

fn lookup<'a>(env: &'a [Option<Value>], id: NodeId, user: &str) -> RuntimeResult<&'a Value> {
    env.get(id.index())
        .and_then(Option::as_ref)
        .ok_or_else(|| RuntimeError::new(format!("{user} reads undefined value #{}", id.index())))
}
