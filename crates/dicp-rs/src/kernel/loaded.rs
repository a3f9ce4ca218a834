use std::collections::HashMap;

use super::{KernelExpr, KernelModule};
use crate::error::{RuntimeError, RuntimeResult};
use crate::runtime::{evaluate, Value};

/// A parsed kernel ready to be called.
#[derive(Debug)]
pub struct LoadedKernel {
    module: KernelModule,
    digest: blake3::Hash,
}

impl LoadedKernel {
    pub(crate) fn new(module: KernelModule, digest: blake3::Hash) -> Self {
        Self { module, digest }
    }

    pub fn name(&self) -> &str {
        &self.module.name
    }

    pub fn target(&self) -> Option<&str> {
        self.module.target.as_deref()
    }

    /// Hex digest of the source text this kernel was loaded from.
    pub fn digest(&self) -> String {
        self.digest.to_hex().to_string()
    }

    pub fn module(&self) -> &KernelModule {
        &self.module
    }

    pub fn num_params(&self) -> usize {
        self.module.params.len()
    }

    /// Runs the kernel on `inputs`, passed in parameter order.
    ///
    /// Inputs must match the declared parameter types exactly, and returned
    /// tensors must match the declared output shapes when the kernel has them.
    pub fn call(&self, inputs: Vec<Value>) -> RuntimeResult<Vec<Value>> {
        let module = &self.module;
        if inputs.len() != module.params.len() {
            return Err(RuntimeError::new(format!(
                "{} expects {} inputs, got {}",
                module.name,
                module.params.len(),
                inputs.len()
            )));
        }

        let mut env: HashMap<&str, Value> = HashMap::with_capacity(module.body.len() + inputs.len());
        for (param, input) in module.params.iter().zip(inputs) {
            if !param.ty.accepts(&input) {
                return Err(RuntimeError::new(format!(
                    "{}: parameter `{}` expects {}, got {input}",
                    module.name, param.name, param.ty
                )));
            }
            env.insert(param.name.as_str(), input);
        }

        for statement in &module.body {
            let value = match &statement.expr {
                KernelExpr::Const(tensor) => Value::Tensor(tensor.clone()),
                KernelExpr::Call { target, args } => {
                    let operands = args
                        .iter()
                        .map(|arg| {
                            arg.as_ref().try_map(|name| {
                                env.get(name.as_str()).ok_or_else(|| {
                                    RuntimeError::new(format!("undefined value `{name}`"))
                                })
                            })
                        })
                        .collect::<RuntimeResult<Vec<_>>>()?;
                    evaluate(*target, &operands).map_err(|err| {
                        RuntimeError::new(format!(
                            "{} ({target}): {}",
                            statement.name,
                            err.message()
                        ))
                    })?
                }
            };
            if !statement.ty.accepts(&value) {
                return Err(RuntimeError::new(format!(
                    "{}: `{}` declared {} but produced {value}",
                    module.name, statement.name, statement.ty
                )));
            }
            env.insert(statement.name.as_str(), value);
        }

        let outputs = module
            .returns
            .iter()
            .map(|name| {
                env.get(name.as_str())
                    .cloned()
                    .ok_or_else(|| RuntimeError::new(format!("undefined return value `{name}`")))
            })
            .collect::<RuntimeResult<Vec<_>>>()?;

        if let Some(declared) = &module.outputs {
            for (output, value) in declared.iter().zip(&outputs) {
                let actual = value.as_tensor().map(|tensor| tensor.dims());
                if actual != Some(output.dims.as_slice()) {
                    return Err(RuntimeError::new(format!(
                        "{}: output `{}` declared {:?} but produced {value}",
                        module.name, output.name, output.dims
                    )));
                }
            }
        }
        Ok(outputs)
    }
}
