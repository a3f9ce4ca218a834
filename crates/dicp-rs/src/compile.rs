//! Compile orchestration.
//!
//! [`CompileContext`] takes a traced module plus example inputs, decides
//! whether the graph is worth compiling at all, and otherwise runs it through
//! the vendor pipeline: opset transform, shape inference, output shape
//! recovery, code generation and kernel loading.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::env;
use crate::error::{CompileError, CompileResult, RuntimeResult};
use crate::extract::{extract_output_shapes, OutputShapeMap};
use crate::graph::{Graph, GraphModule, NodeKind};
use crate::infer::infer_module;
use crate::kernel::{KernelCache, LoadedKernel};
use crate::ops::ResultKind;
use crate::profiling;
use crate::runtime::{interpret, Value};
use crate::vendor::{Backend, VendorBackend};

/// Where the code generator's output shapes come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputShapeSource {
    /// Scan the rendered, annotated graph.
    #[default]
    Textual,
    /// Read the output node's argument metadata.
    Structural,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub output_shapes: OutputShapeSource,
    /// Derive missing placeholder metadata from the example inputs.
    pub fill_placeholder_meta: bool,
    /// Directory receiving generated kernel sources, if any.
    pub dump_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output_shapes: OutputShapeSource::Textual,
            fill_placeholder_meta: true,
            dump_dir: None,
        }
    }
}

impl PipelineConfig {
    /// Reads `DICP_OUTPUT_SHAPES`, `DICP_DUMP_CODE` and `DICP_CACHE_DIR`.
    pub fn from_env() -> Self {
        Self {
            output_shapes: if env::structural_output_shapes() {
                OutputShapeSource::Structural
            } else {
                OutputShapeSource::Textual
            },
            fill_placeholder_meta: true,
            dump_dir: env::dump_code_enabled().then(env::cache_dir),
        }
    }
}

/// Per-request parameters supplied by the forward/backward front.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompileRequest {
    pub is_backward: bool,
    /// Leading inputs that are parameters or saved values rather than
    /// user inputs.
    pub num_fixed: usize,
    /// Assigned from the context's counter when `None`.
    pub graph_id: Option<usize>,
}

#[derive(Debug)]
enum CompiledKind {
    Eager(Arc<GraphModule>),
    Kernel(Arc<LoadedKernel>),
}

/// The callable produced by a compilation request.
///
/// Inputs are always passed boxed: one vector, in placeholder order.
#[derive(Debug)]
pub struct CompiledFn {
    kind: CompiledKind,
    boxed_call: bool,
    graph_id: usize,
}

impl CompiledFn {
    fn eager(module: GraphModule, graph_id: usize) -> Self {
        Self {
            kind: CompiledKind::Eager(Arc::new(module)),
            boxed_call: true,
            graph_id,
        }
    }

    pub fn call(&self, inputs: Vec<Value>) -> RuntimeResult<Vec<Value>> {
        match &self.kind {
            CompiledKind::Eager(module) => interpret(module, inputs),
            CompiledKind::Kernel(kernel) => kernel.call(inputs),
        }
    }

    pub fn is_eager(&self) -> bool {
        matches!(self.kind, CompiledKind::Eager(_))
    }

    /// The uncompiled module, when the request short-circuited.
    pub fn original_module(&self) -> Option<&GraphModule> {
        match &self.kind {
            CompiledKind::Eager(module) => Some(module),
            CompiledKind::Kernel(_) => None,
        }
    }

    pub fn kernel(&self) -> Option<&Arc<LoadedKernel>> {
        match &self.kind {
            CompiledKind::Kernel(kernel) => Some(kernel),
            CompiledKind::Eager(_) => None,
        }
    }

    pub fn boxed_call(&self) -> bool {
        self.boxed_call
    }

    pub fn graph_id(&self) -> usize {
        self.graph_id
    }
}

/// Owns the kernel cache and graph counter shared by compilation requests.
pub struct CompileContext {
    config: PipelineConfig,
    cache: KernelCache,
    graph_counter: AtomicUsize,
}

impl Default for CompileContext {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}

impl CompileContext {
    pub fn new(config: PipelineConfig) -> Self {
        let cache = match &config.dump_dir {
            Some(dir) => KernelCache::with_dump_dir(dir),
            None => KernelCache::new(),
        };
        Self {
            config,
            cache,
            graph_counter: AtomicUsize::new(0),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn cache(&self) -> &KernelCache {
        &self.cache
    }

    pub fn next_graph_id(&self) -> usize {
        self.graph_counter.fetch_add(1, Ordering::Relaxed)
    }

    /// Compiles `module` for the backend named `backend`.
    pub fn compile(
        &self,
        module: &GraphModule,
        example_inputs: &[Value],
        backend: &str,
    ) -> CompileResult<CompiledFn> {
        let backend: Backend = backend.parse()?;
        self.compile_with(module, example_inputs, &backend, CompileRequest::default())
    }

    /// Returns the compile hooks of one traced function. All hooks share a
    /// single graph id.
    pub fn compile_fx(
        &self,
        backend: &str,
        num_example_inputs: usize,
    ) -> CompileResult<GraphCompilers<'_>> {
        Ok(GraphCompilers {
            context: self,
            backend: backend.parse()?,
            graph_id: self.next_graph_id(),
            num_example_inputs,
        })
    }

    pub fn compile_with<B: VendorBackend + ?Sized>(
        &self,
        module: &GraphModule,
        example_inputs: &[Value],
        backend: &B,
        request: CompileRequest,
    ) -> CompileResult<CompiledFn> {
        module.graph().validate()?;
        let graph_id = request
            .graph_id
            .unwrap_or_else(|| self.next_graph_id());

        if module.graph().count_calls() == 0 {
            tracing::debug!(module = module.name(), "graph has no calls, running eagerly");
            return Ok(CompiledFn::eager(module.clone(), graph_id));
        }
        if used_nodes_all_sym_int(module.graph(), example_inputs) {
            tracing::debug!(
                module = module.name(),
                "graph only computes sym-ints, running eagerly"
            );
            return Ok(CompiledFn::eager(module.clone(), graph_id));
        }

        let direction = if request.is_backward {
            "BACKWARDS"
        } else {
            "FORWARDS"
        };
        let backend_name = backend.name();
        tracing::info!("{backend_name} compiling {direction} graph {graph_id}");
        tracing::debug!(num_fixed = request.num_fixed, inputs = example_inputs.len());

        let mut original = module.clone();
        if self.config.fill_placeholder_meta {
            fill_placeholder_meta(original.graph_mut(), example_inputs);
        }

        let mut transformed = {
            let _scope = profiling::compile_scope("compile.opset_transform");
            backend.opset_transform(&original)?
        };
        {
            let _scope = profiling::compile_scope("compile.infer");
            infer_module(&mut transformed)?;
        }
        let output_shapes = {
            let _scope = profiling::compile_scope("compile.output_shapes");
            match self.config.output_shapes {
                OutputShapeSource::Textual => extract_output_shapes(&transformed.print_readable())?,
                OutputShapeSource::Structural => OutputShapeMap::from_graph(transformed.graph())?,
            }
        };
        tracing::debug!(outputs = output_shapes.len(), "recovered output shapes");
        let source = {
            let _scope = profiling::compile_scope("compile.codegen");
            let shapes = backend
                .requires_output_shapes()
                .then_some(&output_shapes);
            backend.codegen(&transformed, &original, shapes)?
        };
        let kernel = self.cache.load(&source)?;

        tracing::info!("{backend_name} compiling {direction} graph {graph_id}");
        Ok(CompiledFn {
            kind: CompiledKind::Kernel(kernel),
            boxed_call: true,
            graph_id,
        })
    }
}

/// Compile hooks handed to the forward/backward partitioner.
pub struct GraphCompilers<'a> {
    context: &'a CompileContext,
    backend: Backend,
    graph_id: usize,
    num_example_inputs: usize,
}

impl GraphCompilers<'_> {
    pub fn graph_id(&self) -> usize {
        self.graph_id
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn forward(&self, module: &GraphModule, example_inputs: &[Value]) -> CompileResult<CompiledFn> {
        self.compile_forward(module, example_inputs)
    }

    /// Same as [`GraphCompilers::forward`], for graphs that never see a
    /// backward pass.
    pub fn inference(&self, module: &GraphModule, example_inputs: &[Value]) -> CompileResult<CompiledFn> {
        self.compile_forward(module, example_inputs)
    }

    pub fn backward(&self, module: &GraphModule, example_inputs: &[Value]) -> CompileResult<CompiledFn> {
        let request = CompileRequest {
            is_backward: true,
            num_fixed: count_tangents(module.graph())?,
            graph_id: Some(self.graph_id),
        };
        self.context
            .compile_with(module, example_inputs, &self.backend, request)
    }

    fn compile_forward(&self, module: &GraphModule, example_inputs: &[Value]) -> CompileResult<CompiledFn> {
        let request = CompileRequest {
            is_backward: false,
            num_fixed: example_inputs.len().saturating_sub(self.num_example_inputs),
            graph_id: Some(self.graph_id),
        };
        self.context
            .compile_with(module, example_inputs, &self.backend, request)
    }
}

/// Number of static inputs of a backward graph: the placeholders that are not
/// incoming gradients. They must all precede the gradients.
pub fn count_tangents(graph: &Graph) -> CompileResult<usize> {
    let positions: Vec<usize> = graph
        .placeholders()
        .enumerate()
        .filter(|(_, node)| !node.name.contains("tangents"))
        .map(|(position, _)| position)
        .collect();
    if positions.iter().enumerate().any(|(idx, position)| idx != *position) {
        return Err(CompileError::StaticInputsNotPrefix { positions });
    }
    Ok(positions.len())
}

/// True when every node that something consumes produces a sym-int.
///
/// A node's kind comes from its metadata; without metadata, a placeholder takes
/// the kind of its example input and a call the declared result kind of its
/// target.
fn used_nodes_all_sym_int(graph: &Graph, example_inputs: &[Value]) -> bool {
    let users = graph.user_counts();
    let mut placeholder_idx = 0usize;
    for node in graph.nodes() {
        let is_sym_int = match (&node.meta, &node.kind) {
            (Some(meta), _) => meta.is_sym_int(),
            (None, NodeKind::Placeholder) => matches!(
                example_inputs.get(placeholder_idx),
                Some(Value::SymInt(_))
            ),
            (None, NodeKind::CallFunction { target, .. }) => {
                target.result_kind() == ResultKind::SymInt
            }
            (None, _) => false,
        };
        if matches!(node.kind, NodeKind::Placeholder) {
            placeholder_idx += 1;
        }
        if users[node.id.index()] > 0 && !is_sym_int {
            return false;
        }
    }
    true
}

fn fill_placeholder_meta(graph: &mut Graph, example_inputs: &[Value]) {
    let missing: Vec<_> = graph
        .placeholders()
        .zip(example_inputs)
        .filter(|(node, _)| node.meta.is_none())
        .map(|(node, input)| (node.id, input.describe_as(&node.name)))
        .collect();
    for (id, meta) in missing {
        graph.set_meta(id, Some(meta));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Argument, NodeValue};
    use crate::ops::{OpKind, Target};
    use crate::tensor::{DType, HostTensor, TensorMeta};

    #[test]
    fn count_tangents_requires_static_prefix() {
        let mut graph = Graph::new();
        graph.placeholder("primals_1", None);
        graph.placeholder("primals_2", None);
        graph.placeholder("tangents_1", None);
        assert_eq!(count_tangents(&graph), Ok(2));

        let mut graph = Graph::new();
        graph.placeholder("primals_1", None);
        graph.placeholder("tangents_1", None);
        graph.placeholder("primals_2", None);
        assert_eq!(
            count_tangents(&graph),
            Err(CompileError::StaticInputsNotPrefix {
                positions: vec![0, 2]
            })
        );
    }

    #[test]
    fn sym_int_detection_uses_result_kinds_without_metadata() {
        let mut graph = Graph::new();
        let x = graph.placeholder("x", None);
        let size = graph.call(
            "sym_size",
            Target::aten(OpKind::SymSize),
            vec![x.into(), Argument::Int(0)],
        );
        graph.output(vec![size]);

        let tensor = Value::Tensor(HostTensor::zeros(TensorMeta::new(DType::F32, [2])));
        // `x` feeds sym_size, and it is a tensor.
        assert!(!used_nodes_all_sym_int(&graph, &[tensor]));
        assert!(used_nodes_all_sym_int(&graph, &[Value::SymInt(4)]));
    }

    #[test]
    fn placeholder_meta_is_filled_from_inputs() {
        let mut graph = Graph::new();
        let known = NodeValue::Tensor(TensorMeta::new(DType::I64, [1]));
        let a = graph.placeholder("a", Some(known.clone()));
        let s0 = graph.placeholder("s0", None);
        graph.output(vec![a, s0]);

        let inputs = [
            Value::Tensor(HostTensor::zeros(TensorMeta::new(DType::F32, [3]))),
            Value::SymInt(5),
        ];
        fill_placeholder_meta(&mut graph, &inputs);
        assert_eq!(graph.node(a).and_then(|n| n.meta.clone()), Some(known));
        let filled = graph.node(s0).and_then(|n| n.meta.clone()).expect("filled");
        let sym = filled.as_sym_int().expect("sym-int");
        assert_eq!(sym.expr, "s0");
        assert_eq!(sym.hint, Some(5));
    }
}
