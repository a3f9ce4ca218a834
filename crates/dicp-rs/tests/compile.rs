use std::sync::Mutex;

use dicp_rs::compile::{count_tangents, CompileRequest};
use dicp_rs::extract::OutputShapeMap;
use dicp_rs::graph::{Argument, Graph};
use dicp_rs::kernel::{KernelParam, KernelType, KernelWriter};
use dicp_rs::ops::{OpKind, Target};
use dicp_rs::{
    CompileContext, CompileError, CompileResult, DType, GraphModule, HostTensor, PipelineConfig,
    TensorMeta, Value, VendorBackend,
};

fn f32_input(dims: &[usize], values: Vec<f32>) -> Value {
    Value::Tensor(HostTensor::from_f32(dims, values).expect("tensor"))
}

fn relu_module() -> GraphModule {
    let mut graph = Graph::new();
    let x = graph.placeholder("x", None);
    let relu = graph.call("relu", Target::aten(OpKind::Relu), vec![x.into()]);
    graph.output(vec![relu]);
    GraphModule::new("Relu", graph)
}

/// Leaves the graph untouched and emits a kernel returning its first input.
/// Keeps the output shapes it was handed.
#[derive(Default)]
struct PassThrough {
    output_shapes: Mutex<Option<OutputShapeMap>>,
}

impl VendorBackend for PassThrough {
    fn name(&self) -> &str {
        "passthrough"
    }

    fn opset_transform(&self, module: &GraphModule) -> CompileResult<GraphModule> {
        Ok(module.clone())
    }

    fn requires_output_shapes(&self) -> bool {
        true
    }

    fn codegen(
        &self,
        transformed: &GraphModule,
        _original: &GraphModule,
        output_shapes: Option<&OutputShapeMap>,
    ) -> CompileResult<String> {
        let output_shapes =
            output_shapes.ok_or_else(|| CompileError::codegen("output shapes were not supplied"))?;
        *self.output_shapes.lock().expect("shapes lock") = Some(output_shapes.clone());
        let params = transformed
            .graph()
            .placeholders()
            .map(|node| {
                let meta = node
                    .meta
                    .as_ref()
                    .ok_or_else(|| CompileError::codegen("placeholder without metadata"))?;
                Ok(KernelParam {
                    name: node.name.clone(),
                    ty: KernelType::of(meta),
                })
            })
            .collect::<CompileResult<Vec<_>>>()?;
        let first = params
            .first()
            .map(|param| param.name.clone())
            .ok_or_else(|| CompileError::codegen("no inputs"))?;
        let mut writer = KernelWriter::new();
        writer.begin("passthrough", &params, None);
        writer.ret(&[first]);
        Ok(writer.finish())
    }
}

#[test]
fn graphs_without_calls_run_eagerly() {
    let mut graph = Graph::new();
    let x = graph.placeholder("x", None);
    graph.output(vec![x]);
    let module = GraphModule::new("Identity", graph);

    let context = CompileContext::default();
    let input = f32_input(&[2], vec![1.0, 2.0]);
    let compiled = context
        .compile(&module, &[input.clone()], "topsgraph")
        .expect("compiles");
    assert!(compiled.is_eager());
    assert!(compiled.boxed_call());
    assert_eq!(compiled.original_module().map(GraphModule::graph), Some(module.graph()));
    assert_eq!(compiled.call(vec![input.clone()]).expect("runs"), vec![input]);
    assert!(context.cache().is_empty());
}

#[test]
fn sym_int_only_graphs_return_the_original_module() {
    let mut graph = Graph::new();
    let s0 = graph.placeholder("s0", None);
    let s1 = graph.placeholder("s1", None);
    let sum = graph.call("sym_add", Target::aten(OpKind::SymAdd), vec![s0.into(), s1.into()]);
    let doubled = graph.call("sym_mul", Target::aten(OpKind::SymMul), vec![sum.into(), Argument::Int(2)]);
    graph.output(vec![doubled]);
    let module = GraphModule::new("Sizes", graph);

    let inputs = [Value::SymInt(3), Value::SymInt(4)];
    let compiled = CompileContext::default()
        .compile(&module, &inputs, "ascendgraph")
        .expect("compiles");
    assert!(compiled.is_eager());
    assert_eq!(compiled.original_module().map(GraphModule::graph), Some(module.graph()));
    assert_eq!(compiled.call(inputs.to_vec()).expect("runs"), vec![Value::SymInt(14)]);
}

#[test]
fn stub_backend_pipeline_returns_its_input() {
    let context = CompileContext::default();
    let input = f32_input(&[3], vec![-1.0, 0.0, 2.5]);
    let backend = PassThrough::default();
    let compiled = context
        .compile_with(&relu_module(), &[input.clone()], &backend, CompileRequest::default())
        .expect("compiles");
    assert!(!compiled.is_eager());
    let shapes = backend
        .output_shapes
        .lock()
        .expect("shapes lock")
        .clone()
        .expect("codegen saw output shapes");
    assert_eq!(shapes.len(), 1);
    assert_eq!(shapes.dims("relu").expect("relu shape"), vec![3]);
    assert_eq!(compiled.kernel().map(|kernel| kernel.name()), Some("passthrough"));
    assert_eq!(compiled.call(vec![input.clone()]).expect("runs"), vec![input]);
}

#[test]
fn returned_values_without_a_shape_fail_on_tops() {
    let mut graph = Graph::new();
    let x = graph.placeholder("x", None);
    let w = graph.placeholder("w", None);
    let add = graph.call("add", Target::aten(OpKind::Add), vec![x.into(), w.into()]);
    let size = graph.call(
        "sym_size",
        Target::aten(OpKind::SymSize),
        vec![x.into(), Argument::Int(0)],
    );
    graph.output(vec![add, w, size]);
    let module = GraphModule::new("AddWithSize", graph);

    let inputs = [
        f32_input(&[3], vec![1.0, 2.0, 3.0]),
        f32_input(&[3], vec![0.5, 0.5, 0.5]),
    ];
    let err = CompileContext::default()
        .compile(&module, &inputs, "topsgraph")
        .expect_err("sym-int output has no bracketed shape");
    assert_eq!(
        err,
        CompileError::ShapeNotFound {
            ident: "sym_size".to_string()
        }
    );
}

#[test]
fn unknown_backends_are_rejected() {
    let err = CompileContext::default()
        .compile(&relu_module(), &[f32_input(&[1], vec![0.0])], "cudagraph")
        .expect_err("unknown backend");
    assert_eq!(
        err,
        CompileError::UnsupportedBackend {
            name: "cudagraph".to_string()
        }
    );
}

#[test]
fn backend_names_ignore_case() {
    let compiled = CompileContext::default()
        .compile(&relu_module(), &[f32_input(&[2], vec![-1.0, 1.0])], "TopsGraph")
        .expect("compiles");
    assert_eq!(compiled.kernel().and_then(|kernel| kernel.target()), Some("topsgraph"));
}

#[test]
fn placeholders_need_metadata_when_filling_is_disabled() {
    let context = CompileContext::new(PipelineConfig {
        fill_placeholder_meta: false,
        ..PipelineConfig::default()
    });
    let err = context
        .compile(&relu_module(), &[f32_input(&[2], vec![-1.0, 1.0])], "topsgraph")
        .expect_err("no metadata");
    assert!(matches!(err, CompileError::Inference { ref node, .. } if node == "relu"));
}

#[test]
fn recompiling_reuses_the_cached_kernel() {
    let context = CompileContext::default();
    let inputs = [f32_input(&[2, 2], vec![1.0, -1.0, 2.0, -2.0])];
    let first = context.compile(&relu_module(), &inputs, "topsgraph").expect("first");
    let second = context.compile(&relu_module(), &inputs, "topsgraph").expect("second");
    let (first, second) = (
        first.kernel().expect("kernel"),
        second.kernel().expect("kernel"),
    );
    assert!(std::sync::Arc::ptr_eq(first, second));
    assert_eq!(context.cache().len(), 1);
}

#[test]
fn graph_ids_are_assigned_in_order() -> anyhow::Result<()> {
    let context = CompileContext::default();
    let inputs = [f32_input(&[1], vec![1.0])];
    let a = context.compile(&relu_module(), &inputs, "topsgraph")?;
    let b = context.compile(&relu_module(), &inputs, "topsgraph")?;
    assert_eq!(b.graph_id(), a.graph_id() + 1);
    Ok(())
}

#[test]
fn forward_and_backward_share_a_graph_id() {
    let context = CompileContext::default();
    let compilers = context.compile_fx("ascendgraph", 1).expect("front");

    let forward = compilers
        .forward(&relu_module(), &[f32_input(&[2], vec![-3.0, 3.0])])
        .expect("forward");

    let mut graph = Graph::new();
    let saved = graph.placeholder("relu", None);
    let grad = graph.placeholder("tangents_1", None);
    let mask = graph.call("relu_1", Target::aten(OpKind::Relu), vec![saved.into()]);
    let grad_in = graph.call("mul", Target::aten(OpKind::Mul), vec![grad.into(), mask.into()]);
    graph.output(vec![grad_in]);
    let backward_module = GraphModule::new("ReluBackward", graph);
    assert_eq!(count_tangents(backward_module.graph()), Ok(1));

    let backward = compilers
        .backward(
            &backward_module,
            &[f32_input(&[2], vec![0.0, 3.0]), f32_input(&[2], vec![0.5, 0.5])],
        )
        .expect("backward");
    assert_eq!(forward.graph_id(), compilers.graph_id());
    assert_eq!(backward.graph_id(), compilers.graph_id());
}

#[test]
fn backward_graphs_with_interleaved_tangents_are_rejected() {
    let mut graph = Graph::new();
    let g = graph.placeholder("tangents_1", None);
    let x = graph.placeholder("primals_1", None);
    let out = graph.call("mul", Target::aten(OpKind::Mul), vec![g.into(), x.into()]);
    graph.output(vec![out]);
    let module = GraphModule::new("Bad", graph);

    let context = CompileContext::default();
    let compilers = context.compile_fx("topsgraph", 1).expect("front");
    let inputs = [f32_input(&[1], vec![1.0]), f32_input(&[1], vec![2.0])];
    assert!(matches!(
        compilers.backward(&module, &inputs),
        Err(CompileError::StaticInputsNotPrefix { .. })
    ));
}

#[test]
fn dump_directory_receives_generated_sources() {
    let dir = std::env::temp_dir().join(format!("dicp-compile-dump-{}", std::process::id()));
    let context = CompileContext::new(PipelineConfig {
        dump_dir: Some(dir.clone()),
        ..PipelineConfig::default()
    });
    let compiled = context
        .compile(&relu_module(), &[f32_input(&[2], vec![1.0, 2.0])], "ascendgraph")
        .expect("compiles");
    let kernel = compiled.kernel().expect("kernel");
    let stem = format!("kernel_{}", &kernel.digest()[..16]);
    let source = std::fs::read_to_string(dir.join(format!("{stem}.dicp"))).expect("dumped source");
    assert!(source.contains("ascend.Relu"));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn kernels_check_their_inputs() {
    let compiled = CompileContext::default()
        .compile(&relu_module(), &[f32_input(&[2], vec![1.0, 2.0])], "topsgraph")
        .expect("compiles");
    assert!(compiled.call(vec![]).is_err());
    assert!(compiled.call(vec![f32_input(&[3], vec![1.0, 2.0, 3.0])]).is_err());

    let ints = HostTensor::zeros(TensorMeta::new(DType::I64, [2]));
    assert!(compiled.call(vec![Value::Tensor(ints)]).is_err());
}
