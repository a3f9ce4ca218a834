use dicp_rs::graph::{Argument, AttributeStore, Graph, NodeValue, SymInt};
use dicp_rs::infer::{infer_module, infer_node_values};
use dicp_rs::ops::{OpKind, Target};
use dicp_rs::{CompileError, DType, GraphModule, HostTensor, TensorMeta};

fn linear_module(attrs: AttributeStore) -> GraphModule {
    let mut graph = Graph::new();
    let x = graph.placeholder("x", Some(NodeValue::Tensor(TensorMeta::new(DType::F32, [2, 3]))));
    let w = graph.get_attr("layer_weight", "layer.weight");
    let b = graph.get_attr("layer_bias", "layer.bias");
    let mm = graph.call("addmm", Target::aten(OpKind::Addmm), vec![b.into(), x.into(), w.into()]);
    let act = graph.call("relu", Target::aten(OpKind::Relu), vec![mm.into()]);
    graph.output(vec![act]);
    GraphModule::with_attributes("Linear", graph, attrs)
}

fn linear_attrs() -> AttributeStore {
    let mut attrs = AttributeStore::new();
    attrs
        .insert_tensor("layer.weight", HostTensor::from_f32(&[3, 5], vec![0.0; 15]).expect("weight"))
        .expect("insert weight");
    attrs
        .insert_tensor("layer.bias", HostTensor::from_f32(&[5], vec![0.0; 5]).expect("bias"))
        .expect("insert bias");
    attrs
}

#[test]
fn annotates_attributes_and_calls() {
    let mut module = linear_module(linear_attrs());
    infer_module(&mut module).expect("infers");
    let graph = module.graph();
    let meta = |name: &str| {
        graph
            .find(name)
            .and_then(|id| graph.node(id))
            .and_then(|node| node.meta.clone())
            .expect("annotated")
    };
    assert_eq!(meta("layer_weight"), NodeValue::Tensor(TensorMeta::new(DType::F32, [3, 5])));
    assert_eq!(meta("addmm"), NodeValue::Tensor(TensorMeta::new(DType::F32, [2, 5])));
    assert_eq!(meta("relu"), NodeValue::Tensor(TensorMeta::new(DType::F32, [2, 5])));
    let output = graph.output_node().expect("output");
    assert!(output.meta.is_none());
}

#[test]
fn inference_is_idempotent() {
    let mut module = linear_module(linear_attrs());
    infer_module(&mut module).expect("first pass");
    let first = module.graph().clone();
    infer_module(&mut module).expect("second pass");
    assert_eq!(module.graph(), &first);
}

#[test]
fn missing_attribute_names_the_failing_prefix() {
    let mut attrs = AttributeStore::new();
    attrs
        .insert_tensor("layer.bias", HostTensor::from_f32(&[5], vec![0.0; 5]).expect("bias"))
        .expect("insert bias");
    let mut module = linear_module(attrs);
    let err = infer_module(&mut module).expect_err("weight is missing");
    assert_eq!(
        err,
        CompileError::MissingAttribute {
            path: "layer.weight".to_string()
        }
    );
}

#[test]
fn sym_int_arithmetic_keeps_expressions() {
    let mut graph = Graph::new();
    let x = graph.placeholder(
        "x",
        Some(NodeValue::Tensor(TensorMeta::new(DType::F32, [4, 6]))),
    );
    let s0 = graph.placeholder("s0", Some(NodeValue::SymInt(SymInt::new("s0", Some(3)))));
    let size = graph.call(
        "sym_size",
        Target::aten(OpKind::SymSize),
        vec![x.into(), Argument::Int(1)],
    );
    let scaled = graph.call("sym_mul", Target::aten(OpKind::SymMul), vec![s0.into(), Argument::Int(2)]);
    let total = graph.call("sym_add", Target::aten(OpKind::SymAdd), vec![scaled.into(), size.into()]);
    graph.output(vec![total]);

    infer_node_values(&mut graph, &AttributeStore::new()).expect("infers");
    let total = graph.node(total).and_then(|node| node.meta.clone()).expect("annotated");
    assert_eq!(total, NodeValue::SymInt(SymInt::new("s0*2+6", Some(12))));
}

#[test]
fn shape_rule_violations_name_the_node() {
    let mut graph = Graph::new();
    let a = graph.placeholder("a", Some(NodeValue::Tensor(TensorMeta::new(DType::F32, [2, 3]))));
    let b = graph.placeholder("b", Some(NodeValue::Tensor(TensorMeta::new(DType::F32, [2, 3]))));
    let mm = graph.call("mm", Target::aten(OpKind::MatMul), vec![a.into(), b.into()]);
    graph.output(vec![mm]);

    let err = infer_node_values(&mut graph, &AttributeStore::new()).expect_err("mismatch");
    assert!(matches!(err, CompileError::Inference { ref node, .. } if node == "mm"));
}

#[test]
fn overflowing_reshape_is_an_inference_error() {
    let mut graph = Graph::new();
    let x = graph.placeholder("x", Some(NodeValue::Tensor(TensorMeta::new(DType::F32, [4]))));
    let view = graph.call(
        "view",
        Target::aten(OpKind::Reshape),
        vec![x.into(), Argument::IntList(vec![i64::MAX, 4])],
    );
    graph.output(vec![view]);

    let err = infer_node_values(&mut graph, &AttributeStore::new()).expect_err("overflow");
    assert!(matches!(err, CompileError::Inference { ref node, .. } if node == "view"));
}
