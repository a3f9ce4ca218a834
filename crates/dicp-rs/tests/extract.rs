use dicp_rs::extract::{extract_output_shapes, OutputShapeMap};
use dicp_rs::graph::{Argument, Graph, NodeValue};
use dicp_rs::infer::infer_module;
use dicp_rs::ops::{OpKind, Target};
use dicp_rs::{CompileError, DType, GraphModule, TensorMeta};
use proptest::prelude::*;

fn tokens(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

#[test]
fn extracts_every_returned_value() {
    let text = "\
class Repro:
    def forward(self, x: f32[2, 3]):
        a: f32[2, 3] = aten.relu(x)
        b: f32[4] = self.bias
        return (a, b)
";
    let shapes = extract_output_shapes(text).expect("extracts");
    assert_eq!(shapes.len(), 2);
    assert_eq!(shapes.get("a"), Some(tokens(&["2", "3"]).as_slice()));
    assert_eq!(shapes.get("b"), Some(tokens(&["4"]).as_slice()));
    let order: Vec<&str> = shapes.iter().map(|(name, _)| name).collect();
    assert_eq!(order, vec!["a", "b"]);
}

#[test]
fn bare_annotation_and_single_return() {
    let shapes = extract_output_shapes("c0: [3,4]\nreturn (c0)\n").expect("extracts");
    assert_eq!(shapes.len(), 1);
    assert_eq!(shapes.dims("c0").expect("static"), vec![3, 4]);
}

#[test]
fn most_recent_annotation_wins() {
    let text = "\
        y: f32[8] = aten.neg(x)
        y: f32[2, 4] = aten.view(y, [2, 4])
        return (y,)
";
    let shapes = extract_output_shapes(text).expect("extracts");
    assert_eq!(shapes.dims("y").expect("static"), vec![2, 4]);
}

#[test]
fn missing_annotation_is_shape_not_found() {
    let text = "\
        y = aten.neg(x)
        return (y,)
";
    assert_eq!(
        extract_output_shapes(text),
        Err(CompileError::ShapeNotFound {
            ident: "y".to_string()
        })
    );
}

#[test]
fn unterminated_return_fails_closed() {
    let text = "        y: f32[2] = aten.neg(x)\n        return (y,\n";
    assert!(matches!(
        extract_output_shapes(text),
        Err(CompileError::MalformedRendering(_))
    ));
    assert!(matches!(
        extract_output_shapes("y: f32[2] = aten.neg(x)"),
        Err(CompileError::MalformedRendering(_))
    ));
}

#[test]
fn scalar_outputs_have_no_tokens() {
    let text = "        total: f32[] = aten.sum(x, [0, 1])\n        return (total,)\n";
    let shapes = extract_output_shapes(text).expect("extracts");
    assert_eq!(shapes.dims("total").expect("scalar"), Vec::<usize>::new());
}

#[test]
fn textual_and_structural_shapes_agree() {
    let mut graph = Graph::new();
    let x = graph.placeholder("x", Some(NodeValue::Tensor(TensorMeta::new(DType::F32, [3, 4]))));
    let t = graph.call(
        "permute",
        Target::aten(OpKind::Permute),
        vec![x.into(), Argument::IntList(vec![1, 0])],
    );
    let s = graph.call(
        "sum",
        Target::aten(OpKind::Sum),
        vec![t.into(), Argument::IntList(vec![1]), Argument::Bool(true)],
    );
    graph.output(vec![t, s, x]);
    let mut module = GraphModule::new("Agree", graph);
    infer_module(&mut module).expect("infers");

    let textual = extract_output_shapes(&module.print_readable()).expect("textual");
    let structural = OutputShapeMap::from_graph(module.graph()).expect("structural");
    assert_eq!(textual, structural);
    assert_eq!(textual.dims("sum").expect("static"), vec![4, 1]);
}

fn render(outputs: &[(String, Vec<usize>)]) -> String {
    let mut text = String::from("class Generated:\n    def forward(self):\n");
    for (name, dims) in outputs {
        let dims: Vec<String> = dims.iter().map(usize::to_string).collect();
        text.push_str(&format!(
            "        {name}: f32[{}] = aten.neg(x)\n",
            dims.join(", ")
        ));
    }
    let names: Vec<&str> = outputs.iter().map(|(name, _)| name.as_str()).collect();
    text.push_str(&format!("        return ({},)\n", names.join(", ")));
    text
}

proptest! {
    #[test]
    fn recovers_rendered_dims(dims in prop::collection::vec(prop::collection::vec(1usize..64, 0..4), 1..6)) {
        let outputs: Vec<(String, Vec<usize>)> = dims
            .into_iter()
            .enumerate()
            .map(|(idx, dims)| (format!("out_{idx}"), dims))
            .collect();
        let shapes = extract_output_shapes(&render(&outputs)).expect("extracts");
        prop_assert_eq!(shapes.len(), outputs.len());
        for (name, dims) in &outputs {
            prop_assert_eq!(&shapes.dims(name).expect("static"), dims);
        }
    }

    #[test]
    fn prefixed_names_do_not_shadow(dims in prop::collection::vec(1usize..32, 1..4)) {
        let outputs = vec![
            ("my_out".to_string(), vec![99]),
            ("out".to_string(), dims.clone()),
        ];
        let text = render(&outputs).replace("return (my_out, out,)", "return (out,)");
        let shapes = extract_output_shapes(&text).expect("extracts");
        prop_assert_eq!(shapes.dims("out").expect("static"), dims);
    }
}
