use std::fmt::Write;

use super::{Argument, Graph, GraphModule, Node, NodeKind};

pub(super) fn render_module(module: &GraphModule) -> String {
    let graph = module.graph();
    let mut out = String::new();
    let _ = writeln!(out, "class {}:", module.name());

    let params: Vec<String> = graph.placeholders().map(annotated_name).collect();
    if params.is_empty() {
        out.push_str("    def forward(self):\n");
    } else {
        let _ = writeln!(out, "    def forward(self, {}):", params.join(", "));
    }

    for node in graph.nodes() {
        match &node.kind {
            NodeKind::Placeholder => {}
            NodeKind::GetAttr { target } => {
                let _ = writeln!(out, "        {} = self.{target}", annotated_name(node));
            }
            NodeKind::CallFunction { target, args } => {
                let rendered: Vec<String> =
                    args.iter().map(|arg| render_argument(graph, arg)).collect();
                let _ = writeln!(
                    out,
                    "        {} = {target}({})",
                    annotated_name(node),
                    rendered.join(", ")
                );
            }
            NodeKind::Output { args } => {
                let names: Vec<&str> = args.iter().map(|id| node_name(graph, id.0)).collect();
                let trailing = if names.len() == 1 { "," } else { "" };
                let _ = writeln!(out, "        return ({}{trailing})", names.join(", "));
            }
        }
    }
    out
}

fn annotated_name(node: &Node) -> String {
    match &node.meta {
        Some(meta) => format!("{}: {meta}", node.name),
        None => node.name.clone(),
    }
}

fn node_name(graph: &Graph, index: usize) -> &str {
    graph
        .nodes()
        .get(index)
        .map(|node| node.name.as_str())
        .unwrap_or("<invalid>")
}

fn render_argument(graph: &Graph, arg: &Argument) -> String {
    match arg {
        Argument::Node(id) => node_name(graph, id.0).to_string(),
        Argument::Int(value) => value.to_string(),
        Argument::Float(value) => format!("{value:?}"),
        Argument::Bool(value) => value.to_string(),
        Argument::IntList(values) => {
            let items: Vec<String> = values.iter().map(i64::to_string).collect();
            format!("[{}]", items.join(", "))
        }
        Argument::DType(dtype) => dtype.short_name().to_string(),
    }
}
