use std::fmt::Write;

use super::{KernelOutput, KernelParam, KernelType};
use crate::ops::{Operand, Target};
use crate::tensor::{HostTensor, TensorData};

/// Incremental builder for kernel source text.
///
/// ```
/// use dicp_rs::kernel::{parse_kernel, KernelParam, KernelType, KernelWriter};
/// use dicp_rs::ops::{Namespace, OpKind, Operand, Target};
/// use dicp_rs::tensor::{DType, TensorMeta};
///
/// let ty = KernelType::Tensor(TensorMeta::new(DType::F32, [2]));
/// let mut writer = KernelWriter::new();
/// writer.target("topsgraph");
/// writer.begin(
///     "kernel_demo",
///     &[KernelParam { name: "x".into(), ty: ty.clone() }],
///     None,
/// );
/// let neg = Target::new(Namespace::Tops, OpKind::Neg).expect("tops.Neg");
/// writer.call("y", &ty, neg, &[Operand::Value("x".to_string())]);
/// writer.ret(&["y".to_string()]);
/// let source = writer.finish();
/// assert_eq!(parse_kernel(&source).expect("parses").name, "kernel_demo");
/// ```
#[derive(Debug, Default)]
pub struct KernelWriter {
    out: String,
}

impl KernelWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn comment(&mut self, text: &str) {
        for line in text.lines() {
            let _ = writeln!(self.out, "// {line}");
        }
    }

    pub fn target(&mut self, backend: &str) {
        let _ = writeln!(self.out, "target {backend}");
    }

    pub fn begin(&mut self, name: &str, params: &[KernelParam], outputs: Option<&[KernelOutput]>) {
        let params: Vec<String> = params
            .iter()
            .map(|param| format!("{}: {}", param.name, param.ty))
            .collect();
        let _ = write!(self.out, "kernel {name}({})", params.join(", "));
        if let Some(outputs) = outputs {
            let outputs: Vec<String> = outputs
                .iter()
                .map(|output| format!("{}: {}", output.name, dims_list(&output.dims)))
                .collect();
            let _ = write!(self.out, " -> ({})", outputs.join(", "));
        }
        self.out.push_str(" {\n");
    }

    pub fn constant(&mut self, name: &str, tensor: &HostTensor) {
        let values: Vec<String> = match tensor.data() {
            TensorData::F32(values) => values.iter().map(|v| format!("{v:?}")).collect(),
            TensorData::I64(values) => values.iter().map(i64::to_string).collect(),
            TensorData::Bool(values) => values.iter().map(bool::to_string).collect(),
        };
        let _ = writeln!(
            self.out,
            "    {name}: {} = const [{}]",
            tensor.meta(),
            values.join(", ")
        );
    }

    pub fn call(&mut self, name: &str, ty: &KernelType, target: Target, args: &[Operand<String>]) {
        let args: Vec<String> = args.iter().map(render_operand).collect();
        let _ = writeln!(self.out, "    {name}: {ty} = {target}({})", args.join(", "));
    }

    pub fn ret(&mut self, names: &[String]) {
        let _ = writeln!(self.out, "    return ({})", names.join(", "));
    }

    pub fn finish(mut self) -> String {
        self.out.push_str("}\n");
        self.out
    }
}

fn dims_list(dims: &[usize]) -> String {
    let items: Vec<String> = dims.iter().map(usize::to_string).collect();
    format!("[{}]", items.join(", "))
}

fn render_operand(operand: &Operand<String>) -> String {
    match operand {
        Operand::Value(name) => name.clone(),
        Operand::Int(value) => value.to_string(),
        Operand::Float(value) => format!("{value:?}"),
        Operand::Bool(value) => value.to_string(),
        Operand::IntList(values) => {
            let items: Vec<String> = values.iter().map(i64::to_string).collect();
            format!("[{}]", items.join(", "))
        }
        Operand::DType(dtype) => format!("dtype({dtype})"),
    }
}
