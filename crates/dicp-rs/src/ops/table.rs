use super::{Namespace, OpKind};

pub(super) fn name_in(namespace: Namespace, op: OpKind) -> Option<&'static str> {
    match namespace {
        Namespace::Aten => Some(aten_name(op)),
        Namespace::Tops => tops_name(op),
        Namespace::Ascend => ascend_name(op),
    }
}

pub(super) fn aten_name(op: OpKind) -> &'static str {
    match op {
        OpKind::Add => "add",
        OpKind::Sub => "sub",
        OpKind::Mul => "mul",
        OpKind::Div => "div",
        OpKind::Maximum => "maximum",
        OpKind::AddScalar => "add.Scalar",
        OpKind::MulScalar => "mul.Scalar",
        OpKind::Neg => "neg",
        OpKind::Relu => "relu",
        OpKind::Exp => "exp",
        OpKind::Sqrt => "sqrt",
        OpKind::Rsqrt => "rsqrt",
        OpKind::Reciprocal => "reciprocal",
        OpKind::Abs => "abs",
        OpKind::MatMul => "mm",
        OpKind::Addmm => "addmm",
        OpKind::Reshape => "view",
        OpKind::Permute => "permute",
        OpKind::Sum => "sum",
        OpKind::Amax => "amax",
        OpKind::Softmax => "_softmax",
        OpKind::Convert => "convert_element_type",
        OpKind::SymSize => "sym_size",
        OpKind::SymAdd => "sym_add",
        OpKind::SymMul => "sym_mul",
    }
}

fn tops_name(op: OpKind) -> Option<&'static str> {
    let name = match op {
        OpKind::Add => "Add",
        OpKind::Sub => "Sub",
        OpKind::Mul => "Mul",
        OpKind::Div => "Div",
        OpKind::Maximum => "Max",
        OpKind::Neg => "Neg",
        OpKind::Relu => "Relu",
        OpKind::Exp => "Exp",
        OpKind::Sqrt => "Sqrt",
        OpKind::Rsqrt => "Rsqrt",
        OpKind::Reciprocal => "Reciprocal",
        OpKind::Abs => "Abs",
        OpKind::MatMul => "Dot",
        OpKind::Reshape => "Reshape",
        OpKind::Permute => "Transpose",
        OpKind::Sum => "ReduceSum",
        OpKind::Amax => "ReduceMax",
        OpKind::Softmax => "Softmax",
        OpKind::Convert => "Convert",
        OpKind::AddScalar
        | OpKind::MulScalar
        | OpKind::Addmm
        | OpKind::SymSize
        | OpKind::SymAdd
        | OpKind::SymMul => return None,
    };
    Some(name)
}

fn ascend_name(op: OpKind) -> Option<&'static str> {
    let name = match op {
        OpKind::Add => "Add",
        OpKind::Mul => "Mul",
        OpKind::Maximum => "Maximum",
        OpKind::AddScalar => "Adds",
        OpKind::MulScalar => "Muls",
        OpKind::Neg => "Neg",
        OpKind::Relu => "Relu",
        OpKind::Exp => "Exp",
        OpKind::Sqrt => "Sqrt",
        OpKind::Rsqrt => "Rsqrt",
        OpKind::Reciprocal => "Reciprocal",
        OpKind::Abs => "Abs",
        OpKind::MatMul => "MatMul",
        OpKind::Reshape => "Reshape",
        OpKind::Permute => "Transpose",
        OpKind::Sum => "ReduceSum",
        OpKind::Amax => "ReduceMax",
        OpKind::Convert => "Cast",
        OpKind::Sub
        | OpKind::Div
        | OpKind::Addmm
        | OpKind::Softmax
        | OpKind::SymSize
        | OpKind::SymAdd
        | OpKind::SymMul => return None,
    };
    Some(name)
}
