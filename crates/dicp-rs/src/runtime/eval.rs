use super::Value;
use crate::error::{RuntimeError, RuntimeResult};
use crate::graph::NodeValue;
use crate::ops::shape::{
    check_permutation, dim_operand, int_list_operand, normalize_axes, normalize_dim,
    reduce_operands,
};
use crate::ops::{OpKind, Operand, Target};
use crate::tensor::{compute_strides, HostTensor, TensorMeta};

/// Evaluates one operation on host values.
///
/// The shape rule runs first, so every kernel below can rely on validated
/// operands and a known result type.
pub fn evaluate(target: Target, operands: &[Operand<&Value>]) -> RuntimeResult<Value> {
    let described: Vec<Operand<NodeValue>> = operands
        .iter()
        .map(|operand| operand.clone().map(Value::describe))
        .collect();
    let described: Vec<Operand<&NodeValue>> = described.iter().map(Operand::as_ref).collect();
    let meta = match target.infer(&described)? {
        NodeValue::SymInt(sym) => {
            let value = sym.hint.ok_or_else(|| {
                RuntimeError::new(format!("{target}: sym-int `{}` has no value", sym.expr))
            })?;
            return Ok(Value::SymInt(value));
        }
        NodeValue::Tensor(meta) => meta,
    };

    let op = target.op();
    let tensor = match op {
        OpKind::Add | OpKind::Sub | OpKind::Mul | OpKind::Div | OpKind::Maximum => {
            op_binary(op, operands, &meta)?
        }
        OpKind::AddScalar => op_binary(OpKind::Add, operands, &meta)?,
        OpKind::MulScalar => op_binary(OpKind::Mul, operands, &meta)?,
        OpKind::Neg
        | OpKind::Relu
        | OpKind::Exp
        | OpKind::Sqrt
        | OpKind::Rsqrt
        | OpKind::Reciprocal
        | OpKind::Abs => op_unary(op, tensor_operand(operands, 0)?, &meta)?,
        OpKind::MatMul => {
            let values = matmul(tensor_operand(operands, 0)?, tensor_operand(operands, 1)?);
            HostTensor::from_values(meta, &values)?
        }
        OpKind::Addmm => {
            let bias = broadcast_values(tensor_operand(operands, 0)?, &meta.dims);
            let product = matmul(tensor_operand(operands, 1)?, tensor_operand(operands, 2)?);
            let values: Vec<f64> = bias.iter().zip(&product).map(|(b, p)| b + p).collect();
            HostTensor::from_values(meta, &values)?
        }
        OpKind::Reshape => tensor_operand(operands, 0)?.reshaped(&meta.dims)?,
        OpKind::Permute => {
            let input = tensor_operand(operands, 0)?;
            let perm = check_permutation(&int_list_operand(op, operands, 1)?, input.dims().len())?;
            op_permute(input, &perm, meta)?
        }
        OpKind::Sum | OpKind::Amax => {
            let input = tensor_operand(operands, 0)?;
            let (axes, _) = reduce_operands(op, operands)?;
            let axes = normalize_axes(&axes, input.dims().len())?;
            op_reduce(op, input, &axes, meta)?
        }
        OpKind::Softmax => {
            let input = tensor_operand(operands, 0)?;
            let axis = normalize_dim(dim_operand(op, operands, 1)?, input.dims().len())?;
            op_softmax(input, axis, meta)?
        }
        OpKind::Convert => HostTensor::from_values(meta, &tensor_operand(operands, 0)?.to_f64_vec())?,
        OpKind::SymSize | OpKind::SymAdd | OpKind::SymMul => {
            return Err(RuntimeError::new(format!(
                "{target}: expected a sym-int result"
            )));
        }
    };
    Ok(Value::Tensor(tensor))
}

fn tensor_operand<'a>(operands: &[Operand<&'a Value>], idx: usize) -> RuntimeResult<&'a HostTensor> {
    match operands.get(idx) {
        Some(Operand::Value(value)) => {
            let value: &'a Value = *value;
            value
                .as_tensor()
                .ok_or_else(|| RuntimeError::new(format!("operand {idx} is not a tensor")))
        }
        _ => Err(RuntimeError::new(format!("operand {idx} is not a tensor"))),
    }
}

enum Side<'a> {
    Tensor(&'a HostTensor),
    Scalar(f64),
}

fn side<'a>(operands: &[Operand<&'a Value>], idx: usize) -> RuntimeResult<Side<'a>> {
    match operands.get(idx) {
        Some(Operand::Value(value)) => {
            let value: &'a Value = *value;
            Ok(match value {
                Value::Tensor(tensor) => Side::Tensor(tensor),
                Value::SymInt(v) => Side::Scalar(*v as f64),
            })
        }
        Some(Operand::Int(v)) => Ok(Side::Scalar(*v as f64)),
        Some(Operand::Float(v)) => Ok(Side::Scalar(*v)),
        Some(Operand::Bool(v)) => Ok(Side::Scalar(f64::from(u8::from(*v)))),
        _ => Err(RuntimeError::new(format!("operand {idx} is not a scalar or tensor"))),
    }
}

fn unravel_index(mut index: usize, dims: &[usize]) -> Vec<usize> {
    let mut coords = vec![0; dims.len()];
    for (i, dim) in dims.iter().enumerate().rev() {
        coords[i] = index % *dim;
        index /= *dim;
    }
    coords
}

/// Expands `tensor` to `out_dims` following broadcast rules.
fn broadcast_values(tensor: &HostTensor, out_dims: &[usize]) -> Vec<f64> {
    let values = tensor.to_f64_vec();
    let in_dims = tensor.dims();
    let offset = out_dims.len() - in_dims.len();
    let in_strides = compute_strides(in_dims);
    let total: usize = out_dims.iter().product();
    (0..total)
        .map(|idx| {
            let coord = unravel_index(idx, out_dims);
            let src: usize = in_dims
                .iter()
                .enumerate()
                .filter(|(_, &dim)| dim != 1)
                .map(|(axis, _)| coord[axis + offset] * in_strides[axis])
                .sum();
            values[src]
        })
        .collect()
}

fn op_binary(op: OpKind, operands: &[Operand<&Value>], meta: &TensorMeta) -> RuntimeResult<HostTensor> {
    let expand = |side: Side<'_>| match side {
        Side::Tensor(tensor) => broadcast_values(tensor, &meta.dims),
        Side::Scalar(value) => vec![value; meta.numel()],
    };
    let lhs = expand(side(operands, 0)?);
    let rhs = expand(side(operands, 1)?);
    let values: Vec<f64> = lhs
        .iter()
        .zip(&rhs)
        .map(|(&a, &b)| match op {
            OpKind::Add => a + b,
            OpKind::Sub => a - b,
            OpKind::Mul => a * b,
            OpKind::Div => a / b,
            _ => a.max(b),
        })
        .collect();
    HostTensor::from_values(meta.clone(), &values)
}

fn op_unary(op: OpKind, input: &HostTensor, meta: &TensorMeta) -> RuntimeResult<HostTensor> {
    let values: Vec<f64> = input
        .to_f64_vec()
        .into_iter()
        .map(|x| match op {
            OpKind::Neg => -x,
            OpKind::Relu => x.max(0.0),
            OpKind::Exp => x.exp(),
            OpKind::Sqrt => x.sqrt(),
            OpKind::Rsqrt => 1.0 / x.sqrt(),
            OpKind::Reciprocal => 1.0 / x,
            _ => x.abs(),
        })
        .collect();
    HostTensor::from_values(meta.clone(), &values)
}

fn matmul(lhs: &HostTensor, rhs: &HostTensor) -> Vec<f64> {
    let (m, k) = (lhs.dims()[0], lhs.dims()[1]);
    let n = rhs.dims()[1];
    let a = lhs.to_f64_vec();
    let b = rhs.to_f64_vec();
    let mut out = vec![0.0f64; m * n];
    for i in 0..m {
        for p in 0..k {
            let lhs_value = a[i * k + p];
            for j in 0..n {
                out[i * n + j] += lhs_value * b[p * n + j];
            }
        }
    }
    out
}

fn op_permute(input: &HostTensor, perm: &[usize], meta: TensorMeta) -> RuntimeResult<HostTensor> {
    let input_strides = compute_strides(input.dims());
    let indices: Vec<usize> = (0..meta.numel())
        .map(|idx| {
            let out_coord = unravel_index(idx, &meta.dims);
            out_coord
                .iter()
                .enumerate()
                .map(|(out_axis, &c)| c * input_strides[perm[out_axis]])
                .sum()
        })
        .collect();
    HostTensor::new(meta, input.data().gather(&indices))
}

fn op_reduce(
    op: OpKind,
    input: &HostTensor,
    axes: &[usize],
    meta: TensorMeta,
) -> RuntimeResult<HostTensor> {
    let dims = input.dims();
    let kept: Vec<usize> = dims
        .iter()
        .enumerate()
        .map(|(axis, &dim)| if axes.contains(&axis) { 1 } else { dim })
        .collect();
    let kept_strides = compute_strides(&kept);
    let init = if op == OpKind::Sum {
        0.0
    } else {
        f64::NEG_INFINITY
    };
    let mut acc = vec![init; meta.numel()];
    for (idx, value) in input.to_f64_vec().into_iter().enumerate() {
        let coord = unravel_index(idx, dims);
        let slot: usize = coord
            .iter()
            .enumerate()
            .filter(|(axis, _)| !axes.contains(axis))
            .map(|(axis, &c)| c * kept_strides[axis])
            .sum();
        acc[slot] = if op == OpKind::Sum {
            acc[slot] + value
        } else {
            acc[slot].max(value)
        };
    }
    HostTensor::from_values(meta, &acc)
}

fn op_softmax(input: &HostTensor, axis: usize, meta: TensorMeta) -> RuntimeResult<HostTensor> {
    let dims = input.dims();
    let mut values = input.to_f64_vec();
    if dims.is_empty() {
        values.iter_mut().for_each(|v| *v = 1.0);
        return HostTensor::from_values(meta, &values);
    }
    let axis_len = dims[axis];
    let inner = compute_strides(dims)[axis];
    let outer = if axis_len * inner == 0 {
        0
    } else {
        values.len() / (axis_len * inner)
    };
    for outer_idx in 0..outer {
        for inner_idx in 0..inner {
            let base = outer_idx * axis_len * inner + inner_idx;
            let slice = (0..axis_len).map(|a| base + a * inner);
            let max = slice
                .clone()
                .map(|idx| values[idx])
                .fold(f64::NEG_INFINITY, f64::max);
            let mut total = 0.0;
            for idx in slice.clone() {
                values[idx] = (values[idx] - max).exp();
                total += values[idx];
            }
            for idx in slice {
                values[idx] /= total;
            }
        }
    }
    HostTensor::from_values(meta, &values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::DType;

    fn f32_tensor(dims: &[usize], values: &[f32]) -> Value {
        Value::Tensor(HostTensor::from_f32(dims, values.to_vec()).expect("tensor"))
    }

    fn values(value: &Value) -> Vec<f32> {
        value
            .as_tensor()
            .and_then(HostTensor::as_f32)
            .expect("f32 tensor")
            .to_vec()
    }

    #[test]
    fn add_broadcasts_rows() {
        let a = f32_tensor(&[2, 2], &[1.0, 2.0, 3.0, 4.0]);
        let b = f32_tensor(&[2], &[10.0, 20.0]);
        let out = evaluate(
            Target::aten(OpKind::Add),
            &[Operand::Value(&a), Operand::Value(&b)],
        )
        .expect("add");
        assert_eq!(values(&out), vec![11.0, 22.0, 13.0, 24.0]);
    }

    #[test]
    fn mm_and_permute() {
        let a = f32_tensor(&[2, 3], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let t = evaluate(
            Target::aten(OpKind::Permute),
            &[Operand::Value(&a), Operand::IntList(vec![1, 0])],
        )
        .expect("permute");
        assert_eq!(values(&t), vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
        let out = evaluate(
            Target::aten(OpKind::MatMul),
            &[Operand::Value(&a), Operand::Value(&t)],
        )
        .expect("mm");
        assert_eq!(values(&out), vec![14.0, 32.0, 32.0, 77.0]);
    }

    #[test]
    fn softmax_rows_sum_to_one() {
        let x = f32_tensor(&[2, 3], &[1.0, 2.0, 3.0, 0.0, 0.0, 0.0]);
        let out = evaluate(
            Target::aten(OpKind::Softmax),
            &[Operand::Value(&x), Operand::Int(-1), Operand::Bool(false)],
        )
        .expect("softmax");
        let probs = values(&out);
        assert!((probs[..3].iter().sum::<f32>() - 1.0).abs() < 1e-6);
        assert!((probs[3] - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn reductions_and_conversion() {
        let x = f32_tensor(&[2, 2], &[1.0, -5.0, 3.0, 4.0]);
        let sum = evaluate(
            Target::aten(OpKind::Sum),
            &[Operand::Value(&x), Operand::IntList(vec![0])],
        )
        .expect("sum");
        assert_eq!(values(&sum), vec![4.0, -1.0]);
        let max = evaluate(
            Target::aten(OpKind::Amax),
            &[Operand::Value(&x), Operand::IntList(vec![1]), Operand::Bool(true)],
        )
        .expect("amax");
        assert_eq!(values(&max), vec![1.0, 4.0]);
        let ints = evaluate(
            Target::aten(OpKind::Convert),
            &[Operand::Value(&x), Operand::DType(DType::I64)],
        )
        .expect("convert");
        assert_eq!(
            ints.as_tensor().and_then(HostTensor::as_i64),
            Some(&[1i64, -5, 3, 4][..])
        );
    }

    #[test]
    fn sym_size_reads_dimension() {
        let x = f32_tensor(&[4, 2], &[0.0; 8]);
        let out = evaluate(
            Target::aten(OpKind::SymSize),
            &[Operand::Value(&x), Operand::Int(0)],
        )
        .expect("sym_size");
        assert_eq!(out, Value::SymInt(4));
        let doubled = evaluate(
            Target::aten(OpKind::SymMul),
            &[Operand::Value(&out), Operand::Int(2)],
        )
        .expect("sym_mul");
        assert_eq!(doubled, Value::SymInt(8));
    }
}
