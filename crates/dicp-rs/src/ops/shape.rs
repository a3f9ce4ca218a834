//! Shape and dtype rules.
//!
//! Operand conventions per operation (the same for every namespace):
//!
//! | op | operands |
//! |---|---|
//! | binary (`Add`, `Sub`, `Mul`, `Div`, `Maximum`) | `a, b`, either may be a scalar literal |
//! | `AddScalar`, `MulScalar` | `tensor, scalar` |
//! | unary | `tensor` |
//! | `MatMul` | `[m, k], [k, n]` |
//! | `Addmm` | `bias, [m, k], [k, n]` |
//! | `Reshape` | `tensor, int-list` (one `-1` allowed) |
//! | `Permute` | `tensor, int-list` |
//! | `Sum`, `Amax` | `tensor, int-list [, keepdim]` (empty list reduces all dims) |
//! | `Softmax` | `tensor, dim [, half_to_float]` |
//! | `Convert` | `tensor, dtype` |
//! | `SymSize` | `tensor, dim` |
//! | `SymAdd`, `SymMul` | `sym-int or int, sym-int or int` |

use super::{OpKind, Operand};
use crate::error::{RuntimeError, RuntimeResult};
use crate::graph::{NodeValue, SymInt};
use crate::tensor::{DType, Dims, TensorMeta};

fn err(op: OpKind, message: impl std::fmt::Display) -> RuntimeError {
    RuntimeError::new(format!("{op:?}: {message}"))
}

fn operand<'a, T>(op: OpKind, operands: &'a [Operand<T>], idx: usize) -> RuntimeResult<&'a Operand<T>> {
    operands
        .get(idx)
        .ok_or_else(|| err(op, format!("missing operand {idx}")))
}

fn tensor_at<'a>(
    op: OpKind,
    operands: &[Operand<&'a NodeValue>],
    idx: usize,
) -> RuntimeResult<&'a TensorMeta> {
    let value: &'a NodeValue = match operand(op, operands, idx)? {
        Operand::Value(value) => *value,
        other => return Err(err(op, format!("operand {idx} must be a tensor, got {other:?}"))),
    };
    match value {
        NodeValue::Tensor(meta) => Ok(meta),
        NodeValue::SymInt(sym) => Err(err(
            op,
            format!("operand {idx} must be a tensor, got sym-int {}", sym.expr),
        )),
    }
}

fn int_at<T>(op: OpKind, operands: &[Operand<T>], idx: usize) -> RuntimeResult<i64> {
    match operand(op, operands, idx)? {
        Operand::Int(value) => Ok(*value),
        _ => Err(err(op, format!("operand {idx} must be an integer"))),
    }
}

fn int_list_at<T>(op: OpKind, operands: &[Operand<T>], idx: usize) -> RuntimeResult<Vec<i64>> {
    match operand(op, operands, idx)? {
        Operand::IntList(values) => Ok(values.clone()),
        Operand::Int(value) => Ok(vec![*value]),
        _ => Err(err(op, format!("operand {idx} must be an integer list"))),
    }
}

fn optional_bool<T>(op: OpKind, operands: &[Operand<T>], idx: usize) -> RuntimeResult<bool> {
    match operands.get(idx) {
        None => Ok(false),
        Some(Operand::Bool(value)) => Ok(*value),
        Some(_) => Err(err(op, format!("operand {idx} must be a bool"))),
    }
}

/// Reads the `dim` operand of `SymSize`/`Softmax`-like ops.
pub(crate) fn dim_operand<T>(op: OpKind, operands: &[Operand<T>], idx: usize) -> RuntimeResult<i64> {
    int_at(op, operands, idx)
}

/// Reads the axes list and keepdim flag of a reduction.
pub(crate) fn reduce_operands<T>(
    op: OpKind,
    operands: &[Operand<T>],
) -> RuntimeResult<(Vec<i64>, bool)> {
    let axes = match operands.get(1) {
        None => Vec::new(),
        Some(_) => int_list_at(op, operands, 1)?,
    };
    Ok((axes, optional_bool(op, operands, 2)?))
}

pub(crate) fn int_list_operand<T>(
    op: OpKind,
    operands: &[Operand<T>],
    idx: usize,
) -> RuntimeResult<Vec<i64>> {
    int_list_at(op, operands, idx)
}

/// Numpy-style broadcast of two shapes.
pub fn broadcast_dims(lhs: &[usize], rhs: &[usize]) -> RuntimeResult<Dims> {
    let rank = lhs.len().max(rhs.len());
    let mut dims = Dims::with_capacity(rank);
    for axis in 0..rank {
        let l = axis_from_end(lhs, rank, axis);
        let r = axis_from_end(rhs, rank, axis);
        let dim = match (l, r) {
            (a, b) if a == b => a,
            (1, b) => b,
            (a, 1) => a,
            (a, b) => {
                return Err(RuntimeError::new(format!(
                    "cannot broadcast {lhs:?} with {rhs:?} (axis {axis}: {a} vs {b})"
                )))
            }
        };
        dims.push(dim);
    }
    Ok(dims)
}

fn axis_from_end(dims: &[usize], rank: usize, axis: usize) -> usize {
    let offset = rank - dims.len();
    if axis < offset {
        1
    } else {
        dims[axis - offset]
    }
}

/// Maps a possibly negative axis into `0..rank`.
pub fn normalize_dim(dim: i64, rank: usize) -> RuntimeResult<usize> {
    let bound = rank.max(1) as i64;
    let normalized = if dim < 0 { dim + bound } else { dim };
    if normalized < 0 || normalized >= bound {
        return Err(RuntimeError::new(format!(
            "dimension {dim} out of range for rank {rank}"
        )));
    }
    Ok(normalized as usize)
}

/// Normalized, sorted, deduplicated reduction axes; empty means every axis.
pub fn normalize_axes(axes: &[i64], rank: usize) -> RuntimeResult<Vec<usize>> {
    if axes.is_empty() {
        return Ok((0..rank).collect());
    }
    let mut normalized = axes
        .iter()
        .map(|&axis| normalize_dim(axis, rank))
        .collect::<RuntimeResult<Vec<_>>>()?;
    normalized.sort_unstable();
    normalized.dedup();
    Ok(normalized)
}

pub fn reduce_dims(dims: &[usize], axes: &[usize], keepdim: bool) -> Dims {
    dims.iter()
        .enumerate()
        .filter_map(|(axis, &dim)| match (axes.contains(&axis), keepdim) {
            (false, _) => Some(dim),
            (true, true) => Some(1),
            (true, false) => None,
        })
        .collect()
}

/// Resolves a target shape that may contain a single `-1`.
pub fn reshape_dims(numel: usize, shape: &[i64]) -> RuntimeResult<Dims> {
    let mut inferred = None;
    let mut known = 1usize;
    for (axis, &dim) in shape.iter().enumerate() {
        match dim {
            -1 if inferred.is_none() => inferred = Some(axis),
            d if d >= 0 => {
                known = usize::try_from(d)
                    .ok()
                    .and_then(|d| known.checked_mul(d))
                    .ok_or_else(|| {
                        RuntimeError::new(format!("reshape target {shape:?} overflows"))
                    })?;
            }
            _ => {
                return Err(RuntimeError::new(format!("invalid reshape target {shape:?}")));
            }
        }
    }
    let mut dims: Dims = shape.iter().map(|&dim| dim.max(0) as usize).collect();
    if let Some(axis) = inferred {
        if known == 0 || numel % known != 0 {
            return Err(RuntimeError::new(format!(
                "cannot infer -1 in {shape:?} for {numel} elements"
            )));
        }
        dims[axis] = numel / known;
    } else if known != numel {
        return Err(RuntimeError::new(format!(
            "cannot reshape {numel} elements into {shape:?}"
        )));
    }
    Ok(dims)
}

pub(crate) fn check_permutation(perm: &[i64], rank: usize) -> RuntimeResult<Vec<usize>> {
    if perm.len() != rank {
        return Err(RuntimeError::new(format!(
            "permutation {perm:?} does not match rank {rank}"
        )));
    }
    let axes = perm
        .iter()
        .map(|&axis| normalize_dim(axis, rank))
        .collect::<RuntimeResult<Vec<_>>>()?;
    let mut seen = vec![false; rank];
    for &axis in &axes {
        if std::mem::replace(&mut seen[axis], true) {
            return Err(RuntimeError::new(format!("{perm:?} is not a permutation")));
        }
    }
    Ok(axes)
}

enum BinarySide<'a> {
    Tensor(&'a TensorMeta),
    Scalar { is_float: bool },
}

fn binary_side<'a>(
    op: OpKind,
    operands: &[Operand<&'a NodeValue>],
    idx: usize,
) -> RuntimeResult<BinarySide<'a>> {
    match operand(op, operands, idx)? {
        Operand::Value(value) => {
            let value: &'a NodeValue = *value;
            match value {
                NodeValue::Tensor(meta) => Ok(BinarySide::Tensor(meta)),
                NodeValue::SymInt(_) => Ok(BinarySide::Scalar { is_float: false }),
            }
        }
        Operand::Int(_) | Operand::Bool(_) => Ok(BinarySide::Scalar { is_float: false }),
        Operand::Float(_) => Ok(BinarySide::Scalar { is_float: true }),
        other => Err(err(op, format!("operand {idx} cannot be {other:?}"))),
    }
}

fn infer_binary(op: OpKind, operands: &[Operand<&NodeValue>]) -> RuntimeResult<TensorMeta> {
    let lhs = binary_side(op, operands, 0)?;
    let rhs = binary_side(op, operands, 1)?;
    let meta = match (lhs, rhs) {
        (BinarySide::Tensor(a), BinarySide::Tensor(b)) => {
            TensorMeta::new(a.dtype.promote(b.dtype), broadcast_dims(&a.dims, &b.dims)?)
        }
        (BinarySide::Tensor(t), BinarySide::Scalar { is_float })
        | (BinarySide::Scalar { is_float }, BinarySide::Tensor(t)) => {
            t.with_dtype(t.dtype.promote_scalar(is_float))
        }
        (BinarySide::Scalar { .. }, BinarySide::Scalar { .. }) => {
            return Err(err(op, "at least one operand must be a tensor"));
        }
    };
    if op == OpKind::Div && !meta.dtype.is_float() {
        return Ok(meta.with_dtype(DType::F32));
    }
    Ok(meta)
}

fn float_result(meta: &TensorMeta) -> TensorMeta {
    if meta.dtype.is_float() {
        meta.clone()
    } else {
        meta.with_dtype(DType::F32)
    }
}

fn sym_side(op: OpKind, operands: &[Operand<&NodeValue>], idx: usize) -> RuntimeResult<SymInt> {
    match operand(op, operands, idx)? {
        Operand::Value(NodeValue::SymInt(sym)) => Ok(sym.clone()),
        Operand::Int(value) => Ok(SymInt::constant(*value)),
        other => Err(err(op, format!("operand {idx} must be a sym-int, got {other:?}"))),
    }
}

fn combine_sym(op: OpKind, lhs: SymInt, rhs: SymInt) -> SymInt {
    let (symbol, apply): (&str, fn(i64, i64) -> i64) = match op {
        OpKind::SymMul => ("*", i64::wrapping_mul),
        _ => ("+", i64::wrapping_add),
    };
    let hint = lhs.hint.zip(rhs.hint).map(|(a, b)| apply(a, b));
    match (lhs.expr.parse::<i64>(), rhs.expr.parse::<i64>(), hint) {
        (Ok(_), Ok(_), Some(value)) => SymInt::constant(value),
        _ => SymInt::new(format!("{}{symbol}{}", lhs.expr, rhs.expr), hint),
    }
}

/// Infers the result of `op` applied to `operands`.
pub fn infer(op: OpKind, operands: &[Operand<&NodeValue>]) -> RuntimeResult<NodeValue> {
    let meta = match op {
        OpKind::Add | OpKind::Sub | OpKind::Mul | OpKind::Div | OpKind::Maximum => {
            infer_binary(op, operands)?
        }
        OpKind::AddScalar | OpKind::MulScalar => {
            let tensor = tensor_at(op, operands, 0)?;
            let is_float = match operand(op, operands, 1)? {
                Operand::Float(_) => true,
                Operand::Int(_) | Operand::Bool(_) => false,
                _ => return Err(err(op, "operand 1 must be a scalar literal")),
            };
            tensor.with_dtype(tensor.dtype.promote_scalar(is_float))
        }
        OpKind::Neg | OpKind::Relu | OpKind::Abs => tensor_at(op, operands, 0)?.clone(),
        OpKind::Exp | OpKind::Sqrt | OpKind::Rsqrt | OpKind::Reciprocal => {
            float_result(tensor_at(op, operands, 0)?)
        }
        OpKind::MatMul => {
            let a = tensor_at(op, operands, 0)?;
            let b = tensor_at(op, operands, 1)?;
            matmul_meta(op, a, b)?
        }
        OpKind::Addmm => {
            let bias = tensor_at(op, operands, 0)?;
            let a = tensor_at(op, operands, 1)?;
            let b = tensor_at(op, operands, 2)?;
            let product = matmul_meta(op, a, b)?;
            let dims = broadcast_dims(&bias.dims, &product.dims)?;
            if dims != product.dims {
                return Err(err(
                    op,
                    format!("bias {bias} does not broadcast to {product}"),
                ));
            }
            product.with_dtype(product.dtype.promote(bias.dtype))
        }
        OpKind::Reshape => {
            let tensor = tensor_at(op, operands, 0)?;
            let shape = int_list_at(op, operands, 1)?;
            let numel = tensor
                .checked_numel()
                .ok_or_else(|| err(op, format!("element count of {tensor} overflows")))?;
            TensorMeta::new(tensor.dtype, reshape_dims(numel, &shape)?)
        }
        OpKind::Permute => {
            let tensor = tensor_at(op, operands, 0)?;
            let perm = check_permutation(&int_list_at(op, operands, 1)?, tensor.rank())?;
            TensorMeta::new(tensor.dtype, perm.iter().map(|&axis| tensor.dims[axis]))
        }
        OpKind::Sum | OpKind::Amax => {
            let tensor = tensor_at(op, operands, 0)?;
            let (axes, keepdim) = reduce_operands(op, operands)?;
            let axes = normalize_axes(&axes, tensor.rank())?;
            let dtype = if op == OpKind::Sum && !tensor.dtype.is_float() {
                DType::I64
            } else {
                tensor.dtype
            };
            TensorMeta::new(dtype, reduce_dims(&tensor.dims, &axes, keepdim))
        }
        OpKind::Softmax => {
            let tensor = tensor_at(op, operands, 0)?;
            normalize_dim(int_at(op, operands, 1)?, tensor.rank())?;
            if !tensor.dtype.is_float() {
                return Err(err(op, format!("expects a float tensor, got {tensor}")));
            }
            tensor.clone()
        }
        OpKind::Convert => {
            let tensor = tensor_at(op, operands, 0)?;
            match operand(op, operands, 1)? {
                Operand::DType(dtype) => tensor.with_dtype(*dtype),
                _ => return Err(err(op, "operand 1 must be a dtype")),
            }
        }
        OpKind::SymSize => {
            let tensor = tensor_at(op, operands, 0)?;
            let axis = normalize_dim(int_at(op, operands, 1)?, tensor.rank())?;
            let dim = tensor.dims.get(axis).copied().unwrap_or(1);
            return Ok(NodeValue::SymInt(SymInt::constant(dim as i64)));
        }
        OpKind::SymAdd | OpKind::SymMul => {
            let lhs = sym_side(op, operands, 0)?;
            let rhs = sym_side(op, operands, 1)?;
            return Ok(NodeValue::SymInt(combine_sym(op, lhs, rhs)));
        }
    };
    if meta.checked_numel().is_none() {
        return Err(err(op, format!("element count of {meta} overflows")));
    }
    Ok(NodeValue::Tensor(meta))
}

fn matmul_meta(op: OpKind, a: &TensorMeta, b: &TensorMeta) -> RuntimeResult<TensorMeta> {
    if a.rank() != 2 || b.rank() != 2 {
        return Err(err(op, format!("expects rank-2 operands, got {a} and {b}")));
    }
    if a.dims[1] != b.dims[0] {
        return Err(err(op, format!("inner dimensions differ: {a} x {b}")));
    }
    Ok(TensorMeta::new(
        a.dtype.promote(b.dtype),
        [a.dims[0], b.dims[1]],
    ))
}
