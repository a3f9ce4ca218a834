use std::collections::HashSet;
use std::sync::Arc;

use thiserror::Error;

use super::{KernelExpr, KernelModule, KernelOutput, KernelParam, KernelStatement, KernelType};
use crate::error::CompileError;
use crate::ops::{Operand, Target};
use crate::tensor::{DType, HostTensor, TensorData, TensorMeta};

/// Errors raised while parsing kernel source.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("line {line}: {message}")]
pub struct KernelParseError {
    pub line: usize,
    pub message: String,
}

impl From<KernelParseError> for CompileError {
    fn from(err: KernelParseError) -> Self {
        CompileError::Codegen(format!("invalid kernel source: {err}"))
    }
}

type ParseResult<T> = Result<T, String>;

/// Parses kernel source produced by [`KernelWriter`](super::KernelWriter).
///
/// Lines starting with `//` are comments. An optional `target <backend>` line
/// precedes the `kernel` header; every statement defines a new name from names
/// defined before it.
pub fn parse_kernel(source: &str) -> Result<KernelModule, KernelParseError> {
    let mut lines = source
        .lines()
        .enumerate()
        .map(|(idx, line)| (idx + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with("//"));

    let fail = |line: usize, message: String| KernelParseError { line, message };
    let last_line = source.lines().count().max(1);

    let (mut line_no, mut line) = lines
        .next()
        .ok_or_else(|| fail(last_line, "source is empty".to_string()))?;

    let mut target = None;
    if let Some(rest) = line.strip_prefix("target ") {
        target = Some(rest.trim().to_string());
        (line_no, line) = lines
            .next()
            .ok_or_else(|| fail(last_line, "missing kernel header".to_string()))?;
    }

    let (name, params, outputs) = parse_header(line).map_err(|message| fail(line_no, message))?;
    let mut defined: HashSet<String> = HashSet::new();
    for param in &params {
        if !defined.insert(param.name.clone()) {
            return Err(fail(line_no, format!("duplicate parameter `{}`", param.name)));
        }
    }

    let mut body = Vec::new();
    let mut returns = None;
    let mut closed = false;
    for (line_no, line) in lines.by_ref() {
        if line == "}" {
            closed = true;
            break;
        }
        if returns.is_some() {
            return Err(fail(line_no, "statement after return".to_string()));
        }
        if let Some(rest) = line
            .strip_prefix("return ")
            .filter(|rest| rest.trim_start().starts_with('('))
        {
            let names = parse_return(rest.trim()).map_err(|message| fail(line_no, message))?;
            if let Some(unknown) = names.iter().find(|name| !defined.contains(*name)) {
                return Err(fail(line_no, format!("return of undefined value `{unknown}`")));
            }
            returns = Some(names);
            continue;
        }
        let statement = parse_statement(line).map_err(|message| fail(line_no, message))?;
        if let KernelExpr::Call { args, .. } = &statement.expr {
            for arg in args {
                if let Operand::Value(name) = arg {
                    if !defined.contains(name) {
                        return Err(fail(line_no, format!("use of undefined value `{name}`")));
                    }
                }
            }
        }
        if !defined.insert(statement.name.clone()) {
            return Err(fail(line_no, format!("redefinition of `{}`", statement.name)));
        }
        body.push(statement);
    }
    if !closed {
        return Err(fail(last_line, "missing closing `}`".to_string()));
    }
    if let Some((line_no, _)) = lines.next() {
        return Err(fail(line_no, "unexpected text after kernel body".to_string()));
    }
    let returns = returns.ok_or_else(|| fail(last_line, "kernel has no return".to_string()))?;

    if let Some(outputs) = &outputs {
        let declared: Vec<&str> = outputs.iter().map(|output| output.name.as_str()).collect();
        let returned: Vec<&str> = returns.iter().map(String::as_str).collect();
        if declared != returned {
            return Err(fail(
                line_no,
                format!("declared outputs {declared:?} differ from returned values {returned:?}"),
            ));
        }
    }

    Ok(KernelModule {
        target,
        name,
        params,
        outputs,
        body,
        returns,
    })
}

type Header = (String, Vec<KernelParam>, Option<Vec<KernelOutput>>);

fn parse_header(line: &str) -> ParseResult<Header> {
    let rest = line
        .strip_prefix("kernel ")
        .ok_or_else(|| format!("expected `kernel` header, found `{line}`"))?;
    let rest = rest
        .strip_suffix('{')
        .ok_or_else(|| "kernel header must end with `{`".to_string())?
        .trim();
    let open = rest
        .find('(')
        .ok_or_else(|| "missing parameter list".to_string())?;
    let name = rest[..open].trim();
    if !is_identifier(name) {
        return Err(format!("invalid kernel name `{name}`"));
    }
    let close = matching(&rest[open + 1..], '(', ')')
        .ok_or_else(|| "unterminated parameter list".to_string())?
        + open
        + 1;
    let params = split_top_level(&rest[open + 1..close])
        .into_iter()
        .map(|param| {
            let (name, ty) = split_annotation(param)?;
            Ok(KernelParam {
                name,
                ty: parse_type(ty)?,
            })
        })
        .collect::<ParseResult<Vec<_>>>()?;

    let tail = rest[close + 1..].trim();
    let outputs = if tail.is_empty() {
        None
    } else {
        let list = tail
            .strip_prefix("->")
            .map(str::trim)
            .and_then(|list| list.strip_prefix('('))
            .and_then(|list| list.strip_suffix(')'))
            .ok_or_else(|| format!("malformed output declaration `{tail}`"))?;
        let outputs = split_top_level(list)
            .into_iter()
            .map(|output| {
                let (name, dims) = split_annotation(output)?;
                Ok(KernelOutput {
                    name,
                    dims: parse_dims(dims)?,
                })
            })
            .collect::<ParseResult<Vec<_>>>()?;
        Some(outputs)
    };
    Ok((name.to_string(), params, outputs))
}

fn parse_return(rest: &str) -> ParseResult<Vec<String>> {
    let list = rest
        .strip_prefix('(')
        .and_then(|list| list.strip_suffix(')'))
        .ok_or_else(|| format!("malformed return `{rest}`"))?;
    let names: Vec<String> = split_top_level(list)
        .into_iter()
        .map(str::to_string)
        .collect();
    if let Some(bad) = names.iter().find(|name| !is_identifier(name)) {
        return Err(format!("invalid returned name `{bad}`"));
    }
    Ok(names)
}

fn parse_statement(line: &str) -> ParseResult<KernelStatement> {
    let (lhs, expr) = line
        .split_once(" = ")
        .ok_or_else(|| format!("expected `name: type = expr`, found `{line}`"))?;
    let (name, ty) = split_annotation(lhs)?;
    let ty = parse_type(ty)?;
    let expr = expr.trim();

    let expr = if let Some(values) = expr.strip_prefix("const") {
        let KernelType::Tensor(meta) = &ty else {
            return Err(format!("constant `{name}` must have a tensor type"));
        };
        KernelExpr::Const(parse_constant(meta, values.trim())?)
    } else {
        let open = expr
            .find('(')
            .ok_or_else(|| format!("expected a call, found `{expr}`"))?;
        let target = Target::parse(expr[..open].trim())
            .ok_or_else(|| format!("unknown operation `{}`", expr[..open].trim()))?;
        let args = expr[open + 1..]
            .strip_suffix(')')
            .ok_or_else(|| format!("unterminated call `{expr}`"))?;
        let args = split_top_level(args)
            .into_iter()
            .map(parse_operand)
            .collect::<ParseResult<Vec<_>>>()?;
        KernelExpr::Call { target, args }
    };
    Ok(KernelStatement { name, ty, expr })
}

fn parse_constant(meta: &TensorMeta, values: &str) -> ParseResult<HostTensor> {
    let body = values
        .strip_prefix('[')
        .and_then(|body| body.strip_suffix(']'))
        .ok_or_else(|| format!("malformed constant `{values}`"))?;
    let tokens = split_top_level(body);
    let bad = |token: &str| format!("invalid {} literal `{token}`", meta.dtype);
    let data = if meta.dtype.is_float() {
        TensorData::F32(
            tokens
                .iter()
                .map(|&token| token.parse::<f32>().map_err(|_| bad(token)))
                .collect::<ParseResult<Arc<[f32]>>>()?,
        )
    } else if meta.dtype.is_integer() {
        TensorData::I64(
            tokens
                .iter()
                .map(|&token| token.parse::<i64>().map_err(|_| bad(token)))
                .collect::<ParseResult<Arc<[i64]>>>()?,
        )
    } else {
        TensorData::Bool(
            tokens
                .iter()
                .map(|&token| token.parse::<bool>().map_err(|_| bad(token)))
                .collect::<ParseResult<Arc<[bool]>>>()?,
        )
    };
    HostTensor::new(meta.clone(), data).map_err(|err| err.message().to_string())
}

fn parse_operand(token: &str) -> ParseResult<Operand<String>> {
    if let Some(list) = token.strip_prefix('[') {
        let list = list
            .strip_suffix(']')
            .ok_or_else(|| format!("unterminated list `{token}`"))?;
        let values = split_top_level(list)
            .into_iter()
            .map(|item| item.parse::<i64>().map_err(|_| format!("invalid integer `{item}`")))
            .collect::<ParseResult<Vec<_>>>()?;
        return Ok(Operand::IntList(values));
    }
    if let Some(name) = token
        .strip_prefix("dtype(")
        .and_then(|rest| rest.strip_suffix(')'))
    {
        return DType::from_short_name(name)
            .map(Operand::DType)
            .ok_or_else(|| format!("unknown dtype `{name}`"));
    }
    match token {
        "true" => return Ok(Operand::Bool(true)),
        "false" => return Ok(Operand::Bool(false)),
        _ => {}
    }
    let numeric = token.starts_with(|ch: char| ch.is_ascii_digit() || ch == '-')
        || matches!(token, "NaN" | "inf");
    if numeric {
        if let Ok(value) = token.parse::<i64>() {
            return Ok(Operand::Int(value));
        }
        return token
            .parse::<f64>()
            .map(Operand::Float)
            .map_err(|_| format!("invalid number `{token}`"));
    }
    if is_identifier(token) {
        Ok(Operand::Value(token.to_string()))
    } else {
        Err(format!("invalid argument `{token}`"))
    }
}

fn parse_type(text: &str) -> ParseResult<KernelType> {
    let text = text.trim();
    if text == "sym" {
        return Ok(KernelType::Sym);
    }
    let open = text
        .find('[')
        .ok_or_else(|| format!("invalid type `{text}`"))?;
    let dtype = DType::from_short_name(&text[..open])
        .ok_or_else(|| format!("unknown dtype in `{text}`"))?;
    let dims = parse_dims(&text[open..])?;
    Ok(KernelType::Tensor(TensorMeta::new(dtype, dims)))
}

fn parse_dims(text: &str) -> ParseResult<Vec<usize>> {
    let body = text
        .trim()
        .strip_prefix('[')
        .and_then(|body| body.strip_suffix(']'))
        .ok_or_else(|| format!("invalid dimension list `{text}`"))?;
    split_top_level(body)
        .into_iter()
        .map(|dim| {
            dim.parse::<usize>()
                .map_err(|_| format!("invalid dimension `{dim}`"))
        })
        .collect()
}

fn split_annotation(text: &str) -> ParseResult<(String, &str)> {
    let (name, ty) = text
        .split_once(':')
        .ok_or_else(|| format!("expected `name: type`, found `{text}`"))?;
    let name = name.trim();
    if !is_identifier(name) {
        return Err(format!("invalid name `{name}`"));
    }
    Ok((name.to_string(), ty.trim()))
}

/// Splits on commas that are not nested in brackets, dropping empty items.
fn split_top_level(text: &str) -> Vec<&str> {
    let mut items = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (pos, ch) in text.char_indices() {
        match ch {
            '[' | '(' => depth += 1,
            ']' | ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                items.push(text[start..pos].trim());
                start = pos + 1;
            }
            _ => {}
        }
    }
    items.push(text[start..].trim());
    items.retain(|item| !item.is_empty());
    items
}

fn matching(text: &str, open: char, close: char) -> Option<usize> {
    let mut depth = 0usize;
    for (pos, ch) in text.char_indices() {
        if ch == open {
            depth += 1;
        } else if ch == close {
            if depth == 0 {
                return Some(pos);
            }
            depth -= 1;
        }
    }
    None
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    matches!(chars.next(), Some(ch) if ch.is_alphabetic() || ch == '_')
        && chars.all(|ch| ch.is_alphanumeric() || ch == '_')
}
