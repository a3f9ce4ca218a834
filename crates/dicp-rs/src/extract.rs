//! Output shape recovery.
//!
//! Vendor code generators that need static output shapes receive them as an
//! [`OutputShapeMap`]. The map is normally scanned out of the module's textual
//! rendering ([`extract_output_shapes`]); [`OutputShapeMap::from_graph`] reads
//! the same information straight from node metadata.

use serde::{Deserialize, Serialize};

use crate::error::{CompileError, CompileResult};
use crate::graph::{Graph, NodeValue};

const RETURN_MARKER: &str = "return (";

/// Returned identifiers in return order, each with its dimension tokens.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputShapeMap {
    entries: Vec<(String, Vec<String>)>,
}

impl OutputShapeMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the tokens of `name`, keeping its original position if present.
    pub fn insert(&mut self, name: impl Into<String>, tokens: Vec<String>) {
        let name = name.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => *slot = tokens,
            None => self.entries.push((name, tokens)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, tokens)| tokens.as_slice())
    }

    /// Parses the tokens of `name` as concrete dimensions.
    pub fn dims(&self, name: &str) -> CompileResult<Vec<usize>> {
        let tokens = self.get(name).ok_or_else(|| CompileError::ShapeNotFound {
            ident: name.to_string(),
        })?;
        tokens
            .iter()
            .map(|token| {
                token.parse::<usize>().map_err(|_| {
                    CompileError::MalformedRendering(format!(
                        "dimension `{token}` of `{name}` is not a static size"
                    ))
                })
            })
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(name, tokens)| (name.as_str(), tokens.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Builds the map from the metadata of the output node's arguments.
    pub fn from_graph(graph: &Graph) -> CompileResult<Self> {
        let mut map = OutputShapeMap::new();
        for id in graph.output_values() {
            let node = graph.node(*id).ok_or_else(|| {
                CompileError::MalformedRendering(format!("output refers to unknown node #{}", id.index()))
            })?;
            match &node.meta {
                Some(NodeValue::Tensor(meta)) => {
                    map.insert(
                        node.name.clone(),
                        meta.dims.iter().map(usize::to_string).collect(),
                    );
                }
                _ => {
                    return Err(CompileError::ShapeNotFound {
                        ident: node.name.clone(),
                    })
                }
            }
        }
        Ok(map)
    }
}

/// Scans a rendered module for the shapes of the values it returns.
///
/// The last `return (` line names the outputs. For each of them the nearest
/// line annotating `name: ...[dims]` wins; a returned value without such a
/// line is an error.
pub fn extract_output_shapes(text: &str) -> CompileResult<OutputShapeMap> {
    let lines: Vec<&str> = text.lines().collect();
    let (return_idx, returned) = lines
        .iter()
        .enumerate()
        .rev()
        .find_map(|(idx, line)| line.find(RETURN_MARKER).map(|pos| (idx, &line[pos..])))
        .ok_or_else(|| CompileError::MalformedRendering("no return statement".to_string()))?;

    let inner = &returned[RETURN_MARKER.len()..];
    let close = matching_close(inner, '(', ')').ok_or_else(|| {
        CompileError::MalformedRendering(format!(
            "unterminated return tuple on line {}",
            return_idx + 1
        ))
    })?;
    let idents: Vec<&str> = inner[..close]
        .split(',')
        .map(str::trim)
        .filter(|ident| !ident.is_empty())
        .collect();

    let mut map = OutputShapeMap::new();
    for ident in idents {
        let tokens = lines
            .iter()
            .enumerate()
            .rev()
            .filter(|(idx, line)| *idx != return_idx && !line.contains(RETURN_MARKER))
            .find_map(|(_, line)| annotated_dims(line, ident))
            .ok_or_else(|| CompileError::ShapeNotFound {
                ident: ident.to_string(),
            })?;
        map.insert(ident, tokens);
    }
    Ok(map)
}

/// Byte offset of the delimiter closing an already opened `open`.
fn matching_close(text: &str, open: char, close: char) -> Option<usize> {
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

fn is_ident_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}

/// Dimension tokens of the first `ident: ...[...]` annotation on `line`.
fn annotated_dims(line: &str, ident: &str) -> Option<Vec<String>> {
    let marker = format!("{ident}: ");
    let mut search_from = 0;
    while let Some(found) = line[search_from..].find(&marker) {
        let start = search_from + found;
        search_from = start + marker.len();
        let at_boundary = line[..start]
            .chars()
            .next_back()
            .map_or(true, |ch| !is_ident_char(ch) && ch != '.');
        if !at_boundary {
            continue;
        }
        let annotation = annotation_span(&line[search_from..]);
        if let Some(tokens) = bracket_tokens(annotation) {
            return Some(tokens);
        }
    }
    None
}

/// The annotation text after a `name: ` marker, ending before ` = `, or before
/// a `,`/`)` that closes the surrounding parameter list.
fn annotation_span(rest: &str) -> &str {
    let mut depth = 0usize;
    for (pos, ch) in rest.char_indices() {
        match ch {
            '[' | '(' => depth += 1,
            ']' | ')' if depth > 0 => depth -= 1,
            ')' | ',' if depth == 0 => return &rest[..pos],
            ' ' if depth == 0 && rest[pos..].starts_with(" = ") => return &rest[..pos],
            _ => {}
        }
    }
    rest
}

fn bracket_tokens(annotation: &str) -> Option<Vec<String>> {
    let open = annotation.find('[')?;
    let body = &annotation[open + 1..];
    let close = matching_close(body, '[', ']')?;
    Some(
        body[..close]
            .split(',')
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(str::to_string)
            .collect(),
    )
}
