use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;

static DICP_DUMP_CODE: OnceLock<bool> = OnceLock::new();
static DICP_CACHE_DIR: OnceLock<PathBuf> = OnceLock::new();
static DICP_STRUCTURAL_SHAPES: OnceLock<bool> = OnceLock::new();

fn parse_bool(value: &str) -> bool {
    let normalized = value.trim().to_ascii_lowercase();
    matches!(normalized.as_str(), "1" | "true" | "yes" | "on")
}

pub(crate) fn dump_code_enabled() -> bool {
    *DICP_DUMP_CODE.get_or_init(|| match env::var("DICP_DUMP_CODE") {
        Ok(value) if !value.trim().is_empty() => parse_bool(&value),
        _ => false,
    })
}

pub(crate) fn cache_dir() -> PathBuf {
    DICP_CACHE_DIR
        .get_or_init(|| match env::var("DICP_CACHE_DIR") {
            Ok(value) if !value.trim().is_empty() => PathBuf::from(value.trim()),
            _ => PathBuf::from(".cache/dicp"),
        })
        .clone()
}

/// `DICP_OUTPUT_SHAPES=structural` reads output shapes from node metadata
/// instead of scanning the rendered graph.
pub(crate) fn structural_output_shapes() -> bool {
    *DICP_STRUCTURAL_SHAPES.get_or_init(|| match env::var("DICP_OUTPUT_SHAPES") {
        Ok(value) => value.trim().eq_ignore_ascii_case("structural"),
        Err(_) => false,
    })
}
