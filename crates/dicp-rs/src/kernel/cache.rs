use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::Serialize;

use super::{parse_kernel, LoadedKernel};
use crate::error::CompileResult;
use crate::profiling;

/// Content-addressed store of loaded kernels.
///
/// Entries are keyed by the complete source text, so two different sources
/// never share an entry and loading the same source again returns the same
/// [`LoadedKernel`]. Concurrent loads of one source parse it at most once.
#[derive(Default)]
pub struct KernelCache {
    loaded: Mutex<HashMap<Arc<str>, Arc<LoadedKernel>>>,
    compile_gates: Mutex<HashMap<blake3::Hash, Arc<Mutex<()>>>>,
    dump_dir: Option<PathBuf>,
}

#[derive(Serialize)]
struct KernelManifest<'a> {
    digest: String,
    entry: &'a str,
    target: Option<&'a str>,
    params: Vec<String>,
    outputs: Option<Vec<(&'a str, &'a [usize])>>,
}

impl KernelCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also writes every newly loaded source and a JSON manifest to `dir`.
    pub fn with_dump_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dump_dir: Some(dir.into()),
            ..Self::default()
        }
    }

    pub fn dump_dir(&self) -> Option<&Path> {
        self.dump_dir.as_deref()
    }

    fn lookup(&self, source: &str) -> Option<Arc<LoadedKernel>> {
        self.loaded
            .lock()
            .expect("kernel cache poisoned")
            .get(source)
            .cloned()
    }

    pub fn load(&self, source: &str) -> CompileResult<Arc<LoadedKernel>> {
        if let Some(found) = self.lookup(source) {
            profiling::cache_event("kernel_cache.hit");
            tracing::debug!(kernel = %found.name(), "kernel cache hit");
            return Ok(found);
        }
        profiling::cache_event("kernel_cache.miss");

        let digest = blake3::hash(source.as_bytes());
        let gate = {
            let mut gates = self
                .compile_gates
                .lock()
                .expect("kernel compile gate cache poisoned");
            gates
                .entry(digest)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let _gate_lock = gate.lock().expect("kernel compile gate poisoned");

        if let Some(found) = self.lookup(source) {
            profiling::cache_event("kernel_cache.hit");
            self.release_gate(&digest);
            return Ok(found);
        }

        let parsed = {
            let _scope = profiling::compile_scope("kernel_cache.load");
            parse_kernel(source)
        };
        let kernel = match parsed {
            Ok(module) => Arc::new(LoadedKernel::new(module, digest)),
            Err(err) => {
                self.release_gate(&digest);
                return Err(err.into());
            }
        };
        tracing::debug!(
            kernel = %kernel.name(),
            digest = %digest.to_hex(),
            "loaded kernel"
        );
        if let Some(dir) = &self.dump_dir {
            if let Err(err) = dump_kernel(dir, source, &kernel) {
                tracing::warn!(dir = %dir.display(), error = %err, "failed to dump kernel source");
            }
        }

        self.loaded
            .lock()
            .expect("kernel cache poisoned")
            .insert(Arc::from(source), Arc::clone(&kernel));
        self.release_gate(&digest);
        Ok(kernel)
    }

    /// Drops the gate of `digest`; later loads either hit the map or retry
    /// under a fresh gate.
    fn release_gate(&self, digest: &blake3::Hash) {
        self.compile_gates
            .lock()
            .expect("kernel compile gate cache poisoned")
            .remove(digest);
    }

    #[cfg(test)]
    fn pending_gates(&self) -> usize {
        self.compile_gates
            .lock()
            .expect("kernel compile gate cache poisoned")
            .len()
    }

    pub fn contains(&self, source: &str) -> bool {
        self.lookup(source).is_some()
    }

    pub fn len(&self) -> usize {
        self.loaded.lock().expect("kernel cache poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn dump_kernel(dir: &Path, source: &str, kernel: &LoadedKernel) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    let digest = kernel.digest();
    let stem = format!("kernel_{}", &digest[..16]);
    std::fs::write(dir.join(format!("{stem}.dicp")), source)?;

    let module = kernel.module();
    let manifest = KernelManifest {
        digest: digest.clone(),
        entry: &module.name,
        target: module.target.as_deref(),
        params: module
            .params
            .iter()
            .map(|param| format!("{}: {}", param.name, param.ty))
            .collect(),
        outputs: module.outputs.as_ref().map(|outputs| {
            outputs
                .iter()
                .map(|output| (output.name.as_str(), output.dims.as_slice()))
                .collect()
        }),
    };
    let json = serde_json::to_string_pretty(&manifest).map_err(std::io::Error::other)?;
    std::fs::write(dir.join(format!("{stem}.json")), json)
}
