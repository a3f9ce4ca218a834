//! Lightweight compile-time profiling.
//!
//! With the `profiler` feature enabled, [`compile_scope`] guards record how long
//! each pipeline stage takes and [`cache_event`] counts kernel cache hits and
//! misses. Without the feature every entry point compiles to a no-op and
//! [`take_counters`] returns nothing.

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};
#[cfg(feature = "profiler")]
use std::time::Duration;
#[cfg(feature = "profiler")]
use std::time::Instant;

use serde::Serialize;

#[cfg_attr(not(feature = "profiler"), allow(dead_code))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ProfilerKey {
    Compile(&'static str),
    Cache(&'static str),
}

#[cfg_attr(not(feature = "profiler"), allow(dead_code))]
#[derive(Default, Clone, Copy)]
struct Stat {
    calls: u64,
    total_ns: u128,
}

#[cfg_attr(not(feature = "profiler"), allow(dead_code))]
struct Profiler {
    stats: Mutex<HashMap<ProfilerKey, Stat>>,
}

#[cfg_attr(not(feature = "profiler"), allow(dead_code))]
impl Profiler {
    fn instance() -> &'static Self {
        static INSTANCE: OnceLock<Profiler> = OnceLock::new();
        INSTANCE.get_or_init(|| Profiler {
            stats: Mutex::new(HashMap::new()),
        })
    }

    #[cfg(feature = "profiler")]
    fn record(&self, key: ProfilerKey, elapsed: Duration) {
        let mut stats = self.stats.lock().expect("profiler mutex poisoned");
        let entry = stats.entry(key).or_default();
        entry.calls = entry.calls.saturating_add(1);
        entry.total_ns = entry.total_ns.saturating_add(elapsed.as_nanos());
    }

    fn drain(&self) -> Vec<(ProfilerKey, Stat)> {
        let mut stats = self.stats.lock().expect("profiler mutex poisoned");
        stats.drain().collect()
    }
}

/// One row of a counter snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CounterRow {
    pub kind: &'static str,
    pub name: &'static str,
    pub calls: u64,
    pub total_ns: u128,
}

/// Times the enclosing scope while alive.
#[must_use = "the scope is measured until the guard is dropped"]
pub struct ScopeGuard {
    #[cfg(feature = "profiler")]
    key: ProfilerKey,
    #[cfg(feature = "profiler")]
    start: Instant,
}

#[cfg(feature = "profiler")]
impl Drop for ScopeGuard {
    fn drop(&mut self) {
        Profiler::instance().record(self.key, self.start.elapsed());
    }
}

#[inline(always)]
pub fn compile_scope(name: &'static str) -> ScopeGuard {
    #[cfg(feature = "profiler")]
    {
        ScopeGuard {
            key: ProfilerKey::Compile(name),
            start: Instant::now(),
        }
    }
    #[cfg(not(feature = "profiler"))]
    {
        let _ = name;
        ScopeGuard {}
    }
}

#[inline(always)]
pub fn cache_event(name: &'static str) {
    #[cfg(feature = "profiler")]
    {
        Profiler::instance().record(ProfilerKey::Cache(name), Duration::ZERO);
    }
    #[cfg(not(feature = "profiler"))]
    {
        let _ = name;
    }
}

/// Returns every counter recorded so far, sorted by kind and name, and resets
/// them.
pub fn take_counters() -> Vec<CounterRow> {
    let mut rows: Vec<CounterRow> = Profiler::instance()
        .drain()
        .into_iter()
        .map(|(key, stat)| {
            let (kind, name) = match key {
                ProfilerKey::Compile(name) => ("compile", name),
                ProfilerKey::Cache(name) => ("cache", name),
            };
            CounterRow {
                kind,
                name,
                calls: stat.calls,
                total_ns: stat.total_ns,
            }
        })
        .collect();
    rows.sort_by(|a, b| (a.kind, a.name).cmp(&(b.kind, b.name)));
    rows
}

pub fn reset() {
    let _ = Profiler::instance().drain();
}

#[cfg(all(test, feature = "profiler"))]
mod tests {
    use super::*;

    #[test]
    fn counts_cache_events_and_scopes() {
        reset();
        cache_event("unit.hit");
        cache_event("unit.hit");
        {
            let _scope = compile_scope("unit.stage");
        }
        let rows = take_counters();
        let hit = rows
            .iter()
            .find(|row| row.kind == "cache" && row.name == "unit.hit")
            .expect("hit counter");
        assert!(hit.calls >= 2);
        assert!(rows.iter().any(|row| row.kind == "compile" && row.name == "unit.stage"));
    }
}
