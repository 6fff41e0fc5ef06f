//! Thin compatibility shim over the original's `dc_context_set_loglevel`
//! (§5/§7: "a single process-wide log sink"), for embedders that want a
//! programmatic level switch instead of wiring up their own
//! `tracing_subscriber::EnvFilter`. The CLI (`main.rs`) installs its own
//! env-filter-based subscriber instead, since an interactive user wants
//! `RUST_LOG`, not a setter function — this module is for library callers
//! who don't.

use std::sync::OnceLock;

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::reload;

type Handle = reload::Handle<LevelFilter, tracing_subscriber::Registry>;

static HANDLE: OnceLock<Handle> = OnceLock::new();

/// Installs the process-global subscriber. Idempotent: a second call is a
/// no-op, since only one subscriber may ever be installed per process.
pub fn init(default_level: LevelFilter) {
    if HANDLE.get().is_some() {
        return;
    }
    let (filter, handle) = reload::Layer::new(default_level);
    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer());
    if tracing::subscriber::set_global_default(subscriber).is_ok() {
        let _ = HANDLE.set(handle);
    }
}

/// `dc_context_set_loglevel` equivalent: reconfigures the installed
/// sink's level filter. A no-op if [`init`] was never called (e.g. the
/// CLI, which installs its own subscriber directly).
pub fn set_log_level(level: LevelFilter) {
    if let Some(handle) = HANDLE.get() {
        let _ = handle.modify(|filter| *filter = level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_log_level_without_init_is_a_harmless_no_op() {
        set_log_level(LevelFilter::DEBUG);
    }
}
