//! Diagnostic logging setup.
//!
//! The library only emits `tracing` events; binaries call [`init`] once to
//! route them to stderr. `RUST_LOG` overrides the default filter.

use std::sync::Once;

use tracing_subscriber::{fmt, EnvFilter};

static INIT: Once = Once::new();

/// Install the stderr subscriber. Safe to call more than once.
pub fn init(verbose: bool) {
    INIT.call_once(|| {
        let default = if verbose {
            "knowledge_architect=debug"
        } else {
            "knowledge_architect=info"
        };
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
        // A subscriber installed by the host application takes precedence.
        let _ = fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init();
    });
}
