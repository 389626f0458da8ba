// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod config;
pub mod error;
pub mod ingest;
pub mod metrics;
pub mod transport;

// ---- Re-exports for stable public API ----
pub use crate::config::EdcConfig;
pub use crate::error::IngestError;
pub use crate::ingest::scheduler::{Engine, RoundSummary};
pub use crate::ingest::sink::Sink;
pub use crate::transport::Transport;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const ENV_LOG_FORMAT: &str = "EDC_LOG_FORMAT";

/// Install the global tracing subscriber. `RUST_LOG` overrides the default filter;
/// `EDC_LOG_FORMAT=json` switches to JSON lines. Safe to call more than once.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("edc_poller=info,ingest=info,discovery=info,sink=info,warn")
    });
    let json = std::env::var(ENV_LOG_FORMAT)
        .ok()
        .is_some_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    let _ = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
}
