//! Structured logging initialization
//!
//! Binaries call [`init_tracing`] once at startup. Filtering follows
//! `RUST_LOG` when set, defaulting to `info`.

use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber
///
/// # Arguments
/// * `json` - Emit JSON lines (production) instead of human-readable output
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
