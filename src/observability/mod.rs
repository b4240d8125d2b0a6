//! # Observability
//!
//! Structured logging and Prometheus metrics.
//!
//! - `metrics`: Prometheus metrics collection
//! - [`init_tracing`]: tracing subscriber setup

pub mod metrics;

use tracing_subscriber::EnvFilter;

use crate::config::ServerConfig;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured log level; `LOG_FORMAT=json` selects
/// JSON output, anything else human-readable text.
pub fn init_tracing(config: &ServerConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "walrus={level},tower_http={level}",
            level = config.log_level.to_lowercase()
        ))
    });

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let installed = if config.json_logs() {
        builder.json().with_current_span(true).try_init()
    } else {
        builder.with_target(true).try_init()
    };
    if let Err(e) = installed {
        eprintln!("tracing subscriber already installed: {e}");
    }
}
