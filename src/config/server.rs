//! # Server Configuration

use std::path::PathBuf;
use std::time::Duration;

use super::{env_var_non_empty, env_var_or_default, env_var_or_default_bool, env_var_or_default_str};

/// Server-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address the HTTP server binds to
    pub serve_address: String,
    /// Namespace holding Projects, Settings and global Variables
    pub system_namespace: String,
    /// Global log level (ERROR, WARN, INFO, DEBUG, TRACE)
    pub log_level: String,
    /// Log format (json, text)
    pub log_format: String,
    /// Run the walruscore controllers alongside the API server
    pub enable_controllers: bool,
    /// Directory of FileExample YAML documents
    pub file_examples_dir: Option<PathBuf>,
    /// Attempts of align-then-update writes before giving up on conflicts
    pub align_retry_attempts: u32,
    /// Fibonacci backoff starting value of align-then-update retries (milliseconds)
    pub align_backoff_start_ms: u64,
    /// Fibonacci backoff maximum value of align-then-update retries (milliseconds)
    pub align_backoff_max_ms: u64,
    /// Reconciliation error requeue interval of the controllers (seconds)
    pub reconciliation_error_requeue_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            serve_address: DEFAULT_SERVE_ADDRESS.to_string(),
            system_namespace: DEFAULT_SYSTEM_NAMESPACE.to_string(),
            log_level: "INFO".to_string(),
            log_format: "json".to_string(),
            enable_controllers: true,
            file_examples_dir: None,
            align_retry_attempts: DEFAULT_ALIGN_RETRY_ATTEMPTS,
            align_backoff_start_ms: DEFAULT_ALIGN_BACKOFF_START_MS,
            align_backoff_max_ms: DEFAULT_ALIGN_BACKOFF_MAX_MS,
            reconciliation_error_requeue_secs: DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        use crate::constants::*;
        Self {
            serve_address: env_var_or_default_str("SERVE_ADDRESS", DEFAULT_SERVE_ADDRESS),
            system_namespace: env_var_or_default_str("SYSTEM_NAMESPACE", DEFAULT_SYSTEM_NAMESPACE),
            log_level: env_var_or_default_str("LOG_LEVEL", "INFO"),
            log_format: env_var_or_default_str("LOG_FORMAT", "json"),
            enable_controllers: env_var_or_default_bool("ENABLE_CONTROLLERS", true),
            file_examples_dir: env_var_non_empty("FILE_EXAMPLES_DIR").map(PathBuf::from),
            align_retry_attempts: env_var_or_default(
                "ALIGN_RETRY_ATTEMPTS",
                DEFAULT_ALIGN_RETRY_ATTEMPTS,
            ),
            align_backoff_start_ms: env_var_or_default(
                "ALIGN_BACKOFF_START_MS",
                DEFAULT_ALIGN_BACKOFF_START_MS,
            ),
            align_backoff_max_ms: env_var_or_default(
                "ALIGN_BACKOFF_MAX_MS",
                DEFAULT_ALIGN_BACKOFF_MAX_MS,
            ),
            reconciliation_error_requeue_secs: env_var_or_default(
                "RECONCILIATION_ERROR_REQUEUE_SECS",
                DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS,
            ),
        }
    }

    /// Get align backoff start duration
    pub fn align_backoff_start_duration(&self) -> Duration {
        Duration::from_millis(self.align_backoff_start_ms)
    }

    /// Get align backoff max duration
    pub fn align_backoff_max_duration(&self) -> Duration {
        Duration::from_millis(self.align_backoff_max_ms)
    }

    /// Get reconciliation error requeue duration
    pub fn reconciliation_error_requeue_duration(&self) -> Duration {
        Duration::from_secs(self.reconciliation_error_requeue_secs)
    }

    /// Whether logs are emitted as JSON
    pub fn json_logs(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }
}
