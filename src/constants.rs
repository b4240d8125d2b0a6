//! # Constants
//!
//! Shared constants used throughout the extension API server.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// API group served by the extension API server
pub const WALRUS_GROUP: &str = "walrus.seal.io";

/// API group of the physical walruscore resources
pub const WALRUSCORE_GROUP: &str = "walruscore.seal.io";

/// Served version of both API groups
pub const API_VERSION: &str = "v1";

/// Namespace holding system-wide state (Projects, Settings, global Variables)
pub const DEFAULT_SYSTEM_NAMESPACE: &str = "walrus-system";

/// Project that always exists and adopts its pre-existing Namespace
pub const DEFAULT_PROJECT_NAME: &str = "default";

/// Namespaces that can never back a Project
pub const RESERVED_PROJECT_NAMES: &[&str] = &["kube-system", "kube-public"];

/// Secret carrying every Setting of the system
pub const SETTINGS_DELEGATED_SECRET_NAME: &str = "walrus-settings";

/// Secret carrying every Variable of one scope
pub const VARIABLES_DELEGATED_SECRET_NAME: &str = "walrus-variables";

/// Label recording which virtual resource a physical object backs
pub const RESOURCE_TYPE_LABEL: &str = "resource.walrus.seal.io/type";

/// Annotation key prefix of resource notes
pub const RESOURCE_NOTE_ANNOTATION_PREFIX: &str = "note.walrus.seal.io/";

/// Finalizer marking a physical object as controlled by Walrus
pub const CONTROLLED_FINALIZER: &str = "walrus.seal.io/controlled";

/// Value exposed in place of sensitive Setting/Variable values
pub const SENSITIVE_PLACEHOLDER: &str = "(sensitive)";

/// Maximum display width of resource names
pub const MAX_NAME_WIDTH: usize = 30;

/// Maximum display width of display names
pub const MAX_DISPLAY_NAME_WIDTH: usize = 30;

/// Maximum display width of descriptions
pub const MAX_DESCRIPTION_WIDTH: usize = 50;

/// Page size used by collection deletes when the caller gives none
pub const DEFAULT_COLLECTION_DELETE_LIMIT: i64 = 1000;

/// Capacity of the channel between the collection delete pager and deleter
pub const COLLECTION_DELETE_CHANNEL_CAPACITY: usize = 256;

/// Default address of the HTTP server
pub const DEFAULT_SERVE_ADDRESS: &str = "0.0.0.0:8080";

/// Default number of attempts of align-then-update writes on conflict
pub const DEFAULT_ALIGN_RETRY_ATTEMPTS: u32 = 5;

/// Default align-then-update backoff starting value (milliseconds)
pub const DEFAULT_ALIGN_BACKOFF_START_MS: u64 = 10;

/// Default align-then-update backoff maximum value (milliseconds)
pub const DEFAULT_ALIGN_BACKOFF_MAX_MS: u64 = 500;

/// Default requeue interval for reconciliation errors (seconds)
pub const DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS: u64 = 60;

/// Capacity of in-memory watch fan-out channels
pub const MEMORY_WATCH_CHANNEL_CAPACITY: usize = 1024;

/// Environment variable prefix of setting initial values
pub const SETTING_ENV_PREFIX: &str = "WALRUS_SETTING_";
