//! # Metrics
//!
//! Prometheus metrics for monitoring the extension API server.
//!
//! ## Metrics Exposed
//!
//! - `walrus_api_requests_total` - Total number of API requests by resource, verb and status code
//! - `walrus_api_request_duration_seconds` - Duration of API requests by resource and verb
//! - `walrus_api_watch_sessions` - Current number of open watch sessions
//! - `walrus_api_watch_events_total` - Total number of watch events delivered by resource and type
//! - `walrus_collection_delete_items_total` - Total number of items removed by collection deletes
//! - `walrus_reconciliations_total` - Total number of reconciliations by kind

use anyhow::Result;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry};
use std::sync::LazyLock;

use crate::extensionapi::WatchEventType;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static API_REQUESTS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("walrus_api_requests_total", "Total number of API requests"),
        &["resource", "verb", "code"],
    )
    .expect("Failed to create API_REQUESTS_TOTAL metric - this should never happen")
});

static API_REQUEST_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "walrus_api_request_duration_seconds",
            "Duration of API requests in seconds",
        )
        .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        &["resource", "verb"],
    )
    .expect("Failed to create API_REQUEST_DURATION metric - this should never happen")
});

static API_WATCH_SESSIONS: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new("walrus_api_watch_sessions", "Current number of open watch sessions")
        .expect("Failed to create API_WATCH_SESSIONS metric - this should never happen")
});

static API_WATCH_EVENTS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "walrus_api_watch_events_total",
            "Total number of watch events delivered",
        ),
        &["resource", "type"],
    )
    .expect("Failed to create API_WATCH_EVENTS_TOTAL metric - this should never happen")
});

static COLLECTION_DELETE_ITEMS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "walrus_collection_delete_items_total",
            "Total number of items removed by collection deletes",
        ),
        &["resource"],
    )
    .expect("Failed to create COLLECTION_DELETE_ITEMS_TOTAL metric - this should never happen")
});

static RECONCILIATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("walrus_reconciliations_total", "Total number of reconciliations"),
        &["kind"],
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(API_REQUESTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(API_REQUEST_DURATION.clone()))?;
    REGISTRY.register(Box::new(API_WATCH_SESSIONS.clone()))?;
    REGISTRY.register(Box::new(API_WATCH_EVENTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(COLLECTION_DELETE_ITEMS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    Ok(())
}

pub fn record_api_request(resource: &str, verb: &str, code: u16, duration: f64) {
    API_REQUESTS_TOTAL
        .with_label_values(&[resource, verb, &code.to_string()])
        .inc();
    API_REQUEST_DURATION
        .with_label_values(&[resource, verb])
        .observe(duration);
}

pub fn increment_watch_events(resource: &str, event_type: WatchEventType) {
    let event_type = match event_type {
        WatchEventType::Added => "ADDED",
        WatchEventType::Modified => "MODIFIED",
        WatchEventType::Deleted => "DELETED",
        WatchEventType::Bookmark => "BOOKMARK",
        WatchEventType::Error => "ERROR",
    };
    API_WATCH_EVENTS_TOTAL
        .with_label_values(&[resource, event_type])
        .inc();
}

pub fn increment_collection_delete_items(resource: &str) {
    COLLECTION_DELETE_ITEMS_TOTAL
        .with_label_values(&[resource])
        .inc();
}

pub fn increment_reconciliations(kind: &str) {
    RECONCILIATIONS_TOTAL.with_label_values(&[kind]).inc();
}

/// Counts an open watch session for as long as it lives.
#[derive(Debug)]
pub struct WatchSessionGuard {
    resource: String,
}

impl WatchSessionGuard {
    pub fn new(resource: &str) -> Self {
        API_WATCH_SESSIONS.inc();
        Self {
            resource: resource.to_string(),
        }
    }

    #[must_use]
    pub fn resource(&self) -> &str {
        &self.resource
    }
}

impl Drop for WatchSessionGuard {
    fn drop(&mut self) {
        API_WATCH_SESSIONS.dec();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_api_request() {
        let before = API_REQUESTS_TOTAL
            .with_label_values(&["environments", "get", "200"])
            .get();
        record_api_request("environments", "get", 200, 0.01);
        let after = API_REQUESTS_TOTAL
            .with_label_values(&["environments", "get", "200"])
            .get();
        assert_eq!(after, before + 1u64);
    }

    #[test]
    fn test_increment_watch_events() {
        let before = API_WATCH_EVENTS_TOTAL
            .with_label_values(&["settings", "ADDED"])
            .get();
        increment_watch_events("settings", WatchEventType::Added);
        let after = API_WATCH_EVENTS_TOTAL
            .with_label_values(&["settings", "ADDED"])
            .get();
        assert_eq!(after, before + 1u64);
    }

    #[test]
    fn test_watch_session_guard_tracks_sessions() {
        let guard = WatchSessionGuard::new("variables");
        assert_eq!(guard.resource(), "variables");
        assert!(API_WATCH_SESSIONS.get() >= 1);
        drop(guard);
    }

    #[test]
    fn test_increment_reconciliations() {
        let before = RECONCILIATIONS_TOTAL.with_label_values(&["Catalog"]).get();
        increment_reconciliations("Catalog");
        let after = RECONCILIATIONS_TOTAL.with_label_values(&["Catalog"]).get();
        assert_eq!(after, before + 1u64);
    }
}
