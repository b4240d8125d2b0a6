//! # Align-then-update
//!
//! Read-modify-write of a physical object: fetch the current state, let an
//! align function decide the next state, write it back, and retry with a
//! Fibonacci backoff when somebody else wrote in between.

use anyhow::Result;
use std::time::Duration;
use tracing::debug;

use super::ObjectClient;
use crate::backoff::FibonacciBackoff;
use crate::config::ServerConfig;
use crate::constants::{
    DEFAULT_ALIGN_BACKOFF_MAX_MS, DEFAULT_ALIGN_BACKOFF_START_MS, DEFAULT_ALIGN_RETRY_ATTEMPTS,
};
use crate::extensionapi::{name_of, ApiObject, CreateOptions, UpdateOptions};

/// Outcome of an align function.
#[derive(Debug, Clone)]
pub enum Aligned<K> {
    /// Write this object back.
    Update(K),
    /// Nothing to change; the current object is returned as-is.
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateMode {
    /// Fail with `NotFound` when the object does not exist.
    #[default]
    UpdateOnly,
    /// Create the expected object when it does not exist.
    UpdateOrCreate,
}

/// Retry policy of align-then-update writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignRetry {
    pub attempts: u32,
    pub backoff_start: Duration,
    pub backoff_max: Duration,
}

impl Default for AlignRetry {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ALIGN_RETRY_ATTEMPTS,
            backoff_start: Duration::from_millis(DEFAULT_ALIGN_BACKOFF_START_MS),
            backoff_max: Duration::from_millis(DEFAULT_ALIGN_BACKOFF_MAX_MS),
        }
    }
}

impl From<&ServerConfig> for AlignRetry {
    fn from(config: &ServerConfig) -> Self {
        Self {
            attempts: config.align_retry_attempts,
            backoff_start: config.align_backoff_start_duration(),
            backoff_max: config.align_backoff_max_duration(),
        }
    }
}

/// Update the object identified by `expected` through `align`.
///
/// `align` receives the current object and may fail; its error is returned
/// unchanged so handlers can surface `NotFound`/`AlreadyExists`/`Invalid`
/// from inside it. Conflicts, and creation races in
/// [`UpdateMode::UpdateOrCreate`], are retried up to `retry.attempts`
/// times.
pub async fn update_with_align<K, F>(
    client: &dyn ObjectClient<K>,
    expected: &K,
    mode: UpdateMode,
    retry: &AlignRetry,
    align: F,
) -> Result<K>
where
    K: ApiObject,
    F: Fn(K) -> Result<Aligned<K>> + Send + Sync,
{
    let namespace = expected.meta().namespace.as_deref();
    let name = name_of(expected);
    let mut backoff = FibonacciBackoff::new(retry.backoff_start, retry.backoff_max);
    let attempts = retry.attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        let current = match client.get(namespace, name).await {
            Ok(current) => current,
            Err(err) if err.is_not_found() && mode == UpdateMode::UpdateOrCreate => {
                match client.create(expected, &CreateOptions::default()).await {
                    Ok(created) => return Ok(created),
                    Err(err) if err.is_already_exists() && attempt < attempts => {
                        debug!(kind = %K::kind(&()), name, attempt, "created concurrently, retrying");
                        tokio::time::sleep(backoff.next_backoff()).await;
                        continue;
                    }
                    Err(err) => return Err(err.into()),
                }
            }
            Err(err) => return Err(err.into()),
        };

        let next = match align(current.clone())? {
            Aligned::Skip => return Ok(current),
            Aligned::Update(next) => next,
        };
        match client.update(&next, &UpdateOptions::default()).await {
            Ok(updated) => return Ok(updated),
            Err(err) if err.is_conflict() && attempt < attempts => {
                debug!(kind = %K::kind(&()), name, attempt, "conflict, retrying");
                tokio::time::sleep(backoff.next_backoff()).await;
            }
            Err(err) => return Err(err.into()),
        }
    }
}
