//! # Handler Contracts
//!
//! Narrow per-verb interfaces implemented by resource handlers. The
//! operations in this module family turn them into the full REST verb
//! surface.
//!
//! Handlers return `anyhow::Result`; returning a [`StatusError`] selects
//! the status reported to the caller.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use super::error::StatusError;
use super::object::{ApiObject, ObjectList};
use super::options::{CreateOptions, DeleteOptions, GetOptions, ListOptions, UpdateOptions};
use super::request::RequestContext;
use super::watch::ProxyWatcher;

/// Namespace and name of an object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ObjectKey {
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: Option<&str>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.filter(|ns| !ns.is_empty()).map(str::to_string),
            name: name.into(),
        }
    }

    pub fn cluster(name: impl Into<String>) -> Self {
        Self {
            namespace: None,
            name: name.into(),
        }
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        self.namespace.as_deref().unwrap_or_default()
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{ns}/{}", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Common identity of a handler.
pub trait ResourceHandler: Send + Sync + 'static {
    type Object: ApiObject;

    /// Whether objects live inside a namespace.
    fn namespace_scoped(&self) -> bool;
}

#[async_trait]
pub trait CreateHandler: ResourceHandler {
    async fn on_create(
        &self,
        ctx: &RequestContext,
        obj: Self::Object,
        opts: &CreateOptions,
    ) -> anyhow::Result<Self::Object>;
}

#[async_trait]
pub trait ListHandler: ResourceHandler {
    async fn on_list(
        &self,
        ctx: &RequestContext,
        opts: &ListOptions,
    ) -> anyhow::Result<ObjectList<Self::Object>>;
}

#[async_trait]
pub trait WatchHandler: ResourceHandler {
    async fn on_watch(
        &self,
        ctx: &RequestContext,
        opts: &ListOptions,
    ) -> anyhow::Result<ProxyWatcher<Self::Object>>;

    /// Whether one upstream event can yield several objects sharing a
    /// resource version. Such handlers deduplicate on their own, and the
    /// watch operation then only drops events older than its bookmark.
    fn fans_out_events(&self) -> bool {
        false
    }
}

#[async_trait]
pub trait GetHandler: ResourceHandler {
    async fn on_get(
        &self,
        ctx: &RequestContext,
        key: &ObjectKey,
        opts: &GetOptions,
    ) -> anyhow::Result<Self::Object>;
}

#[async_trait]
pub trait UpdateHandler: GetHandler {
    async fn on_update(
        &self,
        ctx: &RequestContext,
        obj: Self::Object,
        old: Self::Object,
        opts: &UpdateOptions,
    ) -> anyhow::Result<Self::Object>;
}

#[async_trait]
pub trait DeleteHandler: GetHandler {
    async fn on_delete(
        &self,
        ctx: &RequestContext,
        obj: Self::Object,
        opts: &DeleteOptions,
    ) -> anyhow::Result<()>;
}

/// Handlers serving every verb.
pub trait CurdHandler:
    CreateHandler + UpdateHandler + ListHandler + WatchHandler + GetHandler + DeleteHandler
{
}

impl<T> CurdHandler for T where
    T: CreateHandler + UpdateHandler + ListHandler + WatchHandler + GetHandler + DeleteHandler
{
}

/// Validation run against a new object before it is created, or an
/// existing object before it is deleted.
pub type ValidateObjectFn<K> = Arc<dyn Fn(&K) -> Result<(), StatusError> + Send + Sync>;

/// Validation run against `(new, existing)` before an update.
pub type ValidateObjectUpdateFn<K> = Arc<dyn Fn(&K, &K) -> Result<(), StatusError> + Send + Sync>;

/// Hook rewriting `(new, existing)` into the object to store.
pub type BeforeUpdateFn<K> = Arc<dyn Fn(K, &K) -> anyhow::Result<K> + Send + Sync>;
