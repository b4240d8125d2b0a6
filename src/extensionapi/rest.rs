//! # REST Verbs
//!
//! Typed verb contracts implemented by the storage operations and consumed
//! by the HTTP layer through [`super::storage`].

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use super::error::{StatusDetails, StatusError};
use super::handler::{ValidateObjectFn, ValidateObjectUpdateFn};
use super::object::{ApiObject, ObjectList};
use super::options::{CreateOptions, DeleteOptions, GetOptions, ListOptions, UpdateOptions};
use super::request::RequestContext;
use super::table::Table;
use super::watch::ProxyWatcher;

/// Success status returned by deletes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuccessStatus {
    pub kind: &'static str,
    pub api_version: &'static str,
    pub status: &'static str,
    pub details: StatusDetails,
}

impl SuccessStatus {
    #[must_use]
    pub fn new(details: StatusDetails) -> Self {
        Self {
            kind: "Status",
            api_version: "v1",
            status: "Success",
            details,
        }
    }
}

/// Produces the object an update stores from the existing one.
pub trait UpdatedObjectInfo<K>: Send + Sync {
    /// `existing` is `None` when the update turns into a create.
    fn updated_object(&self, existing: Option<&K>) -> Result<K, StatusError>;
}

/// Full replacement with the given object.
#[derive(Debug, Clone)]
pub struct ReplaceObject<K>(pub K);

impl<K: ApiObject> UpdatedObjectInfo<K> for ReplaceObject<K> {
    fn updated_object(&self, _existing: Option<&K>) -> Result<K, StatusError> {
        Ok(self.0.clone())
    }
}

/// RFC 7386 JSON merge patch applied over the existing object.
#[derive(Debug, Clone)]
pub struct MergePatch(pub Value);

impl<K: ApiObject> UpdatedObjectInfo<K> for MergePatch {
    fn updated_object(&self, existing: Option<&K>) -> Result<K, StatusError> {
        let mut doc = match existing {
            Some(obj) => serde_json::to_value(obj).map_err(StatusError::internal)?,
            None => Value::Object(serde_json::Map::new()),
        };
        json_patch::merge(&mut doc, &self.0);
        serde_json::from_value(doc)
            .map_err(|e| StatusError::bad_request(format!("invalid patch result: {e}")))
    }
}

#[async_trait]
pub trait Creator<K>: Send + Sync {
    async fn create(
        &self,
        ctx: &RequestContext,
        obj: K,
        validation: Option<&ValidateObjectFn<K>>,
        opts: &CreateOptions,
    ) -> Result<K, StatusError>;
}

#[async_trait]
pub trait Getter<K>: Send + Sync {
    async fn get(&self, ctx: &RequestContext, name: &str, opts: &GetOptions) -> Result<K, StatusError>;
}

#[async_trait]
pub trait Lister<K>: Send + Sync {
    async fn list(&self, ctx: &RequestContext, opts: &ListOptions) -> Result<ObjectList<K>, StatusError>;

    fn convert_to_table(&self, list: &ObjectList<K>) -> Table;
}

#[async_trait]
pub trait Watcher<K>: Send + Sync {
    async fn watch(&self, ctx: &RequestContext, opts: &ListOptions) -> Result<ProxyWatcher<K>, StatusError>;
}

#[async_trait]
pub trait Updater<K>: Send + Sync {
    /// Returns the stored object and whether it was created.
    #[allow(clippy::too_many_arguments, reason = "mirrors the REST update contract")]
    async fn update(
        &self,
        ctx: &RequestContext,
        name: &str,
        obj_info: &dyn UpdatedObjectInfo<K>,
        create_validation: Option<&ValidateObjectFn<K>>,
        update_validation: Option<&ValidateObjectUpdateFn<K>>,
        force_allow_create: bool,
        opts: &UpdateOptions,
    ) -> Result<(K, bool), StatusError>;
}

#[async_trait]
pub trait GracefulDeleter<K>: Send + Sync {
    /// Returns the deletion status and whether deletion completes
    /// asynchronously.
    async fn delete(
        &self,
        ctx: &RequestContext,
        name: &str,
        validation: Option<&ValidateObjectFn<K>>,
        opts: &DeleteOptions,
    ) -> Result<(SuccessStatus, bool), StatusError>;
}

#[async_trait]
pub trait CollectionDeleter<K>: Send + Sync {
    async fn delete_collection(
        &self,
        ctx: &RequestContext,
        validation: Option<ValidateObjectFn<K>>,
        opts: &DeleteOptions,
        list_opts: &ListOptions,
    ) -> Result<ObjectList<K>, StatusError>;
}
