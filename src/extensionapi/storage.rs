//! # Rest Storage
//!
//! Type-erased view of the typed verb implementations, so the HTTP layer
//! can serve any resource through JSON values. A [`Storage`] holds the
//! verbs a resource supports; verbs it lacks answer `MethodNotAllowed`.

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use serde_json::Value;
use std::sync::Arc;

use super::error::StatusError;
use super::handler::{ValidateObjectFn, ValidateObjectUpdateFn};
use super::object::ApiObject;
use super::options::{CreateOptions, DeleteOptions, GetOptions, ListOptions, UpdateOptions};
use super::request::RequestContext;
use super::rest::{
    CollectionDeleter, Creator, GracefulDeleter, Getter, Lister, MergePatch, ReplaceObject,
    UpdatedObjectInfo, Updater, Watcher,
};

/// Body of an update request.
#[derive(Debug, Clone)]
pub enum UpdateBody {
    Replace(Value),
    MergePatch(Value),
}

/// Verbs of one resource over JSON values.
#[async_trait]
pub trait RestStorage: Send + Sync {
    /// Kind of the served objects.
    fn kind(&self) -> String;

    fn namespace_scoped(&self) -> bool;

    /// Verbs in discovery order.
    fn verbs(&self) -> Vec<&'static str>;

    async fn create(&self, ctx: &RequestContext, body: Value, opts: &CreateOptions) -> Result<Value, StatusError>;

    async fn get(&self, ctx: &RequestContext, name: &str, opts: &GetOptions) -> Result<Value, StatusError>;

    /// List, rendered as a Table when `as_table` is set.
    async fn list(&self, ctx: &RequestContext, opts: &ListOptions, as_table: bool) -> Result<Value, StatusError>;

    /// Stream of `{"type", "object"}` watch frames.
    async fn watch(
        &self,
        ctx: &RequestContext,
        opts: &ListOptions,
    ) -> Result<BoxStream<'static, Value>, StatusError>;

    /// Returns the stored object and whether it was created.
    async fn update(
        &self,
        ctx: &RequestContext,
        name: &str,
        body: UpdateBody,
        opts: &UpdateOptions,
    ) -> Result<(Value, bool), StatusError>;

    /// Returns the deletion status and whether deletion is asynchronous.
    async fn delete(&self, ctx: &RequestContext, name: &str, opts: &DeleteOptions) -> Result<(Value, bool), StatusError>;

    async fn delete_collection(
        &self,
        ctx: &RequestContext,
        opts: &DeleteOptions,
        list_opts: &ListOptions,
    ) -> Result<Value, StatusError>;
}

/// Typed verbs of a resource plus the validations applied on each call.
pub struct Storage<K: ApiObject> {
    namespace_scoped: bool,
    allow_create_on_update: bool,
    creator: Option<Arc<dyn Creator<K>>>,
    getter: Option<Arc<dyn Getter<K>>>,
    lister: Option<Arc<dyn Lister<K>>>,
    watcher: Option<Arc<dyn Watcher<K>>>,
    updater: Option<Arc<dyn Updater<K>>>,
    deleter: Option<Arc<dyn GracefulDeleter<K>>>,
    collection_deleter: Option<Arc<dyn CollectionDeleter<K>>>,
    create_validation: Option<ValidateObjectFn<K>>,
    update_validation: Option<ValidateObjectUpdateFn<K>>,
    delete_validation: Option<ValidateObjectFn<K>>,
}

impl<K: ApiObject> std::fmt::Debug for Storage<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("kind", &K::kind(&()))
            .field("verbs", &self.verbs())
            .finish_non_exhaustive()
    }
}

impl<K: ApiObject> Storage<K> {
    #[must_use]
    pub fn new(namespace_scoped: bool) -> Self {
        Self {
            namespace_scoped,
            allow_create_on_update: false,
            creator: None,
            getter: None,
            lister: None,
            watcher: None,
            updater: None,
            deleter: None,
            collection_deleter: None,
            create_validation: None,
            update_validation: None,
            delete_validation: None,
        }
    }

    #[must_use]
    pub fn with_creator(mut self, creator: Arc<dyn Creator<K>>) -> Self {
        self.creator = Some(creator);
        self
    }

    #[must_use]
    pub fn with_getter(mut self, getter: Arc<dyn Getter<K>>) -> Self {
        self.getter = Some(getter);
        self
    }

    #[must_use]
    pub fn with_lister(mut self, lister: Arc<dyn Lister<K>>) -> Self {
        self.lister = Some(lister);
        self
    }

    #[must_use]
    pub fn with_watcher(mut self, watcher: Arc<dyn Watcher<K>>) -> Self {
        self.watcher = Some(watcher);
        self
    }

    #[must_use]
    pub fn with_updater(mut self, updater: Arc<dyn Updater<K>>) -> Self {
        self.updater = Some(updater);
        self
    }

    #[must_use]
    pub fn with_deleter(mut self, deleter: Arc<dyn GracefulDeleter<K>>) -> Self {
        self.deleter = Some(deleter);
        self
    }

    #[must_use]
    pub fn with_collection_deleter(mut self, deleter: Arc<dyn CollectionDeleter<K>>) -> Self {
        self.collection_deleter = Some(deleter);
        self
    }

    #[must_use]
    pub fn with_create_validation(mut self, validation: ValidateObjectFn<K>) -> Self {
        self.create_validation = Some(validation);
        self
    }

    #[must_use]
    pub fn with_update_validation(mut self, validation: ValidateObjectUpdateFn<K>) -> Self {
        self.update_validation = Some(validation);
        self
    }

    #[must_use]
    pub fn with_delete_validation(mut self, validation: ValidateObjectFn<K>) -> Self {
        self.delete_validation = Some(validation);
        self
    }

    /// Let updates of absent objects create them.
    #[must_use]
    pub fn allowing_create_on_update(mut self) -> Self {
        self.allow_create_on_update = true;
        self
    }

    /// Keep only the getter and updater, for subresources.
    #[must_use]
    pub fn get_update_only(self) -> Self {
        Self {
            creator: None,
            lister: None,
            watcher: None,
            deleter: None,
            collection_deleter: None,
            ..self
        }
    }

    fn unsupported(ctx: &RequestContext, action: &str) -> StatusError {
        StatusError::method_not_supported(&ctx.info.qualified_resource(), action)
    }

    fn decode(body: Value) -> Result<K, StatusError> {
        serde_json::from_value(body)
            .map_err(|e| StatusError::bad_request(format!("decode {} body: {e}", K::kind(&()))))
    }

    fn encode<T: serde::Serialize>(obj: &T) -> Result<Value, StatusError> {
        serde_json::to_value(obj).map_err(StatusError::internal)
    }
}

#[async_trait]
impl<K: ApiObject> RestStorage for Storage<K> {
    fn kind(&self) -> String {
        K::kind(&()).into_owned()
    }

    fn namespace_scoped(&self) -> bool {
        self.namespace_scoped
    }

    fn verbs(&self) -> Vec<&'static str> {
        let mut verbs = Vec::new();
        if self.creator.is_some() {
            verbs.push("create");
        }
        if self.deleter.is_some() {
            verbs.push("delete");
        }
        if self.collection_deleter.is_some() {
            verbs.push("deletecollection");
        }
        if self.getter.is_some() {
            verbs.push("get");
        }
        if self.lister.is_some() {
            verbs.push("list");
        }
        if self.updater.is_some() {
            verbs.extend(["patch", "update"]);
        }
        if self.watcher.is_some() {
            verbs.push("watch");
        }
        verbs
    }

    async fn create(&self, ctx: &RequestContext, body: Value, opts: &CreateOptions) -> Result<Value, StatusError> {
        let Some(creator) = &self.creator else {
            return Err(Self::unsupported(ctx, "create"));
        };
        let mut obj = Self::decode(body)?;
        if self.namespace_scoped {
            obj.meta_mut().namespace = ctx.namespace().map(str::to_string);
        }
        let created = creator
            .create(ctx, obj, self.create_validation.as_ref(), opts)
            .await?;
        Self::encode(&created)
    }

    async fn get(&self, ctx: &RequestContext, name: &str, opts: &GetOptions) -> Result<Value, StatusError> {
        let Some(getter) = &self.getter else {
            return Err(Self::unsupported(ctx, "get"));
        };
        Self::encode(&getter.get(ctx, name, opts).await?)
    }

    async fn list(&self, ctx: &RequestContext, opts: &ListOptions, as_table: bool) -> Result<Value, StatusError> {
        let Some(lister) = &self.lister else {
            return Err(Self::unsupported(ctx, "list"));
        };
        let list = lister.list(ctx, opts).await?;
        if as_table {
            return Self::encode(&lister.convert_to_table(&list));
        }
        Self::encode(&list)
    }

    async fn watch(
        &self,
        ctx: &RequestContext,
        opts: &ListOptions,
    ) -> Result<BoxStream<'static, Value>, StatusError> {
        let Some(watcher) = &self.watcher else {
            return Err(Self::unsupported(ctx, "watch"));
        };
        let watched = watcher.watch(ctx, opts).await?;
        let frames = watched.into_stream().map(|event| {
            event
                .to_frame()
                .unwrap_or_else(|err| serde_json::json!({
                    "type": "ERROR",
                    "object": StatusError::internal(err).to_status(),
                }))
        });
        Ok(frames.boxed())
    }

    async fn update(
        &self,
        ctx: &RequestContext,
        name: &str,
        body: UpdateBody,
        opts: &UpdateOptions,
    ) -> Result<(Value, bool), StatusError> {
        let Some(updater) = &self.updater else {
            return Err(Self::unsupported(ctx, "update"));
        };
        let info: Box<dyn UpdatedObjectInfo<K>> = match body {
            UpdateBody::Replace(body) => {
                let mut obj = Self::decode(body)?;
                if self.namespace_scoped {
                    obj.meta_mut().namespace = ctx.namespace().map(str::to_string);
                }
                if obj.meta().name.as_deref().is_some_and(|n| n != name) {
                    return Err(StatusError::bad_request(format!(
                        "the name of the object ({}) does not match the name on the URL ({name})",
                        obj.meta().name.as_deref().unwrap_or_default()
                    )));
                }
                obj.meta_mut().name = Some(name.to_string());
                Box::new(ReplaceObject(obj))
            }
            UpdateBody::MergePatch(patch) => Box::new(MergePatch(patch)),
        };
        let (obj, created) = updater
            .update(
                ctx,
                name,
                info.as_ref(),
                self.create_validation.as_ref(),
                self.update_validation.as_ref(),
                self.allow_create_on_update,
                opts,
            )
            .await?;
        Ok((Self::encode(&obj)?, created))
    }

    async fn delete(&self, ctx: &RequestContext, name: &str, opts: &DeleteOptions) -> Result<(Value, bool), StatusError> {
        let Some(deleter) = &self.deleter else {
            return Err(Self::unsupported(ctx, "delete"));
        };
        let (status, is_async) = deleter
            .delete(ctx, name, self.delete_validation.as_ref(), opts)
            .await?;
        Ok((Self::encode(&status)?, is_async))
    }

    async fn delete_collection(
        &self,
        ctx: &RequestContext,
        opts: &DeleteOptions,
        list_opts: &ListOptions,
    ) -> Result<Value, StatusError> {
        let Some(deleter) = &self.collection_deleter else {
            return Err(Self::unsupported(ctx, "deletecollection"));
        };
        let deleted = deleter
            .delete_collection(ctx, self.delete_validation.clone(), opts, list_opts)
            .await?;
        Self::encode(&deleted)
    }
}
