//! Bundles of operations for handlers serving several verbs.

use async_trait::async_trait;
use std::sync::Arc;

use super::create::CreateOperation;
use super::delete::{CollectionDeleteOperation, DeleteOperation};
use super::error::StatusError;
use super::get::GetOperation;
use super::handler::{CreateHandler, CurdHandler, UpdateHandler, ValidateObjectFn, ValidateObjectUpdateFn};
use super::list::ListWatchOperation;
use super::options::{CreateOptions, UpdateOptions};
use super::request::RequestContext;
use super::rest::{Creator, UpdatedObjectInfo, Updater};
use super::storage::Storage;
use super::table::TableConvertor;
use super::update::UpdateOperation;

/// Create and update over one handler. Updates of absent objects fall
/// back to the create path when the caller allows it, and dry-run creates
/// probe for existing objects through the handler's getter.
pub struct CreateUpdateOperation<H: CreateHandler + UpdateHandler> {
    pub create: CreateOperation<H>,
    pub update: UpdateOperation<H>,
}

impl<H: CreateHandler + UpdateHandler> Clone for CreateUpdateOperation<H> {
    fn clone(&self) -> Self {
        Self {
            create: self.create.clone(),
            update: self.update.clone(),
        }
    }
}

impl<H: CreateHandler + UpdateHandler> std::fmt::Debug for CreateUpdateOperation<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreateUpdateOperation")
            .field("create", &self.create)
            .field("update", &self.update)
            .finish()
    }
}

impl<H: CreateHandler + UpdateHandler> CreateUpdateOperation<H> {
    pub fn new(handler: Arc<H>) -> Self {
        let create = CreateOperation::new(Arc::clone(&handler))
            .with_getter(Arc::new(GetOperation::new(Arc::clone(&handler))));
        let update = UpdateOperation::new(handler).with_creator(Arc::new(create.clone()));
        Self { create, update }
    }
}

#[async_trait]
impl<H: CreateHandler + UpdateHandler> Creator<H::Object> for CreateUpdateOperation<H> {
    async fn create(
        &self,
        ctx: &RequestContext,
        obj: H::Object,
        validation: Option<&ValidateObjectFn<H::Object>>,
        opts: &CreateOptions,
    ) -> Result<H::Object, StatusError> {
        self.create.create(ctx, obj, validation, opts).await
    }
}

#[async_trait]
impl<H: CreateHandler + UpdateHandler> Updater<H::Object> for CreateUpdateOperation<H> {
    async fn update(
        &self,
        ctx: &RequestContext,
        name: &str,
        obj_info: &dyn UpdatedObjectInfo<H::Object>,
        create_validation: Option<&ValidateObjectFn<H::Object>>,
        update_validation: Option<&ValidateObjectUpdateFn<H::Object>>,
        force_allow_create: bool,
        opts: &UpdateOptions,
    ) -> Result<(H::Object, bool), StatusError> {
        self.update
            .update(
                ctx,
                name,
                obj_info,
                create_validation,
                update_validation,
                force_allow_create,
                opts,
            )
            .await
    }
}

/// Every verb over one handler.
pub struct CurdOperations<H: CurdHandler> {
    pub create_update: CreateUpdateOperation<H>,
    pub list_watch: ListWatchOperation<H>,
    pub get: GetOperation<H>,
    pub delete: DeleteOperation<H>,
    pub collection_delete: CollectionDeleteOperation<H>,
}

impl<H: CurdHandler> Clone for CurdOperations<H> {
    fn clone(&self) -> Self {
        Self {
            create_update: self.create_update.clone(),
            list_watch: self.list_watch.clone(),
            get: self.get.clone(),
            delete: self.delete.clone(),
            collection_delete: self.collection_delete.clone(),
        }
    }
}

impl<H: CurdHandler> std::fmt::Debug for CurdOperations<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CurdOperations")
            .field("list_watch", &self.list_watch)
            .finish_non_exhaustive()
    }
}

impl<H: CurdHandler> CurdOperations<H> {
    pub fn new(table: Option<Arc<dyn TableConvertor<H::Object>>>, handler: Arc<H>) -> Self {
        let create_update = CreateUpdateOperation::new(Arc::clone(&handler));
        let list_watch = ListWatchOperation::new(table, Arc::clone(&handler));
        let get = GetOperation::new(Arc::clone(&handler));
        let delete = DeleteOperation::new(Arc::clone(&handler));
        let collection_delete =
            CollectionDeleteOperation::new(list_watch.list_operation().clone(), delete.clone());
        Self {
            create_update,
            list_watch,
            get,
            delete,
            collection_delete,
        }
    }

    /// Storage serving every verb of the handler.
    pub fn storage(&self, namespace_scoped: bool) -> Storage<H::Object> {
        let list_watch = Arc::new(self.list_watch.clone());
        Storage::new(namespace_scoped)
            .with_creator(Arc::new(self.create_update.clone()))
            .with_getter(Arc::new(self.get.clone()))
            .with_lister(Arc::clone(&list_watch) as _)
            .with_watcher(list_watch)
            .with_updater(Arc::new(self.create_update.clone()))
            .with_deleter(Arc::new(self.delete.clone()))
            .with_collection_deleter(Arc::new(self.collection_delete.clone()))
    }
}

