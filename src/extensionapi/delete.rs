//! # Delete and Collection Delete
//!
//! Single deletes resolve the stored object, validate it and hand it to the
//! handler. Collection deletes run a pager and a deleter concurrently,
//! joined by a bounded channel so deletion never runs far ahead of
//! listing; the first failure on either side cancels the other.

use async_trait::async_trait;
use kube::Resource;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::error::{is_not_found, wrap_error, StatusDetails, StatusError};
use super::get::key_for;
use super::handler::{DeleteHandler, ListHandler, ValidateObjectFn};
use super::list::ListOperation;
use super::object::{name_of, ObjectList};
use super::options::{DeleteOptions, GetOptions, ListOptions};
use super::request::RequestContext;
use super::rest::{CollectionDeleter, GracefulDeleter, Lister, SuccessStatus};
use crate::constants::{COLLECTION_DELETE_CHANNEL_CAPACITY, DEFAULT_COLLECTION_DELETE_LIMIT};
use crate::observability::metrics;

/// Serves deletes through a [`DeleteHandler`].
pub struct DeleteOperation<H: DeleteHandler> {
    handler: Arc<H>,
}

impl<H: DeleteHandler> Clone for DeleteOperation<H> {
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
        }
    }
}

impl<H: DeleteHandler> std::fmt::Debug for DeleteOperation<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeleteOperation").finish_non_exhaustive()
    }
}

impl<H: DeleteHandler> DeleteOperation<H> {
    pub fn new(handler: Arc<H>) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl<H: DeleteHandler> GracefulDeleter<H::Object> for DeleteOperation<H> {
    async fn delete(
        &self,
        ctx: &RequestContext,
        name: &str,
        validation: Option<&ValidateObjectFn<H::Object>>,
        opts: &DeleteOptions,
    ) -> Result<(SuccessStatus, bool), StatusError> {
        let key = key_for(ctx, name, self.handler.namespace_scoped())?;

        let is_async = opts.is_async();
        let existing = match self.handler.on_get(ctx, &key, &GetOptions::default()).await {
            Ok(existing) => existing,
            // Already absent.
            Err(err) if is_not_found(&err) => {
                debug!(resource = %ctx.info.resource, name = %name, "nothing to delete");
                return Ok((success_status(ctx, name, None), is_async));
            }
            Err(err) => return Err(wrap_error(&ctx.info, name, &err)),
        };

        if let Some(validate) = validation {
            validate(&existing)?;
        }

        let status = success_status(ctx, name, existing.meta().uid.clone());

        if opts.dry_run {
            return Ok((status, is_async));
        }

        debug!(resource = %ctx.info.resource, name = %name, "deleting");
        match self.handler.on_delete(ctx, existing, opts).await {
            Ok(()) => {}
            // Gone between the lookup and the delete.
            Err(err) if is_not_found(&err) => debug!(name = %name, "already deleted"),
            Err(err) => return Err(wrap_error(&ctx.info, name, &err)),
        }
        Ok((status, is_async))
    }
}

fn success_status(ctx: &RequestContext, name: &str, uid: Option<String>) -> SuccessStatus {
    let qualified = ctx.info.qualified_kind();
    SuccessStatus::new(StatusDetails {
        name: name.to_string(),
        group: qualified.group,
        kind: qualified.resource,
        uid: uid.unwrap_or_default(),
        ..StatusDetails::default()
    })
}

/// Deletes every object a list selects.
pub struct CollectionDeleteOperation<H: ListHandler + DeleteHandler> {
    list: ListOperation<H>,
    delete: DeleteOperation<H>,
}

impl<H: ListHandler + DeleteHandler> Clone for CollectionDeleteOperation<H> {
    fn clone(&self) -> Self {
        Self {
            list: self.list.clone(),
            delete: self.delete.clone(),
        }
    }
}

impl<H: ListHandler + DeleteHandler> std::fmt::Debug for CollectionDeleteOperation<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionDeleteOperation")
            .field("list", &self.list)
            .finish_non_exhaustive()
    }
}

impl<H: ListHandler + DeleteHandler> CollectionDeleteOperation<H> {
    pub fn new(list: ListOperation<H>, delete: DeleteOperation<H>) -> Self {
        Self { list, delete }
    }

    /// Page through the listing, feeding items to the deleter.
    async fn page(
        &self,
        ctx: &RequestContext,
        mut list_opts: ListOptions,
        has_limit: bool,
        observed: &Mutex<Vec<H::Object>>,
        items_tx: mpsc::Sender<H::Object>,
        cancel: &CancellationToken,
    ) -> Result<(), StatusError> {
        loop {
            if cancel.is_cancelled() {
                return Err(StatusError::internal("collection delete cancelled"));
            }

            let list = self.list.list(ctx, &list_opts).await?;
            let next = list.continue_token().map(str::to_string);
            observed
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .extend(list.items.iter().cloned());

            for item in list.items {
                tokio::select! {
                    () = cancel.cancelled() => {
                        return Err(StatusError::internal("collection delete cancelled"));
                    }
                    sent = items_tx.send(item) => {
                        if sent.is_err() {
                            // Deleter is gone; its error is reported by the join.
                            return Ok(());
                        }
                    }
                }
            }

            // Done as reached the limit, or as no more items.
            let Some(next) = next.filter(|_| !has_limit) else {
                return Ok(());
            };

            list_opts.continue_token = Some(next);
            list_opts.resource_version = None;
            list_opts.resource_version_match = None;
        }
    }

    /// Delete items as they arrive; absent objects count as deleted.
    async fn drain(
        &self,
        ctx: &RequestContext,
        validation: Option<ValidateObjectFn<H::Object>>,
        opts: &DeleteOptions,
        mut items_rx: mpsc::Receiver<H::Object>,
        cancel: &CancellationToken,
    ) -> Result<(), StatusError> {
        loop {
            let item = tokio::select! {
                () = cancel.cancelled() => {
                    return Err(StatusError::internal("collection delete cancelled"));
                }
                item = items_rx.recv() => match item {
                    Some(item) => item,
                    None => return Ok(()),
                },
            };

            let name = name_of(&item).to_string();
            let item_ctx = match item.meta().namespace.as_deref() {
                Some(ns) if !ns.is_empty() => ctx.in_namespace(ns),
                _ => ctx.clone(),
            };
            match self.delete.delete(&item_ctx, &name, validation.as_ref(), opts).await {
                Ok(_) => metrics::increment_collection_delete_items(&ctx.info.resource),
                Err(err) if err.is_not_found() => {
                    debug!(name = %name, "already deleted");
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[async_trait]
impl<H: ListHandler + DeleteHandler> CollectionDeleter<H::Object> for CollectionDeleteOperation<H> {
    async fn delete_collection(
        &self,
        ctx: &RequestContext,
        validation: Option<ValidateObjectFn<H::Object>>,
        opts: &DeleteOptions,
        list_opts: &ListOptions,
    ) -> Result<ObjectList<H::Object>, StatusError> {
        let mut list_opts = list_opts.clone();
        let has_limit = list_opts.limit.is_some_and(|l| l > 0);
        if !has_limit {
            list_opts.limit = Some(DEFAULT_COLLECTION_DELETE_LIMIT);
        }

        let observed = Arc::new(Mutex::new(Vec::new()));
        let (items_tx, items_rx) = mpsc::channel(COLLECTION_DELETE_CHANNEL_CAPACITY);
        let cancel = ctx.cancel.child_token();

        let mut group = JoinSet::new();
        {
            let this = self.clone();
            let ctx = ctx.clone();
            let observed = Arc::clone(&observed);
            let cancel = cancel.clone();
            group.spawn(async move {
                this.page(&ctx, list_opts, has_limit, &observed, items_tx, &cancel)
                    .await
            });
        }
        {
            let this = self.clone();
            let ctx = ctx.clone();
            let opts = opts.clone();
            let cancel = cancel.clone();
            group.spawn(async move { this.drain(&ctx, validation, &opts, items_rx, &cancel).await });
        }

        let mut first_err = None;
        while let Some(joined) = group.join_next().await {
            let result = joined.unwrap_or_else(|err| Err(StatusError::internal(err)));
            if let Err(err) = result {
                if first_err.is_none() {
                    warn!(resource = %ctx.info.resource, error = %err, "collection delete failed");
                    cancel.cancel();
                    first_err = Some(err);
                }
            }
        }
        if let Some(err) = first_err {
            return Err(StatusError::internal(err));
        }

        let items = std::mem::take(&mut *observed.lock().unwrap_or_else(PoisonError::into_inner));
        Ok(ObjectList::new(items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apis::walruscore::v1::{Template, TemplateSpec};
    use crate::extensionapi::handler::{GetHandler, ObjectKey, ResourceHandler};
    use crate::extensionapi::request::RequestInfo;

    /// Finds the object on lookup but loses it before the delete.
    struct Racing {
        deleted: bool,
    }

    impl ResourceHandler for Racing {
        type Object = Template;

        fn namespace_scoped(&self) -> bool {
            true
        }
    }

    #[async_trait]
    impl GetHandler for Racing {
        async fn on_get(&self, _ctx: &RequestContext, key: &ObjectKey, _opts: &GetOptions) -> anyhow::Result<Template> {
            if self.deleted {
                return Err(StatusError::not_found(&crate::extensionapi::GroupResource::default(), &key.name).into());
            }
            let mut template = Template::new(&key.name, TemplateSpec::default());
            template.metadata.namespace = Some(key.namespace().to_string());
            Ok(template)
        }
    }

    #[async_trait]
    impl DeleteHandler for Racing {
        async fn on_delete(&self, _ctx: &RequestContext, obj: Template, _opts: &DeleteOptions) -> anyhow::Result<()> {
            Err(StatusError::not_found(&crate::extensionapi::GroupResource::default(), name_of(&obj)).into())
        }
    }

    fn ctx() -> RequestContext {
        RequestContext::new(RequestInfo::new("walrus.seal.io", "templates").with_namespace("acme"))
    }

    #[tokio::test]
    async fn test_object_gone_before_delete_counts_as_deleted() {
        let op = DeleteOperation::new(Arc::new(Racing { deleted: false }));
        op.delete(&ctx(), "webservice", None, &DeleteOptions::default())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_absent_object_counts_as_deleted() {
        let op = DeleteOperation::new(Arc::new(Racing { deleted: true }));
        let (status, _) = op
            .delete(&ctx(), "webservice", None, &DeleteOptions::default())
            .await
            .unwrap();
        assert_eq!(status.details.name, "webservice");
    }
}
