//! Update verb, status subresource hooks and managed-fields handling.

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ManagedFieldsEntry;
use kube::Resource;
use std::sync::Arc;
use tracing::debug;

use super::error::{is_not_found, wrap_error, FieldError, StatusError};
use super::get::key_for;
use super::handler::{BeforeUpdateFn, UpdateHandler, ValidateObjectFn, ValidateObjectUpdateFn};
use super::object::{resource_version_of, HasStatusSubresource};
use super::options::{CreateOptions, GetOptions, UpdateOptions};
use super::request::RequestContext;
use super::rest::{Creator, UpdatedObjectInfo, Updater};

/// Main endpoint hook: `status` can only change through the status
/// subresource, so the stored status is carried over.
pub fn before_update_prevent_status_modify<K: HasStatusSubresource>(
    mut obj: K,
    existing: &K,
) -> anyhow::Result<K> {
    obj.set_status(existing.status().cloned());
    Ok(obj)
}

/// Status subresource hook: everything but `status` comes from the stored
/// object.
pub fn before_update_status_modify_only<K: HasStatusSubresource>(
    obj: K,
    existing: &K,
) -> anyhow::Result<K> {
    let mut out = existing.clone();
    out.set_status(obj.status().cloned());
    out.meta_mut().resource_version = obj.meta().resource_version.clone();
    Ok(out)
}

fn same_entry_ignoring_time(a: &ManagedFieldsEntry, b: &ManagedFieldsEntry) -> bool {
    a.manager == b.manager
        && a.operation == b.operation
        && a.api_version == b.api_version
        && a.fields_type == b.fields_type
        && a.fields_v1 == b.fields_v1
        && a.subresource == b.subresource
}

/// Keep stored managed-field timestamps for entries whose content did not
/// change, so no-op updates do not churn them.
pub fn ignore_managed_fields_timestamps<K: Resource>(mut obj: K, existing: &K) -> K {
    let Some(old_entries) = existing.meta().managed_fields.as_ref() else {
        return obj;
    };
    if let Some(entries) = obj.meta_mut().managed_fields.as_mut() {
        for entry in entries.iter_mut() {
            if let Some(old) = old_entries.iter().find(|old| same_entry_ignoring_time(old, entry)) {
                entry.time.clone_from(&old.time);
            }
        }
    }
    obj
}

/// Serves updates through an [`UpdateHandler`].
///
/// When the object does not exist and the caller allows it, the update
/// becomes a create through the attached [`Creator`].
pub struct UpdateOperation<H: UpdateHandler> {
    handler: Arc<H>,
    before_update: Option<BeforeUpdateFn<H::Object>>,
    creator: Option<Arc<dyn Creator<H::Object>>>,
}

impl<H: UpdateHandler> Clone for UpdateOperation<H> {
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
            before_update: self.before_update.clone(),
            creator: self.creator.clone(),
        }
    }
}

impl<H: UpdateHandler> std::fmt::Debug for UpdateOperation<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateOperation")
            .field("before_update", &self.before_update.is_some())
            .field("creator", &self.creator.is_some())
            .finish_non_exhaustive()
    }
}

impl<H: UpdateHandler> UpdateOperation<H> {
    pub fn new(handler: Arc<H>) -> Self {
        Self {
            handler,
            before_update: None,
            creator: None,
        }
    }

    #[must_use]
    pub fn with_creator(mut self, creator: Arc<dyn Creator<H::Object>>) -> Self {
        self.creator = Some(creator);
        self
    }

    #[must_use]
    pub fn with_before_update(mut self, before_update: BeforeUpdateFn<H::Object>) -> Self {
        self.before_update = Some(before_update);
        self
    }
}

impl<H: UpdateHandler> UpdateOperation<H>
where
    H::Object: HasStatusSubresource,
{
    /// Main endpoint updater of an object with a status subresource.
    #[must_use]
    pub fn preventing_status_modify(self) -> Self {
        self.with_before_update(Arc::new(before_update_prevent_status_modify::<H::Object>))
    }

    /// Updater serving the status subresource.
    #[must_use]
    pub fn status_subresource_updater(&self) -> Self {
        self.clone()
            .with_before_update(Arc::new(before_update_status_modify_only::<H::Object>))
    }
}

#[async_trait]
impl<H: UpdateHandler> Updater<H::Object> for UpdateOperation<H> {
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
        let key = key_for(ctx, name, self.handler.namespace_scoped())?;

        let existing = match self.handler.on_get(ctx, &key, &GetOptions::default()).await {
            Ok(existing) => Some(existing),
            Err(err) if is_not_found(&err) => {
                if !force_allow_create {
                    return Err(StatusError::not_found(&ctx.info.qualified_resource(), name));
                }
                None
            }
            Err(err) => return Err(wrap_error(&ctx.info, name, &err)),
        };

        let mut obj = obj_info.updated_object(existing.as_ref())?;

        let Some(existing) = existing else {
            let Some(creator) = &self.creator else {
                return Err(StatusError::not_found(&ctx.info.qualified_resource(), name));
            };
            debug!(resource = %ctx.info.resource, name = %name, "update turns into create");
            let created = creator
                .create(ctx, obj, create_validation, &CreateOptions::from(opts))
                .await?;
            return Ok((created, true));
        };

        if resource_version_of(&obj).is_empty() {
            return Err(StatusError::invalid(
                &ctx.info.qualified_kind(),
                name,
                vec![FieldError::invalid(
                    "metadata.resourceVersion",
                    0,
                    "must be specified for an update",
                )],
            ));
        }

        if let Some(before_update) = &self.before_update {
            obj = before_update(obj, &existing)
                .map_err(|err| StatusError::internal(format!("{err:#}")))?;
        }

        obj = ignore_managed_fields_timestamps(obj, &existing);

        if let Some(validate) = update_validation {
            validate(&obj, &existing)?;
        }

        if opts.dry_run {
            return Ok((obj, false));
        }

        self.handler
            .on_update(ctx, obj, existing, opts)
            .await
            .map(|updated| (updated, false))
            .map_err(|err| wrap_error(&ctx.info, name, &err))
    }
}
