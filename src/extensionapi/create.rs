//! Create verb.

use async_trait::async_trait;
use kube::Resource;
use std::sync::Arc;
use tracing::debug;

use super::error::{wrap_error, StatusError};
use super::handler::{CreateHandler, ValidateObjectFn};
use super::options::{CreateOptions, GetOptions};
use super::request::RequestContext;
use super::rest::{Creator, Getter};
use crate::kubemeta;

/// Serves creation through a [`CreateHandler`].
///
/// Dry-run creation never reaches the handler: with a getter attached it
/// checks for an existing object of the same name, without one it echoes
/// the prepared object.
pub struct CreateOperation<H: CreateHandler> {
    handler: Arc<H>,
    getter: Option<Arc<dyn Getter<H::Object>>>,
}

impl<H: CreateHandler> Clone for CreateOperation<H> {
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
            getter: self.getter.clone(),
        }
    }
}

impl<H: CreateHandler> std::fmt::Debug for CreateOperation<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreateOperation")
            .field("dry_run_getter", &self.getter.is_some())
            .finish_non_exhaustive()
    }
}

impl<H: CreateHandler> CreateOperation<H> {
    pub fn new(handler: Arc<H>) -> Self {
        Self {
            handler,
            getter: None,
        }
    }

    #[must_use]
    pub fn with_getter(mut self, getter: Arc<dyn Getter<H::Object>>) -> Self {
        self.getter = Some(getter);
        self
    }
}

#[async_trait]
impl<H: CreateHandler> Creator<H::Object> for CreateOperation<H> {
    async fn create(
        &self,
        ctx: &RequestContext,
        mut obj: H::Object,
        validation: Option<&ValidateObjectFn<H::Object>>,
        opts: &CreateOptions,
    ) -> Result<H::Object, StatusError> {
        let meta = obj.meta_mut();
        kubemeta::fill_system_fields(meta);
        if meta.name.as_deref().unwrap_or_default().is_empty() {
            if let Some(base) = meta.generate_name.as_deref().filter(|gn| !gn.is_empty()) {
                meta.name = Some(kubemeta::generate_name(base));
            }
        }
        let name = meta.name.clone().unwrap_or_default();

        if let Some(validate) = validation {
            validate(&obj)?;
        }

        if opts.dry_run {
            let Some(getter) = &self.getter else {
                return Ok(obj);
            };
            let probe = GetOptions {
                resource_version: Some("0".to_string()),
            };
            return match getter.get(ctx, &name, &probe).await {
                Ok(_) => Err(StatusError::already_exists(&ctx.info.qualified_resource(), &name)),
                Err(err) if err.is_not_found() => Ok(obj),
                Err(err) => Err(wrap_error(&ctx.info, &name, &err.into())),
            };
        }

        debug!(resource = %ctx.info.resource, name = %name, "creating");
        self.handler
            .on_create(ctx, obj, opts)
            .await
            .map_err(|err| wrap_error(&ctx.info, &name, &err))
    }
}
