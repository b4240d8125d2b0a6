//! # Proxy Handler
//!
//! Serves a resource that mirrors an upstream object of another API group
//! by casting between the two types and delegating to the upstream client.
//!
//! A concrete resource customises the proxy by composition: any verb can
//! be fully replaced through [`ProxyOverrides`], or preceded by an advice
//! hook from [`ProxyHooks`] that validates or rewrites the request.

use async_trait::async_trait;
use std::sync::Arc;

use super::handler::{
    CreateHandler, DeleteHandler, GetHandler, ListHandler, ObjectKey, ResourceHandler, UpdateHandler,
    WatchHandler,
};
use super::object::{ApiObject, ObjectList};
use super::options::{CreateOptions, DeleteOptions, GetOptions, ListOptions, UpdateOptions};
use super::request::RequestContext;
use super::watch::{translate_watch, ProxyWatcher};
use crate::client::ObjectClient;

/// A served type mirroring an upstream type field by field.
pub trait ProxiedObject: ApiObject {
    type Upstream: ApiObject;

    fn into_upstream(self) -> Self::Upstream;

    fn from_upstream(upstream: Self::Upstream) -> Self;
}

/// Checks run before the proxy delegates a verb upstream.
pub struct ProxyHooks<D> {
    pub before_on_create: Option<Arc<dyn Fn(&RequestContext, &D, &CreateOptions) -> anyhow::Result<()> + Send + Sync>>,
    pub before_on_list_watch: Option<Arc<dyn Fn(&RequestContext, &mut ListOptions) -> anyhow::Result<()> + Send + Sync>>,
    pub before_on_get: Option<Arc<dyn Fn(&RequestContext, &ObjectKey) -> anyhow::Result<()> + Send + Sync>>,
    pub before_on_update: Option<Arc<dyn Fn(&RequestContext, &D, &D) -> anyhow::Result<()> + Send + Sync>>,
    pub before_on_delete: Option<Arc<dyn Fn(&RequestContext, &D) -> anyhow::Result<()> + Send + Sync>>,
}

impl<D> Default for ProxyHooks<D> {
    fn default() -> Self {
        Self {
            before_on_create: None,
            before_on_list_watch: None,
            before_on_get: None,
            before_on_update: None,
            before_on_delete: None,
        }
    }
}

/// Handlers replacing the proxy's own implementation of a verb.
pub struct ProxyOverrides<D> {
    pub create: Option<Arc<dyn CreateHandler<Object = D>>>,
    pub list: Option<Arc<dyn ListHandler<Object = D>>>,
    pub watch: Option<Arc<dyn WatchHandler<Object = D>>>,
    pub get: Option<Arc<dyn GetHandler<Object = D>>>,
    pub update: Option<Arc<dyn UpdateHandler<Object = D>>>,
    pub delete: Option<Arc<dyn DeleteHandler<Object = D>>>,
}

impl<D> Default for ProxyOverrides<D> {
    fn default() -> Self {
        Self {
            create: None,
            list: None,
            watch: None,
            get: None,
            update: None,
            delete: None,
        }
    }
}

pub struct CurdProxyHandler<D: ProxiedObject> {
    client: Arc<dyn ObjectClient<D::Upstream>>,
    namespace_scoped: bool,
    hooks: ProxyHooks<D>,
    overrides: ProxyOverrides<D>,
}

impl<D: ProxiedObject> std::fmt::Debug for CurdProxyHandler<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CurdProxyHandler")
            .field("kind", &D::kind(&()))
            .field("upstream", &<D::Upstream as kube::Resource>::kind(&()))
            .field("namespace_scoped", &self.namespace_scoped)
            .finish_non_exhaustive()
    }
}

impl<D: ProxiedObject> CurdProxyHandler<D> {
    pub fn new(client: Arc<dyn ObjectClient<D::Upstream>>, namespace_scoped: bool) -> Self {
        Self {
            client,
            namespace_scoped,
            hooks: ProxyHooks::default(),
            overrides: ProxyOverrides::default(),
        }
    }

    #[must_use]
    pub fn with_hooks(mut self, hooks: ProxyHooks<D>) -> Self {
        self.hooks = hooks;
        self
    }

    #[must_use]
    pub fn with_overrides(mut self, overrides: ProxyOverrides<D>) -> Self {
        self.overrides = overrides;
        self
    }

    fn list_options(&self, ctx: &RequestContext, opts: &ListOptions) -> anyhow::Result<ListOptions> {
        let mut opts = opts.clone();
        if let Some(advice) = &self.hooks.before_on_list_watch {
            advice(ctx, &mut opts)?;
        }
        Ok(opts)
    }
}

impl<D: ProxiedObject> ResourceHandler for CurdProxyHandler<D> {
    type Object = D;

    fn namespace_scoped(&self) -> bool {
        self.namespace_scoped
    }
}

#[async_trait]
impl<D: ProxiedObject> CreateHandler for CurdProxyHandler<D> {
    async fn on_create(&self, ctx: &RequestContext, obj: D, opts: &CreateOptions) -> anyhow::Result<D> {
        if let Some(handler) = &self.overrides.create {
            return handler.on_create(ctx, obj, opts).await;
        }
        if let Some(advice) = &self.hooks.before_on_create {
            advice(ctx, &obj, opts)?;
        }
        let created = self.client.create(&obj.into_upstream(), opts).await?;
        Ok(D::from_upstream(created))
    }
}

#[async_trait]
impl<D: ProxiedObject> ListHandler for CurdProxyHandler<D> {
    async fn on_list(&self, ctx: &RequestContext, opts: &ListOptions) -> anyhow::Result<ObjectList<D>> {
        if let Some(handler) = &self.overrides.list {
            return handler.on_list(ctx, opts).await;
        }
        let opts = self.list_options(ctx, opts)?;
        let list = self.client.list(&opts).await?;
        Ok(list.map(D::from_upstream))
    }
}

#[async_trait]
impl<D: ProxiedObject> WatchHandler for CurdProxyHandler<D> {
    async fn on_watch(&self, ctx: &RequestContext, opts: &ListOptions) -> anyhow::Result<ProxyWatcher<D>> {
        if let Some(handler) = &self.overrides.watch {
            return handler.on_watch(ctx, opts).await;
        }
        let opts = self.list_options(ctx, opts)?;
        let upstream = self.client.watch(&opts).await?;
        let span = tracing::debug_span!("extensionapi.proxy_watch", kind = %D::kind(&()));
        Ok(translate_watch(ctx.cancel.clone(), upstream, span, |event| {
            event
                .filter_map(|obj| Some(D::from_upstream(obj)))
                .into_iter()
                .collect()
        }))
    }
}

#[async_trait]
impl<D: ProxiedObject> GetHandler for CurdProxyHandler<D> {
    async fn on_get(&self, ctx: &RequestContext, key: &ObjectKey, opts: &GetOptions) -> anyhow::Result<D> {
        if let Some(handler) = &self.overrides.get {
            return handler.on_get(ctx, key, opts).await;
        }
        if let Some(advice) = &self.hooks.before_on_get {
            advice(ctx, key)?;
        }
        let obj = self.client.get(key.namespace.as_deref(), &key.name).await?;
        Ok(D::from_upstream(obj))
    }
}

#[async_trait]
impl<D: ProxiedObject> UpdateHandler for CurdProxyHandler<D> {
    async fn on_update(&self, ctx: &RequestContext, obj: D, old: D, opts: &UpdateOptions) -> anyhow::Result<D> {
        if let Some(handler) = &self.overrides.update {
            return handler.on_update(ctx, obj, old, opts).await;
        }
        if let Some(advice) = &self.hooks.before_on_update {
            advice(ctx, &obj, &old)?;
        }
        let updated = self.client.update(&obj.into_upstream(), opts).await?;
        Ok(D::from_upstream(updated))
    }
}

#[async_trait]
impl<D: ProxiedObject> DeleteHandler for CurdProxyHandler<D> {
    async fn on_delete(&self, ctx: &RequestContext, obj: D, opts: &DeleteOptions) -> anyhow::Result<()> {
        if let Some(handler) = &self.overrides.delete {
            return handler.on_delete(ctx, obj, opts).await;
        }
        if let Some(advice) = &self.hooks.before_on_delete {
            advice(ctx, &obj)?;
        }
        self.client.delete(&obj.into_upstream(), opts).await?;
        Ok(())
    }
}
