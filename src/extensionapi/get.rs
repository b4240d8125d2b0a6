//! Get verb and object key resolution.

use async_trait::async_trait;
use std::sync::Arc;

use super::error::{wrap_error, StatusError};
use super::handler::{GetHandler, ObjectKey};
use super::options::GetOptions;
use super::request::RequestContext;
use super::rest::Getter;

/// Names are used as URL path segments.
fn validate_path_segment_name(name: &str) -> Result<(), String> {
    if name == "." || name == ".." {
        return Err(format!("may not be '{name}'"));
    }
    for forbidden in ["/", "%"] {
        if name.contains(forbidden) {
            return Err(format!("may not contain '{forbidden}'"));
        }
    }
    Ok(())
}

/// Resolve the key of `name` under the request's scope.
pub fn key_for(ctx: &RequestContext, name: &str, namespace_scoped: bool) -> Result<ObjectKey, StatusError> {
    if name.is_empty() {
        return Err(StatusError::bad_request("Name parameter required."));
    }
    validate_path_segment_name(name)
        .map_err(|msg| StatusError::bad_request(format!("Name parameter invalid: {name:?}: {msg}")))?;

    if !namespace_scoped {
        return Ok(ObjectKey::cluster(name));
    }
    let Some(namespace) = ctx.namespace() else {
        return Err(StatusError::bad_request("Namespace parameter required."));
    };
    validate_path_segment_name(namespace).map_err(|msg| {
        StatusError::bad_request(format!("Namespace parameter invalid: {namespace:?}: {msg}"))
    })?;
    Ok(ObjectKey::new(Some(namespace), name))
}

/// Serves reads through a [`GetHandler`].
pub struct GetOperation<H: GetHandler> {
    handler: Arc<H>,
}

impl<H: GetHandler> Clone for GetOperation<H> {
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
        }
    }
}

impl<H: GetHandler> std::fmt::Debug for GetOperation<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GetOperation").finish_non_exhaustive()
    }
}

impl<H: GetHandler> GetOperation<H> {
    pub fn new(handler: Arc<H>) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl<H: GetHandler> Getter<H::Object> for GetOperation<H> {
    async fn get(&self, ctx: &RequestContext, name: &str, opts: &GetOptions) -> Result<H::Object, StatusError> {
        let key = key_for(ctx, name, self.handler.namespace_scoped())?;
        self.handler
            .on_get(ctx, &key, opts)
            .await
            .map_err(|err| wrap_error(&ctx.info, name, &err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extensionapi::request::RequestInfo;

    #[test]
    fn test_key_for_cluster_scope_ignores_namespace() {
        let ctx = RequestContext::new(RequestInfo::new("walrus.seal.io", "catalogs").with_namespace("x"));
        let key = key_for(&ctx, "a", false).unwrap();
        assert_eq!(key, ObjectKey::cluster("a"));
    }

    #[test]
    fn test_key_for_namespaced_scope_requires_namespace() {
        let ctx = RequestContext::new(RequestInfo::new("walrus.seal.io", "environments"));
        let err = key_for(&ctx, "a", true).unwrap_err();
        assert_eq!(err.code, 400);

        let ctx = RequestContext::new(RequestInfo::new("walrus.seal.io", "environments").with_namespace("acme"));
        assert_eq!(key_for(&ctx, "acme-dev", true).unwrap().to_string(), "acme/acme-dev");
    }

    #[test]
    fn test_key_for_rejects_bad_names() {
        let ctx = RequestContext::new(RequestInfo::new("walrus.seal.io", "catalogs"));
        assert!(key_for(&ctx, "", false).is_err());
        assert!(key_for(&ctx, "..", false).is_err());
        assert!(key_for(&ctx, "a/b", false).is_err());
    }
}
