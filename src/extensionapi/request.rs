//! Per-request context handed to every storage operation and handler.

use tokio_util::sync::CancellationToken;

use super::error::GroupResource;

/// Routing information of one API request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestInfo {
    pub api_group: String,
    pub api_version: String,
    pub resource: String,
    pub subresource: Option<String>,
    pub namespace: Option<String>,
    pub name: Option<String>,
    pub verb: String,
}

impl RequestInfo {
    pub fn new(api_group: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            api_group: api_group.into(),
            api_version: crate::constants::API_VERSION.to_string(),
            resource: resource.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        self.namespace = (!namespace.is_empty()).then_some(namespace);
        self
    }

    #[must_use]
    pub fn with_subresource(mut self, subresource: impl Into<String>) -> Self {
        self.subresource = Some(subresource.into());
        self
    }

    #[must_use]
    pub fn with_verb(mut self, verb: impl Into<String>) -> Self {
        self.verb = verb.into();
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn qualified_resource(&self) -> GroupResource {
        GroupResource::new(&self.api_group, &self.resource)
    }

    /// Extension resources use the resource name as the kind name.
    #[must_use]
    pub fn qualified_kind(&self) -> GroupResource {
        self.qualified_resource()
    }
}

/// Request scope: routing information plus the cancellation of the
/// inbound connection.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub info: RequestInfo,
    pub cancel: CancellationToken,
}

impl RequestContext {
    #[must_use]
    pub fn new(info: RequestInfo) -> Self {
        Self {
            info,
            cancel: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        self.info.namespace.as_deref()
    }

    /// Same request, scoped to another namespace.
    #[must_use]
    pub fn in_namespace(&self, namespace: &str) -> Self {
        Self {
            info: self.info.clone().with_namespace(namespace),
            cancel: self.cancel.clone(),
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
