//! Handlers of the `walrus.seal.io/v1` resources.

pub mod environment;
pub mod examples;
pub mod project;
pub mod project_subjects;
pub mod proxies;
pub mod setting;
pub mod variable;

use anyhow::Context;
use k8s_openapi::api::core::v1::Namespace;
use kube::Resource;
use tracing::debug;
use unicode_width::UnicodeWidthStr;

use crate::client::{Clients, ObjectClient as _};
use crate::constants::{RESOURCE_TYPE_LABEL, WALRUS_GROUP};
use crate::extensionapi::{
    field_set, namespace_of, DeleteOptions, FieldError, FieldErrorList, FieldSelector, GroupResource,
    LabelRequirement, ListOptions, UpdateOptions,
};
use crate::systemmeta;

pub(crate) const ENVIRONMENTS: &str = "environments";
pub(crate) const PROJECTS: &str = "projects";

const NAMESPACE_FIELD: &str = "metadata.namespace";

pub(crate) fn qualified(resource: &str) -> GroupResource {
    GroupResource::new(WALRUS_GROUP, resource)
}

/// Record a `TooLong` error when `value` is wider than `max` columns.
pub(crate) fn check_width(errs: &mut FieldErrorList, field: &str, value: &str, max: usize) {
    if value.width() > max {
        errs.push(FieldError::too_long(field, value, max));
    }
}

/// Namespace scoping of list and watch requests over resources backed by
/// cluster-scoped objects, applied after conversion.
#[derive(Debug, Clone, Default)]
pub(crate) struct NamespaceFilter {
    requested: Option<String>,
    selector: FieldSelector,
}

impl NamespaceFilter {
    /// Split `opts` into the upstream options selecting objects backing
    /// `resource_type`, and the namespace filter for converted objects.
    pub(crate) fn split(opts: &ListOptions, resource_type: &str) -> (ListOptions, Self) {
        let mut upstream = opts.clone();
        upstream.namespace = None;
        upstream.label_selector = opts
            .label_selector
            .clone()
            .add(LabelRequirement::equals(RESOURCE_TYPE_LABEL, resource_type));
        upstream.field_selector = opts
            .field_selector
            .clone()
            .retain(|r| r.field != NAMESPACE_FIELD);
        let filter = Self {
            requested: opts.namespace.clone(),
            selector: opts.field_selector.clone().retain(|r| r.field == NAMESPACE_FIELD),
        };
        (upstream, filter)
    }

    pub(crate) fn admits<K: Resource>(&self, obj: &K) -> bool {
        let namespace = namespace_of(obj);
        if self.requested.as_deref().is_some_and(|ns| ns != namespace) {
            return false;
        }
        self.selector.matches(&field_set(&[(NAMESPACE_FIELD, namespace)]))
    }
}

/// Unlock and delete the Namespace `name`; an absent Namespace is fine.
pub(crate) async fn release_namespace(clients: &Clients, name: &str) -> anyhow::Result<()> {
    let mut namespace: Namespace = match clients.namespaces.get(None, name).await {
        Ok(ns) => ns,
        Err(err) if err.is_not_found() => return Ok(()),
        Err(err) => return Err(err).with_context(|| format!("get namespace {name}")),
    };
    if systemmeta::unlock(&mut namespace) {
        match clients.namespaces.update(&namespace, &UpdateOptions::default()).await {
            Ok(unlocked) => namespace = unlocked,
            Err(err) if err.is_not_found() => return Ok(()),
            Err(err) => return Err(err).with_context(|| format!("unset finalizer of namespace {name}")),
        }
    }
    match clients.namespaces.delete(&namespace, &DeleteOptions::default()).await {
        Ok(()) => {}
        Err(err) if err.is_not_found() => {
            debug!(namespace = name, "namespace gone after unlocking");
        }
        Err(err) => return Err(err).with_context(|| format!("delete namespace {name}")),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extensionapi::FieldRequirement;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn namespaced(namespace: &str) -> Namespace {
        Namespace {
            metadata: ObjectMeta {
                name: Some("x".to_string()),
                namespace: Some(namespace.to_string()),
                ..ObjectMeta::default()
            },
            ..Namespace::default()
        }
    }

    #[test]
    fn test_namespace_filter_moves_namespace_requirements() {
        let opts = ListOptions::default()
            .in_namespace(Some("acme"))
            .with_field_selector(
                FieldSelector::everything()
                    .add(FieldRequirement::equals("metadata.name", "acme-dev"))
                    .add(FieldRequirement::equals("metadata.namespace", "acme")),
            );
        let (upstream, filter) = NamespaceFilter::split(&opts, ENVIRONMENTS);
        assert_eq!(upstream.namespace, None);
        assert_eq!(upstream.field_selector.to_string(), "metadata.name=acme-dev");
        assert_eq!(
            upstream.label_selector.to_string(),
            "resource.walrus.seal.io/type=environments"
        );
        assert!(filter.admits(&namespaced("acme")));
        assert!(!filter.admits(&namespaced("other")));
    }

    #[test]
    fn test_check_width_counts_columns() {
        let mut errs = FieldErrorList::new();
        check_width(&mut errs, "spec.displayName", &"界".repeat(15), 30);
        assert!(errs.is_empty());
        check_width(&mut errs, "spec.displayName", &"a".repeat(31), 30);
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].field, "spec.displayName");
    }

    #[tokio::test]
    async fn test_release_namespace_tolerates_absence() {
        let clients = Clients::memory(crate::client::AlignRetry::default());
        release_namespace(&clients, "missing").await.unwrap();

        let mut ns = Namespace {
            metadata: ObjectMeta {
                name: Some("acme".to_string()),
                ..ObjectMeta::default()
            },
            ..Namespace::default()
        };
        systemmeta::lock(&mut ns);
        clients
            .namespaces
            .create(&ns, &crate::extensionapi::CreateOptions::default())
            .await
            .unwrap();
        release_namespace(&clients, "acme").await.unwrap();
        assert!(clients.namespaces.get(None, "acme").await.unwrap_err().is_not_found());
    }
}
