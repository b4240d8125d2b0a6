//! # Object Clients
//!
//! The Kubernetes client contract consumed by resource handlers, with a
//! `kube`-backed implementation for clusters and an in-memory one for tests
//! and development.
//!
//! Client errors are [`StatusError`]s, so handlers can tell `NotFound`
//! and `Conflict` apart and pass them through unchanged.

mod align;
mod cluster;
mod memory;

pub use self::align::{update_with_align, AlignRetry, Aligned, UpdateMode};
pub use self::cluster::KubeObjectClient;
pub use self::memory::{MemoryClock, MemoryObjectClient};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, Secret};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding};
use std::sync::Arc;

use crate::apis::walruscore::v1 as walruscore;
use crate::extensionapi::{
    ApiObject, CreateOptions, DeleteOptions, ListOptions, ObjectList, ProxyWatcher, StatusError,
    UpdateOptions,
};

/// Typed access to one kind of Kubernetes object.
#[async_trait]
pub trait ObjectClient<K: ApiObject>: Send + Sync {
    /// `namespace` is ignored for cluster-scoped kinds.
    async fn get(&self, namespace: Option<&str>, name: &str) -> Result<K, StatusError>;

    async fn list(&self, opts: &ListOptions) -> Result<ObjectList<K>, StatusError>;

    async fn watch(&self, opts: &ListOptions) -> Result<ProxyWatcher<K>, StatusError>;

    async fn create(&self, obj: &K, opts: &CreateOptions) -> Result<K, StatusError>;

    /// Replace the object; a non-empty resource version must match the
    /// stored one.
    async fn update(&self, obj: &K, opts: &UpdateOptions) -> Result<K, StatusError>;

    async fn delete(&self, obj: &K, opts: &DeleteOptions) -> Result<(), StatusError>;
}

/// Per-kind clients shared by every handler and controller.
#[derive(Clone)]
pub struct Clients {
    pub namespaces: Arc<dyn ObjectClient<Namespace>>,
    pub secrets: Arc<dyn ObjectClient<Secret>>,
    pub cluster_roles: Arc<dyn ObjectClient<ClusterRole>>,
    pub cluster_role_bindings: Arc<dyn ObjectClient<ClusterRoleBinding>>,
    pub catalogs: Arc<dyn ObjectClient<walruscore::Catalog>>,
    pub connectors: Arc<dyn ObjectClient<walruscore::Connector>>,
    pub resources: Arc<dyn ObjectClient<walruscore::Resource>>,
    pub resource_definitions: Arc<dyn ObjectClient<walruscore::ResourceDefinition>>,
    pub resource_runs: Arc<dyn ObjectClient<walruscore::ResourceRun>>,
    pub templates: Arc<dyn ObjectClient<walruscore::Template>>,
    pub align: AlignRetry,
}

impl std::fmt::Debug for Clients {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Clients")
            .field("align", &self.align)
            .finish_non_exhaustive()
    }
}

impl Clients {
    /// Clients talking to a cluster.
    pub fn kube(client: ::kube::Client, align: AlignRetry) -> Self {
        Self {
            namespaces: Arc::new(KubeObjectClient::cluster(client.clone())),
            secrets: Arc::new(KubeObjectClient::namespaced(client.clone())),
            cluster_roles: Arc::new(KubeObjectClient::cluster(client.clone())),
            cluster_role_bindings: Arc::new(KubeObjectClient::cluster(client.clone())),
            catalogs: Arc::new(KubeObjectClient::namespaced(client.clone())),
            connectors: Arc::new(KubeObjectClient::namespaced(client.clone())),
            resources: Arc::new(KubeObjectClient::namespaced(client.clone())),
            resource_definitions: Arc::new(KubeObjectClient::namespaced(client.clone())),
            resource_runs: Arc::new(KubeObjectClient::namespaced(client.clone())),
            templates: Arc::new(KubeObjectClient::namespaced(client)),
            align,
        }
    }

    /// Clients over in-memory stores sharing one resource version clock.
    pub fn memory(align: AlignRetry) -> Self {
        let clock = MemoryClock::default();
        Self {
            namespaces: Arc::new(MemoryObjectClient::cluster(clock.clone())),
            secrets: Arc::new(MemoryObjectClient::namespaced(clock.clone())),
            cluster_roles: Arc::new(MemoryObjectClient::cluster(clock.clone())),
            cluster_role_bindings: Arc::new(MemoryObjectClient::cluster(clock.clone())),
            catalogs: Arc::new(MemoryObjectClient::namespaced(clock.clone())),
            connectors: Arc::new(MemoryObjectClient::namespaced(clock.clone())),
            resources: Arc::new(MemoryObjectClient::namespaced(clock.clone())),
            resource_definitions: Arc::new(MemoryObjectClient::namespaced(clock.clone())),
            resource_runs: Arc::new(MemoryObjectClient::namespaced(clock.clone())),
            templates: Arc::new(MemoryObjectClient::namespaced(clock)),
            align,
        }
    }
}
