//! Mirrors of the walruscore resources served under `walrus.seal.io`.
//!
//! Each mirror shares the spec and status types of its walruscore
//! counterpart; conversion moves the fields across one by one.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::core::NamespaceResourceScope;
use serde::Deserialize;

use crate::apis::impl_served_resource;
use crate::apis::walruscore::v1 as walruscore;
use crate::constants::WALRUS_GROUP;
use crate::extensionapi::ProxiedObject;

macro_rules! proxied_resource {
    ($(#[$doc:meta])* $kind:ident, $plural:literal, $spec:ty, $status:ty) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Default, PartialEq, Deserialize)]
        pub struct $kind {
            #[serde(default)]
            pub metadata: ObjectMeta,
            #[serde(default)]
            pub spec: $spec,
            #[serde(default)]
            pub status: Option<$status>,
        }

        impl_served_resource!(
            $kind,
            group = WALRUS_GROUP,
            kind = stringify!($kind),
            plural = $plural,
            scope = NamespaceResourceScope,
            fields = [spec => "spec", status => "status"],
        );

        impl ProxiedObject for $kind {
            type Upstream = walruscore::$kind;

            fn into_upstream(self) -> walruscore::$kind {
                walruscore::$kind {
                    metadata: self.metadata,
                    spec: self.spec,
                    status: self.status,
                }
            }

            fn from_upstream(upstream: walruscore::$kind) -> Self {
                Self {
                    metadata: upstream.metadata,
                    spec: upstream.spec,
                    status: upstream.status,
                }
            }
        }
    };
}

proxied_resource!(
    /// Mirror of [`walruscore::Catalog`].
    Catalog,
    "catalogs",
    walruscore::CatalogSpec,
    walruscore::CatalogStatus
);

proxied_resource!(
    /// Mirror of [`walruscore::Connector`].
    Connector,
    "connectors",
    walruscore::ConnectorSpec,
    walruscore::ConnectorStatus
);

proxied_resource!(
    /// Mirror of [`walruscore::Resource`].
    Resource,
    "resources",
    walruscore::ResourceSpec,
    walruscore::ResourceStatus
);

proxied_resource!(
    /// Mirror of [`walruscore::ResourceDefinition`].
    ResourceDefinition,
    "resourcedefinitions",
    walruscore::ResourceDefinitionSpec,
    walruscore::ResourceDefinitionStatus
);

proxied_resource!(
    /// Mirror of [`walruscore::ResourceRun`].
    ResourceRun,
    "resourceruns",
    walruscore::ResourceRunSpec,
    walruscore::ResourceRunStatus
);

proxied_resource!(
    /// Mirror of [`walruscore::Template`].
    Template,
    "templates",
    walruscore::TemplateSpec,
    walruscore::TemplateStatus
);
