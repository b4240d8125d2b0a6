//! # walruscore.seal.io/v1
//!
//! Custom resources persisted by Kubernetes and reconciled by the
//! walruscore controllers. The `walrus.seal.io` group serves mirrors of
//! them through proxy handlers.

mod catalog;
mod connector;
mod resource;
mod template;

pub use catalog::{Catalog, CatalogSpec, CatalogStatus, Filtering, VcsSource};
pub use connector::{Connector, ConnectorSpec, ConnectorStatus};
pub use resource::{
    Resource, ResourceDefinition, ResourceDefinitionMatchingRule, ResourceDefinitionSpec,
    ResourceDefinitionStatus, ResourceRun, ResourceRunSpec, ResourceRunStatus, ResourceSpec,
    ResourceStatus, TemplateReference,
};
pub use template::{Template, TemplateSpec, TemplateStatus, TemplateVersion};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Condition of a reconciled resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Condition type, e.g. "Ready"
    #[serde(rename = "type")]
    pub r#type: String,
    /// "True", "False" or "Unknown"
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}
