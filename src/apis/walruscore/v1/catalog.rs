//! Catalog: a VCS organization or group whose repositories are imported as
//! Templates.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::Condition;

#[derive(CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "walruscore.seal.io",
    version = "v1",
    kind = "Catalog",
    namespaced,
    status = "CatalogStatus",
    derive = "PartialEq",
    derive = "Default",
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct CatalogSpec {
    /// Whether the catalog ships with Walrus
    #[serde(default)]
    pub builtin: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Format of the imported templates, e.g. "terraform"
    #[serde(default)]
    pub template_format: String,
    #[serde(default)]
    pub vcs_source: VcsSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filtering: Option<Filtering>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VcsSource {
    /// "github", "gitlab" or "gitee"
    pub platform: String,
    pub url: String,
}

/// Regular expressions selecting which repositories are imported.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Filtering {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub include_filter: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub exclude_filter: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CatalogStatus {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub phase: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub project: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
    #[serde(default)]
    pub templates_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync_time: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}
