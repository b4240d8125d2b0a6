use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::extensionapi::HasStatusSubresource;

/// A Project groups Environments and owns the subjects allowed into them.
///
/// Projects live in the system namespace; each is backed by a Namespace
/// of the same name.
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "walrus.seal.io",
    version = "v1",
    kind = "Project",
    namespaced,
    status = "ProjectStatus",
    derive = "PartialEq",
    derive = "Default"
)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSpec {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProjectStatus {
    /// Phase of the backing Namespace
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub phase: String,
}

impl HasStatusSubresource for Project {
    type Status = ProjectStatus;

    fn status(&self) -> Option<&ProjectStatus> {
        self.status.as_ref()
    }

    fn set_status(&mut self, status: Option<ProjectStatus>) {
        self.status = status;
    }
}
