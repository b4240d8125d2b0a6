//! Read-only example content served to the UI.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Example file shown when authoring a template.
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "walrus.seal.io",
    version = "v1",
    kind = "FileExample",
    status = "FileExampleStatus",
    derive = "PartialEq",
    derive = "Default"
)]
pub struct FileExampleSpec {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FileExampleStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    pub content: String,
}

/// Example prompt for completing a template with a language model.
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "walrus.seal.io",
    version = "v1",
    kind = "TemplateCompletionExample",
    status = "TemplateCompletionExampleStatus",
    derive = "PartialEq",
    derive = "Default"
)]
pub struct TemplateCompletionExampleSpec {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TemplateCompletionExampleStatus {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub prompt: String,
}
