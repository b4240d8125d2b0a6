use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A Setting is one system-wide configuration entry, stored as one key of
/// the `walrus-settings` Secret.
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "walrus.seal.io",
    version = "v1",
    kind = "Setting",
    namespaced,
    status = "SettingStatus",
    derive = "PartialEq",
    derive = "Default",
    printcolumn = r#"{"name":"Value", "type":"string", "jsonPath":".status.value"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct SettingSpec {
    /// New value, only meaningful on update
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SettingStatus {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub editable: bool,
    #[serde(default)]
    pub sensitive: bool,
    /// Exposed value, masked when sensitive
    #[serde(default)]
    pub value: String,
    /// Raw value, never serialized
    #[serde(skip)]
    pub value_: String,
}

impl Setting {
    /// Whether the two settings carry the same spec and raw value.
    #[must_use]
    pub fn equal(&self, other: &Setting) -> bool {
        self.spec == other.spec && self.raw_value() == other.raw_value()
    }

    /// Raw value, empty when the status is unset.
    #[must_use]
    pub fn raw_value(&self) -> &str {
        self.status.as_ref().map_or("", |s| s.value_.as_str())
    }
}
