use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A Variable is a named value shared by the templates of a scope: the
/// whole system, one Project or one Environment.
///
/// Each is one key of the `walrus-variables` Secret in the namespace of
/// its scope.
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "walrus.seal.io",
    version = "v1",
    kind = "Variable",
    namespaced,
    status = "VariableStatus",
    derive = "PartialEq",
    derive = "Default",
    printcolumn = r#"{"name":"Value", "type":"string", "jsonPath":".status.value"}, {"name":"Environment", "type":"string", "jsonPath":".status.environment"}, {"name":"Project", "type":"string", "jsonPath":".status.project"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct VariableSpec {
    /// New value, only meaningful on create and update
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default)]
    pub sensitive: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VariableStatus {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub project: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub environment: String,
    /// Exposed value, masked when sensitive
    #[serde(default)]
    pub value: String,
    /// Raw value, never serialized
    #[serde(skip)]
    pub value_: String,
}

impl Variable {
    /// Whether the two variables carry the same spec and raw value.
    #[must_use]
    pub fn equal(&self, other: &Variable) -> bool {
        self.spec == other.spec && self.raw_value() == other.raw_value()
    }

    #[must_use]
    pub fn raw_value(&self) -> &str {
        self.status.as_ref().map_or("", |s| s.value_.as_str())
    }

    #[must_use]
    pub fn project(&self) -> &str {
        self.status.as_ref().map_or("", |s| s.project.as_str())
    }

    #[must_use]
    pub fn environment(&self) -> &str {
        self.status.as_ref().map_or("", |s| s.environment.as_str())
    }
}
