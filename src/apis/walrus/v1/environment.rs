use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::extensionapi::{FieldError, HasStatusSubresource};

/// An Environment is a deployment target inside a Project.
///
/// It is served in the namespace of its Project and backed by a Namespace
/// named after it, which the Project's Namespace controls.
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "walrus.seal.io",
    version = "v1",
    kind = "Environment",
    namespaced,
    status = "EnvironmentStatus",
    derive = "PartialEq",
    derive = "Default",
    printcolumn = r#"{"name":"Type", "type":"string", "jsonPath":".spec.type"}, {"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentSpec {
    /// One of [`EnvironmentType`], kept as text so unknown values surface
    /// as validation errors instead of decode errors
    #[serde(default)]
    pub r#type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentStatus {
    /// Name of the owning Project
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub project: String,
    /// Phase of the backing Namespace
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub phase: String,
}

impl HasStatusSubresource for Environment {
    type Status = EnvironmentStatus;

    fn status(&self) -> Option<&EnvironmentStatus> {
        self.status.as_ref()
    }

    fn set_status(&mut self, status: Option<EnvironmentStatus>) {
        self.status = status;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvironmentType {
    Development,
    Staging,
    Production,
}

impl EnvironmentType {
    pub const ALL: [EnvironmentType; 3] = [Self::Development, Self::Staging, Self::Production];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Staging => "staging",
            Self::Production => "production",
        }
    }

    /// Validate `value` as the `spec.type` of an Environment.
    pub fn validate(value: &str) -> Result<Self, FieldError> {
        value.parse().map_err(|()| {
            FieldError::not_supported(
                "spec.type",
                value,
                &Self::ALL.map(EnvironmentType::as_str),
            )
        })
    }
}

impl FromStr for EnvironmentType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, ()> {
        Self::ALL.into_iter().find(|t| t.as_str() == s).ok_or(())
    }
}

impl fmt::Display for EnvironmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
