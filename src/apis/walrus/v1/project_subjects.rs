use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::core::NamespaceResourceScope;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

use crate::apis::impl_served_resource;
use crate::constants::WALRUS_GROUP;

/// Subjects bound to a Project, served as the `projects/subjects`
/// subresource.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ProjectSubjects {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub items: Vec<ProjectSubject>,
}

impl_served_resource!(
    ProjectSubjects,
    group = WALRUS_GROUP,
    kind = "ProjectSubjects",
    plural = "projectsubjects",
    scope = NamespaceResourceScope,
    fields = [items => "items"],
);

#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSubject {
    /// "User", "Group" or "ServiceAccount"; "User" when empty
    #[serde(default)]
    pub kind: String,
    pub name: String,
    /// One of [`ProjectSubjectRole`]
    pub role: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProjectSubjectRole {
    Viewer,
    Member,
    Owner,
}

impl ProjectSubjectRole {
    pub const ALL: [ProjectSubjectRole; 3] = [Self::Viewer, Self::Member, Self::Owner];

    /// Name of the ClusterRole granting this role.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Viewer => "walrus-project-viewer",
            Self::Member => "walrus-project-member",
            Self::Owner => "walrus-project-owner",
        }
    }
}

impl FromStr for ProjectSubjectRole {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, ()> {
        Self::ALL.into_iter().find(|r| r.as_str() == s).ok_or(())
    }
}

impl fmt::Display for ProjectSubjectRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
