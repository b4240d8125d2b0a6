//! # System Authorization
//!
//! RBAC objects backing Projects and Environments.
//!
//! - Each Project owns a *space*: two ClusterRoles,
//!   `walrus-project-<project>-space-viewer` and `-space-editor`.
//! - Each Environment of the Project adds one rule to both roles, scoped
//!   by resource name to the Environment.
//! - Each subject of a Project is one ClusterRoleBinding to the
//!   ClusterRole named by its role.

use anyhow::{Context, Result};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, PolicyRule, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tracing::{debug, info};

use crate::apis::walrus::v1::ProjectSubject;
use crate::client::{update_with_align, Aligned, Clients, ObjectClient as _, UpdateMode};
use crate::constants::WALRUS_GROUP;
use crate::extensionapi::{DeleteOptions, ListOptions};
use crate::systemmeta::{self, ResourceNotes};

const RBAC_GROUP: &str = "rbac.authorization.k8s.io";

/// Kind of a project subject when left empty.
pub const DEFAULT_SUBJECT_KIND: &str = "User";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SpaceRole {
    Viewer,
    Editor,
}

impl SpaceRole {
    const ALL: [SpaceRole; 2] = [Self::Viewer, Self::Editor];

    fn name(self, project: &str) -> String {
        match self {
            Self::Viewer => format!("walrus-project-{project}-space-viewer"),
            Self::Editor => format!("walrus-project-{project}-space-editor"),
        }
    }

    fn verbs(self) -> Vec<String> {
        let verbs: &[&str] = match self {
            Self::Viewer => &["get", "list", "watch"],
            Self::Editor => &["*"],
        };
        verbs.iter().map(ToString::to_string).collect()
    }

    fn rule_for(self, environment: &str) -> PolicyRule {
        PolicyRule {
            api_groups: Some(vec![String::new(), WALRUS_GROUP.to_string()]),
            resources: Some(vec!["namespaces".to_string(), "environments".to_string()]),
            resource_names: Some(vec![environment.to_string()]),
            verbs: self.verbs(),
            non_resource_urls: None,
        }
    }

    fn expected(self, project: &str, rules: Vec<PolicyRule>) -> ClusterRole {
        let mut role = ClusterRole {
            metadata: ObjectMeta {
                name: Some(self.name(project)),
                ..ObjectMeta::default()
            },
            rules: Some(rules),
            ..ClusterRole::default()
        };
        systemmeta::note_resource(&mut role, "roles", project_notes(project));
        role
    }
}

fn project_notes(project: &str) -> ResourceNotes {
    ResourceNotes::from([("project".to_string(), project.to_string())])
}

fn names_environment(rule: &PolicyRule, environment: &str) -> bool {
    rule.resource_names
        .as_ref()
        .is_some_and(|names| names.len() == 1 && names[0] == environment)
}

/// Create the space ClusterRoles of a Project, keeping existing ones.
pub async fn create_project_space(clients: &Clients, project: &str) -> Result<()> {
    for role in SpaceRole::ALL {
        let expected = role.expected(project, Vec::new());
        update_with_align(
            clients.cluster_roles.as_ref(),
            &expected,
            UpdateMode::UpdateOrCreate,
            &clients.align,
            |_| Ok(Aligned::Skip),
        )
        .await
        .with_context(|| format!("create cluster role {}", role.name(project)))?;
    }
    info!(project, "created project space");
    Ok(())
}

/// Delete the space ClusterRoles of a Project; absent roles are fine.
pub async fn delete_project_space(clients: &Clients, project: &str) -> Result<()> {
    for role in SpaceRole::ALL {
        let expected = role.expected(project, Vec::new());
        match clients.cluster_roles.delete(&expected, &DeleteOptions::default()).await {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {}
            Err(err) => {
                return Err(err).with_context(|| format!("delete cluster role {}", role.name(project)));
            }
        }
    }
    info!(project, "deleted project space");
    Ok(())
}

/// Grant the space roles of `project` on `environment`.
pub async fn create_environment_space(clients: &Clients, project: &str, environment: &str) -> Result<()> {
    for role in SpaceRole::ALL {
        let rule = role.rule_for(environment);
        let expected = role.expected(project, vec![rule.clone()]);
        update_with_align(
            clients.cluster_roles.as_ref(),
            &expected,
            UpdateMode::UpdateOrCreate,
            &clients.align,
            |mut current: ClusterRole| {
                let rules = current.rules.get_or_insert_with(Vec::new);
                if rules.iter().any(|r| names_environment(r, environment)) {
                    return Ok(Aligned::Skip);
                }
                rules.push(rule.clone());
                Ok(Aligned::Update(current))
            },
        )
        .await
        .with_context(|| format!("grant cluster role {} on {environment}", role.name(project)))?;
    }
    debug!(project, environment, "created environment space");
    Ok(())
}

/// Revoke the space roles of `project` on `environment`.
pub async fn delete_environment_space(clients: &Clients, project: &str, environment: &str) -> Result<()> {
    for role in SpaceRole::ALL {
        let expected = role.expected(project, Vec::new());
        let revoked = update_with_align(
            clients.cluster_roles.as_ref(),
            &expected,
            UpdateMode::UpdateOnly,
            &clients.align,
            |mut current: ClusterRole| {
                let Some(rules) = current.rules.as_mut() else {
                    return Ok(Aligned::Skip);
                };
                let before = rules.len();
                rules.retain(|r| !names_environment(r, environment));
                if rules.len() == before {
                    return Ok(Aligned::Skip);
                }
                Ok(Aligned::Update(current))
            },
        )
        .await;
        match revoked {
            Ok(_) => {}
            Err(err) if crate::extensionapi::is_not_found(&err) => {}
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("revoke cluster role {} on {environment}", role.name(project)));
            }
        }
    }
    debug!(project, environment, "deleted environment space");
    Ok(())
}

/// Name of the ClusterRoleBinding of `subject` in `project`.
#[must_use]
pub fn binding_name(project: &str, subject: &ProjectSubject) -> String {
    let kind = subject_kind(subject);
    let key = format!("{}/{kind}/{}", subject.role, subject.name);
    let id = uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_OID, key.as_bytes());
    format!("walrus-project-{project}-{}", id.simple())
}

fn subject_kind(subject: &ProjectSubject) -> &str {
    if subject.kind.is_empty() {
        DEFAULT_SUBJECT_KIND
    } else {
        &subject.kind
    }
}

fn expected_binding(project: &str, subject: &ProjectSubject) -> ClusterRoleBinding {
    let kind = subject_kind(subject);
    let mut binding = ClusterRoleBinding {
        metadata: ObjectMeta {
            name: Some(binding_name(project, subject)),
            ..ObjectMeta::default()
        },
        role_ref: RoleRef {
            api_group: RBAC_GROUP.to_string(),
            kind: "ClusterRole".to_string(),
            name: subject.role.clone(),
        },
        subjects: Some(vec![Subject {
            api_group: (kind != "ServiceAccount").then(|| RBAC_GROUP.to_string()),
            kind: kind.to_string(),
            name: subject.name.clone(),
            namespace: None,
        }]),
    };
    systemmeta::note_resource(&mut binding, "rolebindings", project_notes(project));
    binding
}

/// Bind `subject` into `project`; an existing binding is kept.
pub async fn bind_project_subject(clients: &Clients, project: &str, subject: &ProjectSubject) -> Result<()> {
    let expected = expected_binding(project, subject);
    update_with_align(
        clients.cluster_role_bindings.as_ref(),
        &expected,
        UpdateMode::UpdateOrCreate,
        &clients.align,
        |_| Ok(Aligned::Skip),
    )
    .await
    .with_context(|| format!("bind {} {} as {}", subject_kind(subject), subject.name, subject.role))?;
    Ok(())
}

/// Unbind `subject` from `project`; an absent binding is fine.
pub async fn unbind_project_subject(clients: &Clients, project: &str, subject: &ProjectSubject) -> Result<()> {
    let expected = expected_binding(project, subject);
    match clients
        .cluster_role_bindings
        .delete(&expected, &DeleteOptions::default())
        .await
    {
        Ok(()) => Ok(()),
        Err(err) if err.is_not_found() => Ok(()),
        Err(err) => Err(err)
            .with_context(|| format!("unbind {} {} as {}", subject_kind(subject), subject.name, subject.role)),
    }
}

/// ClusterRoleBindings of `project`.
pub async fn list_project_bindings(clients: &Clients, project: &str) -> Result<Vec<ClusterRoleBinding>> {
    let opts = ListOptions::default().with_label_selector(systemmeta::resources_label_selector_of("rolebindings"));
    let list = clients
        .cluster_role_bindings
        .list(&opts)
        .await
        .context("list cluster role bindings")?;
    Ok(systemmeta::filter_resource_list_by_notes(list.items, &[("project", project)]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::AlignRetry;

    fn rules_of(role: &ClusterRole) -> Vec<String> {
        role.rules
            .iter()
            .flatten()
            .flat_map(|r| r.resource_names.clone().unwrap_or_default())
            .collect()
    }

    #[tokio::test]
    async fn test_environment_space_lifecycle() {
        let clients = Clients::memory(AlignRetry::default());
        create_project_space(&clients, "acme").await.unwrap();
        create_environment_space(&clients, "acme", "acme-dev").await.unwrap();
        create_environment_space(&clients, "acme", "acme-dev").await.unwrap();
        create_environment_space(&clients, "acme", "acme-qa").await.unwrap();

        let viewer = clients
            .cluster_roles
            .get(None, "walrus-project-acme-space-viewer")
            .await
            .unwrap();
        assert_eq!(rules_of(&viewer), vec!["acme-dev", "acme-qa"]);
        assert_eq!(systemmeta::describe_resource_type(&viewer), "roles");
        assert_eq!(systemmeta::describe_resource_note(&viewer, "project"), "acme");

        let editor = clients
            .cluster_roles
            .get(None, "walrus-project-acme-space-editor")
            .await
            .unwrap();
        assert_eq!(editor.rules.as_ref().unwrap()[0].verbs, vec!["*"]);

        delete_environment_space(&clients, "acme", "acme-dev").await.unwrap();
        let viewer = clients
            .cluster_roles
            .get(None, "walrus-project-acme-space-viewer")
            .await
            .unwrap();
        assert_eq!(rules_of(&viewer), vec!["acme-qa"]);

        delete_project_space(&clients, "acme").await.unwrap();
        delete_project_space(&clients, "acme").await.unwrap();
        delete_environment_space(&clients, "acme", "acme-qa").await.unwrap();
    }

    #[tokio::test]
    async fn test_bind_and_unbind_subjects() {
        let clients = Clients::memory(AlignRetry::default());
        let alice = ProjectSubject {
            kind: String::new(),
            name: "alice".to_string(),
            role: "walrus-project-owner".to_string(),
        };
        bind_project_subject(&clients, "acme", &alice).await.unwrap();
        bind_project_subject(&clients, "acme", &alice).await.unwrap();
        bind_project_subject(&clients, "other", &alice).await.unwrap();

        let bindings = list_project_bindings(&clients, "acme").await.unwrap();
        assert_eq!(bindings.len(), 1);
        let subject = &bindings[0].subjects.as_ref().unwrap()[0];
        assert_eq!(subject.kind, "User");
        assert_eq!(bindings[0].role_ref.name, "walrus-project-owner");

        unbind_project_subject(&clients, "acme", &alice).await.unwrap();
        unbind_project_subject(&clients, "acme", &alice).await.unwrap();
        assert!(list_project_bindings(&clients, "acme").await.unwrap().is_empty());
        assert_eq!(list_project_bindings(&clients, "other").await.unwrap().len(), 1);
    }

    #[test]
    fn test_binding_name_is_stable_per_project() {
        let subject = ProjectSubject {
            kind: "User".to_string(),
            name: "bob".to_string(),
            role: "walrus-project-viewer".to_string(),
        };
        let mut implicit = subject.clone();
        implicit.kind.clear();
        assert_eq!(binding_name("acme", &subject), binding_name("acme", &implicit));
        assert_ne!(binding_name("acme", &subject), binding_name("other", &subject));
    }
}
