//! Subjects of a Project, served as the `projects/subjects` subresource
//! over the Project's ClusterRoleBindings.

use async_trait::async_trait;
use k8s_openapi::api::rbac::v1::ClusterRoleBinding;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;

use super::project::project_from_namespace;
use super::{qualified, PROJECTS};
use crate::apis::walrus::v1::{ProjectSubject, ProjectSubjectRole, ProjectSubjects};
use crate::client::{Clients, ObjectClient as _};
use crate::extensionapi::{
    name_of, FieldError, FieldErrorList, GetHandler, GetOperation, GetOptions, ObjectKey, RequestContext,
    ResourceHandler, RestStorage, StatusError, Storage, UpdateHandler, UpdateOperation, UpdateOptions,
};
use crate::extensionapis::SetupOptions;
use crate::systemauthz::{self, DEFAULT_SUBJECT_KIND};

const PROJECT_SUBJECTS: &str = "projectsubjects";

pub fn storage(opts: &SetupOptions) -> Arc<dyn RestStorage> {
    let handler = Arc::new(ProjectSubjectsHandler::new(opts.clients.clone(), &opts.system_namespace));
    Arc::new(
        Storage::new(true)
            .with_getter(Arc::new(GetOperation::new(Arc::clone(&handler))))
            .with_updater(Arc::new(UpdateOperation::new(handler)))
            .with_update_validation(Arc::new(validate_update)),
    )
}

fn with_default_kind(mut subject: ProjectSubject) -> ProjectSubject {
    if subject.kind.is_empty() {
        subject.kind = DEFAULT_SUBJECT_KIND.to_string();
    }
    subject
}

/// Check the subjects being added.
pub(crate) fn validate_update(subjects: &ProjectSubjects, existing: &ProjectSubjects) -> Result<(), StatusError> {
    let known: BTreeSet<ProjectSubject> = existing.items.iter().cloned().map(with_default_kind).collect();
    let mut errs = FieldErrorList::new();
    for (i, subject) in subjects.items.iter().enumerate() {
        if known.contains(&with_default_kind(subject.clone())) {
            continue;
        }
        if subject.name.trim().is_empty() {
            errs.push(FieldError::forbidden(format!("items[{i}].name"), "blank string"));
        }
        if subject.role.parse::<ProjectSubjectRole>().is_err() {
            errs.push(FieldError::invalid(
                format!("items[{i}].role"),
                &subject.role,
                "unknown project subject role",
            ));
        }
    }
    if errs.is_empty() {
        return Ok(());
    }
    Err(StatusError::invalid(&qualified(PROJECT_SUBJECTS), name_of(subjects), errs))
}

/// The subject a binding grants, when it binds exactly one subject to a
/// project role.
fn subject_from_binding(binding: &ClusterRoleBinding) -> Option<ProjectSubject> {
    let [subject] = binding.subjects.as_deref()? else {
        return None;
    };
    let role: ProjectSubjectRole = binding.role_ref.name.parse().ok()?;
    Some(ProjectSubject {
        kind: subject.kind.clone(),
        name: subject.name.clone(),
        role: role.to_string(),
    })
}

pub struct ProjectSubjectsHandler {
    clients: Clients,
    system_namespace: String,
}

impl std::fmt::Debug for ProjectSubjectsHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectSubjectsHandler")
            .field("system_namespace", &self.system_namespace)
            .finish_non_exhaustive()
    }
}

impl ProjectSubjectsHandler {
    #[must_use]
    pub fn new(clients: Clients, system_namespace: &str) -> Self {
        Self {
            clients,
            system_namespace: system_namespace.to_string(),
        }
    }

    fn not_found(name: &str) -> anyhow::Error {
        StatusError::not_found(&qualified(PROJECT_SUBJECTS), name).into()
    }
}

impl ResourceHandler for ProjectSubjectsHandler {
    type Object = ProjectSubjects;

    fn namespace_scoped(&self) -> bool {
        true
    }
}

#[async_trait]
impl GetHandler for ProjectSubjectsHandler {
    async fn on_get(&self, _ctx: &RequestContext, key: &ObjectKey, _opts: &GetOptions) -> anyhow::Result<ProjectSubjects> {
        if key.namespace() != self.system_namespace {
            return Err(Self::not_found(&key.name));
        }
        let ns = match self.clients.namespaces.get(None, &key.name).await {
            Ok(ns) => ns,
            Err(err) if err.is_not_found() => return Err(Self::not_found(&key.name)),
            Err(err) => return Err(StatusError::internal(err).into()),
        };
        let Some(project) = project_from_namespace(ns, &self.system_namespace) else {
            return Err(Self::not_found(&key.name));
        };

        let bindings = systemauthz::list_project_bindings(&self.clients, &key.name)
            .await
            .map_err(|err| StatusError::internal(format!("{err:#}")))?;
        let mut items: Vec<ProjectSubject> = bindings.iter().filter_map(subject_from_binding).collect();
        items.sort();
        Ok(ProjectSubjects {
            metadata: project.metadata,
            items,
        })
    }
}

#[async_trait]
impl UpdateHandler for ProjectSubjectsHandler {
    async fn on_update(
        &self,
        ctx: &RequestContext,
        subjects: ProjectSubjects,
        old: ProjectSubjects,
        _opts: &UpdateOptions,
    ) -> anyhow::Result<ProjectSubjects> {
        let project = name_of(&old).to_string();
        let wanted: BTreeSet<ProjectSubject> = subjects.items.into_iter().map(with_default_kind).collect();
        let current: BTreeSet<ProjectSubject> = old.items.into_iter().map(with_default_kind).collect();

        for removed in current.difference(&wanted) {
            systemauthz::unbind_project_subject(&self.clients, &project, removed)
                .await
                .map_err(|err| StatusError::internal(format!("unbind project subject role: {err:#}")))?;
        }
        for added in wanted.difference(&current) {
            systemauthz::bind_project_subject(&self.clients, &project, added)
                .await
                .map_err(|err| StatusError::internal(format!("bind project subject role: {err:#}")))?;
        }
        info!(
            project = %project,
            subjects = wanted.len(),
            "updated project subjects"
        );

        let key = ObjectKey::new(Some(self.system_namespace.as_str()), project);
        self.on_get(ctx, &key, &GetOptions::default()).await
    }
}
