//! # Projects
//!
//! A Project is a Namespace labelled `projects`, served in the system
//! namespace. Creating a Project also creates its space ClusterRoles;
//! deleting it removes them.

use anyhow::anyhow;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use kube::Resource;
use std::sync::Arc;
use tracing::{debug_span, info};

use super::{check_width, qualified, release_namespace, NamespaceFilter, ENVIRONMENTS, PROJECTS};
use crate::apis::walrus::v1::{Project, ProjectSpec, ProjectStatus};
use crate::client::{Clients, ObjectClient as _};
use crate::constants::{
    DEFAULT_PROJECT_NAME, MAX_DESCRIPTION_WIDTH, MAX_DISPLAY_NAME_WIDTH, MAX_NAME_WIDTH, RESERVED_PROJECT_NAMES,
};
use crate::extensionapi::{
    name_of, namespace_of, resource_version_of, sort_by_resource_version, translate_watch, CreateHandler,
    CreateOptions, CurdOperations, DefaultTableConvertor, DeleteHandler, DeleteOptions, FieldError,
    FieldErrorList, GetHandler, GetOptions, ListHandler, ListOptions, ObjectKey, ObjectList, ProxyWatcher,
    RequestContext, ResourceHandler, Storage, StatusError, TableColumn, TableConvertor, UpdateHandler,
    UpdateOptions, WatchEvent, WatchHandler,
};
use crate::extensionapis::walrus::project_subjects;
use crate::extensionapis::{ResourceStorages, SetupOptions};
use crate::kubemeta;
use crate::systemauthz;
use crate::systemmeta::{self, ResourceNotes};

pub fn setup(opts: &SetupOptions) -> ResourceStorages {
    let handler = Arc::new(ProjectHandler::new(opts.clients.clone(), &opts.system_namespace));
    let table: Arc<dyn TableConvertor<Project>> = Arc::new(DefaultTableConvertor::with_columns(vec![
        TableColumn::new("Phase", "string", ".status.phase"),
    ]));

    let mut ops = CurdOperations::new(Some(table), handler);
    let status_updater = ops.create_update.update.status_subresource_updater();
    ops.create_update.update = ops.create_update.update.clone().preventing_status_modify();

    let system_namespace = opts.system_namespace.clone();
    let storage = ops
        .storage(true)
        .with_create_validation(Arc::new(move |proj: &Project| validate_create(&system_namespace, proj)))
        .with_update_validation(Arc::new(|proj: &Project, _: &Project| validate_update(proj)));
    let status = Storage::new(true)
        .with_getter(Arc::new(ops.get.clone()))
        .with_updater(Arc::new(status_updater));

    ResourceStorages::new(PROJECTS, Arc::new(storage))
        .with_subresource("status", Arc::new(status))
        .with_subresource("subjects", project_subjects::storage(opts))
}

fn validate_descriptions(errs: &mut FieldErrorList, spec: &ProjectSpec) {
    check_width(errs, "spec.displayName", &spec.display_name, MAX_DISPLAY_NAME_WIDTH);
    check_width(errs, "spec.description", &spec.description, MAX_DESCRIPTION_WIDTH);
}

fn into_result(proj: &Project, errs: FieldErrorList) -> Result<(), StatusError> {
    if errs.is_empty() {
        return Ok(());
    }
    Err(StatusError::invalid(&qualified(PROJECTS), name_of(proj), errs))
}

pub(crate) fn validate_create(system_namespace: &str, proj: &Project) -> Result<(), StatusError> {
    let mut errs = FieldErrorList::new();
    let name = name_of(proj);
    if namespace_of(proj) != system_namespace {
        errs.push(FieldError::invalid(
            "metadata.namespace",
            namespace_of(proj),
            format!("project namespace must be {system_namespace}"),
        ));
    }
    if RESERVED_PROJECT_NAMES.contains(&name) {
        errs.push(FieldError::invalid("metadata.name", name, "project name is reserved"));
    }
    check_width(&mut errs, "metadata.name", name, MAX_NAME_WIDTH);
    validate_descriptions(&mut errs, &proj.spec);
    into_result(proj, errs)
}

pub(crate) fn validate_update(proj: &Project) -> Result<(), StatusError> {
    let mut errs = FieldErrorList::new();
    validate_descriptions(&mut errs, &proj.spec);
    into_result(proj, errs)
}

pub(crate) fn namespace_from_project(proj: &Project) -> Namespace {
    let mut ns = Namespace {
        metadata: proj.metadata.clone(),
        ..Namespace::default()
    };
    ns.metadata.namespace = None;
    systemmeta::note_resource(
        &mut ns,
        PROJECTS,
        ResourceNotes::from([
            ("displayName".to_string(), proj.spec.display_name.clone()),
            ("description".to_string(), proj.spec.description.clone()),
        ]),
    );
    if ns.metadata.deletion_timestamp.is_none() {
        systemmeta::lock(&mut ns);
    }
    ns
}

/// The Project a Namespace backs, if any, placed in `system_namespace`.
pub(crate) fn project_from_namespace(mut ns: Namespace, system_namespace: &str) -> Option<Project> {
    let (resource_type, mut notes) = systemmeta::unnote_resource(&mut ns);
    if resource_type != PROJECTS {
        return None;
    }
    let mut metadata = ns.metadata;
    metadata.namespace = Some(system_namespace.to_string());
    metadata.labels = metadata.labels.filter(|ls| !ls.is_empty());
    metadata.annotations = metadata.annotations.filter(|as_| !as_.is_empty());
    Some(Project {
        metadata,
        spec: ProjectSpec {
            display_name: notes.remove("displayName").unwrap_or_default(),
            description: notes.remove("description").unwrap_or_default(),
        },
        status: Some(ProjectStatus {
            phase: ns.status.and_then(|s| s.phase).unwrap_or_default(),
        }),
    })
}

fn bookmark_of(ns: &Namespace) -> Project {
    let mut proj = Project::default();
    proj.metadata.resource_version = Some(resource_version_of(ns).to_string());
    proj
}

pub struct ProjectHandler {
    clients: Clients,
    system_namespace: String,
}

impl std::fmt::Debug for ProjectHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectHandler")
            .field("system_namespace", &self.system_namespace)
            .finish_non_exhaustive()
    }
}

impl ProjectHandler {
    #[must_use]
    pub fn new(clients: Clients, system_namespace: &str) -> Self {
        Self {
            clients,
            system_namespace: system_namespace.to_string(),
        }
    }

    fn not_found(name: &str) -> anyhow::Error {
        StatusError::not_found(&qualified(PROJECTS), name).into()
    }

    fn convert(&self, ns: Namespace) -> anyhow::Result<Project> {
        let name = ns.metadata.name.clone().unwrap_or_default();
        project_from_namespace(ns, &self.system_namespace)
            .ok_or_else(|| anyhow!("namespace {name} is not a project"))
    }

    /// Adopt the pre-existing default Namespace instead of creating it.
    async fn adopt_default(&self, proj: &Project, opts: &CreateOptions) -> anyhow::Result<Namespace> {
        let mut ns = namespace_from_project(proj);
        let existing = self
            .clients
            .namespaces
            .get(None, DEFAULT_PROJECT_NAME)
            .await
            .map_err(|err| StatusError::internal(format!("get default namespace: {err}")))?;
        ns.metadata.uid = existing.metadata.uid;
        ns.metadata.resource_version = existing.metadata.resource_version;
        ns.metadata.creation_timestamp = existing.metadata.creation_timestamp;
        let opts = UpdateOptions {
            dry_run: opts.dry_run,
            field_manager: opts.field_manager.clone(),
        };
        let adopted = self
            .clients
            .namespaces
            .update(&ns, &opts)
            .await
            .map_err(|err| StatusError::internal(format!("create default project: {err}")))?;
        Ok(adopted)
    }

    async fn has_environments(&self, project: &str) -> anyhow::Result<bool> {
        let opts = ListOptions::default().with_label_selector(systemmeta::resources_label_selector_of(ENVIRONMENTS));
        let list = self
            .clients
            .namespaces
            .list(&opts)
            .await
            .map_err(|err| StatusError::internal(format!("list environments below the project: {err}")))?;
        Ok(list.items.iter().any(|ns| {
            kubemeta::controller_of_kind(ns, &Project::api_version(&()), &Project::kind(&()))
                .is_some_and(|owner| owner.name == project)
        }))
    }
}

impl ResourceHandler for ProjectHandler {
    type Object = Project;

    fn namespace_scoped(&self) -> bool {
        true
    }
}

#[async_trait]
impl CreateHandler for ProjectHandler {
    async fn on_create(&self, _ctx: &RequestContext, proj: Project, opts: &CreateOptions) -> anyhow::Result<Project> {
        let name = name_of(&proj).to_string();
        let ns = if name == DEFAULT_PROJECT_NAME {
            self.adopt_default(&proj, opts).await?
        } else {
            self.clients.namespaces.create(&namespace_from_project(&proj), opts).await?
        };

        systemauthz::create_project_space(&self.clients, &name)
            .await
            .map_err(|err| StatusError::internal(format!("create project space: {err:#}")))?;

        info!(project = %name, "created project");
        self.convert(ns)
    }
}

#[async_trait]
impl ListHandler for ProjectHandler {
    async fn on_list(&self, _ctx: &RequestContext, opts: &ListOptions) -> anyhow::Result<ObjectList<Project>> {
        let (upstream, filter) = NamespaceFilter::split(opts, PROJECTS);
        let mut list = self.clients.namespaces.list(&upstream).await?;
        sort_by_resource_version(&mut list.items);
        Ok(list.filter_map(|ns| project_from_namespace(ns, &self.system_namespace).filter(|p| filter.admits(p))))
    }
}

#[async_trait]
impl WatchHandler for ProjectHandler {
    async fn on_watch(&self, ctx: &RequestContext, opts: &ListOptions) -> anyhow::Result<ProxyWatcher<Project>> {
        let (upstream, filter) = NamespaceFilter::split(opts, PROJECTS);
        let watcher = self.clients.namespaces.watch(&upstream).await?;
        let system_namespace = self.system_namespace.clone();
        let span = debug_span!("walrus.projects.watch");
        Ok(translate_watch(ctx.cancel.clone(), watcher, span, move |event| match event {
            WatchEvent::Bookmark(ns) => vec![WatchEvent::Bookmark(bookmark_of(&ns))],
            event => event
                .filter_map(|ns| project_from_namespace(ns, &system_namespace).filter(|p| filter.admits(p)))
                .into_iter()
                .collect(),
        }))
    }
}

#[async_trait]
impl GetHandler for ProjectHandler {
    async fn on_get(&self, _ctx: &RequestContext, key: &ObjectKey, _opts: &GetOptions) -> anyhow::Result<Project> {
        if key.namespace() != self.system_namespace {
            return Err(Self::not_found(&key.name));
        }
        let ns = match self.clients.namespaces.get(None, &key.name).await {
            Ok(ns) => ns,
            Err(err) if err.is_not_found() => return Err(Self::not_found(&key.name)),
            Err(err) => return Err(err.into()),
        };
        project_from_namespace(ns, &self.system_namespace).ok_or_else(|| Self::not_found(&key.name))
    }
}

#[async_trait]
impl UpdateHandler for ProjectHandler {
    async fn on_update(
        &self,
        _ctx: &RequestContext,
        proj: Project,
        _old: Project,
        opts: &UpdateOptions,
    ) -> anyhow::Result<Project> {
        let updated = self.clients.namespaces.update(&namespace_from_project(&proj), opts).await?;
        self.convert(updated)
    }
}

#[async_trait]
impl DeleteHandler for ProjectHandler {
    async fn on_delete(&self, _ctx: &RequestContext, proj: Project, _opts: &DeleteOptions) -> anyhow::Result<()> {
        let name = name_of(&proj);
        if name == DEFAULT_PROJECT_NAME {
            return Err(StatusError::bad_request("cannot delete default project").into());
        }
        if self.has_environments(name).await? {
            return Err(StatusError::conflict(&qualified(PROJECTS), name, "project has environments").into());
        }

        release_namespace(&self.clients, name).await?;

        systemauthz::delete_project_space(&self.clients, name)
            .await
            .map_err(|err| StatusError::internal(format!("delete project space: {err:#}")))?;
        info!(project = %name, "deleted project");
        Ok(())
    }
}
