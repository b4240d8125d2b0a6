//! # Environments
//!
//! An Environment is a Namespace labelled `environments`, controlled by the
//! Namespace of its Project. The Environment is served inside the Project's
//! namespace; its spec travels as notes on the backing Namespace.

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use kube::Resource;
use std::sync::Arc;
use tracing::{debug_span, info, warn};

use super::{check_width, qualified, release_namespace, NamespaceFilter, ENVIRONMENTS, PROJECTS};
use crate::apis::walrus::v1::{Environment, EnvironmentSpec, EnvironmentStatus, EnvironmentType, Project};
use crate::client::{Clients, ObjectClient as _};
use crate::constants::{MAX_DESCRIPTION_WIDTH, MAX_DISPLAY_NAME_WIDTH, MAX_NAME_WIDTH};
use crate::extensionapi::{
    name_of, namespace_of, resource_version_of, sort_by_resource_version, translate_watch, CreateHandler,
    CreateOptions, CurdOperations, DefaultTableConvertor, DeleteHandler, DeleteOptions, FieldError,
    FieldErrorList, GetHandler, GetOptions, ListHandler, ListOptions, ObjectKey, ObjectList, ProxyWatcher,
    RequestContext, ResourceHandler, Storage, StatusError, TableColumn, TableConvertor, UpdateHandler,
    UpdateOptions, WatchEvent, WatchHandler,
};
use crate::extensionapis::{ResourceStorages, SetupOptions};
use crate::kubemeta;
use crate::systemauthz;
use crate::systemmeta::{self, ResourceNotes};

pub fn setup(opts: &SetupOptions) -> ResourceStorages {
    let handler = Arc::new(EnvironmentHandler::new(opts.clients.clone()));
    let table: Arc<dyn TableConvertor<Environment>> = Arc::new(DefaultTableConvertor::with_columns(vec![
        TableColumn::new("Type", "string", ".spec.type"),
        TableColumn::new("Phase", "string", ".status.phase"),
        TableColumn::new("Project", "string", ".status.project"),
    ]));

    let mut ops = CurdOperations::new(Some(table), handler);
    let status_updater = ops.create_update.update.status_subresource_updater();
    ops.create_update.update = ops.create_update.update.clone().preventing_status_modify();

    let storage = ops
        .storage(true)
        .with_create_validation(Arc::new(validate_create))
        .with_update_validation(Arc::new(validate_update));
    let status = Storage::new(true)
        .with_getter(Arc::new(ops.get.clone()))
        .with_updater(Arc::new(status_updater));

    ResourceStorages::new(ENVIRONMENTS, Arc::new(storage)).with_subresource("status", Arc::new(status))
}

fn validate_descriptions(errs: &mut FieldErrorList, spec: &EnvironmentSpec) {
    check_width(errs, "spec.displayName", &spec.display_name, MAX_DISPLAY_NAME_WIDTH);
    check_width(errs, "spec.description", &spec.description, MAX_DESCRIPTION_WIDTH);
}

fn into_result(env: &Environment, errs: FieldErrorList) -> Result<(), StatusError> {
    if errs.is_empty() {
        return Ok(());
    }
    Err(StatusError::invalid(&qualified(ENVIRONMENTS), name_of(env), errs))
}

pub(crate) fn validate_create(env: &Environment) -> Result<(), StatusError> {
    let mut errs = FieldErrorList::new();
    let name = name_of(env);
    if !name.starts_with(&format!("{}-", namespace_of(env))) {
        errs.push(FieldError::invalid("metadata.name", name, "name must start with the namespace"));
    }
    check_width(&mut errs, "metadata.name", name, MAX_NAME_WIDTH);
    if let Err(err) = EnvironmentType::validate(&env.spec.r#type) {
        errs.push(err);
    }
    validate_descriptions(&mut errs, &env.spec);
    into_result(env, errs)
}

pub(crate) fn validate_update(env: &Environment, existing: &Environment) -> Result<(), StatusError> {
    let mut errs = FieldErrorList::new();
    if env.spec.r#type != existing.spec.r#type {
        errs.push(FieldError::invalid("spec.type", &env.spec.r#type, "type is immutable"));
    }
    validate_descriptions(&mut errs, &env.spec);
    into_result(env, errs)
}

/// Backing Namespace of an Environment, locked unless it is terminating.
pub(crate) fn namespace_from_environment(env: &Environment) -> Namespace {
    let mut ns = Namespace {
        metadata: env.metadata.clone(),
        ..Namespace::default()
    };
    ns.metadata.namespace = None;
    systemmeta::note_resource(
        &mut ns,
        ENVIRONMENTS,
        ResourceNotes::from([
            ("type".to_string(), env.spec.r#type.clone()),
            ("displayName".to_string(), env.spec.display_name.clone()),
            ("description".to_string(), env.spec.description.clone()),
        ]),
    );
    if ns.metadata.deletion_timestamp.is_none() {
        systemmeta::lock(&mut ns);
    }
    ns
}

/// The Environment a Namespace backs, if any. It must carry the
/// `environments` type and a Project controller.
pub(crate) fn environment_from_namespace(mut ns: Namespace) -> Option<Environment> {
    let (resource_type, mut notes) = systemmeta::unnote_resource(&mut ns);
    if resource_type != ENVIRONMENTS {
        return None;
    }
    let project = kubemeta::controller_of_kind(&ns, &Project::api_version(&()), &Project::kind(&()))?
        .name
        .clone();

    let mut metadata = ns.metadata;
    metadata.namespace = Some(project.clone());
    metadata.labels = metadata.labels.filter(|ls| !ls.is_empty());
    metadata.annotations = metadata.annotations.filter(|as_| !as_.is_empty());

    let mut note = |key: &str| notes.remove(key).unwrap_or_default();
    Some(Environment {
        metadata,
        spec: EnvironmentSpec {
            r#type: note("type"),
            display_name: note("displayName"),
            description: note("description"),
        },
        status: Some(EnvironmentStatus {
            project,
            phase: ns.status.and_then(|s| s.phase).unwrap_or_default(),
        }),
    })
}

/// Object carrying only the resource version of a bookmark.
fn bookmark_of(ns: &Namespace) -> Environment {
    let mut env = Environment::default();
    env.metadata.resource_version = Some(resource_version_of(ns).to_string());
    env
}

pub struct EnvironmentHandler {
    clients: Clients,
}

impl std::fmt::Debug for EnvironmentHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvironmentHandler").finish_non_exhaustive()
    }
}

impl EnvironmentHandler {
    #[must_use]
    pub fn new(clients: Clients) -> Self {
        Self { clients }
    }

    fn not_found(name: &str) -> anyhow::Error {
        StatusError::not_found(&qualified(ENVIRONMENTS), name).into()
    }
}

impl ResourceHandler for EnvironmentHandler {
    type Object = Environment;

    fn namespace_scoped(&self) -> bool {
        true
    }
}

#[async_trait]
impl CreateHandler for EnvironmentHandler {
    async fn on_create(
        &self,
        _ctx: &RequestContext,
        env: Environment,
        opts: &CreateOptions,
    ) -> anyhow::Result<Environment> {
        let project = namespace_of(&env).to_string();
        let name = name_of(&env).to_string();

        let project_uid = match self.clients.namespaces.get(None, &project).await {
            Ok(ns) if systemmeta::describe_resource_type(&ns) == PROJECTS => {
                ns.metadata.uid.unwrap_or_default()
            }
            Ok(_) => return Err(StatusError::not_found(&qualified(PROJECTS), &project).into()),
            Err(err) if err.is_not_found() => {
                return Err(StatusError::not_found(&qualified(PROJECTS), &project).into());
            }
            Err(err) => return Err(err).context("get project namespace"),
        };

        let mut ns = namespace_from_environment(&env);
        kubemeta::control_on_with(
            &mut ns,
            &Project::api_version(&()),
            &Project::kind(&()),
            &project,
            &project_uid,
        );
        let created = self.clients.namespaces.create(&ns, opts).await?;

        if let Err(err) = systemauthz::create_environment_space(&self.clients, &project, &name).await {
            if let Err(rollback) = release_namespace(&self.clients, &name).await {
                warn!(project = %project, environment = %name, error = %format!("{rollback:#}"), "failed to roll back environment namespace");
            }
            return Err(StatusError::internal(format!("create environment space: {err:#}")).into());
        }

        info!(project = %project, environment = %name, "created environment");
        environment_from_namespace(created).ok_or_else(|| anyhow!("created namespace {name} is not an environment"))
    }
}

#[async_trait]
impl ListHandler for EnvironmentHandler {
    async fn on_list(&self, _ctx: &RequestContext, opts: &ListOptions) -> anyhow::Result<ObjectList<Environment>> {
        let (upstream, filter) = NamespaceFilter::split(opts, ENVIRONMENTS);
        let mut list = self.clients.namespaces.list(&upstream).await?;
        sort_by_resource_version(&mut list.items);
        Ok(list.filter_map(|ns| environment_from_namespace(ns).filter(|env| filter.admits(env))))
    }
}

#[async_trait]
impl WatchHandler for EnvironmentHandler {
    async fn on_watch(&self, ctx: &RequestContext, opts: &ListOptions) -> anyhow::Result<ProxyWatcher<Environment>> {
        let (upstream, filter) = NamespaceFilter::split(opts, ENVIRONMENTS);
        let watcher = self.clients.namespaces.watch(&upstream).await?;
        let span = debug_span!("walrus.environments.watch", namespace = ctx.namespace().unwrap_or_default());
        Ok(translate_watch(ctx.cancel.clone(), watcher, span, move |event| match event {
            WatchEvent::Bookmark(ns) => vec![WatchEvent::Bookmark(bookmark_of(&ns))],
            event => event
                .filter_map(|ns| environment_from_namespace(ns).filter(|env| filter.admits(env)))
                .into_iter()
                .collect(),
        }))
    }
}

#[async_trait]
impl GetHandler for EnvironmentHandler {
    async fn on_get(&self, _ctx: &RequestContext, key: &ObjectKey, _opts: &GetOptions) -> anyhow::Result<Environment> {
        let ns = match self.clients.namespaces.get(None, &key.name).await {
            Ok(ns) => ns,
            Err(err) if err.is_not_found() => return Err(Self::not_found(&key.name)),
            Err(err) => return Err(err.into()),
        };
        environment_from_namespace(ns)
            .filter(|env| namespace_of(env) == key.namespace())
            .ok_or_else(|| Self::not_found(&key.name))
    }
}

#[async_trait]
impl UpdateHandler for EnvironmentHandler {
    async fn on_update(
        &self,
        _ctx: &RequestContext,
        env: Environment,
        old: Environment,
        opts: &UpdateOptions,
    ) -> anyhow::Result<Environment> {
        let mut ns = namespace_from_environment(&env);
        ns.metadata.owner_references.clone_from(&old.metadata.owner_references);
        let updated = self.clients.namespaces.update(&ns, opts).await?;
        environment_from_namespace(updated)
            .ok_or_else(|| anyhow!("updated namespace {} is not an environment", name_of(&env)))
    }
}

#[async_trait]
impl DeleteHandler for EnvironmentHandler {
    async fn on_delete(&self, _ctx: &RequestContext, env: Environment, _opts: &DeleteOptions) -> anyhow::Result<()> {
        let name = name_of(&env);
        let below = ListOptions {
            limit: Some(1),
            ..ListOptions::default()
        }
        .in_namespace(Some(name));
        let resources = self
            .clients
            .resources
            .list(&below)
            .await
            .map_err(|err| StatusError::internal(format!("list resources below the environment: {err}")))?;
        if !resources.items.is_empty() {
            return Err(StatusError::forbidden(&qualified(ENVIRONMENTS), name, "environment has resources").into());
        }

        release_namespace(&self.clients, name).await?;

        systemauthz::delete_environment_space(&self.clients, namespace_of(&env), name)
            .await
            .map_err(|err| StatusError::internal(format!("delete environment space: {err:#}")))?;
        info!(project = %namespace_of(&env), environment = %name, "deleted environment");
        Ok(())
    }
}
