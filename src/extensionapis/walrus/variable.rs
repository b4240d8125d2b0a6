//! # Variables
//!
//! Every served Variable is one key of the `walrus-variables` Secret in the
//! namespace of its scope:
//! - the system namespace for global variables
//! - a Project namespace
//! - an Environment namespace, also noting the owning Project
//!
//! Per-key metadata (uid, creation time, sensitivity) travels as notes on
//! the Secret.

use anyhow::anyhow;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, Secret};
use kube::Resource;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug_span, info};
use uuid::Uuid;

use super::{qualified, ENVIRONMENTS, PROJECTS};
use crate::apis::walrus::v1::{Project, Variable, VariableSpec, VariableStatus};
use crate::client::{update_with_align, Aligned, Clients, ObjectClient as _, UpdateMode};
use crate::constants::{SENSITIVE_PLACEHOLDER, VARIABLES_DELEGATED_SECRET_NAME};
use crate::extensionapi::{
    field_set, name_of, namespace_of, sort_by_resource_version, translate_watch, CreateHandler, CreateOptions,
    CurdOperations, DefaultTableConvertor, DeleteHandler, DeleteOptions, FieldError, FieldErrorList,
    FieldRequirement, FieldSelector, GetHandler, GetOptions, ListHandler, ListOptions, ObjectKey, ObjectList,
    ProxyWatcher, RequestContext, ResourceHandler, StatusError, TableColumn, TableConvertor, UpdateHandler,
    UpdateOptions, WatchEvent, WatchHandler,
};
use crate::extensionapis::{ResourceStorages, SetupOptions};
use crate::kubemeta;
use crate::systemmeta::{self, resources_label_selector_of, ResourceNotes};

const VARIABLES: &str = "variables";
const NAME_FIELD: &str = "metadata.name";
const NAMESPACE_FIELD: &str = "metadata.namespace";

const PROJECT_NOTE: &str = "project";
const ENVIRONMENT_NOTE: &str = "environment";

fn uid_note(name: &str) -> String {
    format!("{name}-uid")
}

fn create_at_note(name: &str) -> String {
    format!("{name}-create-at")
}

fn sensitive_note(name: &str) -> String {
    format!("{name}-sensitive")
}

pub fn setup(opts: &SetupOptions) -> ResourceStorages {
    let handler = Arc::new(VariableHandler::new(opts.clients.clone(), &opts.system_namespace));
    let table: Arc<dyn TableConvertor<Variable>> = Arc::new(DefaultTableConvertor::with_columns(vec![
        TableColumn::new("Value", "string", ".status.value"),
        TableColumn::new("Environment", "string", ".status.environment"),
        TableColumn::new("Project", "string", ".status.project"),
    ]));
    let storage = CurdOperations::new(Some(table), handler)
        .storage(true)
        .with_create_validation(Arc::new(validate_value))
        .with_update_validation(Arc::new(|var, _old| validate_value(var)));
    ResourceStorages::new(VARIABLES, Arc::new(storage))
}

pub(crate) fn validate_value(var: &Variable) -> Result<(), StatusError> {
    if var.spec.value.is_some() {
        return Ok(());
    }
    let mut errs = FieldErrorList::new();
    errs.push(FieldError::required("spec.value", "variable value is required"));
    Err(StatusError::invalid(&qualified(VARIABLES), name_of(var), errs))
}

/// The variable `name` carried by `secret`.
fn variable_from_secret(secret: &Secret, name: &str) -> Option<Variable> {
    if systemmeta::describe_resource_type(secret) != VARIABLES {
        return None;
    }
    let raw = kubemeta::secret_value(secret, name)?;

    let uid = match systemmeta::describe_resource_note(secret, &uid_note(name)) {
        "" => secret.metadata.uid.clone(),
        uid => Some(uid.to_string()),
    };
    let creation_timestamp = kubemeta::time_parse(systemmeta::describe_resource_note(secret, &create_at_note(name)))
        .or_else(|| secret.metadata.creation_timestamp.clone());
    let sensitive = systemmeta::describe_resource_note(secret, &sensitive_note(name)) == "true";
    let value = match raw.as_str() {
        "" => String::new(),
        _ if sensitive => SENSITIVE_PLACEHOLDER.to_string(),
        raw => raw.to_string(),
    };

    let mut var = Variable::new(
        name,
        VariableSpec {
            value: None,
            sensitive,
        },
    );
    var.metadata.namespace.clone_from(&secret.metadata.namespace);
    var.metadata.uid = uid;
    var.metadata.resource_version.clone_from(&secret.metadata.resource_version);
    var.metadata.creation_timestamp = creation_timestamp;
    var.status = Some(VariableStatus {
        project: systemmeta::describe_resource_note(secret, PROJECT_NOTE).to_string(),
        environment: systemmeta::describe_resource_note(secret, ENVIRONMENT_NOTE).to_string(),
        value,
        value_: raw,
    });
    Some(var)
}

/// Variables carried by `secret` that pass `selector`, ordered by name.
fn variables_from_secret(secret: &Secret, selector: &FieldSelector) -> Vec<Variable> {
    if systemmeta::describe_resource_type(secret) != VARIABLES {
        return Vec::new();
    }
    let namespace = namespace_of(secret);
    kubemeta::secret_keys(secret)
        .into_iter()
        .filter(|name| selector.matches(&field_set(&[(NAME_FIELD, *name), (NAMESPACE_FIELD, namespace)])))
        .filter_map(|name| variable_from_secret(secret, name))
        .collect()
}

/// Upstream options selecting every variables Secret in scope of `opts`.
fn secret_list_options(opts: &ListOptions) -> ListOptions {
    let mut label_selector = opts.label_selector.clone();
    for requirement in resources_label_selector_of(VARIABLES).requirements() {
        label_selector = label_selector.add(requirement.clone());
    }
    ListOptions {
        namespace: opts.namespace.clone(),
        label_selector,
        field_selector: FieldSelector::everything()
            .add(FieldRequirement::equals(NAME_FIELD, VARIABLES_DELEGATED_SECRET_NAME)),
        resource_version: opts.resource_version.clone(),
        allow_watch_bookmarks: opts.allow_watch_bookmarks,
        ..ListOptions::default()
    }
}

fn delegated_secret(namespace: &str) -> Secret {
    let mut secret = Secret::default();
    secret.metadata.namespace = Some(namespace.to_string());
    secret.metadata.name = Some(VARIABLES_DELEGATED_SECRET_NAME.to_string());
    secret
}

pub struct VariableHandler {
    clients: Clients,
    system_namespace: String,
}

impl std::fmt::Debug for VariableHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VariableHandler")
            .field("system_namespace", &self.system_namespace)
            .finish_non_exhaustive()
    }
}

impl VariableHandler {
    #[must_use]
    pub fn new(clients: Clients, system_namespace: &str) -> Self {
        Self {
            clients,
            system_namespace: system_namespace.to_string(),
        }
    }

    fn not_found(name: &str) -> anyhow::Error {
        StatusError::not_found(&qualified(VARIABLES), name).into()
    }

    fn invalid_namespace(var: &Variable, detail: &str) -> anyhow::Error {
        let mut errs = FieldErrorList::new();
        errs.push(FieldError::invalid(NAMESPACE_FIELD, namespace_of(var), detail));
        StatusError::invalid(&qualified(VARIABLES), name_of(var), errs).into()
    }

    /// Project and environment the namespace of `var` belongs to; both are
    /// empty for global variables.
    async fn scope_of(&self, var: &Variable) -> anyhow::Result<(String, String)> {
        let namespace = namespace_of(var);
        if namespace == self.system_namespace {
            return Ok((String::new(), String::new()));
        }
        let owner: Option<Namespace> = self.clients.namespaces.get(None, namespace).await.ok();
        let Some(owner) = owner else {
            return Err(Self::invalid_namespace(var, "namespace is not a project or environment"));
        };
        match systemmeta::describe_resource_type(&owner) {
            PROJECTS => Ok((namespace.to_string(), String::new())),
            ENVIRONMENTS => {
                let project = kubemeta::controller_of_kind(&owner, &Project::api_version(&()), &Project::kind(&()))
                    .map(|r| r.name.clone())
                    .ok_or_else(|| Self::invalid_namespace(var, "environment is not belong to any project"))?;
                Ok((project, namespace.to_string()))
            }
            _ => Err(Self::invalid_namespace(var, "namespace is not a project or environment")),
        }
    }
}

impl ResourceHandler for VariableHandler {
    type Object = Variable;

    fn namespace_scoped(&self) -> bool {
        true
    }
}

#[async_trait]
impl CreateHandler for VariableHandler {
    async fn on_create(&self, _ctx: &RequestContext, var: Variable, _opts: &CreateOptions) -> anyhow::Result<Variable> {
        let name = name_of(&var).to_string();
        let namespace = namespace_of(&var).to_string();
        let value = var.spec.value.clone().unwrap_or_default();
        let (project, environment) = self.scope_of(&var).await?;

        let create_at = var
            .metadata
            .creation_timestamp
            .as_ref()
            .and_then(kubemeta::time_format)
            .unwrap_or_else(|| chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true));
        let notes: ResourceNotes = [
            (PROJECT_NOTE.to_string(), project),
            (ENVIRONMENT_NOTE.to_string(), environment),
            (
                uid_note(&name),
                var.metadata.uid.clone().unwrap_or_else(|| Uuid::new_v4().to_string()),
            ),
            (create_at_note(&name), create_at),
            (sensitive_note(&name), var.spec.sensitive.to_string()),
        ]
        .into_iter()
        .collect();

        let mut expected = delegated_secret(&namespace);
        kubemeta::set_secret_value(&mut expected, &name, &value);
        systemmeta::note_resource(&mut expected, VARIABLES, notes.clone());

        let secret = update_with_align(
            self.clients.secrets.as_ref(),
            &expected,
            UpdateMode::UpdateOrCreate,
            &self.clients.align,
            |mut secret| {
                if kubemeta::secret_value(&secret, &name).is_some() {
                    return Err(StatusError::already_exists(&qualified(VARIABLES), &name).into());
                }
                kubemeta::set_secret_value(&mut secret, &name, &value);
                let mut merged = notes.clone();
                merged.extend(systemmeta::describe_resource(&secret).1);
                systemmeta::note_resource(&mut secret, VARIABLES, merged);
                Ok(Aligned::Update(secret))
            },
        )
        .await?;

        info!(namespace = %namespace, name = %name, "created variable");
        variable_from_secret(&secret, &name).ok_or_else(|| anyhow!("created variable {name} is missing from its secret"))
    }
}

#[async_trait]
impl ListHandler for VariableHandler {
    async fn on_list(&self, _ctx: &RequestContext, opts: &ListOptions) -> anyhow::Result<ObjectList<Variable>> {
        let mut secrets = self.clients.secrets.list(&secret_list_options(opts)).await?;
        sort_by_resource_version(&mut secrets.items);
        let items = secrets
            .items
            .iter()
            .flat_map(|secret| variables_from_secret(secret, &opts.field_selector))
            .collect();
        let mut list = ObjectList::new(items);
        list.metadata = secrets.metadata;
        Ok(list)
    }
}

#[async_trait]
impl WatchHandler for VariableHandler {
    async fn on_watch(&self, ctx: &RequestContext, opts: &ListOptions) -> anyhow::Result<ProxyWatcher<Variable>> {
        // Seed with the current variables so only changes are emitted.
        let mut index: BTreeMap<(String, String), Variable> = self
            .on_list(ctx, opts)
            .await?
            .items
            .into_iter()
            .map(|v| ((namespace_of(&v).to_string(), name_of(&v).to_string()), v))
            .collect();

        let watcher = self.clients.secrets.watch(&secret_list_options(opts)).await?;
        let selector = opts.field_selector.clone();
        let span = debug_span!("walrus.variables.watch", namespace = ctx.namespace().unwrap_or_default());
        Ok(translate_watch(ctx.cancel.clone(), watcher, span, move |event| {
            let (secret, deleted) = match event {
                WatchEvent::Bookmark(secret) => {
                    let mut bookmark = Variable::new("", VariableSpec::default());
                    bookmark.metadata.resource_version = secret.metadata.resource_version;
                    return vec![WatchEvent::Bookmark(bookmark)];
                }
                WatchEvent::Error(err) => return vec![WatchEvent::Error(err)],
                WatchEvent::Added(secret) | WatchEvent::Modified(secret) => (secret, false),
                WatchEvent::Deleted(secret) => (secret, true),
            };
            let namespace = namespace_of(&secret).to_string();

            let mut events = Vec::new();
            let mut seen = BTreeSet::new();
            if !deleted {
                for var in variables_from_secret(&secret, &selector) {
                    let key = (namespace.clone(), name_of(&var).to_string());
                    seen.insert(key.1.clone());
                    match index.get(&key) {
                        None => events.push(WatchEvent::Added(var.clone())),
                        Some(prev) if !prev.equal(&var) => events.push(WatchEvent::Modified(var.clone())),
                        Some(_) => continue,
                    }
                    index.insert(key, var);
                }
            }

            // Keys gone from the Secret.
            let gone: Vec<(String, String)> = index
                .keys()
                .filter(|(ns, name)| *ns == namespace && !seen.contains(name))
                .cloned()
                .collect();
            for key in gone {
                if let Some(mut var) = index.remove(&key) {
                    var.metadata.resource_version.clone_from(&secret.metadata.resource_version);
                    events.push(WatchEvent::Deleted(var));
                }
            }
            events
        }))
    }

    fn fans_out_events(&self) -> bool {
        true
    }
}

#[async_trait]
impl GetHandler for VariableHandler {
    async fn on_get(&self, _ctx: &RequestContext, key: &ObjectKey, _opts: &GetOptions) -> anyhow::Result<Variable> {
        let secret = match self
            .clients
            .secrets
            .get(Some(key.namespace()), VARIABLES_DELEGATED_SECRET_NAME)
            .await
        {
            Ok(secret) => secret,
            Err(err) if err.is_not_found() => return Err(Self::not_found(&key.name)),
            Err(err) => return Err(err.into()),
        };
        variable_from_secret(&secret, &key.name).ok_or_else(|| Self::not_found(&key.name))
    }
}

#[async_trait]
impl UpdateHandler for VariableHandler {
    async fn on_update(
        &self,
        _ctx: &RequestContext,
        var: Variable,
        _old: Variable,
        _opts: &UpdateOptions,
    ) -> anyhow::Result<Variable> {
        let name = name_of(&var).to_string();
        let value = var.spec.value.clone().unwrap_or_default();
        let notes: ResourceNotes = [(sensitive_note(&name), var.spec.sensitive.to_string())]
            .into_iter()
            .collect();

        let secret = update_with_align(
            self.clients.secrets.as_ref(),
            &delegated_secret(namespace_of(&var)),
            UpdateMode::UpdateOnly,
            &self.clients.align,
            |mut secret| {
                if kubemeta::secret_value(&secret, &name).is_none() {
                    return Err(Self::not_found(&name));
                }
                kubemeta::set_secret_value(&mut secret, &name, &value);
                systemmeta::note_resource(&mut secret, VARIABLES, notes.clone());
                Ok(Aligned::Update(secret))
            },
        )
        .await?;
        variable_from_secret(&secret, &name).ok_or_else(|| Self::not_found(&name))
    }
}

#[async_trait]
impl DeleteHandler for VariableHandler {
    async fn on_delete(&self, _ctx: &RequestContext, var: Variable, _opts: &DeleteOptions) -> anyhow::Result<()> {
        let name = name_of(&var).to_string();
        let result = update_with_align(
            self.clients.secrets.as_ref(),
            &delegated_secret(namespace_of(&var)),
            UpdateMode::UpdateOnly,
            &self.clients.align,
            |mut secret| {
                if !kubemeta::remove_secret_value(&mut secret, &name) {
                    return Ok(Aligned::Skip);
                }
                systemmeta::pop_resource_notes(
                    &mut secret,
                    &[
                        uid_note(&name).as_str(),
                        create_at_note(&name).as_str(),
                        sensitive_note(&name).as_str(),
                    ],
                );
                Ok(Aligned::Update(secret))
            },
        )
        .await;
        match result {
            Ok(_) => {}
            Err(err) if crate::extensionapi::is_not_found(&err) => {}
            Err(err) => return Err(err),
        }
        info!(namespace = namespace_of(&var), name = %name, "deleted variable");
        Ok(())
    }
}
