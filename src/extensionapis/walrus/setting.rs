//! # Settings
//!
//! Every served Setting is one key of the `walrus-settings` Secret in the
//! system namespace. Settings cannot be created or deleted; updating one
//! runs the setting's admission and writes the key back.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug_span;

use super::qualified;
use crate::apis::walrus::v1::{Setting, SettingSpec, SettingStatus};
use crate::client::{Clients, ObjectClient as _};
use crate::constants::{SENSITIVE_PLACEHOLDER, SETTINGS_DELEGATED_SECRET_NAME};
use crate::extensionapi::{
    field_set, name_of, namespace_of, resource_version_of, translate_watch, DefaultTableConvertor, FieldError,
    FieldErrorList, FieldRequirement, FieldSelector, GetHandler, GetOperation, GetOptions, ListHandler,
    ListOptions, ListWatchOperation, ObjectKey, ObjectList, ProxyWatcher, RequestContext, ResourceHandler,
    StatusError, Storage, TableColumn, TableConvertor, UpdateHandler, UpdateOperation, UpdateOptions, WatchEvent,
    WatchHandler,
};
use crate::extensionapis::{ResourceStorages, SetupOptions};
use crate::systemmeta::{self, resources_label_selector_of};
use crate::systemsetting::{SettingRegistry, SETTINGS_RESOURCE_TYPE};

const SETTINGS: &str = "settings";
const NAME_FIELD: &str = "metadata.name";
const NAMESPACE_FIELD: &str = "metadata.namespace";

pub fn setup(opts: &SetupOptions) -> ResourceStorages {
    let handler = Arc::new(SettingHandler::new(
        opts.clients.clone(),
        &opts.system_namespace,
        Arc::clone(&opts.settings),
    ));
    let table: Arc<dyn TableConvertor<Setting>> = Arc::new(DefaultTableConvertor::with_columns(vec![
        TableColumn::new("Value", "string", ".status.value"),
    ]));
    let list_watch = Arc::new(ListWatchOperation::new(Some(table), Arc::clone(&handler)));

    let settings = Arc::clone(&opts.settings);
    let system_namespace = opts.system_namespace.clone();
    let storage = Storage::new(true)
        .with_getter(Arc::new(GetOperation::new(Arc::clone(&handler))))
        .with_lister(list_watch.clone())
        .with_watcher(list_watch)
        .with_updater(Arc::new(UpdateOperation::new(handler)))
        .with_update_validation(Arc::new(move |setting, _old| {
            validate_update(&settings, &system_namespace, setting)
        }));
    ResourceStorages::new(SETTINGS, Arc::new(storage))
}

/// Check that `setting` exists in the system namespace, is editable and
/// carries a new value.
pub(crate) fn validate_update(
    settings: &SettingRegistry,
    system_namespace: &str,
    setting: &Setting,
) -> Result<(), StatusError> {
    let name = name_of(setting);
    if namespace_of(setting) != system_namespace {
        return Err(StatusError::not_found(&qualified(SETTINGS), name));
    }
    if !settings.index(name).is_some_and(|s| s.editable()) {
        return Err(StatusError::forbidden(&qualified(SETTINGS), name, "setting is not editable"));
    }
    if setting.spec.value.is_none() {
        let mut errs = FieldErrorList::new();
        errs.push(FieldError::required("spec.value", "setting value is required"));
        return Err(StatusError::invalid(&qualified(SETTINGS), name, errs));
    }
    Ok(())
}

/// Settings carried by `secret` that pass `selector`, ordered by name.
fn settings_from_secret(settings: &SettingRegistry, secret: &Secret, selector: &FieldSelector) -> Vec<Setting> {
    if systemmeta::describe_resource_type(secret) != SETTINGS_RESOURCE_TYPE {
        return Vec::new();
    }
    let namespace = namespace_of(secret);
    crate::kubemeta::secret_keys(secret)
        .into_iter()
        .filter(|name| selector.matches(&field_set(&[(NAME_FIELD, *name), (NAMESPACE_FIELD, namespace)])))
        .filter_map(|name| setting_from_secret(settings, secret, name))
        .collect()
}

fn setting_from_secret(settings: &SettingRegistry, secret: &Secret, name: &str) -> Option<Setting> {
    let registered = settings.index(name).filter(|s| !s.private())?;
    let raw = crate::kubemeta::secret_value(secret, name)?;

    let uid = match systemmeta::describe_resource_note(secret, &format!("{name}-uid")) {
        "" => secret.metadata.uid.clone(),
        uid => Some(uid.to_string()),
    };
    let value = if raw.is_empty() {
        String::new()
    } else if registered.sensitive() {
        SENSITIVE_PLACEHOLDER.to_string()
    } else {
        raw.clone()
    };

    let mut setting = Setting::new(name, SettingSpec::default());
    setting.metadata.namespace.clone_from(&secret.metadata.namespace);
    setting.metadata.uid = uid;
    setting.metadata.resource_version.clone_from(&secret.metadata.resource_version);
    setting.metadata.creation_timestamp.clone_from(&secret.metadata.creation_timestamp);
    setting.status = Some(SettingStatus {
        description: registered.description().to_string(),
        hidden: registered.hidden(),
        editable: registered.editable(),
        sensitive: registered.sensitive(),
        value,
        value_: raw,
    });
    Some(setting)
}

/// Upstream options selecting the settings Secret of `namespace`.
fn secret_list_options(opts: &ListOptions, namespace: &str) -> ListOptions {
    ListOptions {
        namespace: Some(namespace.to_string()),
        label_selector: resources_label_selector_of(SETTINGS_RESOURCE_TYPE),
        field_selector: FieldSelector::everything()
            .add(FieldRequirement::equals(NAMESPACE_FIELD, namespace))
            .add(FieldRequirement::equals(NAME_FIELD, SETTINGS_DELEGATED_SECRET_NAME)),
        resource_version: opts.resource_version.clone(),
        allow_watch_bookmarks: opts.allow_watch_bookmarks,
        ..ListOptions::default()
    }
}

pub struct SettingHandler {
    clients: Clients,
    system_namespace: String,
    settings: Arc<SettingRegistry>,
}

impl std::fmt::Debug for SettingHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingHandler")
            .field("system_namespace", &self.system_namespace)
            .finish_non_exhaustive()
    }
}

impl SettingHandler {
    #[must_use]
    pub fn new(clients: Clients, system_namespace: &str, settings: Arc<SettingRegistry>) -> Self {
        Self {
            clients,
            system_namespace: system_namespace.to_string(),
            settings,
        }
    }

    fn not_found(name: &str) -> anyhow::Error {
        StatusError::not_found(&qualified(SETTINGS), name).into()
    }

    /// Namespace a list or watch resolves to, `None` when it can hold no
    /// settings.
    fn scope<'a>(&'a self, opts: &'a ListOptions) -> Option<&'a str> {
        match opts.namespace.as_deref() {
            None => Some(self.system_namespace.as_str()),
            Some(ns) if ns == self.system_namespace => Some(ns),
            Some(_) => None,
        }
    }
}

impl ResourceHandler for SettingHandler {
    type Object = Setting;

    fn namespace_scoped(&self) -> bool {
        true
    }
}

#[async_trait]
impl ListHandler for SettingHandler {
    async fn on_list(&self, _ctx: &RequestContext, opts: &ListOptions) -> anyhow::Result<ObjectList<Setting>> {
        let Some(namespace) = self.scope(opts) else {
            return Ok(ObjectList::default());
        };
        let secret = match self.clients.secrets.get(Some(namespace), SETTINGS_DELEGATED_SECRET_NAME).await {
            Ok(secret) => secret,
            Err(err) if err.is_not_found() => return Ok(ObjectList::default()),
            Err(err) => return Err(err.into()),
        };
        let mut list = ObjectList::new(settings_from_secret(&self.settings, &secret, &opts.field_selector));
        list.metadata.resource_version = Some(resource_version_of(&secret).to_string());
        Ok(list)
    }
}

#[async_trait]
impl WatchHandler for SettingHandler {
    async fn on_watch(&self, ctx: &RequestContext, opts: &ListOptions) -> anyhow::Result<ProxyWatcher<Setting>> {
        let namespace = self.scope(opts).unwrap_or(self.system_namespace.as_str()).to_string();
        let scoped = self.scope(opts).is_some();

        // Seed with the current settings so only changes are emitted.
        let mut index: BTreeMap<String, Setting> = self
            .on_list(ctx, opts)
            .await?
            .items
            .into_iter()
            .map(|s| (name_of(&s).to_string(), s))
            .collect();

        let watcher = self.clients.secrets.watch(&secret_list_options(opts, &namespace)).await?;
        let settings = Arc::clone(&self.settings);
        let selector = opts.field_selector.clone();
        let span = debug_span!("walrus.settings.watch", namespace = %namespace);
        Ok(translate_watch(ctx.cancel.clone(), watcher, span, move |event| match event {
            _ if !scoped => Vec::new(),
            WatchEvent::Bookmark(secret) => {
                let mut bookmark = Setting::new("", SettingSpec::default());
                bookmark.metadata.resource_version.clone_from(&secret.metadata.resource_version);
                vec![WatchEvent::Bookmark(bookmark)]
            }
            WatchEvent::Error(err) => vec![WatchEvent::Error(err)],
            WatchEvent::Added(secret) | WatchEvent::Modified(secret) => {
                let mut events = Vec::new();
                for setting in settings_from_secret(&settings, &secret, &selector) {
                    let name = name_of(&setting).to_string();
                    match index.get(&name) {
                        None => events.push(WatchEvent::Added(setting.clone())),
                        Some(prev) if !prev.equal(&setting) => events.push(WatchEvent::Modified(setting.clone())),
                        Some(_) => continue,
                    }
                    index.insert(name, setting);
                }
                events
            }
            WatchEvent::Deleted(_) => Vec::new(),
        }))
    }

    fn fans_out_events(&self) -> bool {
        true
    }
}

#[async_trait]
impl GetHandler for SettingHandler {
    async fn on_get(&self, _ctx: &RequestContext, key: &ObjectKey, _opts: &GetOptions) -> anyhow::Result<Setting> {
        if key.namespace() != self.system_namespace {
            return Err(Self::not_found(&key.name));
        }
        let secret = match self
            .clients
            .secrets
            .get(Some(key.namespace()), SETTINGS_DELEGATED_SECRET_NAME)
            .await
        {
            Ok(secret) => secret,
            Err(err) if err.is_not_found() => return Err(Self::not_found(&key.name)),
            Err(err) => return Err(err.into()),
        };
        if systemmeta::describe_resource_type(&secret) != SETTINGS_RESOURCE_TYPE {
            return Err(Self::not_found(&key.name));
        }
        setting_from_secret(&self.settings, &secret, &key.name).ok_or_else(|| Self::not_found(&key.name))
    }
}

#[async_trait]
impl UpdateHandler for SettingHandler {
    async fn on_update(
        &self,
        ctx: &RequestContext,
        setting: Setting,
        _old: Setting,
        _opts: &UpdateOptions,
    ) -> anyhow::Result<Setting> {
        let name = name_of(&setting);
        let registered = self
            .settings
            .index(name)
            .filter(|s| s.editable())
            .ok_or_else(|| StatusError::forbidden(&qualified(SETTINGS), name, "setting is not editable"))?;
        let value = setting.spec.value.as_deref().unwrap_or_default();
        registered
            .configure(&self.clients, &self.system_namespace, value)
            .await
            .map_err(|err| StatusError::conflict(&qualified(SETTINGS), name, format!("{err:#}")))?;

        let key = ObjectKey::new(Some(self.system_namespace.as_str()), name);
        self.on_get(ctx, &key, &GetOptions::default()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::AlignRetry;
    use crate::extensionapi::{RequestInfo, StatusReason, UpdateBody};
    use crate::systemsetting::{self, Admission, Initializer, SettingProps};
    use futures::StreamExt;
    use serde_json::json;

    const SYSTEM: &str = "walrus-system";

    fn registry() -> SettingRegistry {
        [
            systemsetting::Setting::new(
                "deployer-no-proxy",
                "No proxy.",
                SettingProps::EDITABLE,
                Initializer::from("localhost"),
                Admission::Allow,
            ),
            systemsetting::Setting::new(
                "object-storage-url",
                "Object storage.",
                SettingProps::EDITABLE | SettingProps::SENSITIVE,
                Initializer::from("s3://key:secret@bucket"),
                Admission::Allow,
            ),
            systemsetting::Setting::new(
                "banner",
                "Banner.",
                SettingProps::HIDDEN,
                Initializer::from("hello"),
                Admission::Allow,
            ),
            systemsetting::Setting::new(
                "serve-identify",
                "Identity.",
                SettingProps::PRIVATE,
                Initializer::from("abc"),
                Admission::Disallow,
            ),
        ]
        .into_iter()
        .collect()
    }

    async fn seeded() -> (Clients, ResourceStorages) {
        let clients = Clients::memory(AlignRetry::default());
        let settings = Arc::new(registry());
        systemsetting::initialize(&clients, &settings, SYSTEM).await.unwrap();
        let opts = SetupOptions {
            clients: clients.clone(),
            system_namespace: SYSTEM.to_string(),
            settings,
            file_examples_dir: None,
        };
        (clients, setup(&opts))
    }

    fn ctx() -> RequestContext {
        RequestContext::new(RequestInfo::new("walrus.seal.io", SETTINGS).with_namespace(SYSTEM))
    }

    #[tokio::test]
    async fn test_list_hides_private_and_masks_sensitive() {
        let (_, storages) = seeded().await;
        let list = storages
            .storage
            .list(&ctx(), &ListOptions::default().in_namespace(Some(SYSTEM)), false)
            .await
            .unwrap();
        let names: Vec<&str> = list["items"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["metadata"]["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["banner", "deployer-no-proxy", "object-storage-url"]);
        assert_eq!(list["items"][2]["status"]["value"], SENSITIVE_PLACEHOLDER);
        assert_eq!(list["items"][0]["status"]["hidden"], true);

        let other = storages
            .storage
            .list(&ctx(), &ListOptions::default().in_namespace(Some("acme")), false)
            .await
            .unwrap();
        assert_eq!(other["items"], json!([]));
    }

    #[tokio::test]
    async fn test_list_filters_by_name() {
        let (_, storages) = seeded().await;
        let opts = ListOptions::default().in_namespace(Some(SYSTEM)).with_field_selector(
            FieldSelector::everything().add(FieldRequirement::equals(NAME_FIELD, "banner")),
        );
        let list = storages.storage.list(&ctx(), &opts, false).await.unwrap();
        assert_eq!(list["items"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_get_private_is_not_found() {
        let (_, storages) = seeded().await;
        let err = storages
            .storage
            .get(&ctx(), "serve-identify", &GetOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.reason, StatusReason::NotFound);
    }

    #[tokio::test]
    async fn test_update_configures_value() {
        let (clients, storages) = seeded().await;
        let (updated, created) = storages
            .storage
            .update(
                &ctx(),
                "deployer-no-proxy",
                UpdateBody::MergePatch(json!({"spec": {"value": "10.0.0.0/8"}})),
                &UpdateOptions::default(),
            )
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(updated["status"]["value"], "10.0.0.0/8");

        let secret = clients
            .secrets
            .get(Some(SYSTEM), SETTINGS_DELEGATED_SECRET_NAME)
            .await
            .unwrap();
        assert_eq!(
            crate::kubemeta::secret_value(&secret, "deployer-no-proxy").as_deref(),
            Some("10.0.0.0/8")
        );
    }

    #[tokio::test]
    async fn test_update_rejections() {
        let (_, storages) = seeded().await;
        let err = storages
            .storage
            .update(
                &ctx(),
                "banner",
                UpdateBody::MergePatch(json!({"spec": {"value": "bye"}})),
                &UpdateOptions::default(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.reason, StatusReason::Forbidden);

        let err = storages
            .storage
            .update(
                &ctx(),
                "deployer-no-proxy",
                UpdateBody::MergePatch(json!({"metadata": {"labels": {"a": "b"}}})),
                &UpdateOptions::default(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.reason, StatusReason::Invalid);
        assert!(err.message.contains("spec.value"));
    }

    #[test]
    fn test_validate_update_outside_system_namespace() {
        let mut setting = Setting::new("deployer-no-proxy", SettingSpec::default());
        setting.metadata.namespace = Some("acme".to_string());
        let err = validate_update(&registry(), SYSTEM, &setting).unwrap_err();
        assert_eq!(err.reason, StatusReason::NotFound);
    }

    #[tokio::test]
    async fn test_watch_emits_only_changed_settings() {
        let (clients, storages) = seeded().await;
        let mut events = storages
            .storage
            .watch(&ctx(), &ListOptions::default().in_namespace(Some(SYSTEM)))
            .await
            .unwrap();

        let settings = registry();
        settings
            .index("deployer-no-proxy")
            .unwrap()
            .configure(&clients, SYSTEM, "example.com")
            .await
            .unwrap();

        let frame = loop {
            let frame = events.next().await.unwrap();
            if frame["type"] != "BOOKMARK" {
                break frame;
            }
        };
        assert_eq!(frame["type"], "MODIFIED");
        assert_eq!(frame["object"]["metadata"]["name"], "deployer-no-proxy");
        assert_eq!(frame["object"]["status"]["value"], "example.com");
    }
}
