//! # System Settings
//!
//! Named, typed configuration values of the whole system, stored as the
//! data of the `walrus-settings` Secret in the system namespace.
//!
//! Every [`Setting`] carries:
//! - [`SettingProps`] deciding whether it is listed, editable or masked
//! - an [`Initializer`] producing its value on first start
//! - an [`Admission`] guarding every change
//!
//! The [`SettingRegistry`] holds the built-in settings; the Setting handler
//! serves them and [`initialize`] seeds the Secret at startup.

mod admission;
mod builtin;
mod initializer;

pub use admission::{is_blank, parse_bool, Admission, AdmissionError};
pub use initializer::{setting_env_name, Initializer};

use anyhow::{anyhow, Context, Result};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;
use std::ops::BitOr;
use tracing::info;

use crate::client::{update_with_align, Aligned, Clients, ObjectClient as _, UpdateMode};
use crate::constants::SETTINGS_DELEGATED_SECRET_NAME;
use crate::kubemeta;
use crate::systemmeta::{self, ResourceNotes};

/// Resource type of the Secret carrying the settings.
pub const SETTINGS_RESOURCE_TYPE: &str = "settings";

/// Property flags of a setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SettingProps(u8);

impl SettingProps {
    /// Never served; exclusive with every other flag.
    pub const PRIVATE: Self = Self(1);
    /// Served but hidden from the UI.
    pub const HIDDEN: Self = Self(1 << 1);
    pub const EDITABLE: Self = Self(1 << 2);
    /// Served masked.
    pub const SENSITIVE: Self = Self(1 << 3);

    fn has(self, flag: Self) -> bool {
        self.0 & flag.0 == flag.0
    }

    #[must_use]
    pub fn private(self) -> bool {
        self == Self::PRIVATE
    }

    #[must_use]
    pub fn hidden(self) -> bool {
        !self.private() && self.has(Self::HIDDEN)
    }

    #[must_use]
    pub fn editable(self) -> bool {
        !self.private() && self.has(Self::EDITABLE)
    }

    #[must_use]
    pub fn sensitive(self) -> bool {
        !self.private() && self.has(Self::SENSITIVE)
    }
}

impl BitOr for SettingProps {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone)]
pub struct Setting {
    name: &'static str,
    description: &'static str,
    props: SettingProps,
    initializer: Initializer,
    admission: Admission,
}

impl Setting {
    pub fn new(
        name: &'static str,
        description: &'static str,
        props: SettingProps,
        initializer: Initializer,
        admission: Admission,
    ) -> Self {
        Self {
            name,
            description,
            props,
            initializer,
            admission,
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub fn description(&self) -> &'static str {
        self.description
    }

    #[must_use]
    pub fn props(&self) -> SettingProps {
        self.props
    }

    #[must_use]
    pub fn private(&self) -> bool {
        self.props.private()
    }

    #[must_use]
    pub fn hidden(&self) -> bool {
        self.props.hidden()
    }

    #[must_use]
    pub fn editable(&self) -> bool {
        self.props.editable()
    }

    #[must_use]
    pub fn sensitive(&self) -> bool {
        self.props.sensitive()
    }

    /// Initial value of the setting.
    #[must_use]
    pub fn initial(&self) -> String {
        self.initializer.initial(self.name)
    }

    /// Admit changing the value from `old` to `new`.
    pub fn admit(&self, old: &str, new: &str) -> Result<(), AdmissionError> {
        self.admission.admit(old, new)
    }

    /// Write `value` after admitting it against the stored one; an equal
    /// value is not written.
    pub async fn configure(&self, clients: &Clients, namespace: &str, value: &str) -> Result<()> {
        let expected = settings_secret(namespace, BTreeMap::new());
        update_with_align(
            clients.secrets.as_ref(),
            &expected,
            UpdateMode::UpdateOnly,
            &clients.align,
            |mut secret| {
                let old = kubemeta::secret_value(&secret, self.name).unwrap_or_default();
                self.admit(&old, value).map_err(|e| anyhow!(e))?;
                if old == value {
                    return Ok(Aligned::Skip);
                }
                kubemeta::set_secret_value(&mut secret, self.name, value);
                Ok(Aligned::Update(secret))
            },
        )
        .await
        .with_context(|| format!("configure setting {}", self.name))?;
        info!(setting = self.name, "configured setting");
        Ok(())
    }

    /// Stored value of the setting.
    pub async fn value(&self, clients: &Clients, namespace: &str) -> Result<String> {
        let secret = clients
            .secrets
            .get(Some(namespace), SETTINGS_DELEGATED_SECRET_NAME)
            .await
            .with_context(|| format!("get value of setting {}", self.name))?;
        kubemeta::secret_value(&secret, self.name)
            .ok_or_else(|| anyhow!("get value of setting {}: not found", self.name))
    }

    pub async fn value_bool(&self, clients: &Clients, namespace: &str) -> Result<bool> {
        let value = self.value(clients, namespace).await?;
        parse_bool(&value).ok_or_else(|| anyhow!("setting {} is not a boolean: {value:?}", self.name))
    }

    pub async fn value_i64(&self, clients: &Clients, namespace: &str) -> Result<i64> {
        let value = self.value(clients, namespace).await?;
        value
            .parse()
            .with_context(|| format!("setting {} is not an integer: {value:?}", self.name))
    }

    pub async fn value_u64(&self, clients: &Clients, namespace: &str) -> Result<u64> {
        let value = self.value(clients, namespace).await?;
        value
            .parse()
            .with_context(|| format!("setting {} is not an unsigned integer: {value:?}", self.name))
    }

    pub async fn value_f64(&self, clients: &Clients, namespace: &str) -> Result<f64> {
        let value = self.value(clients, namespace).await?;
        value
            .parse()
            .with_context(|| format!("setting {} is not a number: {value:?}", self.name))
    }

    pub async fn value_url(&self, clients: &Clients, namespace: &str) -> Result<url::Url> {
        let value = self.value(clients, namespace).await?;
        url::Url::parse(&value).with_context(|| format!("setting {} is not a URL: {value:?}", self.name))
    }
}

/// Settings known to the server, indexed by name.
#[derive(Debug, Clone, Default)]
pub struct SettingRegistry {
    settings: BTreeMap<&'static str, Setting>,
}

impl SettingRegistry {
    /// Registry of the built-in settings.
    #[must_use]
    pub fn builtin() -> Self {
        builtin::settings().into_iter().collect()
    }

    /// Add a setting, replacing any with the same name.
    pub fn register(&mut self, setting: Setting) {
        self.settings.insert(setting.name, setting);
    }

    #[must_use]
    pub fn index(&self, name: &str) -> Option<&Setting> {
        self.settings.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Setting> {
        self.settings.values()
    }

    /// Initial value of every setting.
    #[must_use]
    pub fn initials(&self) -> BTreeMap<String, String> {
        self.iter().map(|s| (s.name.to_string(), s.initial())).collect()
    }
}

impl FromIterator<Setting> for SettingRegistry {
    fn from_iter<T: IntoIterator<Item = Setting>>(iter: T) -> Self {
        let mut registry = Self::default();
        for setting in iter {
            registry.register(setting);
        }
        registry
    }
}

fn settings_secret(namespace: &str, data: BTreeMap<String, String>) -> Secret {
    let mut secret = Secret {
        metadata: ObjectMeta {
            namespace: Some(namespace.to_string()),
            name: Some(SETTINGS_DELEGATED_SECRET_NAME.to_string()),
            ..ObjectMeta::default()
        },
        ..Secret::default()
    };
    for (k, v) in &data {
        kubemeta::set_secret_value(&mut secret, k, v);
    }
    systemmeta::note_resource(&mut secret, SETTINGS_RESOURCE_TYPE, ResourceNotes::new());
    secret
}

/// Create the settings Secret, or add the initial value of every setting
/// missing from it. Stored values are never overwritten.
pub async fn initialize(clients: &Clients, registry: &SettingRegistry, namespace: &str) -> Result<()> {
    let initials = registry.initials();
    let expected = settings_secret(namespace, initials.clone());
    update_with_align(
        clients.secrets.as_ref(),
        &expected,
        UpdateMode::UpdateOrCreate,
        &clients.align,
        |mut secret| {
            let missing: Vec<(&String, &String)> = initials
                .iter()
                .filter(|(k, _)| kubemeta::secret_value(&secret, k).is_none())
                .collect();
            if missing.is_empty() {
                return Ok(Aligned::Skip);
            }
            for (k, v) in missing {
                kubemeta::set_secret_value(&mut secret, k, v);
            }
            Ok(Aligned::Update(secret))
        },
    )
    .await
    .context("initialize settings")?;
    info!(namespace, settings = initials.len(), "initialized settings");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{AlignRetry, ObjectClient as _};

    const NS: &str = "walrus-system";

    #[test]
    fn test_props() {
        assert!(SettingProps::PRIVATE.private());
        assert!(!SettingProps::PRIVATE.editable());
        let props = SettingProps::EDITABLE | SettingProps::SENSITIVE;
        assert!(!props.private());
        assert!(props.editable());
        assert!(props.sensitive());
        assert!(!props.hidden());
    }

    #[test]
    fn test_builtin_registry() {
        let registry = SettingRegistry::builtin();
        assert!(registry.index("serve-identify").unwrap().private());
        assert!(registry.index("serve-object-storage-url").unwrap().sensitive());
        assert!(registry.index("unknown").is_none());

        let initials = registry.initials();
        assert_eq!(initials["image-registry"], "docker.io");
        assert_eq!(initials["serve-identify"].len(), 32);
        assert_eq!(initials.len(), registry.iter().count());
    }

    #[test]
    fn test_builtin_admissions() {
        let registry = SettingRegistry::builtin();
        let telemetry = registry.index("enable-telemetry").unwrap();
        assert!(telemetry.admit("true", "false").is_ok());
        assert!(telemetry.admit("true", "maybe").is_err());
        assert!(registry.index("serve-identify").unwrap().admit("a", "b").is_err());
        let catalog_cron = registry.index("catalog-sync-cron").unwrap();
        assert!(catalog_cron.admit("", "0 */10 * * * *").is_err());
        assert!(catalog_cron.admit("", "0 0 */2 * * *").is_ok());
    }

    #[tokio::test]
    async fn test_initialize_keeps_stored_values() {
        let clients = Clients::memory(AlignRetry::default());
        let registry = SettingRegistry::builtin();
        initialize(&clients, &registry, NS).await.unwrap();

        let image_registry = registry.index("image-registry").unwrap();
        image_registry.configure(&clients, NS, "registry.local:5000").await.unwrap();
        initialize(&clients, &registry, NS).await.unwrap();
        assert_eq!(image_registry.value(&clients, NS).await.unwrap(), "registry.local:5000");

        let secret = clients.secrets.get(Some(NS), SETTINGS_DELEGATED_SECRET_NAME).await.unwrap();
        assert_eq!(systemmeta::describe_resource_type(&secret), SETTINGS_RESOURCE_TYPE);
    }

    #[tokio::test]
    async fn test_configure_rejects_and_skips() {
        let clients = Clients::memory(AlignRetry::default());
        let registry = SettingRegistry::builtin();
        initialize(&clients, &registry, NS).await.unwrap();

        let serve_url = registry.index("serve-url").unwrap();
        let err = serve_url.configure(&clients, NS, "http://walrus.local").await.unwrap_err();
        assert!(format!("{err:#}").contains("invalid schema"));

        let before = clients.secrets.get(Some(NS), SETTINGS_DELEGATED_SECRET_NAME).await.unwrap();
        registry
            .index("enable-telemetry")
            .unwrap()
            .configure(&clients, NS, "true")
            .await
            .unwrap();
        let after = clients.secrets.get(Some(NS), SETTINGS_DELEGATED_SECRET_NAME).await.unwrap();
        assert_eq!(before.metadata.resource_version, after.metadata.resource_version);
        assert!(registry.index("enable-telemetry").unwrap().value_bool(&clients, NS).await.unwrap());
    }

    #[tokio::test]
    async fn test_value_without_secret_fails() {
        let clients = Clients::memory(AlignRetry::default());
        let registry = SettingRegistry::builtin();
        let err = registry.index("serve-url").unwrap().value(&clients, NS).await.unwrap_err();
        assert!(err.to_string().starts_with("get value of setting serve-url"));
    }
}
