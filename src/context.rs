//! # Application Context
//!
//! Configuration, clients and the setting registry, constructed once at
//! startup and handed to every component that needs them.

use anyhow::Context;
use k8s_openapi::api::core::v1::Namespace;
use kube::api::ObjectMeta;
use std::sync::Arc;
use tracing::info;

use crate::client::{AlignRetry, Clients, ObjectClient as _};
use crate::config::ServerConfig;
use crate::extensionapi::CreateOptions;
use crate::extensionapis::SetupOptions;
use crate::systemsetting::{self, SettingRegistry};

#[derive(Debug, Clone)]
pub struct AppContext {
    pub config: ServerConfig,
    pub clients: Clients,
    pub settings: Arc<SettingRegistry>,
}

impl AppContext {
    #[must_use]
    pub fn new(config: ServerConfig, clients: Clients, settings: SettingRegistry) -> Self {
        Self {
            config,
            clients,
            settings: Arc::new(settings),
        }
    }

    /// Context over in-memory clients with the built-in settings.
    #[must_use]
    pub fn in_memory(config: ServerConfig) -> Self {
        let clients = Clients::memory(AlignRetry::from(&config));
        Self::new(config, clients, SettingRegistry::builtin())
    }

    /// Create the system namespace when missing and initialize the settings.
    pub async fn bootstrap(&self) -> anyhow::Result<()> {
        let name = self.config.system_namespace.as_str();
        let ns = Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..ObjectMeta::default()
            },
            ..Namespace::default()
        };
        match self.clients.namespaces.create(&ns, &CreateOptions::default()).await {
            Ok(_) => info!(namespace = name, "created system namespace"),
            Err(err) if err.is_already_exists() => {}
            Err(err) => return Err(err).context("create system namespace"),
        }
        systemsetting::initialize(&self.clients, &self.settings, name).await
    }

    #[must_use]
    pub fn setup_options(&self) -> SetupOptions {
        SetupOptions {
            clients: self.clients.clone(),
            system_namespace: self.config.system_namespace.clone(),
            settings: Arc::clone(&self.settings),
            file_examples_dir: self.config.file_examples_dir.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_options_follow_config() {
        let config = ServerConfig {
            system_namespace: "walrus-test".to_string(),
            ..ServerConfig::default()
        };
        let ctx = AppContext::in_memory(config);
        let opts = ctx.setup_options();
        assert_eq!(opts.system_namespace, "walrus-test");
        assert!(opts.file_examples_dir.is_none());
        assert!(opts.settings.index("serve-url").is_some());
    }

    #[tokio::test]
    async fn test_bootstrap_is_repeatable() {
        let ctx = AppContext::in_memory(ServerConfig::default());
        ctx.bootstrap().await.unwrap();
        ctx.bootstrap().await.unwrap();

        ctx.clients.namespaces.get(None, "walrus-system").await.unwrap();
        let secret = ctx
            .clients
            .secrets
            .get(Some("walrus-system"), crate::constants::SETTINGS_DELEGATED_SECRET_NAME)
            .await
            .unwrap();
        assert!(crate::kubemeta::secret_value(&secret, "serve-url").is_some());
    }
}
