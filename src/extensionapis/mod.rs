//! # Extension API Setup
//!
//! Builds the storages of every served resource and groups them by
//! `resource[/subresource]` for the HTTP layer.

pub mod walrus;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use crate::client::Clients;
use crate::constants::{API_VERSION, WALRUS_GROUP};
use crate::extensionapi::RestStorage;
use crate::systemsetting::SettingRegistry;

/// Everything a handler needs at setup time.
#[derive(Debug, Clone)]
pub struct SetupOptions {
    pub clients: Clients,
    pub system_namespace: String,
    pub settings: Arc<SettingRegistry>,
    pub file_examples_dir: Option<PathBuf>,
}

/// Storages of one resource, as returned by each handler's `setup`.
pub struct ResourceStorages {
    pub resource: &'static str,
    pub storage: Arc<dyn RestStorage>,
    pub subresources: Vec<(&'static str, Arc<dyn RestStorage>)>,
}

impl ResourceStorages {
    pub fn new(resource: &'static str, storage: Arc<dyn RestStorage>) -> Self {
        Self {
            resource,
            storage,
            subresources: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_subresource(mut self, subresource: &'static str, storage: Arc<dyn RestStorage>) -> Self {
        self.subresources.push((subresource, storage));
        self
    }
}

/// Storages of one group version, keyed by `resource` or
/// `resource/subresource`.
#[derive(Clone)]
pub struct ApiGroupInfo {
    pub group: &'static str,
    pub version: &'static str,
    pub storages: BTreeMap<String, Arc<dyn RestStorage>>,
}

impl std::fmt::Debug for ApiGroupInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiGroupInfo")
            .field("group", &self.group)
            .field("version", &self.version)
            .field("storages", &self.storages.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ApiGroupInfo {
    #[must_use]
    pub fn new(group: &'static str, version: &'static str) -> Self {
        Self {
            group,
            version,
            storages: BTreeMap::new(),
        }
    }

    pub fn install(&mut self, storages: ResourceStorages) {
        for (subresource, storage) in storages.subresources {
            self.storages
                .insert(format!("{}/{subresource}", storages.resource), storage);
        }
        self.storages.insert(storages.resource.to_string(), storages.storage);
    }

    /// Storage serving `resource`, or its `subresource` when given.
    #[must_use]
    pub fn storage(&self, resource: &str, subresource: Option<&str>) -> Option<&Arc<dyn RestStorage>> {
        match subresource {
            Some(sub) => self.storages.get(&format!("{resource}/{sub}")),
            None => self.storages.get(resource),
        }
    }
}

/// Set up every `walrus.seal.io/v1` resource.
pub fn setup(opts: &SetupOptions) -> anyhow::Result<ApiGroupInfo> {
    let mut group = ApiGroupInfo::new(WALRUS_GROUP, API_VERSION);
    group.install(walrus::environment::setup(opts));
    group.install(walrus::project::setup(opts));
    group.install(walrus::setting::setup(opts));
    group.install(walrus::variable::setup(opts));
    group.install(walrus::examples::setup_file_examples(opts).context("set up file examples")?);
    group.install(walrus::examples::setup_template_completion_examples(opts));
    for storages in walrus::proxies::setup(opts) {
        group.install(storages);
    }
    info!(
        group = group.group,
        version = group.version,
        storages = group.storages.len(),
        "set up extension api storages"
    );
    Ok(group)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::AlignRetry;

    #[test]
    fn test_setup_installs_resources_and_subresources() {
        let opts = SetupOptions {
            clients: Clients::memory(AlignRetry::default()),
            system_namespace: "walrus-system".to_string(),
            settings: Arc::new(SettingRegistry::builtin()),
            file_examples_dir: None,
        };
        let group = setup(&opts).unwrap();
        for key in [
            "environments",
            "environments/status",
            "projects",
            "projects/status",
            "projects/subjects",
            "settings",
            "variables",
            "fileexamples",
            "templatecompletionexamples",
            "catalogs",
            "templates",
        ] {
            assert!(group.storages.contains_key(key), "missing {key}");
        }
        assert!(group.storage("projects", Some("subjects")).is_some());
        assert!(group.storage("settings", Some("status")).is_none());
        assert_eq!(group.storage("settings", None).unwrap().verbs(), vec!["get", "list", "patch", "update", "watch"]);
    }
}
