//! Read-only example content: file examples loaded from a directory at
//! startup, and the built-in template completion prompts.

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::qualified;
use crate::apis::walrus::v1::{
    FileExample, FileExampleSpec, FileExampleStatus, TemplateCompletionExample, TemplateCompletionExampleSpec,
    TemplateCompletionExampleStatus,
};
use crate::extensionapi::{
    field_set, name_of, ApiObject, GetHandler, GetOperation, GetOptions, ListHandler, ListOperation, ListOptions,
    ObjectKey, ObjectList, RequestContext, ResourceHandler, StatusError, Storage,
};
use crate::extensionapis::{ResourceStorages, SetupOptions};
use crate::kubemeta;

const FILE_EXAMPLES: &str = "fileexamples";
const TEMPLATE_COMPLETION_EXAMPLES: &str = "templatecompletionexamples";

/// Shape of one `*.yaml` file in the file examples directory.
#[derive(Debug, Deserialize)]
struct FileExampleSource {
    #[serde(default)]
    icon: Option<String>,
    content: String,
}

pub fn setup_file_examples(opts: &SetupOptions) -> anyhow::Result<ResourceStorages> {
    let examples = match &opts.file_examples_dir {
        Some(dir) => load_file_examples(dir)?,
        None => Vec::new(),
    };
    info!(count = examples.len(), "loaded file examples");
    Ok(ResourceStorages::new(FILE_EXAMPLES, read_only_storage(FILE_EXAMPLES, examples)))
}

pub fn setup_template_completion_examples(_opts: &SetupOptions) -> ResourceStorages {
    ResourceStorages::new(
        TEMPLATE_COMPLETION_EXAMPLES,
        read_only_storage(TEMPLATE_COMPLETION_EXAMPLES, template_completion_examples()),
    )
}

fn read_only_storage<K: ApiObject>(resource: &'static str, items: Vec<K>) -> Arc<Storage<K>> {
    let handler = Arc::new(ExampleHandler::new(resource, items));
    Arc::new(
        Storage::new(false)
            .with_getter(Arc::new(GetOperation::new(Arc::clone(&handler))))
            .with_lister(Arc::new(ListOperation::new(None, handler))),
    )
}

/// Every `*.yaml` file below `dir`, named after its file stem.
/// A missing directory yields no examples.
pub(crate) fn load_file_examples(dir: &Path) -> anyhow::Result<Vec<FileExample>> {
    if !dir.exists() {
        warn!(path = %dir.display(), "file examples directory does not exist");
        return Ok(Vec::new());
    }
    let mut examples = BTreeMap::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.with_context(|| format!("walk {}", dir.display()))?;
        let path = entry.path();
        if !entry.file_type().is_file() || !path.extension().is_some_and(|ext| ext == "yaml") {
            continue;
        }
        let Some(name) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
            continue;
        };
        let raw = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let source: FileExampleSource =
            serde_yaml::from_str(&raw).with_context(|| format!("parse {}", path.display()))?;
        debug!(name = %name, path = %path.display(), "loaded file example");

        let mut example = FileExample::new(&name, FileExampleSpec {});
        example.metadata.uid = Some(kubemeta::stable_uid(&name));
        example.status = Some(FileExampleStatus {
            icon: source.icon,
            content: source.content,
        });
        examples.insert(name, example);
    }
    Ok(examples.into_values().collect())
}

fn template_completion_examples() -> Vec<TemplateCompletionExample> {
    [
        (
            "kubernetes-web-service",
            "Deploy a containerized web service to Kubernetes.",
            "Write a Terraform module that deploys a container image as a Kubernetes Deployment \
             with a configurable number of replicas, and exposes it through a Service.",
        ),
        (
            "aws-s3-bucket",
            "Provision a private AWS S3 bucket.",
            "Write a Terraform module that creates a private AWS S3 bucket with versioning and \
             server side encryption enabled, and outputs the bucket name and ARN.",
        ),
        (
            "alibaba-cloud-rds-mysql",
            "Provision a MySQL instance on Alibaba Cloud RDS.",
            "Write a Terraform module that creates an Alibaba Cloud RDS MySQL instance, a database \
             and an account, and outputs the connection address.",
        ),
    ]
    .into_iter()
    .map(|(name, description, prompt)| {
        let mut example = TemplateCompletionExample::new(name, TemplateCompletionExampleSpec {});
        example.metadata.uid = Some(kubemeta::stable_uid(name));
        example.status = Some(TemplateCompletionExampleStatus {
            description: description.to_string(),
            prompt: prompt.to_string(),
        });
        example
    })
    .collect()
}

/// Serves a fixed set of objects.
pub struct ExampleHandler<K> {
    resource: &'static str,
    items: BTreeMap<String, K>,
}

impl<K> std::fmt::Debug for ExampleHandler<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExampleHandler")
            .field("resource", &self.resource)
            .field("items", &self.items.len())
            .finish()
    }
}

impl<K: ApiObject> ExampleHandler<K> {
    #[must_use]
    pub fn new(resource: &'static str, items: Vec<K>) -> Self {
        Self {
            resource,
            items: items.into_iter().map(|i| (name_of(&i).to_string(), i)).collect(),
        }
    }
}

impl<K: ApiObject> ResourceHandler for ExampleHandler<K> {
    type Object = K;

    fn namespace_scoped(&self) -> bool {
        false
    }
}

#[async_trait]
impl<K: ApiObject> ListHandler for ExampleHandler<K> {
    async fn on_list(&self, _ctx: &RequestContext, opts: &ListOptions) -> anyhow::Result<ObjectList<K>> {
        let items = self
            .items
            .iter()
            .filter(|(name, _)| opts.field_selector.matches(&field_set(&[("metadata.name", name.as_str())])))
            .map(|(_, item)| item.clone())
            .collect();
        Ok(ObjectList::new(items))
    }
}

#[async_trait]
impl<K: ApiObject> GetHandler for ExampleHandler<K> {
    async fn on_get(&self, _ctx: &RequestContext, key: &ObjectKey, _opts: &GetOptions) -> anyhow::Result<K> {
        self.items
            .get(&key.name)
            .cloned()
            .ok_or_else(|| StatusError::not_found(&qualified(self.resource), &key.name).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{AlignRetry, Clients};
    use crate::extensionapi::{RequestInfo, RestStorage as _, StatusReason};

    fn opts(dir: Option<&Path>) -> SetupOptions {
        SetupOptions {
            clients: Clients::memory(AlignRetry::default()),
            system_namespace: "walrus-system".to_string(),
            settings: Arc::new(crate::systemsetting::SettingRegistry::builtin()),
            file_examples_dir: dir.map(Path::to_path_buf),
        }
    }

    #[test]
    fn test_load_file_examples_walks_yaml_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("nginx.yaml"), "icon: nginx.svg\ncontent: |\n  image: nginx\n").unwrap();
        std::fs::create_dir(dir.path().join("db")).unwrap();
        std::fs::write(dir.path().join("db").join("mysql.yaml"), "content: engine\n").unwrap();
        std::fs::write(dir.path().join("README.md"), "# ignored").unwrap();

        let examples = load_file_examples(dir.path()).unwrap();
        let names: Vec<&str> = examples.iter().map(|e| name_of(e)).collect();
        assert_eq!(names, vec!["mysql", "nginx"]);
        let nginx = examples[1].status.as_ref().unwrap();
        assert_eq!(nginx.icon.as_deref(), Some("nginx.svg"));
        assert_eq!(nginx.content, "image: nginx\n");
        assert_eq!(examples[1].metadata.uid.as_deref(), Some(kubemeta::stable_uid("nginx").as_str()));
    }

    #[test]
    fn test_load_file_examples_rejects_malformed_yaml() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.yaml"), "icon: [").unwrap();
        let err = load_file_examples(dir.path()).unwrap_err();
        assert!(format!("{err:#}").contains("broken.yaml"));
    }

    #[tokio::test]
    async fn test_served_read_only() {
        let storages = setup_template_completion_examples(&opts(None));
        assert_eq!(storages.storage.verbs(), vec!["get", "list"]);

        let ctx = RequestContext::new(RequestInfo::new("walrus.seal.io", TEMPLATE_COMPLETION_EXAMPLES));
        let list = storages
            .storage
            .list(&ctx, &ListOptions::default(), false)
            .await
            .unwrap();
        assert_eq!(list["items"].as_array().unwrap().len(), 3);

        let got = storages
            .storage
            .get(&ctx, "aws-s3-bucket", &GetOptions::default())
            .await
            .unwrap();
        assert!(got["status"]["prompt"].as_str().unwrap().contains("S3"));

        let err = storages
            .storage
            .get(&ctx, "missing", &GetOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.reason, StatusReason::NotFound);
    }

    #[test]
    fn test_file_examples_without_directory() {
        let storages = setup_file_examples(&opts(None)).unwrap();
        assert_eq!(storages.resource, FILE_EXAMPLES);
    }

    #[test]
    fn test_missing_directory_serves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("file-examples");
        assert!(load_file_examples(&missing).unwrap().is_empty());
        let storages = setup_file_examples(&opts(Some(&missing))).unwrap();
        assert_eq!(storages.resource, FILE_EXAMPLES);
    }
}
