//! The walruscore resources served as-is under `walrus.seal.io`.

use std::sync::Arc;

use crate::apis::walrus::v1::{Catalog, Connector, Resource, ResourceDefinition, ResourceRun, Template};
use crate::client::ObjectClient;
use crate::extensionapi::{CurdOperations, CurdProxyHandler, ProxiedObject};
use crate::extensionapis::{ResourceStorages, SetupOptions};

pub fn setup(opts: &SetupOptions) -> Vec<ResourceStorages> {
    let clients = &opts.clients;
    vec![
        proxy::<Catalog>("catalogs", Arc::clone(&clients.catalogs)),
        proxy::<Connector>("connectors", Arc::clone(&clients.connectors)),
        proxy::<Resource>("resources", Arc::clone(&clients.resources)),
        proxy::<ResourceDefinition>("resourcedefinitions", Arc::clone(&clients.resource_definitions)),
        proxy::<ResourceRun>("resourceruns", Arc::clone(&clients.resource_runs)),
        proxy::<Template>("templates", Arc::clone(&clients.templates)),
    ]
}

fn proxy<D: ProxiedObject>(resource: &'static str, client: Arc<dyn ObjectClient<D::Upstream>>) -> ResourceStorages {
    let handler = Arc::new(CurdProxyHandler::<D>::new(client, true));
    let storage = CurdOperations::new(None, handler).storage(true);
    ResourceStorages::new(resource, Arc::new(storage))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apis::walruscore::v1 as walruscore;
    use crate::client::{AlignRetry, Clients};
    use crate::extensionapi::{CreateOptions, GetOptions, RequestContext, RequestInfo};
    use serde_json::json;

    #[tokio::test]
    async fn test_template_round_trips_through_walruscore() {
        let clients = Clients::memory(AlignRetry::default());
        let opts = SetupOptions {
            clients: clients.clone(),
            system_namespace: "walrus-system".to_string(),
            settings: Arc::new(crate::systemsetting::SettingRegistry::builtin()),
            file_examples_dir: None,
        };
        let storages = setup(&opts);
        let templates = storages.iter().find(|s| s.resource == "templates").unwrap();

        let ctx = RequestContext::new(RequestInfo::new("walrus.seal.io", "templates").with_namespace("acme"));
        let created = templates
            .storage
            .create(
                &ctx,
                json!({
                    "apiVersion": "walrus.seal.io/v1",
                    "kind": "Template",
                    "metadata": {"name": "webservice"},
                    "spec": {"templateFormat": "terraform"},
                }),
                &CreateOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(created["apiVersion"], "walrus.seal.io/v1");

        let upstream: walruscore::Template = clients.templates.get(Some("acme"), "webservice").await.unwrap();
        assert_eq!(upstream.spec.template_format, "terraform");

        let got = templates
            .storage
            .get(&ctx, "webservice", &GetOptions::default())
            .await
            .unwrap();
        assert_eq!(got["spec"]["templateFormat"], "terraform");
    }

    #[test]
    fn test_sparse_specs_decode() {
        let template: walruscore::Template = serde_json::from_value(json!({
            "apiVersion": "walruscore.seal.io/v1",
            "kind": "Template",
            "metadata": {"name": "webservice", "namespace": "acme"},
            "spec": {},
        }))
        .unwrap();
        assert!(template.spec.vcs_repository.url.is_empty());

        let connector: walruscore::Connector = serde_json::from_value(json!({
            "apiVersion": "walruscore.seal.io/v1",
            "kind": "Connector",
            "metadata": {"name": "aws", "namespace": "acme"},
            "spec": {"type": "aws"},
        }))
        .unwrap();
        assert_eq!(connector.spec.r#type, "aws");
        assert!(connector.spec.category.is_empty());

        let run: walruscore::ResourceRun = serde_json::from_value(json!({
            "apiVersion": "walruscore.seal.io/v1",
            "kind": "ResourceRun",
            "metadata": {"name": "web-1", "namespace": "acme-dev"},
            "spec": {},
        }))
        .unwrap();
        assert!(run.spec.resource_name.is_empty());
    }
}
