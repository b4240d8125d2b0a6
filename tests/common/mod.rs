//! Common test utilities for the integration tests
//!
//! Builds the full `walrus.seal.io/v1` storage set over in-memory clients,
//! with the system namespace and settings bootstrapped.

#![allow(dead_code, reason = "each test crate uses a subset of the helpers")]

use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{BoxStream, StreamExt};
use walrus::client::Clients;
use walrus::config::ServerConfig;
use walrus::context::AppContext;
use walrus::extensionapi::{CreateOptions, RequestContext, RequestInfo, RestStorage, StatusError};
use walrus::extensionapis::{self, ApiGroupInfo};

pub const SYSTEM: &str = "walrus-system";
pub const GROUP: &str = "walrus.seal.io";

pub struct Harness {
    pub clients: Clients,
    pub api: ApiGroupInfo,
}

impl Harness {
    pub async fn new() -> Self {
        let ctx = AppContext::in_memory(ServerConfig::default());
        ctx.bootstrap().await.expect("bootstrap");
        let api = extensionapis::setup(&ctx.setup_options()).expect("setup");
        Self {
            clients: ctx.clients.clone(),
            api,
        }
    }

    pub fn storage(&self, resource: &str) -> Arc<dyn RestStorage> {
        Arc::clone(self.api.storage(resource, None).expect("storage"))
    }

    pub async fn create_project(&self, name: &str) -> Value {
        let body = json!({
            "apiVersion": "walrus.seal.io/v1",
            "kind": "Project",
            "metadata": {"name": name},
            "spec": {"displayName": name},
        });
        self.storage("projects")
            .create(&request("projects", SYSTEM), body, &CreateOptions::default())
            .await
            .expect("create project")
    }

    pub async fn create_environment(&self, project: &str, name: &str, env_type: &str) -> Result<Value, StatusError> {
        let body = json!({
            "apiVersion": "walrus.seal.io/v1",
            "kind": "Environment",
            "metadata": {"name": name},
            "spec": {"type": env_type},
        });
        self.storage("environments")
            .create(&request("environments", project), body, &CreateOptions::default())
            .await
    }

    pub async fn create_variable(&self, namespace: &str, name: &str, value: &str, sensitive: bool) -> Value {
        let body = json!({
            "apiVersion": "walrus.seal.io/v1",
            "kind": "Variable",
            "metadata": {"name": name},
            "spec": {"value": value, "sensitive": sensitive},
        });
        self.storage("variables")
            .create(&request("variables", namespace), body, &CreateOptions::default())
            .await
            .expect("create variable")
    }
}

pub fn request(resource: &str, namespace: &str) -> RequestContext {
    RequestContext::new(RequestInfo::new(GROUP, resource).with_namespace(namespace))
}

/// Next watch frame that is not a bookmark.
pub async fn next_frame(frames: &mut BoxStream<'static, Value>) -> Option<Value> {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), frames.next())
            .await
            .ok()??;
        if frame["type"] != "BOOKMARK" {
            return Some(frame);
        }
    }
}
