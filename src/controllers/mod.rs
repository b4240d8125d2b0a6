//! # Walruscore Controllers
//!
//! Reconcilers of the walruscore kinds. They only observe objects today;
//! failed reconciliations are requeued with a per-object Fibonacci backoff.

use futures::{future, StreamExt};
use kube::{Api, Client, Resource};
use kube::runtime::{controller::Action, watcher, Controller};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::apis::walruscore::v1::{Catalog, Connector, Resource as CoreResource, ResourceDefinition, ResourceRun, Template};
use crate::backoff::FibonacciBackoff;
use crate::config::ServerConfig;
use crate::observability::metrics;

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("{kind} object without a name")]
    MissingName { kind: String },
}

#[derive(Debug)]
struct BackoffState {
    backoff: FibonacciBackoff,
    error_count: u32,
}

impl BackoffState {
    fn new() -> Self {
        Self {
            backoff: FibonacciBackoff::for_reconciliation(),
            error_count: 0,
        }
    }
}

/// State shared by every reconciliation of one kind.
#[derive(Debug)]
pub struct ReconcileContext {
    kind: String,
    default_requeue: Duration,
    // Backoff state per object (identified by namespace/name)
    backoff_states: Mutex<HashMap<String, BackoffState>>,
}

impl ReconcileContext {
    #[must_use]
    pub fn new(kind: &str, config: &ServerConfig) -> Self {
        Self {
            kind: kind.to_string(),
            default_requeue: config.reconciliation_error_requeue_duration(),
            backoff_states: Mutex::new(HashMap::new()),
        }
    }

    fn forget(&self, key: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            states.remove(key);
        }
    }
}

fn object_key<K: Resource>(obj: &K) -> String {
    let meta = obj.meta();
    format!(
        "{}/{}",
        meta.namespace.as_deref().unwrap_or_default(),
        meta.name.as_deref().unwrap_or_default()
    )
}

pub async fn reconcile<K>(obj: Arc<K>, ctx: Arc<ReconcileContext>) -> Result<Action, ReconcilerError>
where
    K: Resource,
{
    metrics::increment_reconciliations(&ctx.kind);
    if obj.meta().name.is_none() {
        return Err(ReconcilerError::MissingName { kind: ctx.kind.clone() });
    }
    let key = object_key(obj.as_ref());
    debug!(kind = %ctx.kind, object = %key, "reconciled");
    ctx.forget(&key);
    Ok(Action::await_change())
}

pub fn error_policy<K>(obj: Arc<K>, err: &ReconcilerError, ctx: Arc<ReconcileContext>) -> Action
where
    K: Resource,
{
    let key = object_key(obj.as_ref());
    error!(kind = %ctx.kind, object = %key, error = %err, "reconciliation failed");

    let (requeue, error_count) = match ctx.backoff_states.lock() {
        Ok(mut states) => {
            let state = states.entry(key.clone()).or_insert_with(BackoffState::new);
            state.error_count += 1;
            (state.backoff.next_backoff(), state.error_count)
        }
        Err(e) => {
            warn!("Failed to lock backoff_states: {}, using default backoff", e);
            (ctx.default_requeue, 0)
        }
    };
    info!(
        kind = %ctx.kind,
        object = %key,
        error_count,
        "retrying in {}s",
        requeue.as_secs()
    );
    Action::requeue(requeue)
}

async fn run_controller<K>(client: Client, config: &ServerConfig)
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    let kind = K::kind(&()).into_owned();
    let ctx = Arc::new(ReconcileContext::new(&kind, config));
    info!(kind = %kind, "starting controller");
    Controller::new(Api::<K>::all(client), watcher::Config::default())
        .shutdown_on_signal()
        .run(reconcile::<K>, error_policy::<K>, ctx)
        .for_each(|res| {
            match res {
                Ok((obj, _)) => debug!(kind = %kind, object = %obj.name, "reconcile finished"),
                Err(e) => warn!(kind = %kind, error = %e, "reconcile stream error"),
            }
            future::ready(())
        })
        .await;
    info!(kind = %kind, "controller stopped");
}

/// Run the controllers of every walruscore kind until shutdown.
pub async fn run(client: Client, config: ServerConfig) {
    tokio::join!(
        run_controller::<Catalog>(client.clone(), &config),
        run_controller::<Connector>(client.clone(), &config),
        run_controller::<CoreResource>(client.clone(), &config),
        run_controller::<ResourceDefinition>(client.clone(), &config),
        run_controller::<ResourceRun>(client.clone(), &config),
        run_controller::<Template>(client, &config),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apis::walruscore::v1::TemplateSpec;

    fn template(name: Option<&str>) -> Arc<Template> {
        let mut template = Template::new("webservice", TemplateSpec::default());
        template.metadata.name = name.map(str::to_string);
        template.metadata.namespace = Some("acme".to_string());
        Arc::new(template)
    }

    #[tokio::test]
    async fn test_reconcile_awaits_change() {
        let ctx = Arc::new(ReconcileContext::new("Template", &ServerConfig::default()));
        let action = reconcile(template(Some("webservice")), ctx).await.unwrap();
        assert_eq!(action, Action::await_change());
    }

    #[tokio::test]
    async fn test_reconcile_rejects_unnamed_object() {
        let ctx = Arc::new(ReconcileContext::new("Template", &ServerConfig::default()));
        let err = reconcile(template(None), ctx).await.unwrap_err();
        assert!(err.to_string().contains("Template"));
    }

    #[tokio::test]
    async fn test_error_policy_backs_off_until_success() {
        let ctx = Arc::new(ReconcileContext::new("Template", &ServerConfig::default()));
        let err = ReconcilerError::MissingName {
            kind: "Template".to_string(),
        };
        let obj = template(Some("webservice"));

        let delays: Vec<Action> = (0..4)
            .map(|_| error_policy(Arc::clone(&obj), &err, Arc::clone(&ctx)))
            .collect();
        assert_eq!(
            delays,
            vec![
                Action::requeue(Duration::from_secs(60)),
                Action::requeue(Duration::from_secs(60)),
                Action::requeue(Duration::from_secs(120)),
                Action::requeue(Duration::from_secs(180)),
            ]
        );

        reconcile(Arc::clone(&obj), Arc::clone(&ctx)).await.unwrap();
        assert_eq!(
            error_policy(obj, &err, ctx),
            Action::requeue(Duration::from_secs(60))
        );
    }
}
