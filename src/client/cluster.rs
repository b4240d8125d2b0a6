//! `kube`-backed object client.

use async_trait::async_trait;
use futures::{stream::BoxStream, StreamExt};
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, DeleteParams, ListParams, PostParams, VersionMatch, WatchParams};
use kube::{core::WatchEvent as KubeWatchEvent, Client, Resource};
use tracing::{debug, Instrument};

use super::ObjectClient;
use crate::extensionapi::{
    name_of, namespace_of, ApiObject, CreateOptions, DeleteOptions, ListOptions, ObjectList,
    PropagationPolicy, ProxyWatcher, StatusError, StatusReason, UpdateOptions, WatchEvent,
};

type ApiFor<K> = fn(Client, Option<&str>) -> Api<K>;

fn namespaced_api<K>(client: Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>,
{
    match namespace.filter(|ns| !ns.is_empty()) {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    }
}

fn cluster_api<K: Resource<DynamicType = ()>>(client: Client, _namespace: Option<&str>) -> Api<K> {
    Api::all(client)
}

/// Object client talking to the Kubernetes API server.
#[derive(Clone)]
pub struct KubeObjectClient<K: ApiObject> {
    client: Client,
    api_for: ApiFor<K>,
}

impl<K: ApiObject> std::fmt::Debug for KubeObjectClient<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeObjectClient")
            .field("kind", &K::kind(&()))
            .finish_non_exhaustive()
    }
}

impl<K> KubeObjectClient<K>
where
    K: ApiObject + Resource<Scope = NamespaceResourceScope>,
{
    pub fn namespaced(client: Client) -> Self {
        Self {
            client,
            api_for: namespaced_api::<K>,
        }
    }
}

impl<K: ApiObject> KubeObjectClient<K> {
    pub fn cluster(client: Client) -> Self {
        Self {
            client,
            api_for: cluster_api::<K>,
        }
    }

    fn api(&self, namespace: Option<&str>) -> Api<K> {
        (self.api_for)(self.client.clone(), namespace)
    }

    fn api_of(&self, obj: &K) -> Api<K> {
        self.api(Some(namespace_of(obj)))
    }
}

fn list_params(opts: &ListOptions) -> ListParams {
    let mut lp = ListParams::default();
    if !opts.label_selector.is_empty() {
        lp = lp.labels(&opts.label_selector.to_string());
    }
    if !opts.field_selector.is_empty() {
        lp = lp.fields(&opts.field_selector.to_string());
    }
    if let Some(limit) = opts.limit.and_then(|l| u32::try_from(l).ok()).filter(|l| *l > 0) {
        lp = lp.limit(limit);
    }
    match opts.continue_token.as_deref().filter(|t| !t.is_empty()) {
        Some(token) => lp = lp.continue_token(token),
        // A continue token already pins the version.
        None => {
            if let Some(rv) = opts.resource_version.as_deref().filter(|rv| !rv.is_empty()) {
                lp = lp.at(rv);
                match opts.resource_version_match.as_deref() {
                    Some("Exact") => lp = lp.matching(VersionMatch::Exact),
                    Some("NotOlderThan") => lp = lp.matching(VersionMatch::NotOlderThan),
                    _ => {}
                }
            }
        }
    }
    lp
}

/// Event forwarded downstream for one upstream watch item. Bookmarks
/// become objects that only carry the resource version.
fn translate_event<K: ApiObject + Default>(event: kube::Result<KubeWatchEvent<K>>) -> WatchEvent<K> {
    match event {
        Ok(KubeWatchEvent::Added(o)) => WatchEvent::Added(o),
        Ok(KubeWatchEvent::Modified(o)) => WatchEvent::Modified(o),
        Ok(KubeWatchEvent::Deleted(o)) => WatchEvent::Deleted(o),
        Ok(KubeWatchEvent::Bookmark(bookmark)) => {
            let mut obj = K::default();
            obj.meta_mut().resource_version = Some(bookmark.metadata.resource_version);
            obj.meta_mut().annotations = Some(bookmark.metadata.annotations).filter(|a| !a.is_empty());
            WatchEvent::Bookmark(obj)
        }
        Ok(KubeWatchEvent::Error(resp)) => WatchEvent::Error(StatusError {
            code: resp.code,
            reason: StatusReason::parse(&resp.reason),
            message: resp.message,
            details: None,
        }),
        Err(err) => WatchEvent::Error(StatusError::from(err)),
    }
}

fn post_params(dry_run: bool, field_manager: Option<&String>) -> PostParams {
    PostParams {
        dry_run,
        field_manager: field_manager.cloned(),
    }
}

fn delete_params(opts: &DeleteOptions) -> DeleteParams {
    DeleteParams {
        dry_run: opts.dry_run,
        grace_period_seconds: opts
            .grace_period_seconds
            .and_then(|s| u32::try_from(s).ok()),
        propagation_policy: opts.propagation_policy.map(|p| match p {
            PropagationPolicy::Orphan => kube::api::PropagationPolicy::Orphan,
            PropagationPolicy::Background => kube::api::PropagationPolicy::Background,
            PropagationPolicy::Foreground => kube::api::PropagationPolicy::Foreground,
        }),
        ..DeleteParams::default()
    }
}

#[async_trait]
impl<K: ApiObject + Default> ObjectClient<K> for KubeObjectClient<K> {
    async fn get(&self, namespace: Option<&str>, name: &str) -> Result<K, StatusError> {
        Ok(self.api(namespace).get(name).await?)
    }

    async fn list(&self, opts: &ListOptions) -> Result<ObjectList<K>, StatusError> {
        let list = self
            .api(opts.namespace.as_deref())
            .list(&list_params(opts))
            .await?;
        Ok(ObjectList {
            metadata: list.metadata,
            items: list.items,
        })
    }

    async fn watch(&self, opts: &ListOptions) -> Result<ProxyWatcher<K>, StatusError> {
        let mut wp = WatchParams::default();
        if !opts.label_selector.is_empty() {
            wp = wp.labels(&opts.label_selector.to_string());
        }
        if !opts.field_selector.is_empty() {
            wp = wp.fields(&opts.field_selector.to_string());
        }
        let version = opts
            .resource_version
            .clone()
            .filter(|rv| !rv.is_empty())
            .unwrap_or_else(|| "0".to_string());

        let mut upstream: BoxStream<'static, kube::Result<KubeWatchEvent<K>>> = self
            .api(opts.namespace.as_deref())
            .watch(&wp, &version)
            .await?
            .boxed();

        let (tx, watcher) = ProxyWatcher::channel();
        let span = tracing::debug_span!("kube.watch", kind = %K::kind(&()), resource_version = %version);
        tokio::spawn(
            async move {
                loop {
                    let next = tokio::select! {
                        () = tx.stopped() => return,
                        next = upstream.next() => next,
                    };
                    let Some(next) = next else {
                        debug!("upstream watch closed");
                        return;
                    };
                    let event = translate_event(next);
                    if !tx.send(event).await {
                        return;
                    }
                }
            }
            .instrument(span),
        );
        Ok(watcher)
    }

    async fn create(&self, obj: &K, opts: &CreateOptions) -> Result<K, StatusError> {
        let pp = post_params(opts.dry_run, opts.field_manager.as_ref());
        Ok(self.api_of(obj).create(&pp, obj).await?)
    }

    async fn update(&self, obj: &K, opts: &UpdateOptions) -> Result<K, StatusError> {
        let pp = post_params(opts.dry_run, opts.field_manager.as_ref());
        Ok(self.api_of(obj).replace(name_of(obj), &pp, obj).await?)
    }

    async fn delete(&self, obj: &K, opts: &DeleteOptions) -> Result<(), StatusError> {
        self.api_of(obj)
            .delete(name_of(obj), &delete_params(opts))
            .await?;
        Ok(())
    }
}
