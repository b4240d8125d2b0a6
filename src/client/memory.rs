//! In-memory object client.
//!
//! Behaves like the API server where handlers can tell the difference:
//! resource versions come from one clock shared by all stores, stale
//! updates conflict, deletes of objects holding finalizers only mark them
//! terminating, and watches see every write after they start.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tracing::{warn, Instrument};

use super::ObjectClient;
use crate::constants::MEMORY_WATCH_CHANNEL_CAPACITY;
use crate::extensionapi::{
    field_set, name_of, namespace_of, resource_version_of, ApiObject, CreateOptions, DeleteOptions,
    FieldError, GroupResource, ListOptions, ObjectList, ProxyWatcher, StatusError, UpdateOptions,
    WatchEvent,
};
use crate::kubemeta;

/// Resource version source shared by a set of stores.
#[derive(Debug, Clone, Default)]
pub struct MemoryClock(Arc<AtomicU64>);

impl MemoryClock {
    fn tick(&self) -> String {
        (self.0.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    fn current(&self) -> String {
        self.0.load(Ordering::SeqCst).to_string()
    }
}

type StoreKey = (String, String);

pub struct MemoryObjectClient<K: ApiObject> {
    objects: Mutex<BTreeMap<StoreKey, K>>,
    events: broadcast::Sender<WatchEvent<K>>,
    clock: MemoryClock,
    namespace_scoped: bool,
}

impl<K: ApiObject> std::fmt::Debug for MemoryObjectClient<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryObjectClient")
            .field("kind", &K::kind(&()))
            .field("namespace_scoped", &self.namespace_scoped)
            .finish_non_exhaustive()
    }
}

impl<K: ApiObject> MemoryObjectClient<K> {
    pub fn new(clock: MemoryClock, namespace_scoped: bool) -> Self {
        let (events, _) = broadcast::channel(MEMORY_WATCH_CHANNEL_CAPACITY);
        Self {
            objects: Mutex::new(BTreeMap::new()),
            events,
            clock,
            namespace_scoped,
        }
    }

    pub fn namespaced(clock: MemoryClock) -> Self {
        Self::new(clock, true)
    }

    pub fn cluster(clock: MemoryClock) -> Self {
        Self::new(clock, false)
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<StoreKey, K>> {
        self.objects.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn qualified() -> GroupResource {
        GroupResource::new(K::group(&()).to_string(), K::plural(&()).to_string())
    }

    fn key(&self, namespace: Option<&str>, name: &str) -> StoreKey {
        let namespace = if self.namespace_scoped {
            namespace.unwrap_or_default()
        } else {
            ""
        };
        (namespace.to_string(), name.to_string())
    }

    fn key_of(&self, obj: &K) -> StoreKey {
        self.key(Some(namespace_of(obj)), name_of(obj))
    }

    /// Replace the stored object with `merge(current)`, enforcing the
    /// resource version precondition of `obj`.
    fn replace(
        &self,
        obj: &K,
        dry_run: bool,
        merge: impl FnOnce(&K) -> Result<K, StatusError>,
    ) -> Result<K, StatusError> {
        let name = name_of(obj);
        let key = self.key_of(obj);
        let mut objects = self.lock();
        let Some(current) = objects.get(&key) else {
            return Err(StatusError::not_found(&Self::qualified(), name));
        };
        let precondition = resource_version_of(obj);
        if !precondition.is_empty() && precondition != resource_version_of(current) {
            return Err(StatusError::conflict(
                &Self::qualified(),
                name,
                "the object has been modified; please apply your changes to the latest version and try again",
            ));
        }

        let mut next = merge(current)?;
        {
            let (meta, prev) = (next.meta_mut(), current.meta());
            meta.uid.clone_from(&prev.uid);
            meta.creation_timestamp.clone_from(&prev.creation_timestamp);
            meta.deletion_timestamp.clone_from(&prev.deletion_timestamp);
            meta.generation = prev.generation;
            meta.resource_version.clone_from(&prev.resource_version);
            if !self.namespace_scoped {
                meta.namespace = None;
            }
        }
        if unchanged(current, &next) {
            return Ok(current.clone());
        }
        next.meta_mut().resource_version = Some(self.clock.tick());
        if dry_run {
            return Ok(next);
        }

        let released = next.meta().deletion_timestamp.is_some()
            && next.meta().finalizers.as_ref().is_none_or(Vec::is_empty);
        if released {
            objects.remove(&key);
            let _ = self.events.send(WatchEvent::Deleted(next.clone()));
        } else {
            objects.insert(key, next.clone());
            let _ = self.events.send(WatchEvent::Modified(next.clone()));
        }
        Ok(next)
    }
}

fn unchanged<K: ApiObject>(current: &K, next: &K) -> bool {
    match (serde_json::to_value(current), serde_json::to_value(next)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn selected<K: ApiObject>(namespace_scoped: bool, opts: &ListOptions, obj: &K) -> bool {
    if namespace_scoped {
        if let Some(ns) = opts.namespace.as_deref() {
            if namespace_of(obj) != ns {
                return false;
            }
        }
    }
    let empty = BTreeMap::new();
    let labels = obj.meta().labels.as_ref().unwrap_or(&empty);
    if !opts.label_selector.matches(labels) {
        return false;
    }
    opts.field_selector.matches(&field_set(&[
        ("metadata.name", name_of(obj)),
        ("metadata.namespace", namespace_of(obj)),
    ]))
}

fn encode_continue((namespace, name): &StoreKey) -> String {
    format!("{namespace}/{name}")
}

fn decode_continue(token: &str) -> Option<StoreKey> {
    token
        .split_once('/')
        .map(|(ns, name)| (ns.to_string(), name.to_string()))
}

/// Watches starting from no particular version first see what exists.
fn replays_existing(opts: &ListOptions) -> bool {
    matches!(opts.resource_version.as_deref(), None | Some("" | "0"))
}

#[async_trait]
impl<K: ApiObject> ObjectClient<K> for MemoryObjectClient<K> {
    async fn get(&self, namespace: Option<&str>, name: &str) -> Result<K, StatusError> {
        self.lock()
            .get(&self.key(namespace, name))
            .cloned()
            .ok_or_else(|| StatusError::not_found(&Self::qualified(), name))
    }

    async fn list(&self, opts: &ListOptions) -> Result<ObjectList<K>, StatusError> {
        let objects = self.lock();
        let start = match opts.continue_token.as_deref().filter(|t| !t.is_empty()) {
            Some(token) => Bound::Excluded(
                decode_continue(token)
                    .ok_or_else(|| StatusError::bad_request(format!("invalid continue token {token:?}")))?,
            ),
            None => Bound::Unbounded,
        };
        let limit = opts
            .limit
            .and_then(|l| usize::try_from(l).ok())
            .filter(|l| *l > 0);

        let mut items = Vec::new();
        let mut last: Option<&StoreKey> = None;
        let mut continue_token = None;
        for (key, obj) in objects.range((start, Bound::Unbounded)) {
            if !selected(self.namespace_scoped, opts, obj) {
                continue;
            }
            if limit.is_some_and(|l| items.len() >= l) {
                continue_token = last.map(encode_continue);
                break;
            }
            items.push(obj.clone());
            last = Some(key);
        }

        let mut list = ObjectList::new(items);
        list.metadata.resource_version = Some(self.clock.current());
        list.metadata.continue_ = continue_token;
        Ok(list)
    }

    async fn watch(&self, opts: &ListOptions) -> Result<ProxyWatcher<K>, StatusError> {
        let mut events = self.events.subscribe();
        let existing: Vec<K> = if replays_existing(opts) {
            self.lock()
                .values()
                .filter(|o| selected(self.namespace_scoped, opts, *o))
                .cloned()
                .collect()
        } else {
            Vec::new()
        };

        let (tx, watcher) = ProxyWatcher::channel();
        let opts = opts.clone();
        let namespace_scoped = self.namespace_scoped;
        let span = tracing::debug_span!("memory.watch", kind = %K::kind(&()));
        tokio::spawn(
            async move {
                for obj in existing {
                    if !tx.send(WatchEvent::Added(obj)).await {
                        return;
                    }
                }
                loop {
                    let received = tokio::select! {
                        () = tx.stopped() => return,
                        received = events.recv() => received,
                    };
                    match received {
                        Ok(event) => {
                            let wanted = event
                                .object()
                                .is_some_and(|o| selected(namespace_scoped, &opts, o));
                            if wanted && !tx.send(event).await {
                                return;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "watch fell behind, closing");
                            let _ = tx
                                .send(WatchEvent::Error(StatusError::internal(format!(
                                    "watch fell behind by {skipped} events"
                                ))))
                                .await;
                            return;
                        }
                        Err(broadcast::error::RecvError::Closed) => return,
                    }
                }
            }
            .instrument(span),
        );
        Ok(watcher)
    }

    async fn create(&self, obj: &K, opts: &CreateOptions) -> Result<K, StatusError> {
        let mut obj = obj.clone();
        {
            let meta = obj.meta_mut();
            if meta.name.as_deref().unwrap_or_default().is_empty() {
                match meta.generate_name.as_deref().filter(|g| !g.is_empty()) {
                    Some(base) => meta.name = Some(kubemeta::generate_name(base)),
                    None => {
                        return Err(StatusError::invalid(
                            &Self::qualified(),
                            "",
                            vec![FieldError::required(
                                "metadata.name",
                                "name or generateName is required",
                            )],
                        ))
                    }
                }
            }
            if !self.namespace_scoped {
                meta.namespace = None;
            } else if meta.namespace.as_deref().unwrap_or_default().is_empty() {
                return Err(StatusError::bad_request("the namespace of the object is required"));
            }
        }

        let key = self.key_of(&obj);
        let mut objects = self.lock();
        if objects.contains_key(&key) {
            return Err(StatusError::already_exists(&Self::qualified(), &key.1));
        }
        {
            let meta = obj.meta_mut();
            kubemeta::fill_system_fields(meta);
            meta.generation = Some(1);
            meta.deletion_timestamp = None;
            meta.resource_version = Some(self.clock.tick());
        }
        if opts.dry_run {
            return Ok(obj);
        }
        objects.insert(key, obj.clone());
        let _ = self.events.send(WatchEvent::Added(obj.clone()));
        Ok(obj)
    }

    async fn update(&self, obj: &K, opts: &UpdateOptions) -> Result<K, StatusError> {
        self.replace(obj, opts.dry_run, |_| Ok(obj.clone()))
    }

    async fn delete(&self, obj: &K, opts: &DeleteOptions) -> Result<(), StatusError> {
        let key = self.key_of(obj);
        let mut objects = self.lock();
        let Some(current) = objects.get(&key) else {
            return Err(StatusError::not_found(&Self::qualified(), name_of(obj)));
        };
        if opts.dry_run {
            return Ok(());
        }

        let finalized = current.meta().finalizers.as_ref().is_some_and(|f| !f.is_empty());
        if finalized {
            if current.meta().deletion_timestamp.is_none() {
                let mut next = current.clone();
                next.meta_mut().deletion_timestamp = kubemeta::now();
                next.meta_mut().resource_version = Some(self.clock.tick());
                objects.insert(key, next.clone());
                let _ = self.events.send(WatchEvent::Modified(next));
            }
            return Ok(());
        }

        if let Some(mut removed) = objects.remove(&key) {
            removed.meta_mut().resource_version = Some(self.clock.tick());
            let _ = self.events.send(WatchEvent::Deleted(removed));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extensionapi::{LabelSelector, StatusReason};
    use k8s_openapi::api::core::v1::{Namespace, Secret};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn secret(ns: &str, name: &str) -> Secret {
        Secret {
            metadata: ObjectMeta {
                namespace: Some(ns.to_string()),
                name: Some(name.to_string()),
                ..ObjectMeta::default()
            },
            ..Secret::default()
        }
    }

    fn labeled(ns: &str, name: &str, key: &str, value: &str) -> Secret {
        let mut s = secret(ns, name);
        s.metadata.labels = Some(BTreeMap::from([(key.to_string(), value.to_string())]));
        s
    }

    #[tokio::test]
    async fn test_create_get_and_already_exists() {
        let client = MemoryObjectClient::<Secret>::namespaced(MemoryClock::default());
        let created = client.create(&secret("a", "s"), &CreateOptions::default()).await.unwrap();
        assert!(created.metadata.uid.is_some());
        assert_eq!(created.metadata.resource_version.as_deref(), Some("1"));

        let got = client.get(Some("a"), "s").await.unwrap();
        assert_eq!(got.metadata.uid, created.metadata.uid);

        let err = client.create(&secret("a", "s"), &CreateOptions::default()).await.unwrap_err();
        assert_eq!(err.reason, StatusReason::AlreadyExists);
        assert!(client.get(Some("b"), "s").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_update_with_stale_version_conflicts() {
        let client = MemoryObjectClient::<Secret>::namespaced(MemoryClock::default());
        let created = client.create(&secret("a", "s"), &CreateOptions::default()).await.unwrap();

        let mut first = created.clone();
        first.string_data = None;
        first.type_ = Some("Opaque".to_string());
        let updated = client.update(&first, &UpdateOptions::default()).await.unwrap();
        assert_ne!(updated.metadata.resource_version, created.metadata.resource_version);

        let mut stale = created;
        stale.type_ = Some("Other".to_string());
        let err = client.update(&stale, &UpdateOptions::default()).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_noop_update_keeps_version() {
        let client = MemoryObjectClient::<Secret>::namespaced(MemoryClock::default());
        let created = client.create(&secret("a", "s"), &CreateOptions::default()).await.unwrap();
        let again = client.update(&created, &UpdateOptions::default()).await.unwrap();
        assert_eq!(again.metadata.resource_version, created.metadata.resource_version);
    }

    #[tokio::test]
    async fn test_finalizer_gates_deletion() {
        let client = MemoryObjectClient::<Namespace>::cluster(MemoryClock::default());
        let mut ns = Namespace::default();
        ns.metadata.name = Some("acme".to_string());
        ns.metadata.finalizers = Some(vec!["walrus.seal.io/controlled".to_string()]);
        let created = client.create(&ns, &CreateOptions::default()).await.unwrap();

        client.delete(&created, &DeleteOptions::default()).await.unwrap();
        let terminating = client.get(None, "acme").await.unwrap();
        assert!(terminating.metadata.deletion_timestamp.is_some());

        let mut released = terminating;
        released.metadata.finalizers = None;
        client.update(&released, &UpdateOptions::default()).await.unwrap();
        assert!(client.get(None, "acme").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_list_pages_and_selects() {
        let client = MemoryObjectClient::<Secret>::namespaced(MemoryClock::default());
        for name in ["a", "b", "c"] {
            client
                .create(&labeled("x", name, "tier", "web"), &CreateOptions::default())
                .await
                .unwrap();
        }
        client
            .create(&labeled("y", "d", "tier", "db"), &CreateOptions::default())
            .await
            .unwrap();

        let opts = ListOptions {
            limit: Some(2),
            ..ListOptions::default()
        };
        let page = client.list(&opts).await.unwrap();
        assert_eq!(page.items.len(), 2);
        let token = page.continue_token().unwrap().to_string();

        let rest = client
            .list(&ListOptions {
                continue_token: Some(token),
                ..ListOptions::default()
            })
            .await
            .unwrap();
        assert_eq!(rest.items.len(), 2);
        assert!(rest.continue_token().is_none());

        let web = client
            .list(&ListOptions::default().with_label_selector(LabelSelector::parse("tier=web").unwrap()))
            .await
            .unwrap();
        assert_eq!(web.items.len(), 3);

        let in_y = client
            .list(&ListOptions::default().in_namespace(Some("y")))
            .await
            .unwrap();
        assert_eq!(in_y.items.len(), 1);
    }

    #[tokio::test]
    async fn test_watch_replays_then_follows() {
        let client = MemoryObjectClient::<Secret>::namespaced(MemoryClock::default());
        client.create(&secret("a", "old"), &CreateOptions::default()).await.unwrap();

        let mut watcher = client.watch(&ListOptions::default()).await.unwrap();
        match watcher.next().await {
            Some(WatchEvent::Added(s)) => assert_eq!(s.metadata.name.as_deref(), Some("old")),
            other => panic!("unexpected event {other:?}"),
        }

        let created = client.create(&secret("a", "new"), &CreateOptions::default()).await.unwrap();
        client.delete(&created, &DeleteOptions::default()).await.unwrap();
        assert!(matches!(watcher.next().await, Some(WatchEvent::Added(_))));
        match watcher.next().await {
            Some(WatchEvent::Deleted(s)) => assert_eq!(s.metadata.name.as_deref(), Some("new")),
            other => panic!("unexpected event {other:?}"),
        }
    }
}
