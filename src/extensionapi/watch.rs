//! # Watch Plumbing
//!
//! Watch events and the proxy watcher bridging a forwarding task to the
//! consumer of a watch session.
//!
//! A [`ProxyWatcher`] is the receiving end handed to the consumer; the
//! paired [`WatchSender`] is owned by the task producing events. Either
//! side can end the session: the consumer by calling
//! [`ProxyWatcher::stop`] (or dropping the watcher), the producer by
//! dropping its sender.

use futures::Stream;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::{debug, Instrument, Span};

use super::error::StatusError;

/// Type of a watch event, as carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WatchEventType {
    #[serde(rename = "ADDED")]
    Added,
    #[serde(rename = "MODIFIED")]
    Modified,
    #[serde(rename = "DELETED")]
    Deleted,
    #[serde(rename = "BOOKMARK")]
    Bookmark,
    #[serde(rename = "ERROR")]
    Error,
}

#[derive(Debug, Clone)]
pub enum WatchEvent<K> {
    Added(K),
    Modified(K),
    Deleted(K),
    Bookmark(K),
    Error(StatusError),
}

impl<K> WatchEvent<K> {
    #[must_use]
    pub fn event_type(&self) -> WatchEventType {
        match self {
            Self::Added(_) => WatchEventType::Added,
            Self::Modified(_) => WatchEventType::Modified,
            Self::Deleted(_) => WatchEventType::Deleted,
            Self::Bookmark(_) => WatchEventType::Bookmark,
            Self::Error(_) => WatchEventType::Error,
        }
    }

    #[must_use]
    pub fn object(&self) -> Option<&K> {
        match self {
            Self::Added(o) | Self::Modified(o) | Self::Deleted(o) | Self::Bookmark(o) => Some(o),
            Self::Error(_) => None,
        }
    }

    /// Same event type carrying another object.
    pub fn with_object<T>(&self, obj: T) -> WatchEvent<T> {
        match self {
            Self::Added(_) => WatchEvent::Added(obj),
            Self::Modified(_) => WatchEvent::Modified(obj),
            Self::Deleted(_) => WatchEvent::Deleted(obj),
            Self::Bookmark(_) => WatchEvent::Bookmark(obj),
            Self::Error(e) => WatchEvent::Error(e.clone()),
        }
    }

    /// Convert the carried object; events whose object maps to `None`
    /// are dropped.
    pub fn filter_map<T>(self, f: impl FnOnce(K) -> Option<T>) -> Option<WatchEvent<T>> {
        Some(match self {
            Self::Added(o) => WatchEvent::Added(f(o)?),
            Self::Modified(o) => WatchEvent::Modified(f(o)?),
            Self::Deleted(o) => WatchEvent::Deleted(f(o)?),
            Self::Bookmark(o) => WatchEvent::Bookmark(f(o)?),
            Self::Error(e) => WatchEvent::Error(e),
        })
    }
}

impl<K: Serialize> WatchEvent<K> {
    /// Wire frame `{"type": ..., "object": ...}`.
    pub fn to_frame(&self) -> serde_json::Result<serde_json::Value> {
        let object = match self {
            Self::Error(e) => e.to_status(),
            other => match other.object() {
                Some(o) => serde_json::to_value(o)?,
                None => serde_json::Value::Null,
            },
        };
        Ok(serde_json::json!({ "type": self.event_type(), "object": object }))
    }
}

/// Producing end of a watch session.
#[derive(Debug)]
pub struct WatchSender<K> {
    tx: mpsc::Sender<WatchEvent<K>>,
    stop: CancellationToken,
}

impl<K> WatchSender<K> {
    /// Deliver one event, waiting for the consumer. Returns `false` once
    /// the session is over and the producer should return.
    pub async fn send(&self, event: WatchEvent<K>) -> bool {
        tokio::select! {
            () = self.stop.cancelled() => false,
            sent = self.tx.send(event) => sent.is_ok(),
        }
    }

    /// Resolves when the consumer stops the session.
    pub fn stopped(&self) -> WaitForCancellationFuture<'_> {
        self.stop.cancelled()
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled() || self.tx.is_closed()
    }
}

/// Consuming end of a watch session.
#[derive(Debug)]
pub struct ProxyWatcher<K> {
    rx: mpsc::Receiver<WatchEvent<K>>,
    stop: CancellationToken,
}

impl<K> ProxyWatcher<K> {
    /// Pair with no buffering beyond a single in-flight event, so the
    /// producer advances only as fast as the consumer reads.
    #[must_use]
    pub fn channel() -> (WatchSender<K>, Self) {
        Self::with_capacity(1)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> (WatchSender<K>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let stop = CancellationToken::new();
        (
            WatchSender {
                tx,
                stop: stop.clone(),
            },
            Self { rx, stop },
        )
    }

    /// Next event, or `None` once the producer is gone.
    pub async fn next(&mut self) -> Option<WatchEvent<K>> {
        if self.stop.is_cancelled() {
            return None;
        }
        self.rx.recv().await
    }

    pub fn stop(&self) {
        self.stop.cancel();
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }

    /// Token cancelled when this watcher stops.
    #[must_use]
    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    /// Adapt into a stream of events.
    pub fn into_stream(self) -> impl Stream<Item = WatchEvent<K>> + Send
    where
        K: Send + 'static,
    {
        futures::stream::unfold(self, |mut w| async move {
            let event = w.next().await?;
            Some((event, w))
        })
    }
}

/// Forward `upstream` into a new watcher, turning each upstream event into
/// zero or more downstream events.
///
/// The forwarding task ends when `cancel` fires, the consumer stops, or the
/// upstream closes; dropping the upstream watcher then stops its producer.
pub fn translate_watch<U, D, F>(
    cancel: CancellationToken,
    mut upstream: ProxyWatcher<U>,
    span: Span,
    mut translate: F,
) -> ProxyWatcher<D>
where
    U: Send + 'static,
    D: Send + 'static,
    F: FnMut(WatchEvent<U>) -> Vec<WatchEvent<D>> + Send + 'static,
{
    let (tx, downstream) = ProxyWatcher::channel();
    tokio::spawn(
        async move {
            loop {
                let event = tokio::select! {
                    () = cancel.cancelled() => return,
                    () = tx.stopped() => return,
                    event = upstream.next() => match event {
                        Some(event) => event,
                        None => {
                            debug!("upstream watch closed");
                            return;
                        }
                    },
                };
                for event in translate(event) {
                    if !tx.send(event).await {
                        return;
                    }
                }
            }
        }
        .instrument(span),
    );
    downstream
}

impl<K> Drop for ProxyWatcher<K> {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_flow_in_order() {
        let (tx, mut rx) = ProxyWatcher::<u32>::channel();
        tokio::spawn(async move {
            for i in 0..3 {
                assert!(tx.send(WatchEvent::Added(i)).await);
            }
        });
        let mut got = Vec::new();
        while let Some(WatchEvent::Added(i)) = rx.next().await {
            got.push(i);
        }
        assert_eq!(got, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_stop_unblocks_producer() {
        let (tx, rx) = ProxyWatcher::<u32>::channel();
        let producer = tokio::spawn(async move {
            let mut sent = 0;
            while tx.send(WatchEvent::Added(sent)).await {
                sent += 1;
            }
            sent
        });
        tokio::task::yield_now().await;
        rx.stop();
        let sent = producer.await.unwrap();
        assert!(sent <= 2);
    }

    #[tokio::test]
    async fn test_drop_stops_session() {
        let (tx, rx) = ProxyWatcher::<u32>::channel();
        drop(rx);
        assert!(!tx.send(WatchEvent::Added(1)).await);
        assert!(tx.is_stopped());
    }

    #[tokio::test]
    async fn test_translate_fans_out_and_drops() {
        let (tx, upstream) = ProxyWatcher::<u32>::channel();
        tokio::spawn(async move {
            for i in 0..4 {
                if !tx.send(WatchEvent::Added(i)).await {
                    return;
                }
            }
        });
        let mut downstream = translate_watch(CancellationToken::new(), upstream, Span::none(), |event| {
            match event {
                WatchEvent::Added(i) if i % 2 == 0 => vec![WatchEvent::Added(i), WatchEvent::Modified(i)],
                _ => Vec::new(),
            }
        });
        let mut got = Vec::new();
        while let Some(event) = downstream.next().await {
            got.push((event.event_type(), *event.object().unwrap()));
        }
        assert_eq!(
            got,
            vec![
                (WatchEventType::Added, 0),
                (WatchEventType::Modified, 0),
                (WatchEventType::Added, 2),
                (WatchEventType::Modified, 2),
            ]
        );
    }

    #[test]
    fn test_frame_shape() {
        let frame = WatchEvent::Deleted(serde_json::json!({"a": 1})).to_frame().unwrap();
        assert_eq!(frame["type"], "DELETED");
        assert_eq!(frame["object"]["a"], 1);
    }
}
