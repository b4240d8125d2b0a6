//! List and watch verbs.

use async_trait::async_trait;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, Instrument};

use super::bookmark::{compare_resource_versions, WatchBookmark};
use super::error::{wrap_error, StatusError};
use super::handler::{ListHandler, WatchHandler};
use super::object::{resource_version_of, ObjectList};
use super::options::ListOptions;
use super::request::RequestContext;
use super::rest::{Lister, Watcher};
use super::table::{DefaultTableConvertor, Table, TableConvertor};
use super::watch::{ProxyWatcher, WatchEvent};
use crate::observability::metrics;

/// Serves listing through a [`ListHandler`] and records the newest
/// listed resource version as the starting point of later watches.
pub struct ListOperation<H: ListHandler> {
    handler: Arc<H>,
    bookmark: WatchBookmark,
    table: Arc<dyn TableConvertor<H::Object>>,
}

impl<H: ListHandler> Clone for ListOperation<H> {
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
            bookmark: self.bookmark.clone(),
            table: Arc::clone(&self.table),
        }
    }
}

impl<H: ListHandler> std::fmt::Debug for ListOperation<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListOperation")
            .field("bookmark", &self.bookmark)
            .finish_non_exhaustive()
    }
}

impl<H: ListHandler> ListOperation<H> {
    /// Without a table convertor, tables show names and creation times.
    pub fn new(table: Option<Arc<dyn TableConvertor<H::Object>>>, handler: Arc<H>) -> Self {
        Self {
            handler,
            bookmark: WatchBookmark::new(),
            table: table.unwrap_or_else(|| Arc::new(DefaultTableConvertor::new())),
        }
    }

    #[must_use]
    pub fn bookmark(&self) -> &WatchBookmark {
        &self.bookmark
    }
}

#[async_trait]
impl<H: ListHandler> Lister<H::Object> for ListOperation<H> {
    async fn list(
        &self,
        ctx: &RequestContext,
        opts: &ListOptions,
    ) -> Result<ObjectList<H::Object>, StatusError> {
        let list = self
            .handler
            .on_list(ctx, opts)
            .await
            .map_err(|err| wrap_error(&ctx.info, "", &err))?;
        if let Some(last) = list.items.last() {
            self.bookmark.swap_resource_version(resource_version_of(last));
        }
        Ok(list)
    }

    fn convert_to_table(&self, list: &ObjectList<H::Object>) -> Table {
        self.table.convert_to_table(&list.items, &list.metadata)
    }
}

/// [`ListOperation`] plus watching through a [`WatchHandler`].
pub struct ListWatchOperation<H: ListHandler + WatchHandler> {
    list: ListOperation<H>,
}

impl<H: ListHandler + WatchHandler> Clone for ListWatchOperation<H> {
    fn clone(&self) -> Self {
        Self {
            list: self.list.clone(),
        }
    }
}

impl<H: ListHandler + WatchHandler> std::fmt::Debug for ListWatchOperation<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListWatchOperation")
            .field("list", &self.list)
            .finish()
    }
}

impl<H: ListHandler + WatchHandler> ListWatchOperation<H> {
    pub fn new(table: Option<Arc<dyn TableConvertor<H::Object>>>, handler: Arc<H>) -> Self {
        Self {
            list: ListOperation::new(table, handler),
        }
    }

    #[must_use]
    pub fn list_operation(&self) -> &ListOperation<H> {
        &self.list
    }
}

#[async_trait]
impl<H: ListHandler + WatchHandler> Lister<H::Object> for ListWatchOperation<H> {
    async fn list(
        &self,
        ctx: &RequestContext,
        opts: &ListOptions,
    ) -> Result<ObjectList<H::Object>, StatusError> {
        self.list.list(ctx, opts).await
    }

    fn convert_to_table(&self, list: &ObjectList<H::Object>) -> Table {
        self.list.convert_to_table(list)
    }
}

#[async_trait]
impl<H: ListHandler + WatchHandler> Watcher<H::Object> for ListWatchOperation<H> {
    async fn watch(
        &self,
        ctx: &RequestContext,
        opts: &ListOptions,
    ) -> Result<ProxyWatcher<H::Object>, StatusError> {
        let handler = &self.list.handler;
        let mut upstream = handler
            .on_watch(ctx, opts)
            .await
            .map_err(|err| wrap_error(&ctx.info, "", &err))?;

        let bookmark = self.list.bookmark.deep_copy();
        let admit_equal = handler.fans_out_events();
        let (tx, downstream) = ProxyWatcher::channel();
        let cancel = ctx.cancel.clone();
        let resource = ctx.info.resource.clone();
        let span = tracing::debug_span!("extensionapi.watch", resource = %resource);

        tokio::spawn(
            async move {
                let _session = metrics::WatchSessionGuard::new(&resource);
                loop {
                    let event = tokio::select! {
                        () = cancel.cancelled() => {
                            debug!("watch cancelled by request");
                            return;
                        }
                        () = tx.stopped() => {
                            debug!("watch stopped by downstream");
                            return;
                        }
                        event = upstream.next() => match event {
                            Some(event) => event,
                            None => {
                                debug!("watch closed by upstream");
                                return;
                            }
                        },
                    };

                    if let WatchEvent::Added(obj) | WatchEvent::Modified(obj) | WatchEvent::Deleted(obj) =
                        &event
                    {
                        let rv = resource_version_of(obj);
                        let swapped = bookmark.swap_resource_version(rv);
                        let equal = admit_equal
                            && compare_resource_versions(&bookmark.resource_version(), rv)
                                == Ordering::Equal;
                        if !swapped && !equal {
                            continue;
                        }
                    }

                    metrics::increment_watch_events(&resource, event.event_type());
                    if !tx.send(event).await {
                        return;
                    }
                }
            }
            .instrument(span),
        );

        Ok(downstream)
    }
}
