//! # Extension API
//!
//! Generic storage framework for virtual API resources. Resource handlers
//! implement the narrow per-verb contracts in [`handler`]; the operations
//! in this module turn them into REST verbs with the usual protocol edge
//! cases handled (dry-run, optimistic concurrency, stale watch events,
//! idempotent deletion), and [`storage`] erases the result for the HTTP
//! layer.

pub mod bookmark;
pub mod create;
pub mod curd;
pub mod delete;
pub mod error;
pub mod get;
pub mod handler;
pub mod list;
pub mod object;
pub mod options;
pub mod proxy;
pub mod request;
pub mod rest;
pub mod selector;
pub mod storage;
pub mod table;
pub mod update;
pub mod watch;

pub use bookmark::{compare_resource_versions, sort_by_resource_version, WatchBookmark};
pub use create::CreateOperation;
pub use curd::{CreateUpdateOperation, CurdOperations};
pub use delete::{CollectionDeleteOperation, DeleteOperation};
pub use error::{
    is_conflict, is_not_found, status_of, wrap_error, FieldError, FieldErrorList, GroupResource, StatusError,
    StatusReason,
};
pub use get::GetOperation;
pub use handler::{
    CreateHandler, CurdHandler, DeleteHandler, GetHandler, ListHandler, ObjectKey, ResourceHandler,
    UpdateHandler, WatchHandler,
};
pub use list::{ListOperation, ListWatchOperation};
pub use object::{name_of, namespace_of, resource_version_of, ApiObject, HasStatusSubresource, ObjectList};
pub use options::{CreateOptions, DeleteOptions, GetOptions, ListOptions, PropagationPolicy, UpdateOptions};
pub use proxy::{CurdProxyHandler, ProxiedObject, ProxyHooks, ProxyOverrides};
pub use request::{RequestContext, RequestInfo};
pub use selector::{field_set, FieldRequirement, FieldSelector, FieldSet, LabelRequirement, LabelSelector};
pub use storage::{RestStorage, Storage, UpdateBody};
pub use table::{DefaultTableConvertor, Table, TableColumn, TableConvertor};
pub use update::UpdateOperation;
pub use watch::{translate_watch, ProxyWatcher, WatchEvent, WatchEventType, WatchSender};
