//! # HTTP Server
//!
//! HTTP server for the extension API, metrics, health checks, and Kubernetes probes.
//!
//! Provides endpoints:
//! - `/metrics` - Prometheus metrics in text format
//! - `/healthz` - Liveness probe (always returns 200)
//! - `/readyz` - Readiness probe (returns 200 once the API storages are installed)
//! - `/apis` - API group discovery
//! - `/apis/walrus.seal.io/v1` - resource discovery
//! - `/apis/walrus.seal.io/v1/[namespaces/{namespace}/]{resource}[/{name}[/{subresource}]]` - resource verbs
//!
//! Watch requests (`?watch=true`) stream newline-delimited `{"type", "object"}` frames.

use anyhow::Context;
use axum::{
    body::{Body, Bytes},
    extract::{Path, Query, State},
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use futures::StreamExt;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{
    APIGroup, APIGroupList, APIResource, APIResourceList, GroupVersionForDiscovery,
};
use prometheus::{Encoder, TextEncoder};
use serde::Deserialize;
use serde_json::Value;
use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::extensionapi::{
    CreateOptions, DeleteOptions, FieldSelector, GetOptions, LabelSelector, ListOptions, PropagationPolicy,
    RequestContext, RequestInfo, RestStorage, StatusError, StatusReason, UpdateBody, UpdateOptions,
};
use crate::extensionapis::ApiGroupInfo;
use crate::observability::metrics;

pub struct ServerState {
    pub is_ready: Arc<AtomicBool>,
    pub api: ApiGroupInfo,
    /// Cancelled on shutdown; every request context is a child of it.
    pub shutdown: CancellationToken,
}

impl std::fmt::Debug for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerState")
            .field("is_ready", &self.is_ready.load(Ordering::Relaxed))
            .field("api", &self.api)
            .finish_non_exhaustive()
    }
}

impl ServerState {
    #[must_use]
    pub fn new(api: ApiGroupInfo, shutdown: CancellationToken) -> Self {
        Self {
            is_ready: Arc::new(AtomicBool::new(false)),
            api,
            shutdown,
        }
    }
}

pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .route("/apis", get(api_groups_handler))
        .route("/apis/{*path}", any(api_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn start_server(addr: &str, state: Arc<ServerState>) -> Result<(), anyhow::Error> {
    let shutdown = state.shutdown.clone();
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;

    info!("HTTP server listening on {}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    Ok(())
}

fn gather() -> Vec<prometheus::proto::MetricFamily> {
    metrics::REGISTRY.gather()
}

async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain")],
            format!("Failed to encode metrics: {}", e).into_bytes(),
        );
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        buffer,
    )
}

async fn healthz_handler() -> impl IntoResponse {
    StatusCode::OK
}

async fn readyz_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    if state.is_ready.load(Ordering::Relaxed) {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

fn group_version(api: &ApiGroupInfo) -> GroupVersionForDiscovery {
    GroupVersionForDiscovery {
        group_version: format!("{}/{}", api.group, api.version),
        version: api.version.to_string(),
    }
}

async fn api_groups_handler(State(state): State<Arc<ServerState>>) -> Json<APIGroupList> {
    Json(APIGroupList {
        groups: vec![APIGroup {
            name: state.api.group.to_string(),
            preferred_version: Some(group_version(&state.api)),
            versions: vec![group_version(&state.api)],
            ..APIGroup::default()
        }],
    })
}

/// Resources of the served group version, subresources included.
fn api_resources(api: &ApiGroupInfo) -> APIResourceList {
    let resources = api
        .storages
        .iter()
        .filter(|(_, storage)| !storage.verbs().is_empty())
        .map(|(name, storage)| {
            let kind = storage.kind();
            APIResource {
                name: name.clone(),
                singular_name: if name.contains('/') {
                    String::new()
                } else {
                    kind.to_lowercase()
                },
                namespaced: storage.namespace_scoped(),
                kind,
                verbs: storage.verbs().into_iter().map(str::to_string).collect(),
                ..APIResource::default()
            }
        })
        .collect();
    APIResourceList {
        group_version: group_version(api).group_version,
        resources,
    }
}

/// Query parameters of resource requests.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiQuery {
    pub watch: Option<String>,
    pub label_selector: Option<String>,
    pub field_selector: Option<String>,
    pub limit: Option<String>,
    #[serde(rename = "continue")]
    pub continue_token: Option<String>,
    pub resource_version: Option<String>,
    pub resource_version_match: Option<String>,
    pub allow_watch_bookmarks: Option<String>,
    pub dry_run: Option<String>,
    pub propagation_policy: Option<String>,
    pub grace_period_seconds: Option<String>,
    pub field_manager: Option<String>,
    #[serde(rename = "as")]
    pub as_: Option<String>,
}

fn truthy(value: Option<&str>) -> bool {
    matches!(value, Some("true" | "1"))
}

impl ApiQuery {
    fn is_watch(&self) -> bool {
        truthy(self.watch.as_deref())
    }

    fn is_dry_run(&self) -> bool {
        self.dry_run.as_deref() == Some("All")
    }

    fn list_options(&self, namespace: Option<&str>) -> Result<ListOptions, StatusError> {
        let label_selector = match self.label_selector.as_deref() {
            Some(s) => LabelSelector::parse(s).map_err(|err| StatusError::bad_request(err.to_string()))?,
            None => LabelSelector::default(),
        };
        let field_selector = match self.field_selector.as_deref() {
            Some(s) => FieldSelector::parse(s).map_err(|err| StatusError::bad_request(err.to_string()))?,
            None => FieldSelector::default(),
        };
        let limit = self
            .limit
            .as_deref()
            .map(str::parse::<i64>)
            .transpose()
            .map_err(|err| StatusError::bad_request(format!("invalid limit: {err}")))?;
        Ok(ListOptions {
            namespace: None,
            label_selector,
            field_selector,
            limit: limit.filter(|l| *l > 0),
            continue_token: self.continue_token.clone().filter(|c| !c.is_empty()),
            resource_version: self.resource_version.clone(),
            resource_version_match: self.resource_version_match.clone(),
            allow_watch_bookmarks: truthy(self.allow_watch_bookmarks.as_deref()),
        }
        .in_namespace(namespace))
    }

    fn update_options(&self) -> UpdateOptions {
        UpdateOptions {
            dry_run: self.is_dry_run(),
            field_manager: self.field_manager.clone(),
        }
    }

    fn create_options(&self) -> CreateOptions {
        CreateOptions::from(&self.update_options())
    }

    /// Delete options from the query, overridden by a `DeleteOptions` body.
    fn delete_options(&self, body: &Bytes) -> Result<DeleteOptions, StatusError> {
        let mut opts = DeleteOptions {
            dry_run: self.is_dry_run(),
            grace_period_seconds: self.grace_period_seconds.as_deref().and_then(|s| s.parse().ok()),
            propagation_policy: self.propagation_policy.as_deref().and_then(PropagationPolicy::parse),
        };
        if body.is_empty() {
            return Ok(opts);
        }
        let body: Value = serde_json::from_slice(body)
            .map_err(|err| StatusError::bad_request(format!("decode delete options: {err}")))?;
        if let Some(policy) = body["propagationPolicy"].as_str() {
            opts.propagation_policy = PropagationPolicy::parse(policy);
        }
        if let Some(grace) = body["gracePeriodSeconds"].as_i64() {
            opts.grace_period_seconds = Some(grace);
        }
        if let Some(dry_run) = body["dryRun"].as_array() {
            opts.dry_run |= dry_run.iter().any(|v| v == "All");
        }
        Ok(opts)
    }
}

/// Target of a request below `/apis/{group}/{version}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRoute {
    pub group: String,
    pub version: String,
    pub namespace: Option<String>,
    pub resource: Option<String>,
    pub name: Option<String>,
    pub subresource: Option<String>,
}

impl ApiRoute {
    /// Parse the path after `/apis/`.
    #[must_use]
    pub fn parse(path: &str) -> Option<Self> {
        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
        let [group, version, rest @ ..] = segments.as_slice() else {
            return None;
        };
        let (namespace, rest) = match rest {
            ["namespaces", namespace, rest @ ..] if !rest.is_empty() => (Some(*namespace), rest),
            _ => (None, rest),
        };
        if rest.len() > 3 || rest.iter().any(|s| s.is_empty()) {
            return None;
        }
        Some(Self {
            group: (*group).to_string(),
            version: (*version).to_string(),
            namespace: namespace.map(str::to_string),
            resource: rest.first().map(|s| (*s).to_string()),
            name: rest.get(1).map(|s| (*s).to_string()),
            subresource: rest.get(2).map(|s| (*s).to_string()),
        })
    }

    fn storage_key(&self) -> String {
        let resource = self.resource.as_deref().unwrap_or_default();
        match &self.subresource {
            Some(sub) => format!("{resource}/{sub}"),
            None => resource.to_string(),
        }
    }
}

fn not_found() -> StatusError {
    StatusError {
        code: 404,
        reason: StatusReason::NotFound,
        message: "the server could not find the requested resource".to_string(),
        details: None,
    }
}

fn method_not_allowed(method: &Method) -> StatusError {
    StatusError {
        code: 405,
        reason: StatusReason::MethodNotAllowed,
        message: format!("the server does not allow this method on the requested resource: {method}"),
        details: None,
    }
}

fn wants_table(query: &ApiQuery, headers: &HeaderMap) -> bool {
    query.as_.as_deref() == Some("Table")
        || headers
            .get(header::ACCEPT)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|accept| accept.contains("as=Table"))
}

/// Verb of a request, following the Kubernetes verb naming.
fn verb_of(method: &Method, route: &ApiRoute, query: &ApiQuery) -> Result<&'static str, StatusError> {
    let named = route.name.is_some();
    let verb = match (method.as_str(), named) {
        ("GET", true) => "get",
        ("GET", false) if query.is_watch() => "watch",
        ("GET", false) => "list",
        ("POST", false) => "create",
        ("PUT", true) => "update",
        ("PATCH", true) => "patch",
        ("DELETE", true) => "delete",
        ("DELETE", false) => "deletecollection",
        _ => return Err(method_not_allowed(method)),
    };
    Ok(verb)
}

fn decode_body(body: &Bytes) -> Result<Value, StatusError> {
    serde_json::from_slice(body).map_err(|err| StatusError::bad_request(format!("decode request body: {err}")))
}

fn json_response(code: StatusCode, body: Value) -> Response {
    (code, Json(body)).into_response()
}

async fn api_handler(
    State(state): State<Arc<ServerState>>,
    method: Method,
    Path(path): Path<String>,
    Query(query): Query<ApiQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(route) = ApiRoute::parse(&path) else {
        return not_found().into_response();
    };
    if route.group != state.api.group || route.version != state.api.version {
        return not_found().into_response();
    }
    if route.resource.is_none() {
        if method != Method::GET {
            return method_not_allowed(&method).into_response();
        }
        return Json(api_resources(&state.api)).into_response();
    }

    let key = route.storage_key();
    let Some(storage) = state
        .api
        .storage(route.resource.as_deref().unwrap_or_default(), route.subresource.as_deref())
    else {
        return not_found().into_response();
    };
    let verb = match verb_of(&method, &route, &query) {
        Ok(verb) => verb,
        Err(err) => return err.into_response(),
    };

    let started = Instant::now();
    let response = match serve(&state, storage.as_ref(), &route, verb, &query, &headers, &body).await {
        Ok(response) => response,
        Err(err) => {
            if err.code >= 500 {
                warn!(resource = %key, verb, code = err.code, error = %err, "request failed");
            } else {
                debug!(resource = %key, verb, code = err.code, error = %err, "request rejected");
            }
            err.into_response()
        }
    };
    metrics::record_api_request(&key, verb, response.status().as_u16(), started.elapsed().as_secs_f64());
    response
}

async fn serve(
    state: &ServerState,
    storage: &dyn RestStorage,
    route: &ApiRoute,
    verb: &'static str,
    query: &ApiQuery,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<Response, StatusError> {
    let namespace = route.namespace.as_deref();
    if namespace.is_some() && !storage.namespace_scoped() {
        return Err(not_found());
    }
    let collection_verb = matches!(verb, "list" | "watch" | "deletecollection");
    if storage.namespace_scoped() && namespace.is_none() && !collection_verb {
        return Err(StatusError::bad_request("the namespace of the provided object is required"));
    }

    let mut info = RequestInfo::new(&route.group, route.resource.as_deref().unwrap_or_default()).with_verb(verb);
    if let Some(ns) = namespace {
        info = info.with_namespace(ns);
    }
    if let Some(sub) = &route.subresource {
        info = info.with_subresource(sub);
    }
    if let Some(name) = &route.name {
        info = info.with_name(name);
    }
    let ctx = RequestContext {
        info,
        cancel: state.shutdown.child_token(),
    };
    let name = route.name.as_deref().unwrap_or_default();

    match verb {
        "get" => {
            let opts = GetOptions {
                resource_version: query.resource_version.clone(),
            };
            let obj = storage.get(&ctx, name, &opts).await?;
            Ok(json_response(StatusCode::OK, obj))
        }
        "list" => {
            let opts = query.list_options(namespace)?;
            let list = storage.list(&ctx, &opts, wants_table(query, headers)).await?;
            Ok(json_response(StatusCode::OK, list))
        }
        "watch" => {
            let opts = query.list_options(namespace)?;
            let frames = storage.watch(&ctx, &opts).await?;
            // Dropping the body on disconnect cancels the request, which
            // stops the forwarder.
            let guard = ctx.cancel.clone().drop_guard();
            let body = frames.map(move |frame| {
                let _held = &guard;
                let mut line = serde_json::to_vec(&frame).unwrap_or_default();
                line.push(b'\n');
                Ok::<_, Infallible>(Bytes::from(line))
            });
            Ok(Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from_stream(body))
                .map_err(StatusError::internal)?)
        }
        "create" => {
            let obj = storage.create(&ctx, decode_body(body)?, &query.create_options()).await?;
            Ok(json_response(StatusCode::CREATED, obj))
        }
        "update" => {
            let obj = decode_body(body)?;
            if let Some(body_name) = obj["metadata"]["name"].as_str() {
                if body_name != name {
                    return Err(StatusError::bad_request(format!(
                        "the name of the object ({body_name}) does not match the name on the URL ({name})"
                    )));
                }
            }
            let (obj, created) = storage
                .update(&ctx, name, UpdateBody::Replace(obj), &query.update_options())
                .await?;
            let code = if created { StatusCode::CREATED } else { StatusCode::OK };
            Ok(json_response(code, obj))
        }
        "patch" => {
            let content_type = headers
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("application/merge-patch+json");
            if !content_type.starts_with("application/merge-patch+json")
                && !content_type.starts_with("application/json")
            {
                return Err(StatusError::bad_request(format!("unsupported patch type {content_type:?}")));
            }
            let (obj, _) = storage
                .update(&ctx, name, UpdateBody::MergePatch(decode_body(body)?), &query.update_options())
                .await?;
            Ok(json_response(StatusCode::OK, obj))
        }
        "delete" => {
            let opts = query.delete_options(body)?;
            let (obj, deferred) = storage.delete(&ctx, name, &opts).await?;
            let code = if deferred { StatusCode::ACCEPTED } else { StatusCode::OK };
            Ok(json_response(code, obj))
        }
        "deletecollection" => {
            let opts = query.delete_options(body)?;
            let list_opts = query.list_options(namespace)?;
            let obj = storage.delete_collection(&ctx, &opts, &list_opts).await?;
            Ok(json_response(StatusCode::OK, obj))
        }
        _ => Err(StatusError::bad_request(format!("unsupported verb {verb}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::context::AppContext;
    use crate::extensionapis;
    use axum::http::Request;
    use tower::ServiceExt;

    fn state() -> Arc<ServerState> {
        let ctx = AppContext::in_memory(ServerConfig::default());
        let api = extensionapis::setup(&ctx.setup_options()).unwrap();
        let state = ServerState::new(api, CancellationToken::new());
        state.is_ready.store(true, Ordering::Relaxed);
        Arc::new(state)
    }

    async fn call(state: &Arc<ServerState>, request: Request<Body>) -> (StatusCode, Value) {
        let response = router(Arc::clone(state)).oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, body)
    }

    fn json_request(method: &str, uri: &str, body: &Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(body).unwrap()))
            .unwrap()
    }

    #[test]
    fn test_parse_routes() {
        let route = ApiRoute::parse("walrus.seal.io/v1/namespaces/acme/environments/acme-dev").unwrap();
        assert_eq!(route.namespace.as_deref(), Some("acme"));
        assert_eq!(route.resource.as_deref(), Some("environments"));
        assert_eq!(route.name.as_deref(), Some("acme-dev"));
        assert_eq!(route.subresource, None);

        let route = ApiRoute::parse("walrus.seal.io/v1/namespaces/walrus-system/projects/acme/subjects").unwrap();
        assert_eq!(route.storage_key(), "projects/subjects");

        let route = ApiRoute::parse("walrus.seal.io/v1/fileexamples").unwrap();
        assert_eq!(route.namespace, None);
        assert_eq!(route.storage_key(), "fileexamples");

        let route = ApiRoute::parse("walrus.seal.io/v1").unwrap();
        assert_eq!(route.resource, None);

        assert!(ApiRoute::parse("walrus.seal.io").is_none());
        assert!(ApiRoute::parse("walrus.seal.io/v1/a/b/c/d").is_none());
    }

    #[test]
    fn test_verb_of() {
        let route = ApiRoute::parse("walrus.seal.io/v1/namespaces/acme/variables").unwrap();
        let watch = ApiQuery {
            watch: Some("true".to_string()),
            ..ApiQuery::default()
        };
        assert_eq!(verb_of(&Method::GET, &route, &ApiQuery::default()).unwrap(), "list");
        assert_eq!(verb_of(&Method::GET, &route, &watch).unwrap(), "watch");
        assert_eq!(verb_of(&Method::DELETE, &route, &ApiQuery::default()).unwrap(), "deletecollection");
        assert_eq!(verb_of(&Method::PUT, &route, &ApiQuery::default()).unwrap_err().code, 405);
    }

    #[test]
    fn test_list_options_from_query() {
        let query = ApiQuery {
            label_selector: Some("a=b".to_string()),
            field_selector: Some("metadata.name=x".to_string()),
            limit: Some("10".to_string()),
            allow_watch_bookmarks: Some("true".to_string()),
            ..ApiQuery::default()
        };
        let opts = query.list_options(Some("acme")).unwrap();
        assert_eq!(opts.namespace.as_deref(), Some("acme"));
        assert_eq!(opts.limit, Some(10));
        assert!(opts.allow_watch_bookmarks);
        assert_eq!(opts.field_selector.requires_exact_match("metadata.name"), Some("x"));

        let query = ApiQuery {
            limit: Some("ten".to_string()),
            ..ApiQuery::default()
        };
        assert_eq!(query.list_options(None).unwrap_err().reason, StatusReason::BadRequest);
    }

    #[tokio::test]
    async fn test_probes() {
        let state = state();
        let (status, _) = call(&state, Request::get("/healthz").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = call(&state, Request::get("/readyz").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);

        state.is_ready.store(false, Ordering::Relaxed);
        let (status, _) = call(&state, Request::get("/readyz").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_discovery() {
        let state = state();
        let (status, groups) = call(&state, Request::get("/apis").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(groups["kind"], "APIGroupList");
        assert_eq!(groups["groups"][0]["name"], "walrus.seal.io");
        assert_eq!(groups["groups"][0]["preferredVersion"]["groupVersion"], "walrus.seal.io/v1");

        let (status, resources) =
            call(&state, Request::get("/apis/walrus.seal.io/v1").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        let resources = resources["resources"].as_array().unwrap();
        let settings = resources.iter().find(|r| r["name"] == "settings").unwrap();
        assert_eq!(settings["namespaced"], true);
        assert_eq!(settings["kind"], "Setting");
        assert_eq!(settings["verbs"], serde_json::json!(["get", "list", "patch", "update", "watch"]));
        assert!(resources.iter().any(|r| r["name"] == "projects/subjects"));
        let examples = resources.iter().find(|r| r["name"] == "fileexamples").unwrap();
        assert_eq!(examples["namespaced"], false);
    }

    #[tokio::test]
    async fn test_unknown_resource_is_not_found() {
        let state = state();
        let (status, body) = call(
            &state,
            Request::get("/apis/walrus.seal.io/v1/namespaces/acme/widgets").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["kind"], "Status");
        assert_eq!(body["reason"], "NotFound");

        let (status, _) = call(&state, Request::get("/apis/other.io/v1").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_project_lifecycle_over_http() {
        let state = state();
        let project = serde_json::json!({
            "apiVersion": "walrus.seal.io/v1",
            "kind": "Project",
            "metadata": {"name": "acme"},
            "spec": {"displayName": "Acme", "description": "Acme workloads"},
        });
        let (status, created) = call(
            &state,
            json_request("POST", "/apis/walrus.seal.io/v1/namespaces/walrus-system/projects", &project),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{created}");
        assert_eq!(created["metadata"]["name"], "acme");

        let (status, got) = call(
            &state,
            Request::get("/apis/walrus.seal.io/v1/namespaces/walrus-system/projects/acme")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(got["spec"]["displayName"], "Acme");

        let (status, table) = call(
            &state,
            Request::get("/apis/walrus.seal.io/v1/namespaces/walrus-system/projects?as=Table")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(table["kind"], "Table");

        let (status, dup) = call(
            &state,
            json_request("POST", "/apis/walrus.seal.io/v1/namespaces/walrus-system/projects", &project),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(dup["reason"], "AlreadyExists");
    }

    #[tokio::test]
    async fn test_cluster_scoped_resource_rejects_namespace() {
        let state = state();
        let (status, _) = call(
            &state,
            Request::get("/apis/walrus.seal.io/v1/namespaces/acme/templatecompletionexamples")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, list) = call(
            &state,
            Request::get("/apis/walrus.seal.io/v1/templatecompletionexamples")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list["items"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_named_request_requires_namespace() {
        let state = state();
        let (status, body) = call(
            &state,
            Request::get("/apis/walrus.seal.io/v1/projects/acme").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["reason"], "BadRequest");
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        crate::observability::metrics::register_metrics().ok();
        metrics::record_api_request("projects", "get", 200, 0.01);
        let state = state();
        let response = router(state)
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&body).contains("walrus_api_requests_total"));
    }
}
