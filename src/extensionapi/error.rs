//! # Status Errors
//!
//! Kubernetes-API-shaped errors returned by every storage operation.
//!
//! Handlers return `anyhow::Error`; a handler that wants a specific status
//! (`NotFound`, `Forbidden`, ...) returns a [`StatusError`], which survives
//! `anyhow` context wrapping and is preserved by [`wrap_error`]. Any other
//! error becomes an `InternalError` at the operation boundary.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::request::RequestInfo;

/// Machine-readable reason of a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusReason {
    NotFound,
    AlreadyExists,
    Invalid,
    Forbidden,
    Conflict,
    InternalError,
    BadRequest,
    MethodNotAllowed,
    Timeout,
    Unknown,
}

impl StatusReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "NotFound",
            Self::AlreadyExists => "AlreadyExists",
            Self::Invalid => "Invalid",
            Self::Forbidden => "Forbidden",
            Self::Conflict => "Conflict",
            Self::InternalError => "InternalError",
            Self::BadRequest => "BadRequest",
            Self::MethodNotAllowed => "MethodNotAllowed",
            Self::Timeout => "Timeout",
            Self::Unknown => "",
        }
    }

    /// Parse a reason as reported by the Kubernetes API server.
    #[must_use]
    pub fn parse(reason: &str) -> Self {
        match reason {
            "NotFound" => Self::NotFound,
            "AlreadyExists" => Self::AlreadyExists,
            "Invalid" => Self::Invalid,
            "Forbidden" => Self::Forbidden,
            "Conflict" => Self::Conflict,
            "InternalError" => Self::InternalError,
            "BadRequest" => Self::BadRequest,
            "MethodNotAllowed" => Self::MethodNotAllowed,
            "Timeout" => Self::Timeout,
            _ => Self::Unknown,
        }
    }
}

/// Group and plural resource name, e.g. `environments.walrus.seal.io`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct GroupResource {
    pub group: String,
    pub resource: String,
}

impl GroupResource {
    pub fn new(group: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            resource: resource.into(),
        }
    }
}

impl fmt::Display for GroupResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}", self.resource)
        } else {
            write!(f, "{}.{}", self.resource, self.group)
        }
    }
}

/// One reason a request failed, optionally naming the offending field.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatusCause {
    #[serde(rename = "reason", default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub field: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusDetails {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub group: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uid: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub causes: Vec<StatusCause>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<i32>,
}

/// Type of a field validation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldErrorType {
    Invalid,
    Required,
    Forbidden,
    TooLong,
    NotSupported,
}

impl FieldErrorType {
    fn cause_reason(self) -> &'static str {
        match self {
            Self::Invalid => "FieldValueInvalid",
            Self::Required => "FieldValueRequired",
            Self::Forbidden => "FieldValueForbidden",
            Self::TooLong => "FieldValueTooLong",
            Self::NotSupported => "FieldValueNotSupported",
        }
    }
}

/// A validation failure of one field, named by its JSON path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub kind: FieldErrorType,
    pub field: String,
    pub bad_value: Option<String>,
    pub detail: String,
}

impl FieldError {
    pub fn invalid(field: impl Into<String>, value: impl fmt::Display, detail: impl Into<String>) -> Self {
        Self {
            kind: FieldErrorType::Invalid,
            field: field.into(),
            bad_value: Some(value.to_string()),
            detail: detail.into(),
        }
    }

    pub fn required(field: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            kind: FieldErrorType::Required,
            field: field.into(),
            bad_value: None,
            detail: detail.into(),
        }
    }

    pub fn forbidden(field: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            kind: FieldErrorType::Forbidden,
            field: field.into(),
            bad_value: None,
            detail: detail.into(),
        }
    }

    pub fn too_long(field: impl Into<String>, value: impl fmt::Display, max_length: usize) -> Self {
        Self {
            kind: FieldErrorType::TooLong,
            field: field.into(),
            bad_value: Some(value.to_string()),
            detail: format!("may not be more than {max_length} characters"),
        }
    }

    pub fn not_supported(field: impl Into<String>, value: impl fmt::Display, supported: &[&str]) -> Self {
        let quoted = supported
            .iter()
            .map(|s| format!("{s:?}"))
            .collect::<Vec<_>>()
            .join(", ");
        Self {
            kind: FieldErrorType::NotSupported,
            field: field.into(),
            bad_value: Some(value.to_string()),
            detail: format!("supported values: {quoted}"),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let head = match self.kind {
            FieldErrorType::Invalid => "Invalid value",
            FieldErrorType::Required => "Required value",
            FieldErrorType::Forbidden => "Forbidden",
            FieldErrorType::TooLong => "Too long",
            FieldErrorType::NotSupported => "Unsupported value",
        };
        write!(f, "{}: {head}", self.field)?;
        if let Some(v) = &self.bad_value {
            if matches!(self.kind, FieldErrorType::Invalid | FieldErrorType::NotSupported) {
                write!(f, ": {v:?}")?;
            }
        }
        if !self.detail.is_empty() {
            write!(f, ": {}", self.detail)?;
        }
        Ok(())
    }
}

/// Accumulated field validation failures.
pub type FieldErrorList = Vec<FieldError>;

/// A failed request, shaped like a Kubernetes `v1.Status`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct StatusError {
    pub code: u16,
    pub reason: StatusReason,
    pub message: String,
    pub details: Option<StatusDetails>,
}

impl StatusError {
    fn with_details(
        code: u16,
        reason: StatusReason,
        message: String,
        details: StatusDetails,
    ) -> Self {
        Self {
            code,
            reason,
            message,
            details: Some(details),
        }
    }

    pub fn not_found(qualified: &GroupResource, name: &str) -> Self {
        Self::with_details(
            404,
            StatusReason::NotFound,
            format!("{qualified} {name:?} not found"),
            StatusDetails {
                name: name.to_string(),
                group: qualified.group.clone(),
                kind: qualified.resource.clone(),
                ..StatusDetails::default()
            },
        )
    }

    pub fn already_exists(qualified: &GroupResource, name: &str) -> Self {
        Self::with_details(
            409,
            StatusReason::AlreadyExists,
            format!("{qualified} {name:?} already exists"),
            StatusDetails {
                name: name.to_string(),
                group: qualified.group.clone(),
                kind: qualified.resource.clone(),
                ..StatusDetails::default()
            },
        )
    }

    /// Validation failure; `kind` is the qualified kind, which is the
    /// plural resource name for extension resources.
    pub fn invalid(qualified: &GroupResource, name: &str, errs: FieldErrorList) -> Self {
        let rendered = match errs.as_slice() {
            [one] => one.to_string(),
            many => format!(
                "[{}]",
                many.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
            ),
        };
        let causes = errs
            .iter()
            .map(|e| StatusCause {
                kind: e.kind.cause_reason().to_string(),
                message: e.to_string(),
                field: e.field.clone(),
            })
            .collect();
        Self::with_details(
            422,
            StatusReason::Invalid,
            format!("{qualified} {name:?} is invalid: {rendered}"),
            StatusDetails {
                name: name.to_string(),
                group: qualified.group.clone(),
                kind: qualified.resource.clone(),
                causes,
                ..StatusDetails::default()
            },
        )
    }

    pub fn forbidden(qualified: &GroupResource, name: &str, err: impl fmt::Display) -> Self {
        Self::with_details(
            403,
            StatusReason::Forbidden,
            format!("{qualified} {name:?} is forbidden: {err}"),
            StatusDetails {
                name: name.to_string(),
                group: qualified.group.clone(),
                kind: qualified.resource.clone(),
                ..StatusDetails::default()
            },
        )
    }

    pub fn conflict(qualified: &GroupResource, name: &str, err: impl fmt::Display) -> Self {
        Self::with_details(
            409,
            StatusReason::Conflict,
            format!("Operation cannot be fulfilled on {qualified} {name:?}: {err}"),
            StatusDetails {
                name: name.to_string(),
                group: qualified.group.clone(),
                kind: qualified.resource.clone(),
                ..StatusDetails::default()
            },
        )
    }

    pub fn internal(err: impl fmt::Display) -> Self {
        let cause = err.to_string();
        Self::with_details(
            500,
            StatusReason::InternalError,
            format!("Internal error occurred: {cause}"),
            StatusDetails {
                causes: vec![StatusCause {
                    message: cause,
                    ..StatusCause::default()
                }],
                ..StatusDetails::default()
            },
        )
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            code: 400,
            reason: StatusReason::BadRequest,
            message: message.into(),
            details: None,
        }
    }

    pub fn method_not_supported(qualified: &GroupResource, action: &str) -> Self {
        Self::with_details(
            405,
            StatusReason::MethodNotAllowed,
            format!("{action} is not supported on resources of kind {:?}", qualified.to_string()),
            StatusDetails {
                group: qualified.group.clone(),
                kind: qualified.resource.clone(),
                ..StatusDetails::default()
            },
        )
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            code: 504,
            reason: StatusReason::Timeout,
            message: message.into(),
            details: None,
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.reason == StatusReason::NotFound
    }

    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        self.reason == StatusReason::AlreadyExists
    }

    #[must_use]
    pub fn is_conflict(&self) -> bool {
        self.reason == StatusReason::Conflict
    }

    /// Status body as served over HTTP.
    #[must_use]
    pub fn to_status(&self) -> serde_json::Value {
        let mut body = serde_json::json!({
            "kind": "Status",
            "apiVersion": "v1",
            "metadata": {},
            "status": "Failure",
            "message": self.message,
            "reason": self.reason.as_str(),
            "code": self.code,
        });
        if let Some(details) = &self.details {
            if let Ok(details) = serde_json::to_value(details) {
                body["details"] = details;
            }
        }
        body
    }
}

impl From<kube::Error> for StatusError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(resp) => Self {
                code: resp.code,
                reason: StatusReason::parse(&resp.reason),
                message: resp.message,
                details: None,
            },
            other => Self::internal(other),
        }
    }
}

impl IntoResponse for StatusError {
    fn into_response(self) -> Response {
        let code = StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (code, Json(self.to_status())).into_response()
    }
}

/// Status carried by a handler error, looking through `anyhow` context.
#[must_use]
pub fn status_of(err: &anyhow::Error) -> Option<&StatusError> {
    err.downcast_ref::<StatusError>()
}

#[must_use]
pub fn is_not_found(err: &anyhow::Error) -> bool {
    status_of(err).is_some_and(StatusError::is_not_found)
}

#[must_use]
pub fn is_conflict(err: &anyhow::Error) -> bool {
    status_of(err).is_some_and(StatusError::is_conflict)
}

/// Convert a handler error into a status error stamped with the request's
/// group, kind (the plural resource name) and the object name.
#[must_use]
pub fn wrap_error(info: &RequestInfo, name: &str, err: &anyhow::Error) -> StatusError {
    let qualified = info.qualified_kind();
    match status_of(err) {
        Some(st) => {
            let prev = st.details.clone().unwrap_or_default();
            StatusError {
                code: st.code,
                reason: st.reason,
                message: st.message.clone(),
                details: Some(StatusDetails {
                    name: name.to_string(),
                    group: qualified.group,
                    kind: qualified.resource,
                    uid: prev.uid,
                    causes: prev.causes,
                    retry_after_seconds: prev.retry_after_seconds,
                }),
            }
        }
        None => {
            let cause = format!("{err:#}");
            StatusError {
                code: 500,
                reason: StatusReason::InternalError,
                message: format!("Internal error occurred: {cause}"),
                details: Some(StatusDetails {
                    name: name.to_string(),
                    group: qualified.group,
                    kind: qualified.resource,
                    causes: vec![StatusCause {
                        message: cause,
                        ..StatusCause::default()
                    }],
                    ..StatusDetails::default()
                }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    fn info() -> RequestInfo {
        RequestInfo::new("walrus.seal.io", "environments").with_namespace("acme")
    }

    #[test]
    fn test_wrap_error_preserves_status() {
        let err: anyhow::Error = StatusError::forbidden(
            &GroupResource::new("walrus.seal.io", "environments"),
            "acme-dev",
            "environment has resources",
        )
        .into();
        let wrapped = wrap_error(&info(), "acme-dev", &err);
        assert_eq!(wrapped.code, 403);
        assert_eq!(wrapped.reason, StatusReason::Forbidden);
        let details = wrapped.details.unwrap();
        assert_eq!(details.kind, "environments");
        assert_eq!(details.group, "walrus.seal.io");
        assert_eq!(details.name, "acme-dev");
    }

    #[test]
    fn test_wrap_error_looks_through_context() {
        let err = Err::<(), _>(StatusError::not_found(&GroupResource::new("", "namespaces"), "x"))
            .context("unset finalizer")
            .unwrap_err();
        assert!(is_not_found(&err));
        let wrapped = wrap_error(&info(), "x", &err);
        assert_eq!(wrapped.code, 404);
    }

    #[test]
    fn test_wrap_error_bare_error_is_internal() {
        let err = anyhow::anyhow!("boom");
        let wrapped = wrap_error(&info(), "acme-dev", &err);
        assert_eq!(wrapped.code, 500);
        assert_eq!(wrapped.reason, StatusReason::InternalError);
        assert_eq!(wrapped.message, "Internal error occurred: boom");
        assert_eq!(wrapped.details.unwrap().causes[0].message, "boom");
    }

    #[test]
    fn test_invalid_message_lists_fields() {
        let err = StatusError::invalid(
            &GroupResource::new("walrus.seal.io", "environments"),
            "acme-dev",
            vec![
                FieldError::invalid("spec.type", "qa", "invalid environment type"),
                FieldError::too_long("spec.displayName", "x", 30),
            ],
        );
        assert_eq!(err.code, 422);
        assert!(err.message.starts_with("environments.walrus.seal.io \"acme-dev\" is invalid: ["));
        assert!(err.message.contains("spec.type: Invalid value: \"qa\""));
        assert_eq!(err.details.unwrap().causes.len(), 2);
    }

    #[test]
    fn test_status_body() {
        let body = StatusError::bad_request("missing name").to_status();
        assert_eq!(body["kind"], "Status");
        assert_eq!(body["code"], 400);
        assert_eq!(body["reason"], "BadRequest");
    }
}
