//! Error types.
//!
//! Two layers:
//!
//! - [`Error`] surfaces infrastructure failures at startup: binding a port,
//!   opening the database, reading configuration. `main` returns it.
//! - [`ApiError`] is everything a single request can run into. It is
//!   recovered at the handler boundary and rendered as a structured JSON body;
//!   nothing reaches the client as an unhandled fault.

use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::config::ConfigError;
use crate::method::Method;
use crate::response::{IntoResponse, Response};
use crate::status::Status;
use crate::store::StoreError;
use crate::validate::{FieldError, ValidationError};

/// Startup and transport failures.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("store: {0}")]
    Store(#[from] StoreError),

    #[error("config: {0}")]
    Config(#[from] ConfigError),
}

/// Request-level failures, each mapped to one HTTP status.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed, missing or out-of-range fields (422).
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Body is not parseable JSON (400).
    #[error("{0}")]
    BadRequest(String),

    /// Unknown identifier (404).
    #[error("{resource} with id {id} not found")]
    NotFound { resource: &'static str, id: i64 },

    /// No route matches the path (404).
    #[error("no route for {0}")]
    RouteNotFound(String),

    /// Path exists under other verbs (405).
    #[error("method not allowed")]
    MethodNotAllowed { allow: Vec<Method> },

    /// Duplicate unique key (409).
    #[error("{0}")]
    Conflict(String),

    /// Database unreachable or timed out (503). Not retried.
    #[error("upstream unavailable: {0}")]
    Unavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> Status {
        match self {
            Self::Validation(_)             => Status::UnprocessableContent,
            Self::BadRequest(_)             => Status::BadRequest,
            Self::NotFound { .. }           => Status::NotFound,
            Self::RouteNotFound(_)          => Status::NotFound,
            Self::MethodNotAllowed { .. }   => Status::MethodNotAllowed,
            Self::Conflict(_)               => Status::Conflict,
            Self::Unavailable(_)            => Status::ServiceUnavailable,
            Self::Internal(_)               => Status::InternalServerError,
        }
    }

    /// Stable machine-readable code carried in the error body.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_)                    => "validation_error",
            Self::BadRequest(_)                    => "bad_request",
            Self::NotFound { .. } | Self::RouteNotFound(_) => "not_found",
            Self::MethodNotAllowed { .. }          => "method_not_allowed",
            Self::Conflict(_)                      => "conflict",
            Self::Unavailable(_)                   => "upstream_unavailable",
            Self::Internal(_)                      => "internal_error",
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { resource, id } => Self::NotFound { resource, id },
            StoreError::Conflict(msg) => Self::Conflict(msg),
            StoreError::Unavailable(msg) => Self::Unavailable(msg),
            other @ (StoreError::Sqlite(_)
            | StoreError::Poisoned
            | StoreError::Corrupt(_)
            | StoreError::UnsupportedSchemaVersion { .. }) => Self::Internal(other.to_string()),
        }
    }
}

/// JSON error body: `{"detail": "...", "error_code": "...", "errors": [...]}`.
#[derive(Debug, Serialize)]
pub struct ErrorBody<'a> {
    pub detail: String,
    pub error_code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<&'a [FieldError]>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            Self::Unavailable(_) | Self::Internal(_) => error!(status = status.as_u16(), "{self}"),
            _ => {}
        }

        let body = ErrorBody {
            detail: self.to_string(),
            error_code: self.code(),
            errors: match &self {
                Self::Validation(v) => Some(v.errors.as_slice()),
                _ => None,
            },
        };

        let mut builder = Response::builder().status(status);
        if let Self::MethodNotAllowed { allow } = &self {
            let allow = allow.iter().map(|m| m.as_str()).collect::<Vec<_>>().join(", ");
            builder = builder.header("allow", &allow);
        }
        builder.json(&body)
    }
}
