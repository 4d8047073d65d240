//! Typed errors and HTTP mapping.

use crate::response::{error_body, ApiResponse};
use crate::validation::ValidationErrors;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

/// Message used for every permission failure. Never says why.
pub const PERMISSION_DENIED: &str = "You do not have permission to perform this action.";

/// Registration and config-loading errors. Raised at startup, never per request.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing reference: {kind} '{id}'")]
    MissingReference { kind: &'static str, id: String },
    #[error("duplicate model: {0}")]
    DuplicateModel(String),
    #[error("unknown field: {model}.{field}")]
    UnknownField { model: String, field: String },
    #[error("field is not editable: {model}.{field}")]
    NotEditable { model: String, field: String },
    #[error("duplicate route: {0}")]
    DuplicateRoute(String),
    #[error("invalid url slug for {model}: '{slug}'")]
    InvalidSlug { model: String, slug: String },
    #[error("pagination size must be positive for {0}")]
    InvalidPagination(String),
    #[error("invalid pattern for {field}: {message}")]
    InvalidPattern { field: String, message: String },
    #[error("invalid decimal {field}: {message}")]
    InvalidDecimal { field: String, message: String },
    #[error("cannot order {model} by many-to-many field {field}")]
    UnorderableField { model: String, field: String },
    #[error("config load: {0}")]
    Load(String),
    #[error("validation: {0}")]
    Validation(String),
}

/// Data-access layer failures. These are not client errors and surface as 500.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("no {model} record with id {id}")]
    Missing { model: String, id: i64 },
    /// A queryset names a field the store cannot filter or order on.
    #[error("invalid query on {model}: {message}")]
    InvalidQuery { model: String, message: String },
    #[error("store: {0}")]
    Backend(String),
}

impl IntoResponse for StoreError {
    fn into_response(self) -> Response {
        let body = error_body("store_error", self.to_string(), None);
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}

/// A descriptor names a display field that no resolution strategy can satisfy.
/// This is a deployment bug and is never turned into an HTTP status.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationFault {
    #[error("invalid field '{field}' for resource {resource}")]
    InvalidField { resource: String, field: String },
}

/// Everything the dispatcher does not recover from.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationFault),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Client-facing failures, each with a fixed HTTP form.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("validation failed on {} field(s)", .0.len())]
    Validation(ValidationErrors),
    #[error("permission denied")]
    Forbidden,
    #[error("not found")]
    NotFound,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
        }
    }
}

impl From<ApiError> for ApiResponse {
    fn from(err: ApiError) -> Self {
        let status = err.status();
        match err {
            ApiError::BadRequest(message) => ApiResponse::text(status, message),
            ApiError::Validation(errors) => ApiResponse::json(status, errors.to_json()),
            ApiError::Forbidden => ApiResponse::text(status, PERMISSION_DENIED),
            ApiError::NotFound => ApiResponse::empty(status),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        ApiResponse::from(self).into_response()
    }
}
