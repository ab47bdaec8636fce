//! Error types and HTTP response conversion

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::repository::{RepositoryError, RepositoryErrorKind};

/// Result type alias using the framework error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the framework
///
/// `NotFound` and `BadRequest` are the two classes a caller of a CRUD
/// operation is expected to handle. `Serialization` and `Internal` are
/// unexpected failures and are never retried.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(Box<figment::Error>),

    /// Referenced entity, entity type or field does not resolve
    #[error("Not found: {0}")]
    NotFound(String),

    /// Relationship-integrity violation or malformed request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Structured error raised by a repository or query engine
    #[error("{0}")]
    Repository(RepositoryError),

    /// Cache store failure
    #[error("Cache error: {0}")]
    Cache(String),

    /// Redis error
    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(Box<redis::RedisError>),

    /// Entity could not be converted to or from its document form
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Not found error for an entity of the given type and id
    pub fn entity_not_found(entity: &str, id: impl std::fmt::Display) -> Self {
        Self::NotFound(format!("{} with id {}", entity, id))
    }

    /// Check whether this error is one a caller is expected to handle
    pub fn is_client_error(&self) -> bool {
        match self {
            Self::NotFound(_) | Self::BadRequest(_) => true,
            Self::Repository(e) => matches!(
                e.kind,
                RepositoryErrorKind::NotFound
                    | RepositoryErrorKind::AlreadyExists
                    | RepositoryErrorKind::ValidationFailed
            ),
            _ => false,
        }
    }
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error message
    pub error: String,

    /// Optional error code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    /// HTTP status code
    pub status: u16,
}

impl ErrorResponse {
    /// Create a new error response
    pub fn new(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: None,
            status: status.as_u16(),
        }
    }

    /// Create error response with a code
    pub fn with_code(
        status: StatusCode,
        code: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            error: error.into(),
            code: Some(code.into()),
            status: status.as_u16(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_response) = match self {
            Error::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                ErrorResponse::with_code(StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ),

            Error::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse::with_code(StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ),

            Error::Repository(ref e) => {
                tracing::error!(
                    operation = %e.operation,
                    kind = %e.kind,
                    entity_type = ?e.entity_type,
                    entity_id = ?e.entity_id,
                    "Repository error: {}", e.message
                );

                let status = match e.kind {
                    RepositoryErrorKind::NotFound => StatusCode::NOT_FOUND,
                    RepositoryErrorKind::AlreadyExists => StatusCode::CONFLICT,
                    RepositoryErrorKind::ValidationFailed => StatusCode::BAD_REQUEST,
                    RepositoryErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };

                let code = format!("REPOSITORY_{}", e.kind.to_string().to_uppercase());

                let user_message = match e.kind {
                    RepositoryErrorKind::NotFound => "Resource not found".to_string(),
                    RepositoryErrorKind::AlreadyExists => "Resource already exists".to_string(),
                    RepositoryErrorKind::ValidationFailed => e.message.clone(),
                    RepositoryErrorKind::Timeout => "Repository operation timed out".to_string(),
                    _ => "Repository operation failed".to_string(),
                };

                (status, ErrorResponse::with_code(status, code, user_message))
            }

            Error::Config(e) => {
                tracing::error!("Configuration error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::with_code(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "CONFIG_ERROR",
                        "Service is misconfigured",
                    ),
                )
            }

            Error::Cache(msg) => {
                tracing::error!("Cache error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::with_code(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "CACHE_ERROR",
                        "Cache operation failed",
                    ),
                )
            }

            #[cfg(feature = "redis")]
            Error::Redis(e) => {
                tracing::error!("Redis error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::with_code(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "CACHE_ERROR",
                        "Cache operation failed",
                    ),
                )
            }

            Error::Serialization(e) => {
                tracing::error!("Serialization error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::with_code(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "SERIALIZATION_ERROR",
                        "Failed to process entity data",
                    ),
                )
            }

            Error::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::with_code(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_ERROR",
                        "An internal error occurred",
                    ),
                )
            }
        };

        (status, Json(error_response)).into_response()
    }
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Error::Config(Box::new(err))
    }
}

impl From<RepositoryError> for Error {
    fn from(err: RepositoryError) -> Self {
        Error::Repository(err)
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for Error {
    fn from(err: redis::RedisError) -> Self {
        Error::Redis(Box::new(err))
    }
}
