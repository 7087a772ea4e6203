/// Error types for Delivery Service
///
/// Errors are converted to appropriate HTTP responses. Anything fatal
/// before the first byte yields a clean error response; a failure after
/// streaming has begun instead truncates the stream (see services::delivery).
use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use std::fmt;

/// Result type for delivery-service operations
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error types
#[derive(Debug)]
pub enum AppError {
    /// Manifest text has no recognizable playlist shape
    Parse(String),

    /// Requested object absent from the store; terminal, not retried
    StorageMiss(String),

    /// Object store unreachable or rejecting
    Storage(String),

    /// Signing backend rejection affecting the synchronous head
    SigningFailure(String),

    /// Cache operation failed
    Cache(String),

    /// Internal server error
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Parse(msg) => write!(f, "Parse error: {}", msg),
            AppError::StorageMiss(msg) => write!(f, "Not found: {}", msg),
            AppError::Storage(msg) => write!(f, "Storage error: {}", msg),
            AppError::SigningFailure(msg) => write!(f, "Signing failure: {}", msg),
            AppError::Cache(msg) => write!(f, "Cache error: {}", msg),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Parse(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::StorageMiss(_) => StatusCode::NOT_FOUND,
            AppError::Storage(_) => StatusCode::BAD_GATEWAY,
            AppError::SigningFailure(_) | AppError::Cache(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let error = match self {
            AppError::Parse(_) => "parse_error",
            AppError::StorageMiss(_) => "not_found_error",
            AppError::Storage(_) => "storage_error",
            AppError::SigningFailure(_) => "signing_error",
            AppError::Cache(_) => "cache_error",
            AppError::Internal(_) => "server_error",
        };

        HttpResponse::build(status).json(serde_json::json!({
            "error": error,
            "message": self.to_string(),
            "status": status.as_u16(),
        }))
    }
}

impl From<manifest_core::ParseError> for AppError {
    fn from(err: manifest_core::ParseError) -> Self {
        AppError::Parse(err.to_string())
    }
}

impl From<edge_cache::CacheError> for AppError {
    fn from(err: edge_cache::CacheError) -> Self {
        AppError::Cache(err.to_string())
    }
}

impl From<url_signing::SignError> for AppError {
    fn from(err: url_signing::SignError) -> Self {
        AppError::SigningFailure(err.to_string())
    }
}
