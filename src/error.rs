use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Failure modes of the adapter layer.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// Update or consume target is absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// Uniqueness or foreign-key violation.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Rejected input: malformed email, non-positive TTL.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Transport or connection failure against either store.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type AdapterResult<T> = Result<T, AdapterError>;

impl From<sqlx::Error> for AdapterError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db) => {
                if db.is_unique_violation() {
                    return AdapterError::Conflict(
                        db.constraint().unwrap_or("unique constraint").to_string(),
                    );
                }
                if db.is_foreign_key_violation() {
                    return AdapterError::Conflict(
                        db.constraint().unwrap_or("foreign key constraint").to_string(),
                    );
                }
                match db.code() {
                    Some(code) => from_sqlstate(&code, db.message()),
                    None => AdapterError::Internal(e.to_string()),
                }
            }
            sqlx::Error::Decode(_)
            | sqlx::Error::ColumnDecode { .. }
            | sqlx::Error::ColumnNotFound(_)
            | sqlx::Error::ColumnIndexOutOfBounds { .. }
            | sqlx::Error::TypeNotFound { .. }
            | sqlx::Error::RowNotFound => AdapterError::Internal(e.to_string()),
            _ => AdapterError::StoreUnavailable(e.to_string()),
        }
    }
}

/// Postgres SQLSTATE to the adapter taxonomy, for errors that are neither
/// uniqueness nor foreign-key violations.
fn from_sqlstate(code: &str, message: &str) -> AdapterError {
    // 22: data exception, 23502: not null, 23514: check constraint
    if code.starts_with("22") || code == "23502" || code == "23514" {
        return AdapterError::Validation(message.to_string());
    }
    // 08: connection, 40: rollback, 53: resources, 57: operator, 58: system
    if ["08", "40", "53", "57", "58"].iter().any(|class| code.starts_with(class)) {
        return AdapterError::StoreUnavailable(format!("{}: {}", code, message));
    }
    AdapterError::Internal(format!("{}: {}", code, message))
}

impl From<redis::RedisError> for AdapterError {
    fn from(e: redis::RedisError) -> Self {
        AdapterError::StoreUnavailable(e.to_string())
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for AdapterError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AdapterError::NotFound(_) => (StatusCode::NOT_FOUND, "NotFound", self.to_string()),
            AdapterError::Conflict(_) => (StatusCode::CONFLICT, "Conflict", self.to_string()),
            AdapterError::Validation(_) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "ValidationError",
                self.to_string(),
            ),
            AdapterError::StoreUnavailable(detail) => {
                error!(error = %detail, "store unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "StoreUnavailable",
                    "Store unavailable".to_string(),
                )
            }
            AdapterError::Internal(detail) => {
                error!(error = %detail, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "InternalServerError",
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(ErrorBody { error: code, message })).into_response()
    }
}
