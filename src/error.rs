use axum::{http::StatusCode, response::IntoResponse, Json};
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Flight not found: {0}")]
    FlightNotFound(i64),

    #[error("User not found: {0}")]
    UserNotFound(i64),

    #[error("Booking not found: {0}")]
    BookingNotFound(String),

    #[error("Insufficient wallet balance: required {required}, available {available}")]
    InsufficientBalance { required: Decimal, available: Decimal },

    #[error("Concurrent update conflict on flight {flight_id}")]
    ConcurrentUpdateConflict { flight_id: i64 },

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Access denied: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Corrupt stored record: {0}")]
    CorruptRecord(String),

    #[error("Password hashing error: {0}")]
    PasswordHash(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;

/// SQLite primary result code for SQLITE_BUSY; extended codes keep it in the low byte.
const SQLITE_BUSY: i32 = 5;

impl AppError {
    /// Transient write collisions the storage layer retries before surfacing.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::ConcurrentUpdateConflict { .. } => true,
            AppError::Database(sqlx::Error::Database(db_err)) => db_err
                .code()
                .and_then(|code| code.parse::<i32>().ok())
                .is_some_and(|code| code & 0xff == SQLITE_BUSY),
            _ => false,
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::FlightNotFound(_) | AppError::UserNotFound(_) | AppError::BookingNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            AppError::InsufficientBalance { .. } | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ConcurrentUpdateConflict { .. } => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Database(_) if self.is_retryable() => StatusCode::SERVICE_UNAVAILABLE,
            AppError::InvalidConfiguration(_)
            | AppError::PasswordHash(_)
            | AppError::CorruptRecord(_)
            | AppError::Database(_)
            | AppError::Migration(_)
            | AppError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(serde_json::json!({ "detail": self.to_string() }))).into_response()
    }
}
