use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Main error type for the application.
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found error.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Book already purchased by this user.
    #[error("Already owned: {0}")]
    AlreadyOwned(String),

    /// Book is not available for purchase or rental.
    #[error("Book unavailable: {0}")]
    BookUnavailable(String),

    /// Unknown rental period code.
    #[error("Invalid rental period: {0}")]
    InvalidPeriod(String),

    /// Missing or invalid credentials.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated but not permitted (access gate, admin-only).
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Invalid request data.
    #[error("Invalid data: {0}")]
    Validation(String),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::AlreadyOwned(_)
            | AppError::BookUnavailable(_)
            | AppError::InvalidPeriod(_)
            | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        tracing::error!(error = %self, "Request error");

        (status, self.to_string()).into_response()
    }
}

/// Result type alias for the application.
pub type Result<T> = std::result::Result<T, AppError>;
