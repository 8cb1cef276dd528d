//! Error types for contactdesk
//!
//! All errors in the application are converted to `AppError`,
//! which implements `IntoResponse` for proper HTTP error responses.

use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};
use thiserror::Error;

/// Application-wide error type
///
/// This enum represents all possible errors that can occur
/// in the application. It implements `IntoResponse` to
/// automatically convert errors to appropriate HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Resource not found (404)
    #[error("Resource not found")]
    NotFound,

    /// Authentication required (redirect to home)
    #[error("Authentication required")]
    Unauthorized,

    /// Form rules violated (400 when not handled by the form)
    #[error("Validation failed: {}", .0.join(", "))]
    Validation(Vec<String>),

    /// Database error (500)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Identity provider rejected or failed the code exchange (502)
    #[error("OAuth exchange failed: {0}")]
    AuthExchange(String),

    /// HTTP client error (502)
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Template rendering error (500)
    #[error("Render error: {0}")]
    Render(#[from] minijinja::Error),

    /// Configuration error (500)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Signing error (500)
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Internal server error (500)
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl AppError {
    fn error_type(&self) -> &'static str {
        match self {
            AppError::NotFound => "not_found",
            AppError::Unauthorized => "unauthorized",
            AppError::Validation(_) => "validation",
            AppError::Database(_) => "database",
            AppError::AuthExchange(_) => "auth_exchange",
            AppError::HttpClient(_) => "http_client",
            AppError::Render(_) => "render",
            AppError::Config(_) => "config",
            AppError::Encryption(_) => "encryption",
            AppError::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for AppError {
    /// Convert error to HTTP response
    ///
    /// Maps each error variant to a status code and a minimal HTML page.
    /// Server-side failures are logged and hide their details.
    fn into_response(self) -> Response {
        use crate::metrics::ERRORS_TOTAL;
        ERRORS_TOTAL.with_label_values(&[self.error_type()]).inc();

        let (status, message) = match &self {
            AppError::Unauthorized => return Redirect::to("/").into_response(),
            AppError::NotFound => (StatusCode::NOT_FOUND, self.to_string()),
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::AuthExchange(_) | AppError::HttpClient(_) => {
                tracing::warn!(error = %self, "Upstream provider failure");
                (StatusCode::BAD_GATEWAY, "Login provider unavailable".to_string())
            }
            AppError::Database(_) => {
                tracing::error!(error = %self, "Request aborted by database failure");
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error".to_string())
            }
            AppError::Render(_)
            | AppError::Config(_)
            | AppError::Encryption(_)
            | AppError::Internal(_) => {
                tracing::error!(error = %self, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = format!(
            "<!DOCTYPE html><html><head><title>{status}</title></head>\
             <body><h1>{status}</h1><p>{}</p><a href=\"/\">Home</a></body></html>",
            html_escape::encode_text(&message),
        );

        (status, Html(body)).into_response()
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
