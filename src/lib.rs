//! Contactdesk - a small server-rendered site with Facebook login
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      HTTP Layer (Axum)                       │
//! │  - Session layer: signed cookie, current user, flashes       │
//! │  - Gates: anonymous-only / session-required                  │
//! │  - Page handlers and OAuth endpoints                         │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Views (minijinja, main layout)               │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Data Layer                              │
//! │  - SQLite (sqlx): users, messages                            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `api`: page handlers and form validation
//! - `auth`: OAuth flow, sessions, gates
//! - `views`: templates and the tagged `Page` result
//! - `data`: database layer
//! - `config`: configuration management
//! - `error`: error types
//! - `metrics`: Prometheus instruments

pub mod api;
pub mod auth;
pub mod config;
pub mod data;
pub mod error;
pub mod metrics;
pub mod views;

use std::sync::Arc;

/// Application state shared across all handlers
///
/// Cloned for each request. Per-request session state lives in request
/// extensions, never here.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// Database connection pool
    pub db: Arc<data::Database>,

    /// Template environment
    pub views: Arc<views::Views>,

    /// OAuth identity provider
    pub provider: Arc<dyn auth::IdentityProvider>,
}

impl AppState {
    /// Initialize application state with the Facebook provider
    ///
    /// # Errors
    /// Returns error if any initialization step fails
    pub async fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("contactdesk/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| error::AppError::Internal(e.into()))?;
        let provider = Arc::new(auth::FacebookProvider::new(&config, http_client));

        Self::with_provider(config, provider).await
    }

    /// Initialize application state with an explicit identity provider
    ///
    /// # Steps
    /// 1. Connect to SQLite database
    /// 2. Compile templates
    pub async fn with_provider(
        config: config::AppConfig,
        provider: Arc<dyn auth::IdentityProvider>,
    ) -> Result<Self, error::AppError> {
        tracing::info!("Initializing application state...");

        let db = data::Database::connect(&config.database.path).await?;
        metrics::USERS_TOTAL.set(db.count_users().await?);

        let views = views::Views::new()?;
        tracing::info!("Templates compiled");

        Ok(Self {
            config: Arc::new(config),
            db: Arc::new(db),
            views: Arc::new(views),
            provider,
        })
    }
}

/// Build the Axum router with all routes.
///
/// This is shared by the binary and integration tests to keep route
/// composition consistent across environments.
pub fn build_router(state: AppState) -> axum::Router {
    use axum::{Router, middleware};
    use tower_http::{
        compression::CompressionLayer, limit::RequestBodyLimitLayer, trace::TraceLayer,
    };

    const MAX_FORM_BYTES: usize = 64 * 1024;

    let cors_layer = build_cors_layer(&state.config.server);

    Router::new()
        .merge(api::pages_router())
        .merge(auth::auth_router())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::session_layer,
        ))
        .route("/health", axum::routing::get(api::health_check))
        .layer(RequestBodyLimitLayer::new(MAX_FORM_BYTES))
        .layer(CompressionLayer::new())
        .layer(middleware::from_fn(metrics::track_requests))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(state)
}

fn build_cors_layer(server: &config::ServerConfig) -> tower_http::cors::CorsLayer {
    use axum::http::HeaderValue;
    use tower_http::cors::{Any, CorsLayer};

    if !server.protocol.eq_ignore_ascii_case("https") {
        return CorsLayer::permissive();
    }

    let allowed_origin = server.base_url();
    match HeaderValue::from_str(&allowed_origin) {
        Ok(origin) => CorsLayer::new()
            .allow_origin([origin])
            .allow_methods(Any)
            .allow_headers(Any),
        Err(error) => {
            tracing::error!(
                %error,
                origin = %allowed_origin,
                "Failed to parse CORS origin from server base URL; denying cross-origin requests"
            );
            CorsLayer::new().allow_methods(Any).allow_headers(Any)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tempfile::TempDir;
    use tower::ServiceExt;

    async fn test_app() -> (axum::Router, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = config::tests::valid_config();
        config.database.path = temp_dir.path().join("test.db");
        let provider = Arc::new(auth::provider::MockIdentityProvider::new());
        let state = AppState::with_provider(config, provider).await.unwrap();
        (build_router(state), temp_dir)
    }

    #[tokio::test]
    async fn health_bypasses_session_layer() {
        let (app, _temp_dir) = test_app().await;

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get("set-cookie").is_none());
    }

    #[tokio::test]
    async fn anonymous_profile_redirects_home() {
        let (app, _temp_dir) = test_app().await;

        let response = app
            .oneshot(Request::get("/profile").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert!(response.status().is_redirection());
        assert_eq!(response.headers()["location"], "/");
    }

    #[tokio::test]
    async fn home_renders_html_for_guests() {
        let (app, _temp_dir) = test_app().await;

        let response = app
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers()["content-type"].to_str().unwrap();
        assert!(content_type.starts_with("text/html"));
    }
}
