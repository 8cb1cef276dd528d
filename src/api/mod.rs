//! HTTP routes
//!
//! Page handlers grouped by the gate that protects them:
//! - anonymous-only pages (home, about, contact)
//! - session-required pages (profile, metrics)
//! - open pages and form posts

pub mod forms;
mod pages;

use axum::{
    Router,
    http::{StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use prometheus::{Encoder, TextEncoder};

use crate::AppState;
use crate::auth::{require_no_session, require_session};
use crate::metrics::REGISTRY;

pub use pages::{SIGNUP_ACKNOWLEDGMENT, health_check};

/// Create the page router
pub fn pages_router() -> Router<AppState> {
    let guest_routes = Router::new()
        .route("/", get(pages::home))
        .route("/about", get(pages::about))
        .route("/contact", get(pages::contact))
        .route_layer(middleware::from_fn(require_no_session));

    let member_routes = Router::new()
        .route("/profile", get(pages::profile))
        .route("/metrics", get(metrics))
        .route_layer(middleware::from_fn(require_session));

    Router::new()
        .merge(guest_routes)
        .merge(member_routes)
        .route("/newAccount", get(pages::new_account))
        .route("/signup", post(pages::signup))
        .route("/contactUs", post(pages::contact_us))
}

/// GET /metrics in Prometheus text format
async fn metrics() -> Response {
    let encoder = TextEncoder::new();

    match encoder.encode_to_string(&REGISTRY.gather()) {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, encoder.format_type().to_string())],
            body,
        )
            .into_response(),
        Err(error) => {
            tracing::error!(%error, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
