//! Contactdesk binary entry point

use contactdesk::{AppState, config};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How often expired session rows are purged
const SESSION_CLEANUP_INTERVAL_SECS: u64 = 3600;

/// Application entry point
///
/// # Setup
/// 1. Load configuration from file and environment
/// 2. Initialize tracing/logging
/// 3. Register metrics
/// 4. Initialize AppState
/// 5. Build Axum router and serve
/// 6. Start background tasks (session cleanup)
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = config::AppConfig::load()?;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.default_directives().into());

    if config.logging.format == "json" {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }

    tracing::info!("Starting Contactdesk...");
    tracing::info!(
        domain = %config.server.domain,
        protocol = %config.server.protocol,
        "Configuration loaded"
    );
    if !config.should_use_secure_cookies() {
        tracing::warn!("Using insecure session cookies for local development");
    }

    contactdesk::metrics::init_metrics();

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let public_url = config.server.base_url();

    let state = AppState::new(config).await?;
    let app = contactdesk::build_router(state.clone());

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);
    tracing::info!("Public URL: {}", public_url);

    spawn_session_cleanup_task(state);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Spawn background task deleting expired sessions
fn spawn_session_cleanup_task(state: AppState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(
            SESSION_CLEANUP_INTERVAL_SECS,
        ));

        loop {
            interval.tick().await;

            match state.db.delete_expired_sessions().await {
                Ok(0) => {}
                Ok(removed) => tracing::info!(removed, "Expired sessions removed"),
                Err(error) => tracing::error!(%error, "Session cleanup failed"),
            }
        }
    });

    tracing::info!("Session cleanup task spawned");
}
