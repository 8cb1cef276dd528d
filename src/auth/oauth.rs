//! OAuth login flow
//!
//! Implements the OAuth 2.0 authorization code flow through the
//! configured identity provider, plus logout.

use axum::{
    Router,
    extract::{Query, State},
    routing::get,
};
use base64::Engine as _;
use rand::RngCore;
use serde::Deserialize;

use super::middleware::{MaybeUser, SessionContext};
use super::session::{FlashKind, RequestSession};
use crate::AppState;
use crate::data::User;
use crate::error::AppError;
use crate::metrics::{LOGINS_TOTAL, USERS_TOTAL};
use crate::views::Page;

/// Create authentication router
///
/// Routes:
/// - GET /auth/facebook - Redirect to the provider
/// - GET /auth/facebook/callback - OAuth callback
/// - GET /logout - End the session
pub fn auth_router() -> Router<AppState> {
    Router::new()
        .route("/auth/facebook", get(begin_login))
        .route("/auth/facebook/callback", get(complete_login))
        .route("/logout", get(logout))
}

// =============================================================================
// Login
// =============================================================================

/// GET /auth/facebook
///
/// # Steps
/// 1. Generate CSRF state token
/// 2. Store state in the session
/// 3. Redirect to the provider's consent screen
async fn begin_login(
    State(state): State<AppState>,
    SessionContext(session): SessionContext,
) -> Page {
    let csrf_state = generate_csrf_state();
    let location = state.provider.authorize_url(&csrf_state);
    session.begin_oauth(csrf_state);

    tracing::debug!(provider = state.provider.name(), "Redirecting to identity provider");
    Page::redirect(location)
}

/// Query parameters from the provider callback
#[derive(Debug, Default, Deserialize)]
struct CallbackQuery {
    /// Authorization code
    code: Option<String>,
    /// CSRF state token
    state: Option<String>,
    /// Set by the provider when the user denied consent
    error: Option<String>,
}

/// GET /auth/facebook/callback
///
/// Success redirects to `/profile`, any exchange failure to `/`.
/// Database failures abort the request.
async fn complete_login(
    State(state): State<AppState>,
    SessionContext(session): SessionContext,
    Query(query): Query<CallbackQuery>,
) -> Result<Page, AppError> {
    match finish_login(&state, &session, query).await {
        Ok(user) => {
            LOGINS_TOTAL.with_label_values(&["success"]).inc();
            tracing::info!(user_id = %user.id, "User signed in");
            session.login(user);
            Ok(Page::redirect("/profile"))
        }
        Err(AppError::AuthExchange(reason)) => {
            LOGINS_TOTAL.with_label_values(&["failure"]).inc();
            tracing::warn!(%reason, provider = state.provider.name(), "OAuth login failed");
            session.flash(FlashKind::Error, "Login failed, please try again");
            Ok(Page::redirect("/"))
        }
        Err(error) => Err(error),
    }
}

/// Verify the callback, exchange the code and find or create the user
async fn finish_login(
    state: &AppState,
    session: &RequestSession,
    query: CallbackQuery,
) -> Result<User, AppError> {
    tracing::debug!(phase = ?session.phase(), "OAuth callback received");
    let pending_state = session.take_oauth_state();

    if let Some(error) = query.error {
        return Err(AppError::AuthExchange(format!("provider returned {error}")));
    }
    verify_csrf_state(query.state.as_deref(), pending_state.as_deref())?;
    let code = query
        .code
        .filter(|code| !code.is_empty())
        .ok_or_else(|| AppError::AuthExchange("callback without code".to_string()))?;

    let identity = state.provider.exchange(&code).await?;
    let (user, created) = state.db.find_or_create_user(&identity).await?;
    if created {
        USERS_TOTAL.inc();
        tracing::info!(user_id = %user.id, provider = state.provider.name(), "User created");
    }

    Ok(user)
}

// =============================================================================
// Logout
// =============================================================================

/// GET /logout
///
/// Marks the user offline, then destroys the session. A failed write
/// aborts the request and keeps the session.
async fn logout(
    State(state): State<AppState>,
    SessionContext(session): SessionContext,
    MaybeUser(user): MaybeUser,
) -> Result<Page, AppError> {
    if let Some(user) = user {
        state
            .db
            .set_user_online(&user.id, false)
            .await
            .inspect_err(|error| {
                tracing::error!(%error, user_id = %user.id, "Failed to mark user offline");
            })?;
        tracing::info!(user_id = %user.id, "User signed out");
    }

    session.destroy();
    Ok(Page::redirect("/"))
}

// =============================================================================
// Helpers
// =============================================================================

/// Generate a random CSRF state token
fn generate_csrf_state() -> String {
    let mut bytes = [0_u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Verify the callback state matches the one stored in the session
fn verify_csrf_state(received: Option<&str>, pending: Option<&str>) -> Result<(), AppError> {
    match (received, pending) {
        (Some(received), Some(pending)) if received == pending => Ok(()),
        (_, None) => Err(AppError::AuthExchange(
            "no login in progress for this session".to_string(),
        )),
        _ => Err(AppError::AuthExchange("CSRF state mismatch".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::provider::MockIdentityProvider;
    use crate::auth::session::{Session, SessionPhase};
    use crate::config::tests::valid_config;
    use crate::data::ProviderIdentity;
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn test_state(provider: MockIdentityProvider) -> (AppState, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = valid_config();
        config.database.path = temp_dir.path().join("test.db");
        let state = AppState::with_provider(config, Arc::new(provider))
            .await
            .unwrap();
        (state, temp_dir)
    }

    fn identity() -> ProviderIdentity {
        ProviderIdentity {
            provider_id: "fb-42".to_string(),
            display_name: "Ada Lovelace".to_string(),
            first_name: None,
            last_name: None,
            email: Some("ada@example.com".to_string()),
            image_url: None,
        }
    }

    fn awaiting(csrf: &str) -> RequestSession {
        let session = RequestSession::new(Session::new(3600), None);
        session.begin_oauth(csrf.to_string());
        session
    }

    fn callback(code: &str, csrf: &str) -> CallbackQuery {
        CallbackQuery {
            code: Some(code.to_string()),
            state: Some(csrf.to_string()),
            error: None,
        }
    }

    #[test]
    fn csrf_state_is_random() {
        assert_ne!(generate_csrf_state(), generate_csrf_state());
        assert_eq!(generate_csrf_state().len(), 43);
    }

    #[test]
    fn csrf_state_must_match_pending() {
        assert!(verify_csrf_state(Some("a"), Some("a")).is_ok());
        assert!(verify_csrf_state(Some("a"), Some("b")).is_err());
        assert!(verify_csrf_state(None, Some("a")).is_err());
        assert!(verify_csrf_state(Some("a"), None).is_err());
    }

    #[tokio::test]
    async fn successful_exchange_creates_user_once() {
        let mut provider = MockIdentityProvider::new();
        provider.expect_name().return_const("mock");
        provider
            .expect_exchange()
            .withf(|code| code.to_string() == "good-code")
            .times(2)
            .returning(|_| Ok(identity()));
        let (state, _temp_dir) = test_state(provider).await;

        let first = finish_login(&state, &awaiting("s1"), callback("good-code", "s1"))
            .await
            .unwrap();
        let second = finish_login(&state, &awaiting("s2"), callback("good-code", "s2"))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(state.db.count_users().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn mismatched_state_never_reaches_provider() {
        let mut provider = MockIdentityProvider::new();
        provider.expect_exchange().never();
        let (state, _temp_dir) = test_state(provider).await;

        let session = awaiting("expected");
        let error = finish_login(&state, &session, callback("good-code", "forged"))
            .await
            .unwrap_err();

        assert!(matches!(error, AppError::AuthExchange(_)));
        assert_eq!(session.phase(), SessionPhase::Anonymous);
        assert_eq!(state.db.count_users().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn provider_error_parameter_fails_login() {
        let mut provider = MockIdentityProvider::new();
        provider.expect_exchange().never();
        let (state, _temp_dir) = test_state(provider).await;

        let query = CallbackQuery {
            code: None,
            state: Some("s1".to_string()),
            error: Some("access_denied".to_string()),
        };
        let error = finish_login(&state, &awaiting("s1"), query)
            .await
            .unwrap_err();

        assert!(matches!(error, AppError::AuthExchange(message) if message.contains("access_denied")));
    }

    #[tokio::test]
    async fn rejected_code_is_exchange_failure() {
        let mut provider = MockIdentityProvider::new();
        provider
            .expect_exchange()
            .returning(|_| Err(AppError::AuthExchange("invalid code".to_string())));
        let (state, _temp_dir) = test_state(provider).await;

        let error = finish_login(&state, &awaiting("s1"), callback("bad-code", "s1"))
            .await
            .unwrap_err();

        assert!(matches!(error, AppError::AuthExchange(_)));
        assert_eq!(state.db.count_users().await.unwrap(), 0);
    }
}
