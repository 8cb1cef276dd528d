//! Authentication middleware
//!
//! The session layer restores the stored session named by the cookie,
//! attaches the current user and persists changes after the handler. The gates
//! protect routes that require (or forbid) a signed-in user.

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};

use super::session::{
    RequestSession, SESSION_COOKIE, Session, SessionWrite, create_session_token,
    verify_session_token,
};
use crate::AppState;
use crate::data::User;
use crate::error::AppError;
use crate::views::{Locals, PendingView};

/// Browser-session cookie; expiry is enforced by the signed token and the row
fn build_session_cookie(token: String, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .build()
}

fn clear_session_cookie() -> Cookie<'static> {
    let mut cookie = Cookie::build((SESSION_COOKIE, "")).path("/").build();
    cookie.make_removal();
    cookie
}

/// Restore the session named by the cookie, or start an anonymous one
///
/// A cookie whose row was deleted or has expired starts a fresh session.
/// A session pointing at a user that no longer exists is treated as
/// anonymous.
async fn restore_session(
    jar: &CookieJar,
    state: &AppState,
) -> Result<(Session, Option<User>), AppError> {
    let auth = &state.config.auth;
    let session_id = jar
        .get(SESSION_COOKIE)
        .and_then(|cookie| verify_session_token(cookie.value(), &auth.session_secret).ok());

    let stored = match session_id {
        Some(session_id) => state.db.get_session(&session_id).await?,
        None => None,
    };
    let Some(mut session) = stored else {
        return Ok((Session::new(auth.session_max_age), None));
    };

    let user = match session.user_id.as_deref() {
        Some(user_id) => state.db.get_user(user_id).await?,
        None => None,
    };
    if user.is_none() && session.user_id.is_some() {
        tracing::debug!(session_id = %session.id, "Session user no longer exists");
        session.user_id = None;
    }

    Ok((session, user))
}

/// Save the session row and sign a cookie for it
///
/// The row the request started from is deleted when login rotated the id.
async fn store_session(
    state: &AppState,
    request_session: &RequestSession,
) -> Result<Cookie<'static>, AppError> {
    let session = request_session.session();
    state.db.save_session(&session).await?;

    let loaded_id = request_session.loaded_id();
    if loaded_id != session.id {
        state.db.delete_session(&loaded_id).await?;
    }

    let token = create_session_token(&session, &state.config.auth.session_secret)?;
    Ok(build_session_cookie(
        token,
        state.config.should_use_secure_cookies(),
    ))
}

/// Session layer for every HTML route
///
/// After the handler ran it renders a pending view (draining flash
/// messages into the page), then saves the session row and its cookie
/// when the session changed, or deletes both when it was destroyed.
///
/// # Usage
/// ```ignore
/// let app = Router::new()
///     .route("/", get(home))
///     .layer(middleware::from_fn_with_state(state, session_layer));
/// ```
pub async fn session_layer(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let jar = CookieJar::from_headers(request.headers());

    let (session, user) = match restore_session(&jar, &state).await {
        Ok(restored) => restored,
        Err(error) => return error.into_response(),
    };
    let request_session = RequestSession::new(session, user);
    request.extensions_mut().insert(request_session.clone());

    let mut response = next.run(request).await;

    if let Some(pending) = response.extensions_mut().remove::<PendingView>() {
        let locals = Locals {
            user: request_session.user(),
            flashes: request_session.take_flashes(),
        };
        response = state.views.respond(&pending, &locals);
    }

    match request_session.write() {
        SessionWrite::Unchanged => response,
        SessionWrite::Destroy => match state.db.delete_session(&request_session.loaded_id()).await {
            Ok(()) => (jar.remove(clear_session_cookie()), response).into_response(),
            Err(error) => error.into_response(),
        },
        SessionWrite::Store => match store_session(&state, &request_session).await {
            Ok(cookie) => (jar.add(cookie), response).into_response(),
            Err(error) => error.into_response(),
        },
    }
}

fn request_session(request: &Request) -> Result<RequestSession, AppError> {
    request
        .extensions()
        .get::<RequestSession>()
        .cloned()
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("session layer is not installed")))
}

/// Gate: anonymous visitors are sent home
pub async fn require_session(request: Request, next: Next) -> Result<Response, AppError> {
    if !request_session(&request)?.is_authenticated() {
        return Ok(Redirect::to("/").into_response());
    }

    Ok(next.run(request).await)
}

/// Gate: signed-in users are sent to their profile
pub async fn require_no_session(request: Request, next: Next) -> Result<Response, AppError> {
    if request_session(&request)?.is_authenticated() {
        return Ok(Redirect::to("/profile").into_response());
    }

    Ok(next.run(request).await)
}

/// Extractor for the request session
///
/// # Usage
/// ```ignore
/// async fn handler(SessionContext(session): SessionContext) -> Page {
///     session.flash(FlashKind::Success, "Saved");
///     Page::redirect("/")
/// }
/// ```
#[derive(Debug, Clone)]
pub struct SessionContext(pub RequestSession);

#[async_trait]
impl<S> FromRequestParts<S> for SessionContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestSession>()
            .cloned()
            .map(SessionContext)
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("session layer is not installed")))
    }
}

/// Extractor for the current signed-in user
///
/// Rejects with `Unauthorized` (a redirect home) for anonymous requests.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let SessionContext(session) = SessionContext::from_request_parts(parts, state).await?;
        session.user().map(CurrentUser).ok_or(AppError::Unauthorized)
    }
}

/// Optional current user extractor
///
/// Returns None if not authenticated, instead of error.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<User>);

#[async_trait]
impl<S> FromRequestParts<S> for MaybeUser
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(
            parts
                .extensions
                .get::<RequestSession>()
                .and_then(RequestSession::user),
        ))
    }
}
