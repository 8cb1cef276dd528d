//! Page handlers
//!
//! Each handler maps a request to at most one store effect and a [`Page`].

use axum::{Form, extract::State};
use serde_json::json;

use super::forms::{ContactForm, SignupForm};
use crate::AppState;
use crate::auth::{CurrentUser, SessionContext};
use crate::error::AppError;
use crate::metrics::MESSAGES_SUBMITTED_TOTAL;
use crate::views::{Page, View};

/// Acknowledgment sent for a valid signup; no account is created yet
pub const SIGNUP_ACKNOWLEDGMENT: &str = "No errors! Ready to create new account";

/// GET /
pub async fn home() -> Page {
    Page::render(View::Home, json!({ "title": "Home" }))
}

/// GET /about
pub async fn about() -> Page {
    Page::render(View::About, json!({ "title": "About" }))
}

/// GET /contact
pub async fn contact() -> Page {
    Page::render(View::Contact, json!({ "title": "Contact" }))
}

/// GET /profile
///
/// Marks the user online before rendering.
pub async fn profile(
    State(state): State<AppState>,
    SessionContext(session): SessionContext,
    CurrentUser(user): CurrentUser,
) -> Result<Page, AppError> {
    let user = state
        .db
        .set_user_online(&user.id, true)
        .await?
        .ok_or(AppError::NotFound)?;
    session.refresh_user(user.clone());

    Ok(Page::render(
        View::Profile,
        json!({ "title": "Profile", "user": user }),
    ))
}

/// GET /newAccount
pub async fn new_account() -> Page {
    Page::render(View::NewAccount, json!({ "title": "Signup" }))
}

/// POST /signup
///
/// Validation only. Failures re-render the form with the submitted values.
pub async fn signup(Form(form): Form<SignupForm>) -> Result<Page, AppError> {
    match form.validate() {
        Ok(()) => {
            tracing::info!("Signup form accepted");
            Ok(Page::text(SIGNUP_ACKNOWLEDGMENT))
        }
        Err(AppError::Validation(errors)) => Ok(Page::render(
            View::NewAccount,
            json!({
                "title": "Error",
                "errors": errors,
                "fullname": form.username,
                "email": form.email,
                "password": form.password,
                "password2": form.password2,
            }),
        )),
        Err(error) => Err(error),
    }
}

/// POST /contactUs
///
/// Stores the message, then lists every stored message.
pub async fn contact_us(
    State(state): State<AppState>,
    Form(form): Form<ContactForm>,
) -> Result<Page, AppError> {
    let new_message = match form.validate() {
        Ok(new_message) => new_message,
        Err(AppError::Validation(errors)) => {
            return Ok(Page::render(
                View::Contact,
                json!({
                    "title": "Contact",
                    "errors": errors,
                    "fullname": form.fullname,
                    "email": form.email,
                    "message": form.message,
                }),
            ));
        }
        Err(error) => return Err(error),
    };

    let message = state.db.insert_message(&new_message).await?;
    MESSAGES_SUBMITTED_TOTAL.inc();
    tracing::info!(message_id = %message.id, "Contact message stored");

    let messages = state.db.list_messages().await?;
    if messages.is_empty() {
        return Ok(Page::render(View::NoMessage, json!({ "title": "Not found" })));
    }

    Ok(Page::render(
        View::NewMessage,
        json!({ "title": "Message sent", "messages": messages }),
    ))
}

/// GET /health
pub async fn health_check() -> &'static str {
    "OK"
}
