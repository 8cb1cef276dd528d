//! Facebook OAuth authentication
//!
//! Handles:
//! - OAuth login flow through an injected identity provider
//! - Signed-cookie sessions with flash messages
//! - Route gates and user extractors

mod middleware;
mod oauth;
pub mod provider;
pub mod session;

pub use middleware::{
    CurrentUser, MaybeUser, SessionContext, require_no_session, require_session, session_layer,
};
pub use oauth::auth_router;
pub use provider::{FacebookProvider, IdentityProvider};
pub use session::{RequestSession, Session, create_session_token, verify_session_token};
