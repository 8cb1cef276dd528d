//! Data models
//!
//! Rust structs representing database rows.
//! All models use ULID for IDs and chrono for timestamps.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// ID Types
// =============================================================================

/// Entity ID wrapper (ULID format, 26 characters)
///
/// Example: "01ARZ3NDEKTSV4RRFFQ69G5FAV"
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    /// Generate a new ULID
    pub fn new() -> Self {
        Self(ulid::Ulid::new().to_string())
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// User
// =============================================================================

/// A user who signed in through the identity provider
///
/// There is at most one row per `provider_id`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    /// Stable id assigned by the identity provider
    pub provider_id: String,
    pub display_name: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    /// Providers may withhold the email even when the scope was requested
    pub email: Option<String>,
    pub image_url: Option<String>,
    pub online: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Verified identity returned by an identity provider after a code exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderIdentity {
    pub provider_id: String,
    pub display_name: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub image_url: Option<String>,
}

// =============================================================================
// Message
// =============================================================================

/// A contact form submission. Immutable once stored.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Message {
    pub id: String,
    pub fullname: String,
    pub email: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Fields accepted from the contact form, already validated
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub fullname: String,
    pub email: String,
    pub message: String,
}

// =============================================================================
// Session
// =============================================================================

/// Kind of a one-time flash notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashKind {
    Success,
    Error,
}

/// One-time notification shown on the next rendered page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flash {
    pub kind: FlashKind,
    pub text: String,
}

/// Where a session stands in the login flow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Anonymous,
    AwaitingProvider,
    Authenticated,
}

/// Server-side session, one row per `sid` cookie
///
/// Deleted on logout; rows past `expires_at` are never loaded.
#[derive(Debug, Clone)]
pub struct Session {
    /// Session id, rotated on login
    pub id: String,
    /// Local id of the signed-in user
    pub user_id: Option<String>,
    /// CSRF state sent to the identity provider, pending its callback
    pub oauth_state: Option<String>,
    /// Flash messages not yet displayed
    pub flash: Vec<Flash>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Start a fresh anonymous session
    pub fn new(max_age_secs: i64) -> Self {
        let now = Utc::now();
        Self {
            id: EntityId::new().0,
            user_id: None,
            oauth_state: None,
            flash: Vec::new(),
            created_at: now,
            expires_at: now + Duration::seconds(max_age_secs),
        }
    }

    /// Check if session is expired
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }

    pub fn phase(&self) -> SessionPhase {
        if self.user_id.is_some() {
            SessionPhase::Authenticated
        } else if self.oauth_state.is_some() {
            SessionPhase::AwaitingProvider
        } else {
            SessionPhase::Anonymous
        }
    }
}
