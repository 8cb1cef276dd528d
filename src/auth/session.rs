//! Session management
//!
//! Sessions live in the `sessions` table. The `sid` cookie carries an
//! HMAC-signed token naming the row, so a forged or edited cookie never
//! reaches the database and a deleted row ends the session for every copy
//! of the cookie.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::data::{EntityId, User};

pub use crate::data::{Flash, FlashKind, Session, SessionPhase};

/// Name of the session cookie
pub const SESSION_COOKIE: &str = "sid";

/// Signed part of the session cookie
#[derive(Debug, Serialize, Deserialize)]
struct SessionClaims {
    /// Session row id
    sid: String,
    /// Expiry of the row at signing time
    exp: DateTime<Utc>,
}

/// Create a signed session token
///
/// Token format: base64(payload).base64(hmac_sha256(payload))
///
/// # Arguments
/// * `session` - Session whose id and expiry are signed
/// * `secret` - HMAC secret key
///
/// # Returns
/// Signed token string
pub fn create_session_token(
    session: &Session,
    secret: &str,
) -> Result<String, crate::error::AppError> {
    use base64::{Engine as _, engine::general_purpose};
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    let claims = SessionClaims {
        sid: session.id.clone(),
        exp: session.expires_at,
    };

    // 1. Serialize claims to JSON
    let payload =
        serde_json::to_string(&claims).map_err(|e| crate::error::AppError::Internal(e.into()))?;

    // 2. Base64 encode the payload
    let payload_b64 = general_purpose::URL_SAFE_NO_PAD.encode(payload.as_bytes());

    // 3. Create HMAC-SHA256 signature
    type HmacSha256 = Hmac<Sha256>;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| crate::error::AppError::Encryption(e.to_string()))?;
    mac.update(payload_b64.as_bytes());
    let signature = mac.finalize().into_bytes();
    let signature_b64 = general_purpose::URL_SAFE_NO_PAD.encode(signature);

    // 4. Return "{payload}.{signature}"
    Ok(format!("{}.{}", payload_b64, signature_b64))
}

/// Verify a session token
///
/// # Returns
/// The session id named by the token
///
/// # Errors
/// Returns `Unauthorized` if the signature is invalid, the token is
/// malformed or the signed expiry has passed
pub fn verify_session_token(token: &str, secret: &str) -> Result<String, crate::error::AppError> {
    use base64::{Engine as _, engine::general_purpose};
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    let (payload_b64, signature_b64) = token
        .split_once('.')
        .ok_or(crate::error::AppError::Unauthorized)?;

    type HmacSha256 = Hmac<Sha256>;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| crate::error::AppError::Encryption(e.to_string()))?;
    mac.update(payload_b64.as_bytes());

    let expected_signature = general_purpose::URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|_| crate::error::AppError::Unauthorized)?;

    mac.verify_slice(&expected_signature)
        .map_err(|_| crate::error::AppError::Unauthorized)?;

    let payload_bytes = general_purpose::URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|_| crate::error::AppError::Unauthorized)?;

    let claims: SessionClaims =
        serde_json::from_slice(&payload_bytes).map_err(|_| crate::error::AppError::Unauthorized)?;

    if claims.exp < Utc::now() {
        return Err(crate::error::AppError::Unauthorized);
    }

    Ok(claims.sid)
}

// =============================================================================
// Request-scoped session
// =============================================================================

/// What the session layer must write back once the handler is done
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionWrite {
    /// Nothing changed, leave the row and the cookie alone
    Unchanged,
    /// Save the row and re-sign the cookie
    Store,
    /// Delete the row and remove the cookie
    Destroy,
}

#[derive(Debug)]
struct Inner {
    session: Session,
    /// Id the session had when the request started
    loaded_id: String,
    user: Option<User>,
    write: SessionWrite,
}

/// Session state for a single request
///
/// Created by the session layer, shared with extractors through request
/// extensions and read back by the layer after the handler ran. Cloning
/// shares the same state.
#[derive(Debug, Clone)]
pub struct RequestSession {
    inner: Arc<Mutex<Inner>>,
}

impl RequestSession {
    pub fn new(session: Session, user: Option<User>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                loaded_id: session.id.clone(),
                session,
                user,
                write: SessionWrite::Unchanged,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn touch(inner: &mut Inner) {
        if inner.write == SessionWrite::Unchanged {
            inner.write = SessionWrite::Store;
        }
    }

    /// Current signed-in user
    pub fn user(&self) -> Option<User> {
        self.lock().user.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.phase() == SessionPhase::Authenticated
    }

    pub fn phase(&self) -> SessionPhase {
        let inner = self.lock();
        match inner.user {
            Some(_) => SessionPhase::Authenticated,
            None => inner.session.phase(),
        }
    }

    /// Snapshot of the underlying session
    pub fn session(&self) -> Session {
        self.lock().session.clone()
    }

    /// Id of the stored row this request started from
    pub fn loaded_id(&self) -> String {
        self.lock().loaded_id.clone()
    }

    pub fn write(&self) -> SessionWrite {
        self.lock().write
    }

    /// Remember the CSRF state handed to the identity provider
    pub fn begin_oauth(&self, state: String) {
        let mut inner = self.lock();
        inner.session.oauth_state = Some(state);
        Self::touch(&mut inner);
    }

    /// Take the pending CSRF state, leaving the session without one
    pub fn take_oauth_state(&self) -> Option<String> {
        let mut inner = self.lock();
        let state = inner.session.oauth_state.take();
        if state.is_some() {
            Self::touch(&mut inner);
        }
        state
    }

    /// Attach a signed-in user, rotating the session id
    pub fn login(&self, user: User) {
        let mut inner = self.lock();
        inner.session.id = EntityId::new().0;
        inner.session.user_id = Some(user.id.clone());
        inner.session.oauth_state = None;
        inner.user = Some(user);
        inner.write = SessionWrite::Store;
    }

    /// Replace the cached user after it was updated in the store
    pub fn refresh_user(&self, user: User) {
        let mut inner = self.lock();
        if inner.session.user_id.as_deref() == Some(user.id.as_str()) {
            inner.user = Some(user);
        }
    }

    /// Queue a flash message for the next rendered page
    ///
    /// A message already waiting in the queue is not queued twice.
    pub fn flash(&self, kind: FlashKind, text: impl Into<String>) {
        let flash = Flash {
            kind,
            text: text.into(),
        };
        let mut inner = self.lock();
        if inner.session.flash.contains(&flash) {
            return;
        }
        inner.session.flash.push(flash);
        Self::touch(&mut inner);
    }

    /// Drain queued flash messages
    pub fn take_flashes(&self) -> Vec<Flash> {
        let mut inner = self.lock();
        let flashes = std::mem::take(&mut inner.session.flash);
        if !flashes.is_empty() {
            Self::touch(&mut inner);
        }
        flashes
    }

    /// Forget the user and delete the stored session
    pub fn destroy(&self) {
        let mut inner = self.lock();
        inner.session.user_id = None;
        inner.session.oauth_state = None;
        inner.session.flash.clear();
        inner.user = None;
        inner.write = SessionWrite::Destroy;
    }
}
