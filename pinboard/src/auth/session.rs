//! Cookie-addressed server-side sessions, managed by `tower-sessions`.
//!
//! [`create_session_layer`] configures the session cookie and lifetime from [`SessionConfig`].
//! Handlers extract a [`tower_sessions::Session`] and hand it to the identity operations as a
//! [`SessionCarrier`]. The layer persists a session once something is written to it, so anonymous
//! requests never create records or cookies, and it clears the client cookie of a flushed one.

use axum::{
    extract::Request,
    http::{HeaderMap, HeaderValue, header},
    middleware::Next,
    response::Response,
};
use thiserror::Error;
use tower_sessions::{
    Expiry, Session, SessionManagerLayer, SessionStore,
    cookie::{SameSite, time},
};
use tracing::debug;

use crate::{config::SessionConfig, types::UserId};

/// Session key holding the logged-in user's id.
pub const USER_ID_KEY: &str = "userId";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Store(#[from] tower_sessions::session::Error),
}

/// The per-request session handle the identity operations work against.
#[async_trait::async_trait]
pub trait SessionCarrier: Send + Sync {
    async fn user_id(&self) -> Result<Option<UserId>, SessionError>;

    async fn set_user_id(&mut self, user_id: UserId) -> Result<(), SessionError>;

    /// Irrecoverably discard all session state, server side.
    async fn destroy(&mut self) -> Result<(), SessionError>;

    /// Tell the client to drop its session cookie. Only called after a successful `destroy`.
    fn clear_client_cookie(&mut self);
}

#[async_trait::async_trait]
impl SessionCarrier for Session {
    async fn user_id(&self) -> Result<Option<UserId>, SessionError> {
        Ok(self.get::<UserId>(USER_ID_KEY).await?)
    }

    async fn set_user_id(&mut self, user_id: UserId) -> Result<(), SessionError> {
        self.insert(USER_ID_KEY, user_id).await?;
        Ok(())
    }

    async fn destroy(&mut self) -> Result<(), SessionError> {
        self.flush().await?;
        Ok(())
    }

    fn clear_client_cookie(&mut self) {
        // The session layer sends the removal cookie for a flushed session
    }
}

fn same_site(configured: &str) -> SameSite {
    match configured.to_ascii_lowercase().as_str() {
        "strict" => SameSite::Strict,
        "none" => SameSite::None,
        _ => SameSite::Lax,
    }
}

/// Session middleware for `store`: cookie name, flags and inactivity timeout from `config`.
///
/// # Errors
///
/// Returns an error if the timeout does not fit a cookie `Max-Age`.
pub fn create_session_layer<S: SessionStore + Clone>(config: &SessionConfig, store: S) -> anyhow::Result<SessionManagerLayer<S>> {
    let timeout = time::Duration::try_from(config.timeout)?;

    Ok(SessionManagerLayer::new(store)
        .with_name(config.cookie_name.clone())
        .with_path("/")
        .with_http_only(true)
        .with_secure(config.cookie_secure)
        .with_same_site(same_site(&config.cookie_same_site))
        .with_expiry(Expiry::OnInactivity(timeout)))
}

/// A cookie pair is kept when it is made only of visible ASCII and spaces.
fn is_usable_cookie_pair(pair: &[u8]) -> bool {
    pair.iter().all(|b| *b == b' ' || (0x21..=0x7e).contains(b))
}

/// Drop cookie pairs that are not visible ASCII, keeping the rest of each Cookie header.
///
/// Returns whether the headers were rewritten.
pub(crate) fn retain_usable_cookies(headers: &mut HeaderMap) -> bool {
    if headers.get_all(header::COOKIE).iter().all(|value| value.to_str().is_ok()) {
        return false;
    }

    let mut kept = Vec::new();
    let mut dropped = 0usize;
    for value in headers.get_all(header::COOKIE) {
        for pair in value.as_bytes().split(|b| *b == b';') {
            if !is_usable_cookie_pair(pair) {
                dropped += 1;
                continue;
            }
            // Only ASCII survives the check above
            let pair = String::from_utf8_lossy(pair);
            let pair = pair.trim();
            if !pair.is_empty() {
                kept.push(pair.to_string());
            }
        }
    }
    debug!(dropped, kept = kept.len(), "Dropped unreadable cookies");

    headers.remove(header::COOKIE);
    if !kept.is_empty() {
        if let Ok(value) = HeaderValue::from_str(&kept.join("; ")) {
            headers.insert(header::COOKIE, value);
        }
    }

    true
}

/// Middleware that removes unreadable cookie pairs before the session layer parses the header.
pub(crate) async fn sanitize_cookie_headers(mut request: Request, next: Next) -> Response {
    retain_usable_cookies(request.headers_mut());
    next.run(request).await
}
