//! Collaborator contracts consumed by [`crate::identity`], with their implementations.
//!
//! - [`CredentialStore`]: durable user records ([`PgCredentialStore`])
//! - [`TokenStore`]: ephemeral key/value entries with per-key expiry ([`MemoryTokenStore`],
//!   [`PgTokenStore`])
//! - [`Notifier`]: outbound HTML messages ([`crate::email::EmailService`])
//!
//! The session carrier lives with the rest of the session plumbing in
//! [`crate::auth::session`].

pub mod credentials;
pub(crate) mod expiry;
pub mod tokens;

pub use credentials::{CredentialStore, PgCredentialStore, UserLookup};
pub use tokens::{MemoryTokenStore, PgTokenStore, TokenStore, TokenStoreError};

use crate::errors::Error;

/// Fire-and-forget delivery of an HTML message to an email address.
///
/// Failures are reported back to the caller; implementations do not retry.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, to: &str, html: &str) -> Result<(), Error>;
}
