//! Authentication building blocks used by [`crate::identity`].
//!
//! - [`password`]: Argon2id hashing and verification, opaque token generation
//! - [`session`]: session layer setup and the session handle the identity operations use
//! - [`validation`]: input syntax checks (email addresses, lengths)

pub mod password;
pub mod session;
pub mod validation;
