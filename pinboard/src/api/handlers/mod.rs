//! HTTP request handlers.
//!
//! Each handler extracts the caller's [`tower_sessions::Session`], builds a
//! [`crate::identity::RequestContext`] from the shared state and runs one identity operation.
//! The session layer persists whatever the operation wrote and sets the cookie.
//!
//! - [`auth`]: registration, login, current user, logout, password resets
//! - [`users`]: account listing

pub mod auth;
pub mod users;
