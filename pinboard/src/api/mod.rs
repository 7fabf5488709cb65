//! HTTP surface over [`crate::identity`].
//!
//! - **[`handlers`]**: Axum route handlers
//! - **[`models`]**: Request/response data structures
//!
//! # API Structure
//!
//! - **Authentication** (`/authentication/*`): register, login, me, logout, password resets
//! - **Users** (`/users`): list accounts
//!
//! Field errors are ordinary results and come back with status 200 in an `errors` array.
//! Only fatal failures map to error statuses, via [`crate::errors::Error`].

pub mod handlers;
pub mod models;
