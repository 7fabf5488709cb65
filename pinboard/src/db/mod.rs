//! Database layer for the credential store.
//!
//! Data access uses SQLx with PostgreSQL and follows the repository pattern: a repository wraps
//! a connection (or transaction) and exposes typed operations over one table.
//!
//! ```text
//! identity ──> stores::PgCredentialStore ──> handlers::Users ──> PostgreSQL
//! ```
//!
//! # Modules
//!
//! - [`handlers`]: Repository implementations
//! - [`models`]: Database records and request types
//! - [`errors`]: Database-specific error types
//!
//! Migrations live in the crate's `migrations/` directory and are embedded through
//! [`crate::migrator`].

pub mod errors;
pub mod handlers;
pub mod models;
