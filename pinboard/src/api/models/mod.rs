//! API request and response data models.
//!
//! API models are distinct from database models: [`users::UserResponse`] never carries the
//! password hash.

pub mod auth;
pub mod pagination;
pub mod users;
