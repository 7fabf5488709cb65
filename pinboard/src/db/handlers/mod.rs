//! Repository implementations for database access.
//!
//! Each repository wraps a SQLx connection and implements the [`Repository`] trait:
//!
//! ```ignore
//! use pinboard::db::handlers::{Users, Repository};
//!
//! async fn example(pool: &sqlx::PgPool) -> Result<(), Box<dyn std::error::Error>> {
//!     let mut conn = pool.acquire().await?;
//!     let mut users = Users::new(&mut conn);
//!
//!     if let Some(user) = users.get_user_by_email("user@example.com").await? {
//!         println!("Found user: {}", user.username);
//!     }
//!     Ok(())
//! }
//! ```

pub mod repository;
pub mod users;

pub use repository::Repository;
pub use users::Users;
