//! Credential store contract and its PostgreSQL implementation.

use sqlx::PgPool;
use tracing::instrument;

use crate::{
    db::{
        errors::Result,
        handlers::{Repository, Users, users::UserFilter},
        models::users::{UserCreateDBRequest, UserDBResponse, UserUpdateDBRequest},
    },
    types::UserId,
};

/// The columns a user can be looked up by, each an exact match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserLookup<'a> {
    Id(UserId),
    Username(&'a str),
    Email(&'a str),
}

/// Durable table of user records.
///
/// Implementations must enforce uniqueness of both username and email, reporting a
/// duplicate through [`crate::db::errors::DbError::UniqueViolation`].
#[async_trait::async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find(&self, lookup: UserLookup<'_>) -> Result<Option<UserDBResponse>>;

    async fn insert(&self, request: &UserCreateDBRequest) -> Result<UserDBResponse>;

    async fn update(&self, id: UserId, request: &UserUpdateDBRequest) -> Result<UserDBResponse>;

    async fn list(&self, filter: &UserFilter) -> Result<Vec<UserDBResponse>>;
}

/// [`CredentialStore`] over the `users` table. Each call checks out its own connection.
#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl CredentialStore for PgCredentialStore {
    #[instrument(skip(self), err)]
    async fn find(&self, lookup: UserLookup<'_>) -> Result<Option<UserDBResponse>> {
        let mut conn = self.pool.acquire().await?;
        let mut users = Users::new(&mut conn);

        match lookup {
            UserLookup::Id(id) => users.get_by_id(id).await,
            UserLookup::Username(username) => users.get_user_by_username(username).await,
            UserLookup::Email(email) => users.get_user_by_email(email).await,
        }
    }

    #[instrument(skip_all, err)]
    async fn insert(&self, request: &UserCreateDBRequest) -> Result<UserDBResponse> {
        let mut conn = self.pool.acquire().await?;
        Users::new(&mut conn).create(request).await
    }

    #[instrument(skip(self, request), err)]
    async fn update(&self, id: UserId, request: &UserUpdateDBRequest) -> Result<UserDBResponse> {
        let mut conn = self.pool.acquire().await?;
        Users::new(&mut conn).update(id, request).await
    }

    #[instrument(skip(self), err)]
    async fn list(&self, filter: &UserFilter) -> Result<Vec<UserDBResponse>> {
        let mut conn = self.pool.acquire().await?;
        Users::new(&mut conn).list(filter).await
    }
}
