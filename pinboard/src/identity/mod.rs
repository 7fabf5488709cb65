//! The credential lifecycle: registration, login, the current-identity query, logout, and the
//! password reset token flow.
//!
//! Every operation takes a [`RequestContext`] built fresh for the inbound request. It bundles
//! the collaborators (credential store, token store, notifier), the caller's session, and the
//! identity settings. Nothing here holds state between requests.
//!
//! Operations return `Result<AuthOutcome>`: user-correctable problems (validation failures,
//! unknown users, wrong passwords, bad reset tokens) come back as [`AuthOutcome::Errors`], while
//! the `Err` arm is reserved for failures the caller cannot fix, such as an unreachable store.

use serde::Serialize;
use std::time::Duration;
use utoipa::ToSchema;

use crate::{
    auth::{password::Argon2Params, session::SessionCarrier},
    config::Config,
    db::models::users::UserDBResponse,
    stores::{CredentialStore, Notifier, TokenStore},
};

mod account;
mod reset;

pub use account::{list_users, login, logout, register, validate_registration, who_am_i};
pub use reset::{forgot_password, reset_password};

/// Input fields a [`FieldError`] can point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum UserField {
    Username,
    Email,
    Password,
    NewPassword,
    Token,
}

/// A validation or business-rule failure attributed to one input field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct FieldError {
    pub field: UserField,
    pub message: String,
}

impl FieldError {
    pub fn new(field: UserField, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Non-fatal result of an operation that can authenticate a user.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthOutcome {
    User(UserDBResponse),
    Errors(Vec<FieldError>),
}

impl AuthOutcome {
    fn error(field: UserField, message: impl Into<String>) -> Self {
        AuthOutcome::Errors(vec![FieldError::new(field, message)])
    }
}

/// Knobs for the identity operations, derived from [`Config`].
#[derive(Debug, Clone)]
pub struct IdentitySettings {
    pub username_min_length: usize,
    pub password_min_length: usize,
    pub argon2: Argon2Params,
    /// Lifetime of a password reset token
    pub reset_token_ttl: Duration,
    /// Namespace for reset tokens in the token store
    pub reset_key_prefix: String,
    /// Frontend base URL the reset link points at, without a trailing slash
    pub reset_link_base: String,
}

impl IdentitySettings {
    pub fn from_config(config: &Config) -> Self {
        let native = &config.auth.native;

        Self {
            username_min_length: native.username.min_length,
            password_min_length: native.password.min_length,
            argon2: Argon2Params {
                memory_kib: native.password.argon2_memory_kib,
                iterations: native.password.argon2_iterations,
                parallelism: native.password.argon2_parallelism,
            },
            reset_token_ttl: native.password_reset.token_ttl,
            reset_key_prefix: native.password_reset.key_prefix.clone(),
            reset_link_base: config.dashboard_url.trim_end_matches('/').to_string(),
        }
    }

    /// Token store key for a reset token.
    pub fn reset_key(&self, token: &str) -> String {
        format!("{}{}", self.reset_key_prefix, token)
    }

    pub fn reset_link(&self, token: &str) -> String {
        format!("{}/update-password/{}", self.reset_link_base, token)
    }
}

impl Default for IdentitySettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Everything an identity operation may touch, scoped to one request.
pub struct RequestContext<'a> {
    pub credentials: &'a dyn CredentialStore,
    pub tokens: &'a dyn TokenStore,
    pub notifier: &'a dyn Notifier,
    pub session: &'a mut dyn SessionCarrier,
    pub settings: &'a IdentitySettings,
}

pub struct RegisterInput {
    pub username: String,
    pub password: String,
    pub email: String,
}

pub struct LoginInput {
    pub username: String,
    pub password: String,
}

pub struct ResetPasswordInput {
    pub token: String,
    pub new_password: String,
}
