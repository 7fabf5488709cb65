use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    api::models::users::UserResponse,
    identity::{AuthOutcome, FieldError},
};

/// Request to register a new user
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RegisterRequest {
    /// Username (must be unique, at least 3 characters)
    pub username: String,
    /// Email address (must be unique)
    pub email: String,
    /// Password (will be hashed, at least 3 characters)
    pub password: String,
}

/// Request to login
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Request to email a password reset link
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

/// Request to redeem a password reset token
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    /// Token from the reset link
    pub token: String,
    /// New password
    pub new_password: String,
}

/// Either the authenticated user, or the field errors explaining why not.
#[derive(Debug, Serialize, ToSchema)]
pub struct UserResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<FieldError>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserResponse>,
}

impl From<AuthOutcome> for UserResult {
    fn from(outcome: AuthOutcome) -> Self {
        match outcome {
            AuthOutcome::User(user) => Self {
                errors: None,
                user: Some(user.into()),
            },
            AuthOutcome::Errors(errors) => Self {
                errors: Some(errors),
                user: None,
            },
        }
    }
}
