//! OpenAPI documentation for the identity API, served at `/openapi.json`.

use utoipa::{
    Modify, OpenApi,
    openapi::security::{ApiKey, ApiKeyValue, SecurityScheme},
};

use crate::{
    api::{
        self,
        models::{
            auth::{ForgotPasswordRequest, LoginRequest, RegisterRequest, ResetPasswordRequest, UserResult},
            users::UserResponse,
        },
    },
    identity::{FieldError, UserField},
};

/// Documents the session cookie. The name here is the default; deployments may rename it.
struct SessionCookieAddon;

impl Modify for SessionCookieAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.security_schemes.insert(
                "SessionCookie".to_string(),
                SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::with_description(
                    "qid",
                    "Opaque session id, set by register, login and password reset.",
                ))),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::auth::register,
        api::handlers::auth::login,
        api::handlers::auth::me,
        api::handlers::auth::logout,
        api::handlers::auth::forgot_password,
        api::handlers::auth::reset_password,
        api::handlers::users::list_users,
    ),
    components(schemas(
        RegisterRequest,
        LoginRequest,
        ForgotPasswordRequest,
        ResetPasswordRequest,
        UserResult,
        UserResponse,
        FieldError,
        UserField,
    )),
    modifiers(&SessionCookieAddon),
    tags(
        (name = "authentication", description = "Registration, login, sessions and password resets"),
        (name = "users", description = "User listing"),
    ),
    info(
        title = "Pinboard identity API",
        description = "Accounts, cookie sessions and password recovery for the pinboard backend.",
    )
)]
pub struct ApiDoc;
