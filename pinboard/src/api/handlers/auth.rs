use axum::{Json, extract::State};
use tower_sessions::Session;

use crate::{
    AppState,
    api::models::{
        auth::{ForgotPasswordRequest, LoginRequest, RegisterRequest, ResetPasswordRequest, UserResult},
        users::UserResponse,
    },
    errors::Error,
    identity::{self, LoginInput, RegisterInput, ResetPasswordInput},
};

/// Register a new user account and log in as it
#[utoipa::path(
    post,
    path = "/authentication/register",
    request_body = RegisterRequest,
    tag = "authentication",
    responses(
        (status = 200, description = "The new user, or field errors", body = UserResult),
        (status = 500, description = "Credential store failure"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn register(
    State(state): State<AppState>,
    mut session: Session,
    Json(request): Json<RegisterRequest>,
) -> Result<Json<UserResult>, Error> {
    let input = RegisterInput {
        username: request.username,
        password: request.password,
        email: request.email,
    };
    let outcome = identity::register(&mut state.request_context(&mut session), input).await?;

    Ok(Json(outcome.into()))
}

/// Log in with username and password
#[utoipa::path(
    post,
    path = "/authentication/login",
    request_body = LoginRequest,
    tag = "authentication",
    responses(
        (status = 200, description = "The user, or field errors", body = UserResult),
        (status = 500, description = "Credential store failure"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    mut session: Session,
    Json(request): Json<LoginRequest>,
) -> Result<Json<UserResult>, Error> {
    let input = LoginInput {
        username: request.username,
        password: request.password,
    };
    let outcome = identity::login(&mut state.request_context(&mut session), input).await?;

    Ok(Json(outcome.into()))
}

/// The user this session is logged in as, or `null`
#[utoipa::path(
    get,
    path = "/authentication/me",
    tag = "authentication",
    responses(
        (status = 200, description = "Current user, or null", body = Option<UserResponse>),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn me(State(state): State<AppState>, mut session: Session) -> Result<Json<Option<UserResponse>>, Error> {
    let user = identity::who_am_i(&state.request_context(&mut session)).await;

    Ok(Json(user.map(UserResponse::from)))
}

/// Destroy the session and clear its cookie
#[utoipa::path(
    post,
    path = "/authentication/logout",
    tag = "authentication",
    responses(
        (status = 200, description = "Whether the session was destroyed", body = bool),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn logout(State(state): State<AppState>, mut session: Session) -> Result<Json<bool>, Error> {
    let destroyed = identity::logout(&mut state.request_context(&mut session)).await;

    Ok(Json(destroyed))
}

/// Email a password reset link
///
/// Answers `false` both for unknown addresses and for delivery failures.
#[utoipa::path(
    post,
    path = "/authentication/password-resets",
    request_body = ForgotPasswordRequest,
    tag = "authentication",
    responses(
        (status = 200, description = "Whether a reset email was sent", body = bool),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn forgot_password(
    State(state): State<AppState>,
    mut session: Session,
    Json(request): Json<ForgotPasswordRequest>,
) -> Result<Json<bool>, Error> {
    let sent = identity::forgot_password(&state.request_context(&mut session), &request.email).await;

    Ok(Json(sent))
}

/// Set a new password with a reset token, and log in
#[utoipa::path(
    post,
    path = "/authentication/password-resets/confirm",
    request_body = ResetPasswordRequest,
    tag = "authentication",
    responses(
        (status = 200, description = "The user, or field errors", body = UserResult),
        (status = 500, description = "Credential store failure"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn reset_password(
    State(state): State<AppState>,
    mut session: Session,
    Json(request): Json<ResetPasswordRequest>,
) -> Result<Json<UserResult>, Error> {
    let input = ResetPasswordInput {
        token: request.token,
        new_password: request.new_password,
    };
    let outcome = identity::reset_password(&mut state.request_context(&mut session), input).await?;

    Ok(Json(outcome.into()))
}
