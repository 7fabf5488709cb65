//! Registration, login, the current-identity query, logout, and listing.

use tracing::{debug, info, instrument, warn};

use super::{AuthOutcome, FieldError, IdentitySettings, LoginInput, RegisterInput, RequestContext, UserField};
use crate::{
    auth::{password, validation},
    db::{
        errors::DbError,
        handlers::users::UserFilter,
        models::users::{UserCreateDBRequest, UserDBResponse},
    },
    errors::{Error, Result},
    stores::UserLookup,
};

/// Syntax checks for a registration, in order. Every violation is reported, not just the first.
pub fn validate_registration(input: &RegisterInput, settings: &IdentitySettings) -> Vec<FieldError> {
    let mut errors = Vec::new();

    if validation::char_len(&input.username) < settings.username_min_length {
        errors.push(FieldError::new(
            UserField::Username,
            format!("Username cannot be less than {} characters", settings.username_min_length),
        ));
    }

    if validation::char_len(&input.password) < settings.password_min_length {
        errors.push(FieldError::new(
            UserField::Password,
            format!("Password cannot be less than {} characters", settings.password_min_length),
        ));
    }

    if !validation::is_valid_email(&input.email) {
        errors.push(FieldError::new(UserField::Email, "Invalid email has been provided"));
    }

    errors
}

/// Create an account and log the session into it.
#[instrument(skip_all, fields(username = %input.username), err)]
pub async fn register(ctx: &mut RequestContext<'_>, input: RegisterInput) -> Result<AuthOutcome> {
    let errors = validate_registration(&input, ctx.settings);
    if !errors.is_empty() {
        debug!(count = errors.len(), "Registration rejected by validation");
        return Ok(AuthOutcome::Errors(errors));
    }

    if ctx.credentials.find(UserLookup::Email(&input.email)).await?.is_some() {
        return Ok(AuthOutcome::error(UserField::Email, "An account with this email is already registered"));
    }

    let params = ctx.settings.argon2;
    let password_hash = tokio::task::spawn_blocking({
        let password = input.password;
        move || password::hash_string_with_params(&password, params)
    })
    .await
    .map_err(|e| Error::Internal {
        operation: format!("spawn password hashing task: {e}"),
    })??;

    let request = UserCreateDBRequest {
        username: input.username,
        email: input.email,
        password_hash,
    };

    let user = match ctx.credentials.insert(&request).await {
        Ok(user) => user,
        // Lost a race against a concurrent registration
        Err(DbError::UniqueViolation { constraint, .. }) => {
            debug!(?constraint, "Registration hit a uniqueness constraint");
            return Ok(AuthOutcome::error(UserField::Username, "Username already exists"));
        }
        Err(e) => return Err(e.into()),
    };

    ctx.session.set_user_id(user.id).await?;
    info!(user_id = user.id, "User registered");

    Ok(AuthOutcome::User(user))
}

/// Check a username and password pair and log the session into that user.
#[instrument(skip_all, fields(username = %input.username), err)]
pub async fn login(ctx: &mut RequestContext<'_>, input: LoginInput) -> Result<AuthOutcome> {
    let Some(user) = ctx.credentials.find(UserLookup::Username(&input.username)).await? else {
        return Ok(AuthOutcome::error(UserField::Username, "User does not exist"));
    };

    let is_valid = tokio::task::spawn_blocking({
        let password = input.password;
        let hash = user.password_hash.clone();
        move || password::verify_string(&password, &hash)
    })
    .await
    .map_err(|e| Error::Internal {
        operation: format!("spawn password verification task: {e}"),
    })??;

    if !is_valid {
        return Ok(AuthOutcome::error(UserField::Password, "Password is incorrect"));
    }

    ctx.session.set_user_id(user.id).await?;
    debug!(user_id = user.id, "User logged in");

    Ok(AuthOutcome::User(user))
}

/// The user the session is logged in as. Lookup failures read as "nobody".
#[instrument(skip_all)]
pub async fn who_am_i(ctx: &RequestContext<'_>) -> Option<UserDBResponse> {
    let user_id = match ctx.session.user_id().await {
        Ok(Some(user_id)) => user_id,
        Ok(None) => return None,
        Err(e) => {
            warn!(error = %e, "Failed to read session");
            return None;
        }
    };

    match ctx.credentials.find(UserLookup::Id(user_id)).await {
        Ok(user) => {
            if user.is_none() {
                debug!(user_id, "Session refers to a user that no longer exists");
            }
            user
        }
        Err(e) => {
            warn!(user_id, error = %e, "Failed to look up session user");
            None
        }
    }
}

/// Destroy the session. `false` only when the session could not be destroyed.
#[instrument(skip_all)]
pub async fn logout(ctx: &mut RequestContext<'_>) -> bool {
    if let Err(e) = ctx.session.destroy().await {
        warn!(error = %e, "Failed to destroy session");
        return false;
    }

    ctx.session.clear_client_cookie();
    true
}

#[instrument(skip_all, fields(skip = filter.skip, limit = filter.limit), err)]
pub async fn list_users(ctx: &RequestContext<'_>, filter: &UserFilter) -> Result<Vec<UserDBResponse>> {
    Ok(ctx.credentials.list(filter).await?)
}
