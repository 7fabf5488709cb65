//! Password reset: issuing single-use tokens by email and redeeming them.

use tracing::{debug, info, instrument, warn};

use super::{AuthOutcome, RequestContext, ResetPasswordInput, UserField};
use crate::{
    auth::{password, validation},
    db::models::users::UserUpdateDBRequest,
    errors::{Error, Result},
    stores::UserLookup,
    types::{UserId, abbrev_token},
};

/// Email a password reset link to the owner of `email`.
///
/// Returns `false` for an unknown address and for every failure along the way, so callers
/// cannot tell whether an address is registered. A previously issued token stays valid.
#[instrument(skip_all)]
pub async fn forgot_password(ctx: &RequestContext<'_>, email: &str) -> bool {
    let user = match ctx.credentials.find(UserLookup::Email(email)).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            debug!("Password reset requested for unknown email");
            return false;
        }
        Err(e) => {
            warn!(error = %e, "Failed to look up user for password reset");
            return false;
        }
    };

    let token = password::generate_token();
    let key = ctx.settings.reset_key(&token);

    if let Err(e) = ctx
        .tokens
        .set_with_expiry(&key, &user.id.to_string(), ctx.settings.reset_token_ttl)
        .await
    {
        warn!(user_id = user.id, error = %e, "Failed to store password reset token");
        return false;
    }

    let html = format!("<a href='{}'>Change Password</a>", ctx.settings.reset_link(&token));

    if let Err(e) = ctx.notifier.send(email, &html).await {
        warn!(user_id = user.id, error = %e, "Failed to send password reset email");
        return false;
    }

    info!(user_id = user.id, token = %abbrev_token(&token), "Password reset token issued");
    true
}

/// Redeem a reset token: set a new password and log the session in as its owner.
///
/// The token is consumed only once the new password is stored. If storing it fails the
/// token stays live so the same link can be retried.
#[instrument(skip_all, fields(token = %abbrev_token(&input.token)), err)]
pub async fn reset_password(ctx: &mut RequestContext<'_>, input: ResetPasswordInput) -> Result<AuthOutcome> {
    let min_length = ctx.settings.password_min_length;
    if validation::char_len(&input.new_password) < min_length {
        return Ok(AuthOutcome::error(
            UserField::NewPassword,
            format!("Password cannot be less than {min_length} characters"),
        ));
    }

    let key = ctx.settings.reset_key(&input.token);

    let stored = match ctx.tokens.get(&key).await {
        Ok(Some(value)) => value,
        Ok(None) => return Ok(AuthOutcome::error(UserField::Token, "Invalid or expired token.")),
        Err(e) => {
            warn!(error = %e, "Failed to read password reset token");
            return Ok(AuthOutcome::error(UserField::Token, "Invalid or expired token."));
        }
    };

    let Ok(user_id) = stored.parse::<UserId>() else {
        warn!("Password reset token holds a malformed user id");
        return Ok(AuthOutcome::error(UserField::Token, "No user found."));
    };

    let Some(user) = ctx.credentials.find(UserLookup::Id(user_id)).await? else {
        return Ok(AuthOutcome::error(UserField::Token, "No user found."));
    };

    let params = ctx.settings.argon2;
    let password_hash = tokio::task::spawn_blocking({
        let password = input.new_password;
        move || password::hash_string_with_params(&password, params)
    })
    .await
    .map_err(|e| Error::Internal {
        operation: format!("spawn password hashing task: {e}"),
    })??;

    let update = UserUpdateDBRequest {
        password_hash: Some(password_hash),
    };

    let user = match ctx.credentials.update(user.id, &update).await {
        Ok(user) => user,
        Err(e) => {
            warn!(user_id = user.id, error = %e, "Failed to update password, keeping reset token");
            return Ok(AuthOutcome::error(UserField::NewPassword, "Could not process request"));
        }
    };

    ctx.session.set_user_id(user.id).await?;

    // Single use. The password has already changed, so a failure here is only logged.
    match ctx.tokens.delete(&key).await {
        Ok(true) => {}
        Ok(false) => debug!(user_id = user.id, "Reset token was already gone when consumed"),
        Err(e) => warn!(user_id = user.id, error = %e, "Failed to delete consumed reset token"),
    }

    info!(user_id = user.id, "Password reset");
    Ok(AuthOutcome::User(user))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::models::users::UserDBResponse,
        identity::{FieldError, LoginInput, RegisterInput, login, register},
        stores::TokenStore,
        test_utils::Harness,
    };
    use std::{sync::atomic::Ordering, time::Duration};

    fn reset(token: &str, new_password: &str) -> ResetPasswordInput {
        ResetPasswordInput {
            token: token.to_string(),
            new_password: new_password.to_string(),
        }
    }

    /// Pull the token out of the last reset email.
    fn token_from_last_email(h: &Harness) -> String {
        let (_, html) = h.notifier.sent().pop().expect("an email was sent");
        let start = html.find("/update-password/").expect("reset link in email") + "/update-password/".len();
        let end = html[start..].find('\'').expect("end of link") + start;
        html[start..end].to_string()
    }

    fn seeded() -> (Harness, UserDBResponse) {
        let h = Harness::new();
        let user = h.credentials.seed("alice", "a@example.com", "old-hash");
        (h, user)
    }

    #[tokio::test]
    async fn test_forgot_password_unknown_email() {
        let (mut h, _) = seeded();

        assert!(!forgot_password(&h.ctx(), "nobody@example.com").await);
        assert!(h.notifier.sent().is_empty());
        assert_eq!(h.tokens.sets.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_forgot_password_stores_token_for_user() {
        let (mut h, user) = seeded();

        assert!(forgot_password(&h.ctx(), "a@example.com").await);

        let sent = h.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "a@example.com");
        assert!(sent[0].1.contains("http://localhost:3000/update-password/"));

        let token = token_from_last_email(&h);
        let key = format!("forget-password:{token}");
        assert_eq!(h.tokens.get(&key).await.unwrap(), Some(user.id.to_string()));

        let ttl = h.tokens.time_to_live(&key).await.unwrap();
        assert!(ttl <= Duration::from_secs(24 * 60 * 60));
        assert!(ttl > Duration::from_secs(24 * 60 * 60 - 60));
    }

    #[test_log::test(tokio::test)]
    async fn test_forgot_password_failures_are_false() {
        let (mut h, _) = seeded();
        h.credentials.fail_lookups.store(true, Ordering::SeqCst);
        assert!(!forgot_password(&h.ctx(), "a@example.com").await);

        let (mut h, _) = seeded();
        h.tokens.fail_set.store(true, Ordering::SeqCst);
        assert!(!forgot_password(&h.ctx(), "a@example.com").await);
        assert!(h.notifier.sent().is_empty());

        let (mut h, _) = seeded();
        h.notifier.fail.store(true, Ordering::SeqCst);
        assert!(!forgot_password(&h.ctx(), "a@example.com").await);
    }

    #[tokio::test]
    async fn test_reissue_keeps_earlier_token_live() {
        let (mut h, _) = seeded();

        assert!(forgot_password(&h.ctx(), "a@example.com").await);
        let first = token_from_last_email(&h);
        assert!(forgot_password(&h.ctx(), "a@example.com").await);
        let second = token_from_last_email(&h);

        assert_ne!(first, second);
        assert!(h.tokens.get(&format!("forget-password:{first}")).await.unwrap().is_some());
        assert!(h.tokens.get(&format!("forget-password:{second}")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_reset_short_password_touches_no_store() {
        let (mut h, _) = seeded();
        let calls = h.credentials.calls.load(Ordering::SeqCst);

        let outcome = reset_password(&mut h.ctx(), reset("whatever", "ab")).await.unwrap();

        assert_eq!(
            outcome,
            AuthOutcome::Errors(vec![FieldError::new(
                UserField::NewPassword,
                "Password cannot be less than 3 characters"
            )])
        );
        assert_eq!(h.credentials.calls.load(Ordering::SeqCst), calls);
        assert_eq!(h.tokens.gets.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_reset_unknown_token() {
        let (mut h, user) = seeded();

        let outcome = reset_password(&mut h.ctx(), reset("made-up", "newpass1")).await.unwrap();

        assert_eq!(
            outcome,
            AuthOutcome::Errors(vec![FieldError::new(UserField::Token, "Invalid or expired token.")])
        );
        assert_eq!(h.credentials.get(user.id).unwrap().password_hash, "old-hash");
        assert_eq!(h.session.user_id, None);
    }

    #[tokio::test]
    async fn test_reset_token_lookup_failure_reads_as_invalid() {
        let (mut h, _) = seeded();
        assert!(forgot_password(&h.ctx(), "a@example.com").await);
        let token = token_from_last_email(&h);

        h.tokens.fail_get.store(true, Ordering::SeqCst);
        let outcome = reset_password(&mut h.ctx(), reset(&token, "newpass1")).await.unwrap();

        assert_eq!(
            outcome,
            AuthOutcome::Errors(vec![FieldError::new(UserField::Token, "Invalid or expired token.")])
        );
    }

    #[tokio::test]
    async fn test_reset_expired_token() {
        let (mut h, user) = seeded();
        h.settings.reset_token_ttl = Duration::from_millis(50);

        assert!(forgot_password(&h.ctx(), "a@example.com").await);
        let token = token_from_last_email(&h);
        tokio::time::sleep(Duration::from_millis(200)).await;

        let outcome = reset_password(&mut h.ctx(), reset(&token, "newpass1")).await.unwrap();

        assert_eq!(
            outcome,
            AuthOutcome::Errors(vec![FieldError::new(UserField::Token, "Invalid or expired token.")])
        );
        assert_eq!(h.credentials.get(user.id).unwrap().password_hash, "old-hash");
    }

    #[tokio::test]
    async fn test_reset_token_for_missing_user() {
        let (mut h, _) = seeded();
        h.tokens
            .set_with_expiry("forget-password:orphan", "42", Duration::from_secs(60))
            .await
            .unwrap();
        h.tokens
            .set_with_expiry("forget-password:garbled", "not-a-number", Duration::from_secs(60))
            .await
            .unwrap();

        for token in ["orphan", "garbled"] {
            let outcome = reset_password(&mut h.ctx(), reset(token, "newpass1")).await.unwrap();
            assert_eq!(
                outcome,
                AuthOutcome::Errors(vec![FieldError::new(UserField::Token, "No user found.")])
            );
        }
    }

    #[tokio::test]
    async fn test_reset_update_failure_keeps_token() {
        let (mut h, user) = seeded();
        assert!(forgot_password(&h.ctx(), "a@example.com").await);
        let token = token_from_last_email(&h);

        h.credentials.fail_updates.store(true, Ordering::SeqCst);
        let outcome = reset_password(&mut h.ctx(), reset(&token, "newpass1")).await.unwrap();

        assert_eq!(
            outcome,
            AuthOutcome::Errors(vec![FieldError::new(UserField::NewPassword, "Could not process request")])
        );
        assert_eq!(h.session.user_id, None);
        assert!(h.tokens.get(&format!("forget-password:{token}")).await.unwrap().is_some());

        // Retry with the same link once the store recovers
        h.credentials.fail_updates.store(false, Ordering::SeqCst);
        let outcome = reset_password(&mut h.ctx(), reset(&token, "newpass1")).await.unwrap();
        assert!(matches!(outcome, AuthOutcome::User(ref u) if u.id == user.id));
    }

    #[test_log::test(tokio::test)]
    async fn test_reset_succeeds_when_token_delete_fails() {
        let (mut h, user) = seeded();
        assert!(forgot_password(&h.ctx(), "a@example.com").await);
        let token = token_from_last_email(&h);

        h.tokens.fail_delete.store(true, Ordering::SeqCst);
        let outcome = reset_password(&mut h.ctx(), reset(&token, "newpass1")).await.unwrap();

        assert!(matches!(outcome, AuthOutcome::User(ref u) if u.id == user.id));
        assert_eq!(h.session.user_id, Some(user.id));
    }

    #[tokio::test]
    async fn test_alice_end_to_end() {
        let mut h = Harness::new();

        let outcome = register(
            &mut h.ctx(),
            RegisterInput {
                username: "alice".to_string(),
                password: "hunter2".to_string(),
                email: "a@example.com".to_string(),
            },
        )
        .await
        .unwrap();
        let AuthOutcome::User(alice) = outcome else {
            panic!("registration failed");
        };
        assert_eq!(alice.id, 1);

        let login_as = |password: &str| LoginInput {
            username: "alice".to_string(),
            password: password.to_string(),
        };

        let outcome = login(&mut h.ctx(), login_as("wrong")).await.unwrap();
        assert_eq!(
            outcome,
            AuthOutcome::Errors(vec![FieldError::new(UserField::Password, "Password is incorrect")])
        );
        assert!(matches!(login(&mut h.ctx(), login_as("hunter2")).await.unwrap(), AuthOutcome::User(_)));

        assert!(forgot_password(&h.ctx(), "a@example.com").await);
        let token = token_from_last_email(&h);
        assert_eq!(
            h.tokens.get(&format!("forget-password:{token}")).await.unwrap().as_deref(),
            Some("1")
        );

        h.session = Default::default();
        let outcome = reset_password(&mut h.ctx(), reset(&token, "newpass1")).await.unwrap();
        let AuthOutcome::User(after) = outcome else {
            panic!("reset failed");
        };
        assert_eq!(after.id, 1);
        assert_ne!(after.password_hash, alice.password_hash);
        assert_eq!(h.session.user_id, Some(1));
        assert_eq!(h.tokens.get(&format!("forget-password:{token}")).await.unwrap(), None);

        let outcome = reset_password(&mut h.ctx(), reset(&token, "newpass2")).await.unwrap();
        assert_eq!(
            outcome,
            AuthOutcome::Errors(vec![FieldError::new(UserField::Token, "Invalid or expired token.")])
        );

        // Only the new password works now
        assert!(matches!(login(&mut h.ctx(), login_as("hunter2")).await.unwrap(), AuthOutcome::Errors(_)));
        assert!(matches!(login(&mut h.ctx(), login_as("newpass1")).await.unwrap(), AuthOutcome::User(_)));
    }
}
