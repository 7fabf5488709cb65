//! Test doubles for the identity collaborators, and test configuration.

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use chrono::Utc;

use crate::{
    AppState,
    auth::session::{SessionCarrier, SessionError},
    config::{Config, EmailTransportConfig},
    db::{
        errors::{DbError, Result as DbResult},
        handlers::users::UserFilter,
        models::users::{UserCreateDBRequest, UserDBResponse, UserUpdateDBRequest},
    },
    errors::Error,
    identity::{IdentitySettings, RequestContext},
    stores::{CredentialStore, MemoryTokenStore, Notifier, TokenStore, TokenStoreError, UserLookup},
    types::UserId,
};

pub fn create_test_config() -> Config {
    let mut config = Config::default();
    config.host = "127.0.0.1".to_string();
    config.port = 0;

    // Cheap hashing keeps the suite fast
    config.auth.native.password.argon2_memory_kib = 1024;
    config.auth.native.password.argon2_iterations = 1;
    config.auth.native.password.argon2_parallelism = 1;

    config.email.transport = EmailTransportConfig::File {
        path: std::env::temp_dir()
            .join(format!("pinboard-test-emails-{}", std::process::id()))
            .to_string_lossy()
            .into_owned(),
    };

    config
}

fn unavailable(what: &str) -> DbError {
    DbError::Other(anyhow::anyhow!("{what} unavailable"))
}

/// Credential store over a vector, enforcing the same uniqueness rules as the `users` table.
#[derive(Default)]
pub struct InMemoryCredentials {
    users: Mutex<Vec<UserDBResponse>>,
    /// Number of store calls made, of any kind
    pub calls: AtomicUsize,
    pub fail_lookups: AtomicBool,
    pub fail_inserts: AtomicBool,
    pub fail_updates: AtomicBool,
}

impl InMemoryCredentials {
    /// Insert a user directly, bypassing the call counter and failure switches.
    pub fn seed(&self, username: &str, email: &str, password_hash: &str) -> UserDBResponse {
        let mut users = self.users.lock().unwrap();
        let now = Utc::now();
        let user = UserDBResponse {
            id: users.len() as UserId + 1,
            username: username.to_string(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            created_at: now,
            updated_at: now,
        };
        users.push(user.clone());
        user
    }

    pub fn users(&self) -> Vec<UserDBResponse> {
        self.users.lock().unwrap().clone()
    }

    pub fn get(&self, id: UserId) -> Option<UserDBResponse> {
        self.users.lock().unwrap().iter().find(|u| u.id == id).cloned()
    }
}

fn unique_violation(constraint: &str) -> DbError {
    DbError::UniqueViolation {
        constraint: Some(constraint.to_string()),
        table: Some("users".to_string()),
        message: format!("duplicate key value violates unique constraint \"{constraint}\""),
    }
}

#[async_trait::async_trait]
impl CredentialStore for InMemoryCredentials {
    async fn find(&self, lookup: UserLookup<'_>) -> DbResult<Option<UserDBResponse>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(unavailable("credential store"));
        }

        let users = self.users.lock().unwrap();
        Ok(users
            .iter()
            .find(|u| match lookup {
                UserLookup::Id(id) => u.id == id,
                UserLookup::Username(username) => u.username == username,
                UserLookup::Email(email) => u.email == email,
            })
            .cloned())
    }

    async fn insert(&self, request: &UserCreateDBRequest) -> DbResult<UserDBResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(unavailable("credential store"));
        }

        {
            let users = self.users.lock().unwrap();
            if users.iter().any(|u| u.username == request.username) {
                return Err(unique_violation("users_username_key"));
            }
            if users.iter().any(|u| u.email == request.email) {
                return Err(unique_violation("users_email_key"));
            }
        }

        Ok(self.seed(&request.username, &request.email, &request.password_hash))
    }

    async fn update(&self, id: UserId, request: &UserUpdateDBRequest) -> DbResult<UserDBResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(unavailable("credential store"));
        }

        let mut users = self.users.lock().unwrap();
        let user = users.iter_mut().find(|u| u.id == id).ok_or(DbError::NotFound)?;
        if let Some(hash) = &request.password_hash {
            user.password_hash = hash.clone();
        }
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn list(&self, filter: &UserFilter) -> DbResult<Vec<UserDBResponse>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(unavailable("credential store"));
        }

        let users = self.users.lock().unwrap();
        Ok(users
            .iter()
            .skip(filter.skip as usize)
            .take(filter.limit as usize)
            .cloned()
            .collect())
    }
}

/// [`MemoryTokenStore`] with per-operation failure switches and call counters.
#[derive(Default)]
pub struct TestTokenStore {
    inner: MemoryTokenStore,
    pub sets: AtomicUsize,
    pub gets: AtomicUsize,
    pub fail_set: AtomicBool,
    pub fail_get: AtomicBool,
    pub fail_delete: AtomicBool,
}

impl TestTokenStore {
    pub async fn time_to_live(&self, key: &str) -> Option<Duration> {
        self.inner.time_to_live(key).await
    }
}

#[async_trait::async_trait]
impl TokenStore for TestTokenStore {
    async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> Result<(), TokenStoreError> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        if self.fail_set.load(Ordering::SeqCst) {
            return Err(unavailable("token store").into());
        }
        self.inner.set_with_expiry(key, value, ttl).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, TokenStoreError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if self.fail_get.load(Ordering::SeqCst) {
            return Err(unavailable("token store").into());
        }
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> Result<bool, TokenStoreError> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(unavailable("token store").into());
        }
        self.inner.delete(key).await
    }
}

/// Notifier that keeps every message instead of sending it.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, String)>>,
    pub fail: AtomicBool,
}

impl RecordingNotifier {
    /// `(to, html)` pairs, oldest first
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, to: &str, html: &str) -> Result<(), Error> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Internal {
                operation: "send test email".to_string(),
            });
        }
        self.sent.lock().unwrap().push((to.to_string(), html.to_string()));
        Ok(())
    }
}

fn session_store_down() -> SessionError {
    tower_sessions::session::Error::Store(tower_sessions::session_store::Error::Backend("session store unavailable".to_string()))
        .into()
}

/// Session carrier that records what was done to it.
#[derive(Debug, Default)]
pub struct TestSession {
    pub user_id: Option<UserId>,
    pub destroyed: bool,
    pub cookie_cleared: bool,
    pub fail_reads: bool,
    pub fail_writes: bool,
    pub fail_destroy: bool,
}

#[async_trait::async_trait]
impl SessionCarrier for TestSession {
    async fn user_id(&self) -> Result<Option<UserId>, SessionError> {
        if self.fail_reads {
            return Err(session_store_down());
        }
        Ok(self.user_id)
    }

    async fn set_user_id(&mut self, user_id: UserId) -> Result<(), SessionError> {
        if self.fail_writes {
            return Err(session_store_down());
        }
        self.user_id = Some(user_id);
        Ok(())
    }

    async fn destroy(&mut self) -> Result<(), SessionError> {
        if self.fail_destroy {
            return Err(session_store_down());
        }
        self.user_id = None;
        self.destroyed = true;
        Ok(())
    }

    fn clear_client_cookie(&mut self) {
        self.cookie_cleared = true;
    }
}

/// One of each collaborator, owned, so tests can build a [`RequestContext`] and then inspect
/// what happened.
pub struct Harness {
    pub credentials: InMemoryCredentials,
    pub tokens: TestTokenStore,
    pub notifier: RecordingNotifier,
    pub session: TestSession,
    pub settings: IdentitySettings,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            credentials: InMemoryCredentials::default(),
            tokens: TestTokenStore::default(),
            notifier: RecordingNotifier::default(),
            session: TestSession::default(),
            settings: IdentitySettings::from_config(&create_test_config()),
        }
    }

    pub fn ctx(&mut self) -> RequestContext<'_> {
        RequestContext {
            credentials: &self.credentials,
            tokens: &self.tokens,
            notifier: &self.notifier,
            session: &mut self.session,
            settings: &self.settings,
        }
    }
}

/// Application state over in-memory collaborators, for driving the router in tests.
pub fn create_test_state() -> (AppState, Arc<InMemoryCredentials>, Arc<RecordingNotifier>) {
    let config = create_test_config();
    let credentials = Arc::new(InMemoryCredentials::default());
    let notifier = Arc::new(RecordingNotifier::default());

    let state = AppState::builder()
        .settings(Arc::new(IdentitySettings::from_config(&config)))
        .config(config)
        .credentials(credentials.clone())
        .tokens(Arc::new(MemoryTokenStore::default()))
        .notifier(notifier.clone())
        .build();

    (state, credentials, notifier)
}
