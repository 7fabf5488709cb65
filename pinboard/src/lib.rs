//! # pinboard: identity service for the pinboard backend
//!
//! `pinboard` owns the credential lifecycle of a small content-sharing backend: registering
//! accounts, logging in and out through cookie-backed server sessions, answering "who am I",
//! and recovering a forgotten password through a single-use emailed token.
//!
//! ## Architecture
//!
//! The HTTP layer is [Axum](https://github.com/tokio-rs/axum). User accounts live in PostgreSQL.
//! Sessions are managed by `tower-sessions`, stored in process or in PostgreSQL. Password reset
//! tokens live in a key-value store with per-entry expiry, either in process (moka) or in
//! PostgreSQL. Each store's backend is selected in the config.
//!
//! The **identity layer** ([`identity`]) holds the operations themselves. Each takes a
//! [`identity::RequestContext`] assembled per request from the shared [`AppState`] plus the
//! request's [`tower_sessions::Session`], so the operations see their collaborators only as traits
//! ([`stores::CredentialStore`], [`stores::TokenStore`], [`stores::Notifier`],
//! [`auth::session::SessionCarrier`]).
//!
//! The **API layer** ([`api`]) maps JSON requests onto those operations. The session layer
//! persists session changes and sets or clears the cookie.
//!
//! The **database layer** ([`db`]) uses the repository pattern for the `users` table.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use pinboard::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = pinboard::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     pinboard::telemetry::init_telemetry(config.enable_otel_export)?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! See the [`config`] module for configuration options.
pub mod api;
pub mod auth;
pub mod config;
pub mod db;
mod email;
pub mod errors;
pub mod identity;
mod openapi;
pub mod stores;
pub mod telemetry;
mod types;

#[cfg(test)]
pub mod test_utils;

use std::{sync::Arc, time::Duration};

use axum::{
    Json, Router,
    http::{self, HeaderValue},
    middleware,
    routing::{get, post},
};
use bon::Builder;
use sqlx::{PgPool, postgres::PgPoolOptions};
use tokio::{net::TcpListener, task::JoinHandle};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tower_sessions::{MemoryStore, SessionStore, session_store::ExpiredDeletion};
use tower_sessions_sqlx_store::PostgresStore;
use tracing::{Level, debug, info, instrument, warn};
use utoipa::OpenApi;

pub use config::Config;
pub use types::UserId;

use crate::{
    auth::session::{SessionCarrier, create_session_layer, sanitize_cookie_headers},
    config::{CorsOrigin, PoolSettings, StoreBackend},
    email::EmailService,
    identity::{IdentitySettings, RequestContext},
    openapi::ApiDoc,
    stores::{CredentialStore, MemoryTokenStore, Notifier, PgCredentialStore, PgTokenStore, TokenStore},
};

/// Application state shared across all request handlers.
///
/// Collaborators are held as trait objects so tests can swap any of them.
///
/// # Example
///
/// ```ignore
/// let state = AppState::builder()
///     .config(config)
///     .settings(settings)
///     .credentials(Arc::new(PgCredentialStore::new(pool.clone())))
///     .tokens(Arc::new(MemoryTokenStore::default()))
///     .notifier(Arc::new(email_service))
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub settings: Arc<IdentitySettings>,
    pub credentials: Arc<dyn CredentialStore>,
    pub tokens: Arc<dyn TokenStore>,
    pub notifier: Arc<dyn Notifier>,
}

impl AppState {
    /// Bundle the shared collaborators with one request's session.
    pub fn request_context<'a>(&'a self, session: &'a mut dyn SessionCarrier) -> RequestContext<'a> {
        RequestContext {
            credentials: self.credentials.as_ref(),
            tokens: self.tokens.as_ref(),
            notifier: self.notifier.as_ref(),
            session,
            settings: &self.settings,
        }
    }
}

/// Get the pinboard database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

async fn connect_pool(url: &str, settings: &PoolSettings) -> anyhow::Result<PgPool> {
    let optional = |secs: u64| (secs > 0).then(|| Duration::from_secs(secs));

    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .min_connections(settings.min_connections)
        .acquire_timeout(Duration::from_secs(settings.acquire_timeout_secs))
        .idle_timeout(optional(settings.idle_timeout_secs))
        .max_lifetime(optional(settings.max_lifetime_secs))
        .connect(url)
        .await?;

    Ok(pool)
}

/// How often expired sessions are purged from PostgreSQL.
const EXPIRED_SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Connect to the database, run migrations, and pick a backend for the token store.
async fn setup_state(config: &Config) -> anyhow::Result<(AppState, PgPool)> {
    let url = config
        .database_url()
        .ok_or_else(|| anyhow::anyhow!("database.url is not configured"))?;

    let pool = connect_pool(url, &config.database.pool).await?;
    migrator().run(&pool).await?;

    let native = &config.auth.native;
    let tokens: Arc<dyn TokenStore> = match native.password_reset.store {
        StoreBackend::Memory => Arc::new(MemoryTokenStore::default()),
        StoreBackend::Postgres => Arc::new(PgTokenStore::new(pool.clone())),
    };
    info!(reset_tokens = ?native.password_reset.store, "Token store configured");

    let state = AppState::builder()
        .config(config.clone())
        .settings(Arc::new(IdentitySettings::from_config(config)))
        .credentials(Arc::new(PgCredentialStore::new(pool.clone())))
        .tokens(tokens)
        .notifier(Arc::new(EmailService::new(&config.email)?))
        .build();

    Ok((state, pool))
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let cors_config = &config.auth.security.cors;

    let allow_origin = if cors_config.allowed_origins.iter().any(|o| matches!(o, CorsOrigin::Wildcard)) {
        // Browsers refuse credentialed responses to a wildcard origin
        if cors_config.allow_credentials {
            anyhow::bail!("CORS: a '*' origin cannot be combined with allow_credentials");
        }
        AllowOrigin::any()
    } else {
        let mut origins = Vec::new();
        for origin in &cors_config.allowed_origins {
            if let CorsOrigin::Url(url) = origin {
                // Origins carry no path, but Url always serializes one
                origins.push(url.as_str().trim_end_matches('/').parse::<HeaderValue>()?);
            }
        }
        AllowOrigin::list(origins)
    };

    let mut cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([http::Method::GET, http::Method::POST])
        .allow_headers([http::header::CONTENT_TYPE])
        .allow_credentials(cors_config.allow_credentials);

    if let Some(max_age) = cors_config.max_age {
        cors = cors.max_age(Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Periodically delete expired rows from the PostgreSQL session table.
fn spawn_expired_session_sweep(store: PostgresStore) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(EXPIRED_SESSION_SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            if let Err(e) = store.delete_expired().await {
                warn!(error = %e, "Failed to delete expired sessions");
            }
        }
    })
}

/// Build the application router: authentication and user routes, health check, OpenAPI
/// document, sessions held in `session_store`, CORS and request tracing.
///
/// # Errors
///
/// Returns an error if the CORS configuration holds an origin that is not a valid header value,
/// or the session timeout does not fit a cookie.
#[instrument(skip_all)]
pub fn build_router<S: SessionStore + Clone>(state: AppState, session_store: S) -> anyhow::Result<Router> {
    use api::handlers::{auth, users};

    let cors_layer = create_cors_layer(&state.config)?;
    let session_layer = create_session_layer(&state.config.auth.native.session, session_store)?;

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/me", get(auth::me))
        .route("/logout", post(auth::logout))
        .route("/password-resets", post(auth::forgot_password))
        .route("/password-resets/confirm", post(auth::reset_password));

    let router = Router::new()
        .nest("/authentication", auth_routes)
        .route("/users", get(users::list_users))
        .route("/healthz", get(|| async { "ok" }))
        .route("/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .with_state(state)
        .layer(session_layer)
        .layer(middleware::from_fn(sanitize_cookie_headers))
        .layer(cors_layer)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        );

    Ok(router)
}

/// The assembled service, from [`Application::new`] to [`Application::serve`].
pub struct Application {
    router: Router,
    config: Config,
    pool: PgPool,
    session_sweep: Option<JoinHandle<()>>,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting pinboard with configuration: {:#?}", config);
        config.validate_for_serving()?;

        let (state, pool) = setup_state(&config).await?;

        let (router, session_sweep) = match config.auth.native.session.store {
            StoreBackend::Memory => (build_router(state, MemoryStore::default())?, None),
            StoreBackend::Postgres => {
                let store = PostgresStore::new(pool.clone());
                store.migrate().await?;
                let sweep = spawn_expired_session_sweep(store.clone());
                (build_router(state, store)?, Some(sweep))
            }
        };
        info!(sessions = ?config.auth.native.session.store, "Session store configured");

        Ok(Self {
            router,
            config,
            pool,
            session_sweep,
        })
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!("pinboard listening on http://{}", bind_addr);

        axum::serve(listener, self.router).with_graceful_shutdown(shutdown).await?;

        if let Some(sweep) = self.session_sweep {
            sweep.abort();
        }

        info!("Closing database connections...");
        self.pool.close().await;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}
