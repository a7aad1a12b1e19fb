//!
//! sessiongate HTTP server
//! -----------------------
//! Axum router binding the token lifecycle to HTTP, plus process bootstrap.
//!
//! Responsibilities:
//! - Login, refresh and logout endpoints backed by `identity::TokenManager`.
//! - Bearer-token guard for `/admin/*`; the resolved `User` is attached to request extensions.
//! - User registration against the configured `UserDirectory`.
//! - Request-id and access-log middleware.
//! - Background session sweeper and optional snapshot task.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::Deserialize;
use tracing::{error, info};

use crate::config::Config;
use crate::directory::{DirectoryError, MemoryUserDirectory, NewUser, PgUserDirectory, User, UserDirectory, UserView};
use crate::error::{AppError, AppResult};
use crate::identity::{bearer_token, CredentialSigner, KvSessionRegistry, RequestId, TokenManager, TokenPolicy, TokenResponse};
use crate::storage::{KvStore, PersistenceSettings, StoreSettings};

const REQUEST_ID_HEADER: &str = "x-request-id";
const HTTP_TARGET: &str = "sessiongate::http";

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub tokens: Arc<TokenManager>,
    pub users: Arc<dyn UserDirectory>,
}

impl AppState {
    pub fn new(tokens: Arc<TokenManager>, users: Arc<dyn UserDirectory>) -> Self {
        Self { tokens, users }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    #[serde(default)]
    pub refresh_token: String,
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> AppResult<T> {
    match payload {
        Ok(Json(v)) => Ok(v),
        Err(rej) => Err(AppError::malformed("malformed_body", rej.body_text())),
    }
}

pub fn build_router(state: AppState) -> Router {
    let admin = Router::new()
        .route("/logout", get(logout))
        .route("/whoami", get(whoami))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/", get(|| async { "sessiongate" }))
        .route("/users", post(create_user))
        .route("/login", post(login))
        .route("/refresh", post(refresh))
        .route("/logout", get(logout))
        .nest("/admin", admin)
        .layer(middleware::from_fn(log_request))
        .layer(middleware::from_fn(set_request_id))
        .with_state(state)
}

async fn login(State(state): State<AppState>, payload: Result<Json<LoginRequest>, JsonRejection>) -> AppResult<Json<TokenResponse>> {
    let body = json_body(payload)?;
    let pair = state.tokens.login(&body.email, &body.password).await?;
    Ok(Json(TokenResponse::from(&pair)))
}

async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<RefreshRequest>, JsonRejection>,
) -> AppResult<Json<TokenResponse>> {
    let body = json_body(payload)?;
    let access = bearer_token(&headers);
    let pair = state.tokens.refresh(&access, &body.refresh_token).await?;
    Ok(Json(TokenResponse::from(&pair)))
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> AppResult<&'static str> {
    state.tokens.logout(&bearer_token(&headers)).await?;
    Ok("Successfully logged out")
}

async fn whoami(Extension(user): Extension<User>) -> Json<UserView> {
    Json(UserView::from(&user))
}

async fn create_user(
    State(state): State<AppState>,
    payload: Result<Json<NewUser>, JsonRejection>,
) -> AppResult<(StatusCode, Json<UserView>)> {
    let new_user = json_body(payload)?;
    let record = tokio::task::spawn_blocking(move || new_user.into_record())
        .await
        .map_err(|e| AppError::internal("password_hash", e.to_string()))??;
    let limit = state.tokens.policy().store_timeout;
    let created = tokio::time::timeout(limit, state.users.create(record))
        .await
        .unwrap_or(Err(DirectoryError::Timeout));
    match created {
        Ok(user) => {
            info!(target: HTTP_TARGET, user_id = user.id, "user created");
            Ok((StatusCode::CREATED, Json(UserView::from(&user))))
        }
        Err(e @ DirectoryError::Conflict(_)) => Err(AppError::unprocessable("email_taken", e.to_string())),
        Err(e) => {
            error!(target: HTTP_TARGET, "user creation failed: {e}");
            Err(AppError::internal("directory_unavailable", "internal server error"))
        }
    }
}

/// Reject the request unless it carries a live access token.
async fn require_auth(State(state): State<AppState>, mut req: Request, next: Next) -> Result<Response, AppError> {
    let token = bearer_token(req.headers());
    let user = state.tokens.authenticate(&token).await?;
    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

async fn set_request_id(mut req: Request, next: Next) -> Response {
    let id = uuid::Uuid::new_v4().to_string();
    req.extensions_mut().insert(RequestId(id.clone()));
    let mut resp = next.run(req).await;
    if let Ok(v) = HeaderValue::from_str(&id) {
        resp.headers_mut().insert(REQUEST_ID_HEADER, v);
    }
    resp
}

async fn log_request(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let remote = req.extensions().get::<ConnectInfo<SocketAddr>>().map(|c| c.0.to_string()).unwrap_or_default();
    let request_id = req.extensions().get::<RequestId>().map(|r| r.0.clone()).unwrap_or_default();
    info!(target: HTTP_TARGET, request_id = %request_id, remote_addr = %remote, "started {} {}", method, uri);
    let started = Instant::now();
    let resp = next.run(req).await;
    let status = resp.status();
    info!(
        target: HTTP_TARGET,
        request_id = %request_id,
        remote_addr = %remote,
        "completed with {} {} in {:?}",
        status.as_u16(),
        status.canonical_reason().unwrap_or(""),
        started.elapsed()
    );
    resp
}

async fn open_directory(config: &Config) -> anyhow::Result<Arc<dyn UserDirectory>> {
    let users: Arc<dyn UserDirectory> = match config.database_url.as_deref() {
        Some(url) => {
            let pg = PgUserDirectory::connect(url).await?;
            pg.ensure_schema().await?;
            info!(target: "startup", "user directory: postgres");
            Arc::new(pg)
        }
        None => {
            info!(target: "startup", "user directory: in-memory");
            Arc::new(MemoryUserDirectory::new())
        }
    };
    if let Some(seed) = config.seed_user.as_ref() {
        let record = NewUser { name: seed.name.clone(), email: seed.email.clone(), password: seed.password.clone() }
            .into_record()
            .with_context(|| format!("While validating seed user {}", seed.email))?;
        match users.create(record).await {
            Ok(u) => info!(target: "startup", user_id = u.id, email = %u.email, "seed user created"),
            Err(DirectoryError::Conflict(_)) => info!(target: "startup", email = %seed.email, "seed user already present"),
            Err(e) => return Err(e).context("While creating seed user"),
        }
    }
    Ok(users)
}

fn open_session_store(config: &Config) -> KvStore {
    let persistence = config.sessions.snapshot_path.as_ref().map(|path| PersistenceSettings {
        path: path.clone(),
        interval_ms: config.sessions.snapshot_interval.as_millis() as u64,
    });
    let kv = KvStore::new(StoreSettings { name: "sessions".to_string(), persistence });
    match kv.load_snapshot() {
        Ok(n) if n > 0 => info!(target: "sessiongate::kv", restored = n, "session snapshot loaded"),
        Ok(_) => {}
        Err(e) => error!(target: "sessiongate::kv", "session snapshot unreadable, starting empty: {e}"),
    }
    kv
}

fn spawn_background_tasks(kv: &KvStore, sweep_interval: Duration) {
    // Start background KV sweeper
    {
        let kv = kv.clone();
        tokio::spawn(async move {
            loop {
                let removed = kv.sweep();
                if removed > 0 { tracing::debug!(target: "sessiongate::kv", removed = removed, "kv_sweep"); }
                tokio::time::sleep(sweep_interval).await;
            }
        });
    }

    if let Some(p) = kv.persistence() {
        let kv = kv.clone();
        let every = Duration::from_millis(p.interval_ms.max(1));
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(every).await;
                if let Err(e) = kv.save_snapshot() {
                    error!(target: "sessiongate::kv", "session snapshot failed: {e}");
                }
            }
        });
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("unable to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!(target: "startup", "shutdown requested");
}

/// Build every collaborator from `config`, start background tasks and serve until Ctrl-C.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let addr = config.socket_addr()?;
    let signer = CredentialSigner::new(config.jwt.access_secret.as_bytes(), config.jwt.refresh_secret.as_bytes())
        .context("While loading signing keys")?;
    let users = open_directory(&config).await?;
    let kv = open_session_store(&config);
    spawn_background_tasks(&kv, config.sessions.sweep_interval);

    let tokens = TokenManager::new(
        users.clone(),
        Arc::new(KvSessionRegistry::new(kv.clone())),
        signer,
        TokenPolicy::from_config(&config),
        tracing::info_span!("token_manager"),
    );
    let app = build_router(AppState::new(Arc::new(tokens), users));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Starting server on {}", addr);
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Err(e) = kv.save_snapshot() {
        error!(target: "sessiongate::kv", "final session snapshot failed: {e}");
    }
    Ok(())
}
