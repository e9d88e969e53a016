//! In-process stand-in for the library API exercised by the librarian scenario.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::time::{Duration, sleep};

pub const PATH_HELLO: &str = "/hello";
pub const PATH_LOGIN: &str = "/api/auth/login";
pub const PATH_READERS: &str = "/api/readers";
pub const PATH_STATUS: &str = "/status/{code}";

pub const DEFAULT_USERNAME: &str = "maria@gmail.com";
pub const DEFAULT_PASSWORD: &str = "Mariaroberta!123";

/// Token handed out by every successful login.
pub const TEST_TOKEN: &str = "surge-test-token";

#[derive(Debug, Clone)]
pub struct TestServerConfig {
    pub username: String,
    pub password: String,
    /// Added before every API response.
    pub latency: Duration,
}

impl Default for TestServerConfig {
    fn default() -> Self {
        Self {
            username: DEFAULT_USERNAME.to_string(),
            password: DEFAULT_PASSWORD.to_string(),
            latency: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TestServerStats {
    requests_total: Arc<AtomicU64>,
    logins_ok: Arc<AtomicU64>,
    logins_rejected: Arc<AtomicU64>,
    readers_created: Arc<AtomicU64>,
    unauthorized: Arc<AtomicU64>,
}

impl TestServerStats {
    fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn requests_total(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    pub fn logins_ok(&self) -> u64 {
        self.logins_ok.load(Ordering::Relaxed)
    }

    pub fn logins_rejected(&self) -> u64 {
        self.logins_rejected.load(Ordering::Relaxed)
    }

    pub fn readers_created(&self) -> u64 {
        self.readers_created.load(Ordering::Relaxed)
    }

    /// Reader creations refused for a missing or wrong bearer token.
    pub fn unauthorized(&self) -> u64 {
        self.unauthorized.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone)]
struct AppState {
    config: Arc<TestServerConfig>,
    stats: TestServerStats,
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateReaderRequest {
    username: String,
    password: String,
    full_name: String,
    #[serde(default)]
    interests: Vec<String>,
    gdpr_consent: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReaderCreated {
    id: u64,
    username: String,
    full_name: String,
    interests: Vec<String>,
}

fn error_body(msg: &str) -> Json<serde_json::Value> {
    Json(json!({ "error": msg }))
}

async fn handle_hello(State(state): State<AppState>) -> &'static str {
    TestServerStats::inc(&state.stats.requests_total);
    "Hello World!"
}

async fn handle_login(
    State(state): State<AppState>,
    body: Bytes,
) -> (StatusCode, Json<serde_json::Value>) {
    TestServerStats::inc(&state.stats.requests_total);
    sleep(state.config.latency).await;

    let Ok(req) = serde_json::from_slice::<LoginRequest>(&body) else {
        return (StatusCode::BAD_REQUEST, error_body("bad json"));
    };

    if req.username == state.config.username && req.password == state.config.password {
        TestServerStats::inc(&state.stats.logins_ok);
        (StatusCode::OK, Json(json!({ "token": TEST_TOKEN })))
    } else {
        TestServerStats::inc(&state.stats.logins_rejected);
        (StatusCode::UNAUTHORIZED, error_body("invalid credentials"))
    }
}

async fn handle_create_reader(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<serde_json::Value>) {
    TestServerStats::inc(&state.stats.requests_total);
    sleep(state.config.latency).await;

    let bearer = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    if bearer != Some(TEST_TOKEN) {
        TestServerStats::inc(&state.stats.unauthorized);
        return (StatusCode::UNAUTHORIZED, error_body("missing or invalid token"));
    }

    let Ok(req) = serde_json::from_slice::<CreateReaderRequest>(&body) else {
        return (StatusCode::BAD_REQUEST, error_body("bad json"));
    };
    if !req.gdpr_consent || req.password.is_empty() || !req.username.contains('@') {
        return (StatusCode::BAD_REQUEST, error_body("invalid reader"));
    }

    let id = state.stats.readers_created.fetch_add(1, Ordering::Relaxed) + 1;
    let created = ReaderCreated {
        id,
        username: req.username,
        full_name: req.full_name,
        interests: req.interests,
    };
    match serde_json::to_value(created) {
        Ok(v) => (StatusCode::CREATED, Json(v)),
        Err(_) => (StatusCode::INTERNAL_SERVER_ERROR, error_body("encode error")),
    }
}

async fn handle_status(State(state): State<AppState>, Path(code): Path<u16>) -> StatusCode {
    TestServerStats::inc(&state.stats.requests_total);
    StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST)
}

pub fn router(config: TestServerConfig, stats: TestServerStats) -> Router {
    let state = AppState {
        config: Arc::new(config),
        stats,
    };
    Router::new()
        .route(PATH_HELLO, get(handle_hello))
        .route(PATH_LOGIN, post(handle_login))
        .route(PATH_READERS, post(handle_create_reader))
        .route(PATH_STATUS, get(handle_status))
        .with_state(state)
}

pub struct TestServer {
    addr: SocketAddr,
    base_url: String,
    stats: TestServerStats,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl TestServer {
    pub async fn start() -> std::io::Result<Self> {
        Self::start_with(TestServerConfig::default()).await
    }

    pub async fn start_with(config: TestServerConfig) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let stats = TestServerStats::default();
        let app = router(config, stats.clone());

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            let _ = serve.await;
        });

        Ok(Self {
            addr,
            base_url: format!("http://{addr}"),
            stats,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn stats(&self) -> &TestServerStats {
        &self.stats
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if self.shutdown_tx.is_some()
            && let Some(task) = self.task.take()
        {
            task.abort();
        }
    }
}
