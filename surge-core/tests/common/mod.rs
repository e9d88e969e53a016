#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use surge_core::{
    HttpExchange, HttpExecutor, HttpRequest, IterationContext, IterationError, RunConfig,
    Scenario, Stage, ThresholdConfig,
};

pub const LATENCY: Duration = Duration::from_millis(100);

/// How the fake backend answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Healthy,
    /// Every endpoint answers 500.
    Broken,
    /// Login answers 401, everything else behaves.
    RejectsLogin,
}

/// In-process stand-in for the library API: every call takes [`LATENCY`].
#[derive(Debug)]
pub struct FakeBackend {
    mode: Backend,
    pub logins: AtomicU64,
    pub readers_created: AtomicU64,
}

impl FakeBackend {
    pub fn new(mode: Backend) -> Arc<Self> {
        Arc::new(Self {
            mode,
            logins: AtomicU64::new(0),
            readers_created: AtomicU64::new(0),
        })
    }

    pub fn readers_created(&self) -> u64 {
        self.readers_created.load(Ordering::SeqCst)
    }

    pub fn logins(&self) -> u64 {
        self.logins.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpExecutor for FakeBackend {
    async fn execute(&self, req: HttpRequest) -> HttpExchange {
        tokio::time::sleep(LATENCY).await;

        if self.mode == Backend::Broken {
            return HttpExchange::with_status(500, "", LATENCY);
        }

        if req.url.ends_with("/api/auth/login") {
            self.logins.fetch_add(1, Ordering::SeqCst);
            if self.mode == Backend::RejectsLogin {
                return HttpExchange::with_status(401, r#"{"error":"bad credentials"}"#, LATENCY);
            }
            return HttpExchange::with_status(200, r#"{"token":"t0k3n"}"#, LATENCY);
        }

        if req.url.ends_with("/api/readers") {
            if req.header("authorization") != Some("Bearer t0k3n") {
                return HttpExchange::with_status(401, "", LATENCY);
            }
            self.readers_created.fetch_add(1, Ordering::SeqCst);
            return HttpExchange::with_status(201, r#"{"id":1}"#, LATENCY);
        }

        HttpExchange::with_status(404, "", LATENCY)
    }
}

/// Logs in, creates a reader with the returned token, then thinks for a second.
pub struct LoginThenCreate;

#[async_trait]
impl Scenario for LoginThenCreate {
    async fn iteration(&self, ctx: &mut IterationContext) -> Result<(), IterationError> {
        let login = ctx
            .post_json(
                "/api/auth/login",
                &json!({"username": "maria@gmail.com", "password": "secret"}),
            )
            .await?;
        let token = login.json_str("/token");
        ctx.check("login successful", login.status == 200);
        ctx.check("token received", token.is_some());
        let Some(token) = token else {
            return Err(IterationError::aborted("login failed"));
        };

        let req = HttpRequest::post_json(
            ctx.url("/api/readers"),
            &json!({"username": format!("reader_{}@test.com", ctx.vu_id())}),
        )
        .map_err(|e| IterationError::failed(e.to_string()))?
        .with_bearer(&token);
        let created = ctx.http(req).await;
        ctx.check("create reader status 201", created.status == 201);

        ctx.sleep(Duration::from_secs(1)).await;
        Ok(())
    }
}

/// Ramp of the original script: 10s to 50, 30s at 50, 10s down to 0.
pub fn default_stages() -> Vec<Stage> {
    vec![
        Stage::new(Duration::from_secs(10), 50),
        Stage::new(Duration::from_secs(30), 50),
        Stage::new(Duration::from_secs(10), 0),
    ]
}

pub fn default_thresholds() -> Vec<ThresholdConfig> {
    vec![
        ThresholdConfig::new("http_req_duration", "p(95)<2000"),
        ThresholdConfig::new("http_req_failed", "rate<0.05"),
    ]
}

pub fn config(stages: Vec<Stage>) -> RunConfig {
    RunConfig {
        stages,
        thresholds: default_thresholds(),
        ..RunConfig::default()
    }
}
