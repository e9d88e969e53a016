use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use surge_http::{HttpExchange, HttpExecutor, HttpRequest};
use surge_metrics::MetricKind;

use crate::iteration_metrics::IterationOutcome;
use crate::metrics_context::MetricsContext;

/// Reason recorded for iterations interrupted by a forced cancellation.
pub const CANCELLED_REASON: &str = "cancelled";

/// Why an iteration did not complete.
///
/// Neither variant stops the virtual user: the outcome is recorded and the next iteration
/// starts as usual.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IterationError {
    /// A precondition for the remaining steps was not met; they were not attempted.
    #[error("iteration aborted: {0}")]
    Aborted(String),

    #[error("iteration failed: {0}")]
    Failed(String),
}

impl IterationError {
    pub fn aborted(reason: impl Into<String>) -> Self {
        Self::Aborted(reason.into())
    }

    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }

    pub fn outcome(&self) -> IterationOutcome {
        match self {
            Self::Aborted(_) => IterationOutcome::Aborted,
            Self::Failed(_) => IterationOutcome::Failed,
        }
    }
}

/// The scripted workflow executed by every virtual user, once per iteration.
#[async_trait]
pub trait Scenario: Send + Sync + 'static {
    async fn iteration(&self, ctx: &mut IterationContext) -> Result<(), IterationError>;
}

/// Run-wide state shared by the iterations of every virtual user.
pub struct RunContext {
    metrics: MetricsContext,
    executor: Arc<dyn HttpExecutor>,
    base_url: String,
}

impl RunContext {
    pub fn new(
        metrics: MetricsContext,
        executor: Arc<dyn HttpExecutor>,
        base_url: impl Into<String>,
    ) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            metrics,
            executor,
            base_url,
        }
    }

    pub fn metrics(&self) -> &MetricsContext {
        &self.metrics
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("scenario", &self.metrics.scenario())
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

/// Capabilities available to one iteration of one virtual user.
///
/// A fresh context is built for every iteration, so [`IterationContext::set_var`] state
/// never leaks into the next iteration or to other virtual users.
#[derive(Debug)]
pub struct IterationContext {
    vu_id: u64,
    iteration: u64,
    run: Arc<RunContext>,
    vars: HashMap<String, String>,
}

impl IterationContext {
    pub fn new(vu_id: u64, iteration: u64, run: Arc<RunContext>) -> Self {
        Self {
            vu_id,
            iteration,
            run,
            vars: HashMap::new(),
        }
    }

    /// 1-based id of the virtual user running this iteration.
    pub fn vu_id(&self) -> u64 {
        self.vu_id
    }

    /// 0-based iteration counter of this virtual user.
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    pub fn scenario(&self) -> &str {
        self.run.metrics.scenario()
    }

    /// Resolves `path` against the run's base URL. Absolute URLs are returned unchanged.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        if path.starts_with('/') {
            format!("{}{path}", self.run.base_url)
        } else {
            format!("{}/{path}", self.run.base_url)
        }
    }

    /// Executes `req` and records the built-in HTTP metrics for it.
    ///
    /// Transport failures come back as an exchange with `status == 0` and `error` set.
    pub async fn http(&mut self, req: HttpRequest) -> HttpExchange {
        let method = req.method.clone();
        let exchange = self.run.executor.execute(req).await;
        self.run.metrics.record_exchange(method.as_str(), &exchange);
        exchange
    }

    pub async fn get(&mut self, path: &str) -> HttpExchange {
        let url = self.url(path);
        self.http(HttpRequest::get(url)).await
    }

    /// POSTs `body` as JSON. Serialization failures fail the iteration before anything is
    /// sent.
    pub async fn post_json<T: Serialize + ?Sized + Sync>(
        &mut self,
        path: &str,
        body: &T,
    ) -> Result<HttpExchange, IterationError> {
        let req = HttpRequest::post_json(self.url(path), body)
            .map_err(|e| IterationError::failed(format!("encode request body: {e}")))?;
        Ok(self.http(req).await)
    }

    /// Records a named boolean assertion and returns it unchanged.
    pub fn check(&mut self, name: &str, passed: bool) -> bool {
        self.run.metrics.record_check(name, passed);
        passed
    }

    /// Records every check and returns whether all of them passed.
    pub fn checks_all(&mut self, checks: &[(&str, bool)]) -> bool {
        checks
            .iter()
            .fold(true, |all, (name, passed)| self.check(name, *passed) && all)
    }

    /// Suspends this virtual user only.
    pub async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    pub fn set_var(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    pub fn var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn take_var(&mut self, key: &str) -> Option<String> {
        self.vars.remove(key)
    }

    /// Returns `false` if `name` is already registered with another kind.
    pub fn add_trend(&mut self, name: &str, value: Duration) -> bool {
        self.run
            .metrics
            .record_custom(name, MetricKind::Trend, &[], |h| h.observe(value))
    }

    pub fn add_counter(&mut self, name: &str, value: u64) -> bool {
        self.run
            .metrics
            .record_custom(name, MetricKind::Counter, &[], |h| h.increment(value))
    }

    pub fn add_rate(&mut self, name: &str, hit: bool) -> bool {
        self.run
            .metrics
            .record_custom(name, MetricKind::Rate, &[], |h| h.add_rate(hit))
    }
}

/// Records the outcome of one finished (or interrupted) iteration.
pub(crate) fn record_iteration_result(
    metrics: &MetricsContext,
    vu_id: u64,
    result: &Result<(), IterationError>,
    elapsed: Duration,
) {
    match result {
        Ok(()) => metrics.record_iteration(IterationOutcome::Complete, Some(elapsed), None),
        Err(IterationError::Aborted(reason)) => {
            metrics.record_iteration(IterationOutcome::Aborted, Some(elapsed), Some(reason));
        }
        Err(IterationError::Failed(msg)) => {
            tracing::debug!(vu = vu_id, error = %msg, "iteration failed");
            metrics.record_iteration(IterationOutcome::Failed, Some(elapsed), None);
        }
    }
}
