use std::sync::Arc;
use std::time::Duration;

use surge_metrics::{CounterSnapshot, Registry};
use tokio::time::Instant;

use crate::controller::RunState;
use crate::iteration_metrics::{CHECKS, ITERATIONS};
use crate::request_metrics::{HTTP_REQ_DURATION, HTTP_REQ_FAILED, HTTP_REQS};
use crate::schedule::StageSnapshot;

#[derive(Debug, Clone, PartialEq)]
pub struct StageProgress {
    /// 1-based stage index.
    pub stage: usize,
    pub stages: usize,
    pub stage_elapsed: Duration,
    pub stage_remaining: Duration,
    pub start_target: u64,
    pub end_target: u64,
    pub current_target: u64,
}

impl From<StageSnapshot> for StageProgress {
    fn from(s: StageSnapshot) -> Self {
        Self {
            stage: s.index + 1,
            stages: s.count,
            stage_elapsed: s.stage_elapsed,
            stage_remaining: s.stage_remaining,
            start_target: s.start_target,
            end_target: s.end_target,
            current_target: s.current_target,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub elapsed: Duration,
    pub state: RunState,
    /// `None` for an empty ramp profile.
    pub stage: Option<StageProgress>,
    pub active_vus: u64,
    pub target_vus: u64,
    pub iterations_total: u64,
    pub requests_total: u64,
    pub failed_requests_total: u64,
    pub checks_failed_total: u64,
    /// `None` until the first request completes.
    pub latency_p95_ms: Option<f64>,
    /// Requests/sec observed since the previous update.
    pub rps_now: f64,
}

pub type ProgressFn = Arc<dyn Fn(ProgressUpdate) + Send + Sync + 'static>;

/// Remembers the previous update so per-interval rates can be derived.
#[derive(Debug, Default)]
pub(crate) struct ProgressTracker {
    prev: Option<(Instant, CounterSnapshot)>,
}

pub(crate) struct LiveCounts {
    pub(crate) elapsed: Duration,
    pub(crate) state: RunState,
    pub(crate) stage: Option<StageSnapshot>,
    pub(crate) active_vus: u64,
    pub(crate) target_vus: u64,
}

impl ProgressTracker {
    pub(crate) fn update(&mut self, registry: &Registry, live: LiveCounts) -> ProgressUpdate {
        let now = Instant::now();
        let count = |name: &str| registry.snapshot(name).map_or(0, |s| s.count);

        let requests_total = count(HTTP_REQS);
        let requests = CounterSnapshot::new(requests_total);
        let rps_now = match self.prev {
            Some((at, prev)) => {
                requests.per_sec_since(Some(prev), now.duration_since(at).as_secs_f64())
            }
            None => requests.per_sec_since(None, live.elapsed.as_secs_f64()),
        };
        self.prev = Some((now, requests));

        let failed_requests_total = registry
            .lookup_metric(HTTP_REQ_FAILED)
            .map_or(0, |(id, _)| registry.query(id).sum_rate_total().hits);
        let checks_failed_total = registry
            .lookup_metric(CHECKS)
            .map_or(0, |(id, _)| registry.query(id).sum_rate_total().misses());
        let latency_p95_ms = registry
            .snapshot(HTTP_REQ_DURATION)
            .and_then(|s| s.trend)
            .and_then(|t| t.percentile(95.0));

        ProgressUpdate {
            elapsed: live.elapsed,
            state: live.state,
            stage: live.stage.map(StageProgress::from),
            active_vus: live.active_vus,
            target_vus: live.target_vus,
            iterations_total: count(ITERATIONS),
            requests_total,
            failed_requests_total,
            checks_failed_total,
            latency_p95_ms,
            rps_now,
        }
    }
}
