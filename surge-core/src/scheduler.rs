use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinError;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::controller::RunState;
use crate::iteration_metrics::IterationOutcome;
use crate::runner::{RunContext, Scenario};
use crate::schedule::RampSchedule;
use crate::vu::{VuHandle, spawn_vu};

const OVERLOAD_WARN_EVERY: Duration = Duration::from_secs(1);

/// Live counters published by the scheduler for progress reporting.
#[derive(Debug, Default)]
pub(crate) struct SchedulerStatus {
    active: AtomicU64,
    target: AtomicU64,
}

impl SchedulerStatus {
    pub(crate) fn active(&self) -> u64 {
        self.active.load(Ordering::Relaxed)
    }

    pub(crate) fn target(&self) -> u64 {
        self.target.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct SchedulerReport {
    /// Virtual users still running when the drain ended and that had to be cancelled.
    pub(crate) forced: u64,
    pub(crate) peak_vus: u64,
    pub(crate) spawned: u64,
}

pub(crate) struct Scheduler {
    pub(crate) schedule: RampSchedule,
    pub(crate) max_vus: u64,
    pub(crate) control_interval: Duration,
    pub(crate) drain_grace: Duration,
    pub(crate) scenario: Arc<dyn Scenario>,
    pub(crate) run: Arc<RunContext>,
    pub(crate) cancel: CancellationToken,
    pub(crate) state: Arc<watch::Sender<RunState>>,
    pub(crate) status: Arc<SchedulerStatus>,
}

impl Scheduler {
    pub(crate) async fn run(self) -> SchedulerReport {
        let started = Instant::now();
        let hard = CancellationToken::new();

        let mut report = SchedulerReport::default();
        let mut next_id = 1u64;
        // Ordered oldest first; shrinking retires from the back.
        let mut active: Vec<VuHandle> = Vec::new();
        let mut retiring: Vec<VuHandle> = Vec::new();

        // Ticks are anchored to `started` so stage boundaries fall on a tick.
        let mut ticker = tokio::time::interval_at(started, self.control_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_tick: Option<Instant> = None;
        let mut last_warn: Option<Instant> = None;

        loop {
            let tick_at = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                at = ticker.tick() => at,
            };

            let now = Instant::now();
            if let Some(prev) = last_tick
                && now.duration_since(prev) > self.control_interval.saturating_mul(2)
            {
                self.overloaded(&mut last_warn, now, "control tick ran late");
            }
            last_tick = Some(now);

            self.reap(&mut active).await;
            self.reap(&mut retiring).await;

            let elapsed = tick_at.duration_since(started);
            if self.schedule.is_done(elapsed) {
                break;
            }

            let wanted = self.schedule.target_at(elapsed);
            if wanted > self.max_vus {
                self.overloaded(&mut last_warn, now, "desired concurrency exceeds max_vus");
            }
            let desired = wanted.min(self.max_vus);
            let desired_len = usize::try_from(desired).unwrap_or(usize::MAX);
            // Retiring virtual users may still be inside an iteration and count toward max_vus.
            let capacity = usize::try_from(self.max_vus)
                .unwrap_or(usize::MAX)
                .saturating_sub(retiring.len());
            let spawn_len = desired_len.min(capacity);
            if spawn_len < desired_len && active.len() < desired_len {
                self.overloaded(&mut last_warn, now, "retiring virtual users hold max_vus");
            }

            while active.len() < spawn_len {
                active.push(spawn_vu(
                    next_id,
                    self.scenario.clone(),
                    self.run.clone(),
                    hard.clone(),
                ));
                next_id += 1;
                report.spawned += 1;
            }
            while active.len() > desired_len {
                let Some(vu) = active.pop() else {
                    break;
                };
                vu.retire();
                retiring.push(vu);
            }

            self.publish(active.len(), desired);
            report.peak_vus = report.peak_vus.max(active.len() as u64);
        }

        let _ = self.state.send_replace(RunState::Draining);
        tracing::info!(
            active = active.len(),
            retiring = retiring.len(),
            cancelled = self.cancel.is_cancelled(),
            "draining virtual users"
        );

        for vu in &active {
            vu.retire();
        }
        retiring.append(&mut active);
        self.publish(0, 0);

        if !self.cancel.is_cancelled() {
            let deadline = Instant::now() + self.drain_grace;
            while let Some(mut vu) = retiring.pop() {
                tokio::select! {
                    biased;
                    res = &mut vu.join => self.on_exit(vu.id, res),
                    _ = tokio::time::sleep_until(deadline) => {
                        retiring.push(vu);
                        break;
                    }
                    _ = self.cancel.cancelled() => {
                        retiring.push(vu);
                        break;
                    }
                }
            }
        }

        if !retiring.is_empty() {
            report.forced = retiring.len() as u64;
            tracing::info!(
                remaining = retiring.len(),
                "cancelling virtual users still running"
            );
            hard.cancel();
            for vu in retiring {
                let res = vu.join.await;
                self.on_exit(vu.id, res);
            }
        }

        report
    }

    /// Removes finished virtual users, recording the ones whose task died.
    async fn reap(&self, vus: &mut Vec<VuHandle>) {
        let mut i = 0;
        while i < vus.len() {
            if vus[i].join.is_finished() {
                let vu = vus.remove(i);
                let res = vu.join.await;
                self.on_exit(vu.id, res);
            } else {
                i += 1;
            }
        }
    }

    fn on_exit(&self, vu_id: u64, res: Result<(), JoinError>) {
        let Err(err) = res else {
            return;
        };
        if err.is_panic() {
            tracing::warn!(vu = vu_id, "virtual user panicked");
            self.run
                .metrics()
                .record_iteration(IterationOutcome::Failed, None, None);
        }
    }

    fn overloaded(&self, last_warn: &mut Option<Instant>, now: Instant, what: &'static str) {
        self.run.metrics().record_scheduler_lag();
        if last_warn.is_none_or(|t| now.duration_since(t) >= OVERLOAD_WARN_EVERY) {
            tracing::warn!(max_vus = self.max_vus, "scheduler overloaded: {what}");
            *last_warn = Some(now);
        }
    }

    fn publish(&self, active: usize, target: u64) {
        let active = active as u64;
        self.status.active.store(active, Ordering::Relaxed);
        self.status.target.store(target, Ordering::Relaxed);
        self.run.metrics().set_vus(active);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU64;

    use async_trait::async_trait;
    use surge_http::{HttpExchange, HttpExecutor, HttpRequest};
    use surge_metrics::Registry;

    use super::*;
    use crate::config::Stage;
    use crate::metrics_context::MetricsContext;
    use crate::runner::{IterationContext, IterationError};

    struct NoHttp;

    #[async_trait]
    impl HttpExecutor for NoHttp {
        async fn execute(&self, _req: HttpRequest) -> HttpExchange {
            HttpExchange::with_status(200, "", Duration::ZERO)
        }
    }

    /// Sleeps `pause` per iteration and tracks how many iterations run at once.
    struct Sleeper {
        pause: Duration,
        running: AtomicU64,
        peak: AtomicU64,
    }

    impl Sleeper {
        fn new(pause: Duration) -> Self {
            Self {
                pause,
                running: AtomicU64::new(0),
                peak: AtomicU64::new(0),
            }
        }
    }

    #[async_trait]
    impl Scenario for Sleeper {
        async fn iteration(&self, ctx: &mut IterationContext) -> Result<(), IterationError> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            ctx.sleep(self.pause).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Panics;

    #[async_trait]
    impl Scenario for Panics {
        async fn iteration(&self, ctx: &mut IterationContext) -> Result<(), IterationError> {
            ctx.sleep(Duration::from_millis(250)).await;
            panic!("scenario bug");
        }
    }

    fn scheduler(
        stages: Vec<Stage>,
        max_vus: u64,
        scenario: Arc<dyn Scenario>,
    ) -> (Scheduler, Arc<Registry>) {
        let registry = Arc::new(Registry::default());
        let metrics = MetricsContext::new(registry.clone(), Arc::from("default"));
        let run = Arc::new(RunContext::new(
            metrics,
            Arc::new(NoHttp),
            "http://localhost:8080",
        ));
        let (tx, _rx) = watch::channel(RunState::Ramping);
        let s = Scheduler {
            schedule: RampSchedule::new(stages),
            max_vus,
            control_interval: Duration::from_millis(100),
            drain_grace: Duration::from_secs(30),
            scenario,
            run,
            cancel: CancellationToken::new(),
            state: Arc::new(tx),
            status: Arc::new(SchedulerStatus::default()),
        };
        (s, registry)
    }

    #[tokio::test(start_paused = true)]
    async fn empty_profile_completes_without_virtual_users() {
        let (s, registry) = scheduler(
            Vec::new(),
            10,
            Arc::new(Sleeper::new(Duration::from_secs(1))),
        );
        let report = s.run().await;
        assert_eq!(report, SchedulerReport::default());
        assert_eq!(registry.snapshot("iterations").map(|s| s.count), Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrency_is_clamped_to_max_vus() {
        let sleeper = Arc::new(Sleeper::new(Duration::from_secs(1)));
        let (s, registry) = scheduler(
            vec![Stage::new(Duration::from_secs(3), 20)],
            5,
            sleeper.clone(),
        );
        let report = s.run().await;

        assert_eq!(report.peak_vus, 5);
        assert_eq!(report.forced, 0);
        assert!(sleeper.peak.load(Ordering::SeqCst) <= 5);
        assert!(registry.snapshot("scheduler_lag").map_or(0, |s| s.count) > 0);
        assert_eq!(registry.snapshot("vus_max").and_then(|s| s.value), Some(5.0));
        assert_eq!(registry.snapshot("vus").and_then(|s| s.value), Some(0.0));
    }

    #[tokio::test(start_paused = true)]
    async fn ramp_peak_lands_on_a_control_tick() {
        let sleeper = Arc::new(Sleeper::new(Duration::from_millis(50)));
        let (s, registry) = scheduler(
            vec![
                Stage::new(Duration::from_secs(1), 1),
                Stage::new(Duration::from_millis(500), 0),
            ],
            10,
            sleeper,
        );
        let report = s.run().await;

        assert_eq!(report.spawned, 1);
        assert_eq!(report.peak_vus, 1);
        assert!(registry.snapshot("iterations").map_or(0, |s| s.count) > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn retiring_virtual_users_count_toward_max_vus() {
        let sleeper = Arc::new(Sleeper::new(Duration::from_secs(5)));
        let (s, registry) = scheduler(
            vec![
                Stage::new(Duration::ZERO, 5),
                Stage::new(Duration::from_secs(2), 5),
                Stage::new(Duration::from_millis(300), 0),
                Stage::new(Duration::from_millis(300), 5),
                Stage::new(Duration::from_secs(1), 5),
            ],
            5,
            sleeper.clone(),
        );
        let report = s.run().await;

        let peak = sleeper.peak.load(Ordering::SeqCst);
        assert!(peak <= 5, "peak concurrent iterations={peak}");
        assert_eq!(report.spawned, 5);
        assert!(registry.snapshot("scheduler_lag").map_or(0, |s| s.count) > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn panicked_virtual_users_are_recorded_and_replaced() {
        let (s, registry) = scheduler(
            vec![Stage::new(Duration::ZERO, 2), Stage::new(Duration::from_secs(1), 2)],
            10,
            Arc::new(Panics),
        );
        let report = s.run().await;

        // Each slot panics at 250ms, is replaced on the next tick and panics again.
        assert!(report.spawned > 2, "spawned={}", report.spawned);
        let failed = registry.snapshot("iterations").map_or(0, |s| s.count);
        assert!(failed >= 2, "failed={failed}");
        assert_eq!(registry.snapshot("iteration_duration").map(|s| s.count), Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_skips_the_grace_period() {
        let (s, registry) = scheduler(
            vec![Stage::new(Duration::ZERO, 3), Stage::new(Duration::from_secs(60), 3)],
            10,
            Arc::new(Sleeper::new(Duration::from_secs(1))),
        );
        let cancel = s.cancel.clone();
        let started = Instant::now();
        let task = tokio::spawn(s.run());
        tokio::time::sleep(Duration::from_millis(500)).await;
        cancel.cancel();

        let report = task.await.unwrap_or_else(|e| panic!("scheduler task: {e}"));
        assert_eq!(report.forced, 3);
        assert!(started.elapsed() < Duration::from_secs(1));

        let reason = registry.resolve_key("reason");
        let cancelled = registry.resolve_key("cancelled");
        let (id, _) = registry
            .lookup_metric("iterations_aborted")
            .unwrap_or_else(|| panic!("iterations_aborted not registered"));
        assert_eq!(
            registry.query(id).where_eq(reason, cancelled).sum_counter_total(),
            3
        );
    }
}
