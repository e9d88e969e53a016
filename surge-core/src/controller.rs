use std::sync::Arc;
use std::time::Duration;

use surge_http::HttpExecutor;
use surge_metrics::Registry;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::RunConfig;
use crate::error::Result;
use crate::metrics_context::MetricsContext;
use crate::progress::{LiveCounts, ProgressFn, ProgressTracker};
use crate::runner::{RunContext, Scenario};
use crate::schedule::RampSchedule;
use crate::scheduler::{Scheduler, SchedulerStatus};
use crate::summary::{RunResult, iteration_totals, summarize_checks, summarize_metrics};
use crate::thresholds_eval::{
    CompiledThreshold, RegistryAt, ThresholdStatus, compile_thresholds, evaluate_threshold,
    evaluate_thresholds, overall_passed,
};

const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum RunState {
    Idle,
    Ramping,
    Draining,
    Completed,
    /// Setup failed before any virtual user ran.
    Errored,
}

/// Cancels a run and observes its state from another task.
#[derive(Debug, Clone)]
pub struct ControllerHandle {
    cancel: CancellationToken,
    state: watch::Receiver<RunState>,
}

impl ControllerHandle {
    /// Stops the run without a drain grace period. In-flight iterations are recorded as
    /// aborted.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn state(&self) -> RunState {
        *self.state.borrow()
    }

    /// Resolves once the run reaches `Completed` or `Errored`.
    pub async fn finished(&mut self) -> RunState {
        let res = self
            .state
            .wait_for(|s| matches!(s, RunState::Completed | RunState::Errored))
            .await
            .map(|s| *s);
        res.unwrap_or_else(|_| *self.state.borrow())
    }
}

/// Owns one run: the scheduler, the metrics sink and the threshold evaluation.
pub struct Controller {
    config: RunConfig,
    scenario: Arc<dyn Scenario>,
    executor: Arc<dyn HttpExecutor>,
    registry: Arc<Registry>,
    cancel: CancellationToken,
    state: Arc<watch::Sender<RunState>>,
    progress: Option<ProgressFn>,
}

impl Controller {
    pub fn new(
        config: RunConfig,
        scenario: Arc<dyn Scenario>,
        executor: Arc<dyn HttpExecutor>,
    ) -> Self {
        let (state, _) = watch::channel(RunState::Idle);
        Self {
            config,
            scenario,
            executor,
            registry: Arc::new(Registry::default()),
            cancel: CancellationToken::new(),
            state: Arc::new(state),
            progress: None,
        }
    }

    /// Called about once per second while the run is in progress, and once more at the end.
    #[must_use]
    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn handle(&self) -> ControllerHandle {
        ControllerHandle {
            cancel: self.cancel.clone(),
            state: self.state.subscribe(),
        }
    }

    /// The run's metrics sink.
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    pub async fn run(self) -> Result<RunResult> {
        let thresholds = match self
            .config
            .validate()
            .and_then(|()| compile_thresholds(&self.config.thresholds))
        {
            Ok(t) => t,
            Err(err) => {
                tracing::error!(error = %err, "invalid run configuration");
                let _ = self.state.send_replace(RunState::Errored);
                return Err(err);
            }
        };

        let started = Instant::now();
        let schedule = RampSchedule::new(self.config.stages.clone());
        let metrics = MetricsContext::new(
            self.registry.clone(),
            Arc::from(self.config.scenario_name.as_str()),
        );
        let run = Arc::new(RunContext::new(
            metrics,
            self.executor.clone(),
            self.config.base_url.as_str(),
        ));
        let status = Arc::new(SchedulerStatus::default());

        let _ = self.state.send_replace(RunState::Ramping);
        tracing::info!(
            scenario = %self.config.scenario_name,
            stages = schedule.stages().len(),
            duration = ?schedule.total_duration(),
            max_vus = self.config.max_vus,
            "run started"
        );

        let scheduler = Scheduler {
            schedule: schedule.clone(),
            max_vus: self.config.max_vus,
            control_interval: self.config.control_interval,
            drain_grace: self.config.drain_grace,
            scenario: self.scenario.clone(),
            run,
            cancel: self.cancel.clone(),
            state: self.state.clone(),
            status: status.clone(),
        };
        let mut scheduler = tokio::spawn(scheduler.run());

        let continuous: Vec<&CompiledThreshold> =
            thresholds.iter().filter(|t| t.is_continuous()).collect();
        let threshold_every = self.config.threshold_interval;
        let mut threshold_tick =
            tokio::time::interval_at(started + threshold_every, threshold_every);
        threshold_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut progress_tick =
            tokio::time::interval_at(started + PROGRESS_INTERVAL, PROGRESS_INTERVAL);
        progress_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut tracker = ProgressTracker::default();
        let mut aborted_by: Option<String> = None;

        let report = loop {
            tokio::select! {
                res = &mut scheduler => match res {
                    Ok(report) => break report,
                    Err(err) => {
                        tracing::error!(error = %err, "scheduler task failed");
                        let _ = self.state.send_replace(RunState::Errored);
                        return Err(err.into());
                    }
                },
                _ = threshold_tick.tick(), if !continuous.is_empty() && aborted_by.is_none() => {
                    aborted_by = self.check_continuous(&continuous, started.elapsed());
                }
                _ = progress_tick.tick(), if self.progress.is_some() => {
                    self.emit_progress(&mut tracker, &schedule, &status, started);
                }
            }
        };

        let duration = started.elapsed();
        let _ = self.state.send_replace(RunState::Completed);
        tracing::info!(
            duration = ?duration,
            peak_vus = report.peak_vus,
            spawned = report.spawned,
            forced = report.forced,
            "run completed"
        );
        self.emit_progress(&mut tracker, &schedule, &status, started);

        let verdicts = evaluate_thresholds(
            &thresholds,
            &RegistryAt {
                registry: &self.registry,
                elapsed: duration,
            },
        );
        let passed = overall_passed(&verdicts, self.config.indeterminate) && aborted_by.is_none();
        let (iterations_total, iterations_aborted) = iteration_totals(&self.registry);

        Ok(RunResult {
            passed,
            state: RunState::Completed,
            thresholds: verdicts,
            metrics: summarize_metrics(&self.registry, duration),
            checks: summarize_checks(&self.registry),
            iterations_total,
            iterations_aborted,
            duration,
            aborted_by,
        })
    }

    /// Returns the first failing `abort_on_fail` threshold after cancelling the run.
    fn check_continuous(
        &self,
        continuous: &[&CompiledThreshold],
        elapsed: Duration,
    ) -> Option<String> {
        let at = RegistryAt {
            registry: &self.registry,
            elapsed,
        };
        for t in continuous {
            let verdict = evaluate_threshold(t, &at);
            if verdict.status != ThresholdStatus::Fail {
                continue;
            }
            if t.config.abort_on_fail {
                tracing::warn!(
                    metric = %verdict.metric,
                    expression = %verdict.expression,
                    observed = ?verdict.observed,
                    "threshold failed, aborting run"
                );
                self.cancel.cancel();
                return Some(format!("{} {}", verdict.metric, verdict.expression));
            }
            tracing::debug!(
                metric = %verdict.metric,
                expression = %verdict.expression,
                observed = ?verdict.observed,
                "threshold currently failing"
            );
        }
        None
    }

    fn emit_progress(
        &self,
        tracker: &mut ProgressTracker,
        schedule: &RampSchedule,
        status: &SchedulerStatus,
        started: Instant,
    ) {
        let Some(progress) = &self.progress else {
            return;
        };
        let elapsed = started.elapsed();
        let update = tracker.update(
            &self.registry,
            LiveCounts {
                elapsed,
                state: *self.state.borrow(),
                stage: schedule.stage_snapshot_at(elapsed),
                active_vus: status.active(),
                target_vus: status.target(),
            },
        );
        progress(update);
    }
}
