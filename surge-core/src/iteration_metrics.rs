use std::time::Duration;

use surge_metrics::{MetricId, MetricKind, Registry};

pub const ITERATIONS: &str = "iterations";
pub const ITERATION_DURATION: &str = "iteration_duration";
pub const ITERATIONS_ABORTED: &str = "iterations_aborted";
pub const CHECKS: &str = "checks";
pub const VUS: &str = "vus";
pub const VUS_MAX: &str = "vus_max";
pub const SCHEDULER_LAG: &str = "scheduler_lag";

/// How one iteration ended. Rendered as the `outcome` tag of `iterations`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum IterationOutcome {
    Complete,
    Failed,
    Aborted,
}

#[derive(Debug, Clone, Copy)]
pub struct IterationMetricIds {
    pub iterations: MetricId,
    pub iteration_duration: MetricId,
    pub iterations_aborted: MetricId,
    pub checks: MetricId,
    pub vus: MetricId,
    pub vus_max: MetricId,
    pub scheduler_lag: MetricId,
}

#[derive(Debug, Clone, Copy)]
pub struct IterationSample<'a> {
    pub scenario: &'a str,
    pub outcome: IterationOutcome,
    /// `None` when the iteration died without reporting (its task panicked).
    pub duration: Option<Duration>,
    /// Set for aborted iterations.
    pub reason: Option<&'a str>,
}

impl IterationMetricIds {
    pub fn register(metrics: &Registry) -> Self {
        Self {
            iterations: metrics.register(ITERATIONS, MetricKind::Counter),
            iteration_duration: metrics.register(ITERATION_DURATION, MetricKind::Trend),
            iterations_aborted: metrics.register(ITERATIONS_ABORTED, MetricKind::Counter),
            checks: metrics.register(CHECKS, MetricKind::Rate),
            vus: metrics.register(VUS, MetricKind::Gauge),
            vus_max: metrics.register(VUS_MAX, MetricKind::Gauge),
            scheduler_lag: metrics.register(SCHEDULER_LAG, MetricKind::Counter),
        }
    }

    pub fn record_iteration(&self, metrics: &Registry, sample: IterationSample<'_>) {
        let outcome = sample.outcome.to_string();
        let tags = metrics.resolve_tags(&[("scenario", sample.scenario), ("outcome", &outcome)]);

        if let Some(h) = metrics.get_handle(self.iterations, tags.clone()) {
            h.increment(1);
        }
        if let Some(d) = sample.duration
            && let Some(h) = metrics.get_handle(self.iteration_duration, tags)
        {
            h.observe(d);
        }

        if sample.outcome == IterationOutcome::Aborted {
            let reason = sample.reason.unwrap_or("unknown");
            let tags = metrics.resolve_tags(&[("scenario", sample.scenario), ("reason", reason)]);
            if let Some(h) = metrics.get_handle(self.iterations_aborted, tags) {
                h.increment(1);
            }
        }
    }

    pub fn record_check(&self, metrics: &Registry, scenario: &str, name: &str, passed: bool) {
        let tags = metrics.resolve_tags(&[("scenario", scenario), ("check", name)]);
        if let Some(h) = metrics.get_handle(self.checks, tags) {
            h.add_rate(passed);
        }
    }

    pub fn set_vus(&self, metrics: &Registry, scenario: &str, active: u64) {
        let tags = metrics.resolve_tags(&[("scenario", scenario)]);
        let active = i64::try_from(active).unwrap_or(i64::MAX);
        if let Some(h) = metrics.get_handle(self.vus, tags.clone()) {
            h.set_gauge(active);
        }
        if let Some(h) = metrics.get_handle(self.vus_max, tags) {
            h.max_gauge(active);
        }
    }

    pub fn record_scheduler_lag(&self, metrics: &Registry, scenario: &str) {
        let tags = metrics.resolve_tags(&[("scenario", scenario)]);
        if let Some(h) = metrics.get_handle(self.scheduler_lag, tags) {
            h.increment(1);
        }
    }
}
