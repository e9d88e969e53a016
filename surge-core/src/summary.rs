use std::collections::BTreeMap;
use std::time::Duration;

use surge_metrics::{MetricKind, Registry, TrendSummary};

use crate::controller::RunState;
use crate::iteration_metrics::{CHECKS, ITERATIONS, ITERATIONS_ABORTED};
use crate::thresholds_eval::ThresholdVerdict;

/// Final outcome of one run. Produced once, when the controller reaches `Completed`.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub passed: bool,
    pub state: RunState,
    pub thresholds: Vec<ThresholdVerdict>,
    /// One entry per metric name, sorted by name.
    pub metrics: Vec<MetricSummary>,
    /// One entry per check name, sorted by name.
    pub checks: Vec<CheckSummary>,
    pub iterations_total: u64,
    pub iterations_aborted: u64,
    pub duration: Duration,
    /// Continuous threshold that cancelled the run, as `"<metric> <expression>"`.
    pub aborted_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricSummary {
    pub name: String,
    pub kind: MetricKind,
    pub count: u64,
    /// Counter total or gauge value.
    pub value: Option<f64>,
    /// Rate metrics: ratio of `true` samples. Counters: per-second throughput.
    pub rate: Option<f64>,
    pub trend: Option<TrendSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckSummary {
    pub name: String,
    pub passes: u64,
    pub fails: u64,
}

pub(crate) fn summarize_metrics(registry: &Registry, elapsed: Duration) -> Vec<MetricSummary> {
    registry
        .metric_names()
        .into_iter()
        .filter_map(|name| registry.snapshot(&name))
        .map(|snap| {
            let rate = match snap.kind {
                MetricKind::Counter => snap.per_second(elapsed),
                _ => snap.rate,
            };
            MetricSummary {
                rate,
                trend: snap.trend.as_ref().map(|t| t.summary()),
                name: snap.name,
                kind: snap.kind,
                count: snap.count,
                value: snap.value,
            }
        })
        .collect()
}

pub(crate) fn summarize_checks(registry: &Registry) -> Vec<CheckSummary> {
    let Some((id, _)) = registry.lookup_metric(CHECKS) else {
        return Vec::new();
    };
    let check_key = registry.resolve_key("check");

    let mut by_name: BTreeMap<String, CheckSummary> = BTreeMap::new();
    for (tags, totals) in registry.query(id).group_by([check_key]).sum_rate() {
        let Some(name) = tags
            .get(check_key)
            .and_then(|v| registry.resolve_key_id(v))
        else {
            continue;
        };
        let entry = by_name
            .entry(name.to_string())
            .or_insert_with(|| CheckSummary {
                name: name.to_string(),
                passes: 0,
                fails: 0,
            });
        entry.passes += totals.hits;
        entry.fails += totals.misses();
    }
    by_name.into_values().collect()
}

pub(crate) fn iteration_totals(registry: &Registry) -> (u64, u64) {
    let count = |name: &str| registry.snapshot(name).map_or(0, |s| s.count);
    (count(ITERATIONS), count(ITERATIONS_ABORTED))
}
