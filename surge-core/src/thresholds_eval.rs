use std::time::Duration;

use surge_metrics::{MetricKind, MetricSnapshot, Registry};

use crate::config::{IndeterminatePolicy, ThresholdConfig, ThresholdTiming};
use crate::error::{Error, Result};
use crate::thresholds::{ThresholdAgg, ThresholdExpr, parse_threshold_expr};

/// Source of per-metric aggregates for threshold evaluation.
pub trait SnapshotProvider {
    fn snapshot(&self, metric: &str) -> Option<MetricSnapshot>;

    /// Time base for counter `rate` (per second). `None` makes those thresholds
    /// indeterminate.
    fn elapsed(&self) -> Option<Duration> {
        None
    }
}

impl SnapshotProvider for Registry {
    fn snapshot(&self, metric: &str) -> Option<MetricSnapshot> {
        Registry::snapshot(self, metric)
    }
}

/// A [`Registry`] seen at a known point of the run.
#[derive(Debug, Clone, Copy)]
pub struct RegistryAt<'a> {
    pub registry: &'a Registry,
    pub elapsed: Duration,
}

impl SnapshotProvider for RegistryAt<'_> {
    fn snapshot(&self, metric: &str) -> Option<MetricSnapshot> {
        self.registry.snapshot(metric)
    }

    fn elapsed(&self) -> Option<Duration> {
        Some(self.elapsed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ThresholdStatus {
    Pass,
    Fail,
    /// The metric has no samples, or the aggregation does not apply to its kind.
    Indeterminate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdVerdict {
    pub metric: String,
    pub expression: String,
    pub observed: Option<f64>,
    pub status: ThresholdStatus,
}

impl ThresholdVerdict {
    pub fn passed(&self, policy: IndeterminatePolicy) -> bool {
        match self.status {
            ThresholdStatus::Pass => true,
            ThresholdStatus::Fail => false,
            ThresholdStatus::Indeterminate => policy == IndeterminatePolicy::Pass,
        }
    }
}

/// A threshold whose expression has been parsed.
#[derive(Debug, Clone)]
pub struct CompiledThreshold {
    pub config: ThresholdConfig,
    pub expr: ThresholdExpr,
}

impl CompiledThreshold {
    pub fn is_continuous(&self) -> bool {
        self.config.timing == ThresholdTiming::Continuous
    }
}

pub fn compile_thresholds(configs: &[ThresholdConfig]) -> Result<Vec<CompiledThreshold>> {
    configs
        .iter()
        .map(|config| {
            let expr =
                parse_threshold_expr(&config.expression).map_err(|error| {
                    Error::InvalidThreshold {
                        metric: config.metric.clone(),
                        expression: config.expression.clone(),
                        error,
                    }
                })?;
            Ok(CompiledThreshold {
                config: config.clone(),
                expr,
            })
        })
        .collect()
}

pub fn evaluate_threshold(
    threshold: &CompiledThreshold,
    provider: &impl SnapshotProvider,
) -> ThresholdVerdict {
    let observed = provider
        .snapshot(&threshold.config.metric)
        .and_then(|snap| observed_value(&snap, threshold.expr.agg, provider.elapsed()));

    let status = match observed {
        None => ThresholdStatus::Indeterminate,
        Some(v) if threshold.expr.passes(v) => ThresholdStatus::Pass,
        Some(_) => ThresholdStatus::Fail,
    };

    ThresholdVerdict {
        metric: threshold.config.metric.clone(),
        expression: threshold.config.expression.clone(),
        observed,
        status,
    }
}

pub fn evaluate_thresholds(
    thresholds: &[CompiledThreshold],
    provider: &impl SnapshotProvider,
) -> Vec<ThresholdVerdict> {
    thresholds
        .iter()
        .map(|t| evaluate_threshold(t, provider))
        .collect()
}

/// AND-reduction of all verdicts under `policy`. An empty list passes.
pub fn overall_passed(verdicts: &[ThresholdVerdict], policy: IndeterminatePolicy) -> bool {
    verdicts.iter().all(|v| v.passed(policy))
}

fn observed_value(
    snap: &MetricSnapshot,
    agg: ThresholdAgg,
    elapsed: Option<Duration>,
) -> Option<f64> {
    if snap.is_empty() {
        return None;
    }

    let trend = || snap.trend.as_ref().filter(|_| snap.kind == MetricKind::Trend);

    match agg {
        ThresholdAgg::Count => Some(snap.count as f64),
        ThresholdAgg::Rate => match snap.kind {
            MetricKind::Rate => snap.rate,
            MetricKind::Counter => elapsed.and_then(|e| snap.per_second(e)),
            _ => None,
        },
        ThresholdAgg::Value => match snap.kind {
            MetricKind::Counter | MetricKind::Gauge => snap.value,
            _ => None,
        },
        ThresholdAgg::Avg => trend()?.avg(),
        ThresholdAgg::Min => trend()?.min(),
        ThresholdAgg::Max => trend()?.max(),
        ThresholdAgg::Med => trend()?.med(),
        ThresholdAgg::P(p) => trend()?.percentile(p),
    }
}
