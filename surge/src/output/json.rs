use std::collections::BTreeMap;
use std::io::Write as _;

use serde::Serialize;
use surge_core::{ProgressFn, RunConfig, RunResult};

use super::OutputFormatter;

pub(crate) struct JsonOutput {
    scenario: String,
}

impl JsonOutput {
    pub(crate) fn new(scenario: &str) -> Self {
        Self {
            scenario: scenario.to_string(),
        }
    }
}

impl OutputFormatter for JsonOutput {
    fn print_header(&self, _config: &RunConfig) {}

    // stdout carries exactly one JSON line per run.
    fn progress(&self) -> Option<ProgressFn> {
        None
    }

    fn print_summary(&self, result: &RunResult) -> anyhow::Result<()> {
        let line = build_summary_line(&self.scenario, result);
        emit_json_line(&line)
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonSummaryLine {
    pub kind: &'static str,
    pub scenario: String,
    pub passed: bool,
    pub state: String,
    pub duration_secs: f64,
    pub iterations_total: u64,
    pub iterations_aborted: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aborted_by: Option<String>,
    pub thresholds: Vec<JsonThreshold>,
    pub checks: Vec<JsonCheck>,
    pub metrics: BTreeMap<String, JsonMetric>,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonThreshold {
    pub metric: String,
    pub expression: String,
    pub status: String,
    pub observed: Option<f64>,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonCheck {
    pub name: String,
    pub passes: u64,
    pub fails: u64,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonMetric {
    pub kind: String,
    pub count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trend: Option<JsonTrend>,
}

/// Trend statistics in milliseconds.
#[derive(Debug, Serialize)]
pub(crate) struct JsonTrend {
    pub avg: Option<f64>,
    pub min: Option<f64>,
    pub med: Option<f64>,
    pub max: Option<f64>,
    pub p90: Option<f64>,
    pub p95: Option<f64>,
    pub p99: Option<f64>,
}

fn build_summary_line(scenario: &str, result: &RunResult) -> JsonSummaryLine {
    JsonSummaryLine {
        kind: "summary",
        scenario: scenario.to_string(),
        passed: result.passed,
        state: result.state.to_string(),
        duration_secs: result.duration.as_secs_f64(),
        iterations_total: result.iterations_total,
        iterations_aborted: result.iterations_aborted,
        aborted_by: result.aborted_by.clone(),
        thresholds: result
            .thresholds
            .iter()
            .map(|v| JsonThreshold {
                metric: v.metric.clone(),
                expression: v.expression.clone(),
                status: v.status.to_string(),
                observed: v.observed,
            })
            .collect(),
        checks: result
            .checks
            .iter()
            .map(|c| JsonCheck {
                name: c.name.clone(),
                passes: c.passes,
                fails: c.fails,
            })
            .collect(),
        metrics: result
            .metrics
            .iter()
            .map(|m| {
                let trend = m.trend.as_ref().map(|t| JsonTrend {
                    avg: t.avg,
                    min: t.min,
                    med: t.med,
                    max: t.max,
                    p90: t.p90,
                    p95: t.p95,
                    p99: t.p99,
                });
                (
                    m.name.clone(),
                    JsonMetric {
                        kind: m.kind.to_string(),
                        count: m.count,
                        value: m.value,
                        rate: m.rate,
                        trend,
                    },
                )
            })
            .collect(),
    }
}

fn emit_json_line<T: Serialize>(line: &T) -> anyhow::Result<()> {
    let mut out = std::io::stdout().lock();
    serde_json::to_writer(&mut out, line)?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}
