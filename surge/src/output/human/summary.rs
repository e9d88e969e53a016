use std::fmt::Write as _;

use surge_core::metric_names::{DATA_RECEIVED, DATA_SENT};
use surge_core::{CheckSummary, MetricSummary, RunResult, ThresholdStatus};
use surge_metrics::MetricKind;

use super::format::*;

const PASS: &str = "✓";
const FAIL: &str = "✗";
const UNKNOWN: &str = "?";

pub(crate) fn render(result: &RunResult) -> String {
    let mut out = String::new();

    render_checks(&result.checks, &mut out);
    render_metrics(&result.metrics, &mut out);
    render_thresholds(result, &mut out);

    writeln!(
        out,
        "iterations: {} (aborted {}) in {}",
        result.iterations_total,
        result.iterations_aborted,
        format_duration(result.duration)
    )
    .ok();
    if let Some(by) = &result.aborted_by {
        writeln!(out, "run aborted by threshold: {by}").ok();
    }
    writeln!(
        out,
        "result: {}",
        if result.passed { "PASSED" } else { "FAILED" }
    )
    .ok();

    out
}

fn render_checks(checks: &[CheckSummary], out: &mut String) {
    if checks.is_empty() {
        return;
    }

    out.push_str("checks\n");
    for c in checks {
        let total = c.passes.saturating_add(c.fails);
        if c.fails == 0 {
            writeln!(out, "  {PASS} {}", c.name).ok();
            continue;
        }
        let ratio = if total > 0 {
            c.passes as f64 / total as f64
        } else {
            0.0
        };
        writeln!(out, "  {FAIL} {}", c.name).ok();
        writeln!(
            out,
            "    ↳ {} ({PASS} {} / {FAIL} {})",
            format_percent(ratio),
            c.passes,
            c.fails
        )
        .ok();
    }
    out.push('\n');
}

fn render_metrics(metrics: &[MetricSummary], out: &mut String) {
    if metrics.is_empty() {
        return;
    }

    let width = metrics.iter().map(|m| m.name.len()).max().unwrap_or(0) + 3;

    out.push_str("metrics\n");
    for m in metrics {
        let mut label = m.name.clone();
        label.push(':');
        let dots = ".".repeat(width.saturating_sub(label.len()));
        writeln!(out, "  {label}{dots} {}", metric_value(m)).ok();
    }
    out.push('\n');
}

fn metric_value(m: &MetricSummary) -> String {
    match m.kind {
        MetricKind::Counter => {
            let per_sec = m.rate.map(|r| format!("{r:.2}/s")).unwrap_or_default();
            if m.name == DATA_SENT || m.name == DATA_RECEIVED {
                format!("{} {per_sec}", format_bytes(m.count))
            } else {
                format!("{} {per_sec}", m.count)
            }
        }
        MetricKind::Gauge => m.value.map_or_else(|| "n/a".to_string(), format_value),
        MetricKind::Rate => match m.rate {
            Some(rate) => {
                let hits = (rate * m.count as f64).round() as u64;
                format!("{} {hits} out of {}", format_percent(rate), m.count)
            }
            None => "n/a".to_string(),
        },
        MetricKind::Trend => match &m.trend {
            Some(t) if t.count > 0 => format!(
                "avg={} min={} med={} max={} p(90)={} p(95)={}",
                format_ms_opt(t.avg),
                format_ms_opt(t.min),
                format_ms_opt(t.med),
                format_ms_opt(t.max),
                format_ms_opt(t.p90),
                format_ms_opt(t.p95),
            ),
            _ => "n/a".to_string(),
        },
    }
}

fn render_thresholds(result: &RunResult, out: &mut String) {
    if result.thresholds.is_empty() {
        return;
    }

    out.push_str("thresholds\n");
    for v in &result.thresholds {
        let mark = match v.status {
            ThresholdStatus::Pass => PASS,
            ThresholdStatus::Fail => FAIL,
            ThresholdStatus::Indeterminate => UNKNOWN,
        };
        let observed = match v.observed {
            Some(obs) => format!("observed {}", format_value(obs)),
            None => "no data".to_string(),
        };
        writeln!(out, "  {mark} {} {} ({observed})", v.metric, v.expression).ok();
    }
    out.push('\n');
}
