use std::sync::Arc;
use std::time::Duration;

mod format;
mod progress;
mod summary;

use format::{format_duration, format_ms_opt, format_rate};
use progress::HumanProgress;
use summary::render;
use surge_core::{ProgressFn, ProgressUpdate, RunConfig, RunResult};

use super::OutputFormatter;

pub(crate) struct HumanReadableOutput {
    progress: Arc<HumanProgress>,
}

impl HumanReadableOutput {
    pub(crate) fn new(total: Duration) -> Self {
        Self {
            progress: Arc::new(HumanProgress::new("run", total)),
        }
    }
}

impl OutputFormatter for HumanReadableOutput {
    fn print_header(&self, config: &RunConfig) {
        println!(
            "scenario: {} base_url={} stages={} duration={} max_vus={}",
            config.scenario_name,
            config.base_url,
            config.stages.len(),
            format_duration(config.total_duration()),
            config.max_vus
        );
        for t in &config.thresholds {
            println!("threshold: {} {}", t.metric, t.expression);
        }
        println!();
    }

    fn progress(&self) -> Option<ProgressFn> {
        let progress = self.progress.clone();
        Some(Arc::new(move |u: ProgressUpdate| {
            progress.update(u.elapsed, progress_message(&u));
        }))
    }

    fn print_summary(&self, result: &RunResult) -> anyhow::Result<()> {
        self.progress.finish();
        print!("{}", render(result));
        Ok(())
    }
}

fn progress_message(u: &ProgressUpdate) -> String {
    let errors = u
        .failed_requests_total
        .saturating_add(u.checks_failed_total);
    let stage = u
        .stage
        .as_ref()
        .map(|s| format!("stage={}/{} ", s.stage, s.stages))
        .unwrap_or_default();

    format!(
        "{stage}{} vus={}/{} iters={} rps={} p95={} errors={errors}",
        u.state,
        u.active_vus,
        u.target_vus,
        u.iterations_total,
        format_rate(u.rps_now),
        format_ms_opt(u.latency_p95_ms),
    )
}
