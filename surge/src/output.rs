use surge_core::{ProgressFn, RunConfig, RunResult};

use crate::cli::OutputFormat;

mod human;
mod json;

pub(crate) trait OutputFormatter: Send + Sync {
    fn print_header(&self, config: &RunConfig);
    fn progress(&self) -> Option<ProgressFn>;
    fn print_summary(&self, result: &RunResult) -> anyhow::Result<()>;
}

pub(crate) fn formatter(format: OutputFormat, config: &RunConfig) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::HumanReadable => {
            Box::new(human::HumanReadableOutput::new(config.total_duration()))
        }
        OutputFormat::Json => Box::new(json::JsonOutput::new(&config.scenario_name)),
    }
}
