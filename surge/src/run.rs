use std::sync::Arc;

use surge_core::Controller;
use surge_http::HttpClient;

use crate::cli::{ConfigArgs, RunArgs, ValidateArgs};
use crate::config_yaml::{self, ResolvedConfig, RunFileYaml};
use crate::exit_codes::ExitCode;
use crate::librarian::LibrarianScenario;
use crate::output;
use crate::run_error::RunError;

pub async fn run(args: RunArgs) -> Result<ExitCode, RunError> {
    let ResolvedConfig {
        run: config,
        request_timeout,
        credentials,
    } = load_config(&args.config).await?;

    let out = output::formatter(args.output, &config);
    out.print_header(&config);

    let client = HttpClient::default().with_request_timeout(Some(request_timeout));
    let scenario = Arc::new(LibrarianScenario::new(credentials));

    let mut controller = Controller::new(config, scenario, Arc::new(client));
    if let Some(progress) = out.progress() {
        controller = controller.with_progress(progress);
    }

    let handle = controller.handle();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling run");
            handle.cancel();
        }
    });

    let result = controller.run().await;
    interrupt.abort();
    let result = result.map_err(RunError::from)?;

    out.print_summary(&result).map_err(RunError::RuntimeError)?;
    Ok(ExitCode::from_verdict(result.passed))
}

pub async fn validate(args: ValidateArgs) -> Result<ExitCode, RunError> {
    let resolved = load_config(&args.config).await?;
    let run = &resolved.run;
    println!(
        "config ok: scenario={} base_url={} stages={} duration={:?} thresholds={}",
        run.scenario_name,
        run.base_url,
        run.stages.len(),
        run.total_duration(),
        run.thresholds.len()
    );
    Ok(ExitCode::Success)
}

async fn load_config(args: &ConfigArgs) -> Result<ResolvedConfig, RunError> {
    let file = match &args.config {
        Some(path) => config_yaml::load_run_file(path)
            .await
            .map_err(RunError::InvalidInput)?,
        None => RunFileYaml::default(),
    };
    config_yaml::resolve(file, args).map_err(RunError::InvalidInput)
}
