use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("duration cannot be empty (expected e.g. 10s, 250ms, 1m)".to_string());
    }
    humantime::parse_duration(s)
        .map_err(|err| format!("invalid duration '{s}': {err} (expected e.g. 10s, 250ms, 1m)"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Progress bar on stderr and a human-readable summary.
    HumanReadable,
    /// Emit a single JSON summary line to stdout.
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "surge",
    author,
    version,
    about = "Ramping-VU load generator for the librarian API",
    long_about = "surge ramps a population of virtual users up and down over a staged profile, runs the librarian login-then-create-reader scenario in each of them, and gates the process exit code on latency and error-rate thresholds.\n\nWithout --config the built-in profile is used: 10s ramp to 50 VUs, 30s hold, 10s ramp down, with p(95)<2000 on http_req_duration and rate<0.05 on http_req_failed.",
    after_help = "Examples:\n  surge run\n  surge run --config load.yaml --base-url http://127.0.0.1:8080\n  surge run --config load.yaml --output json\n  surge validate --config load.yaml\n\nExit codes: 0 pass, 11 thresholds failed, 30 invalid input, 40 runtime error"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the librarian scenario against a target
    #[command(
        long_about = "Run the librarian scenario over the configured stages.\n\nCLI flags override values from the YAML file. Ctrl-C cancels the run without a drain grace period; in-flight iterations are recorded as aborted."
    )]
    Run(RunArgs),

    /// Load and check a run configuration without generating load
    Validate(ValidateArgs),
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    /// Path to a YAML run configuration (defaults to the built-in profile)
    #[arg(long, short = 'c', value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Target base URL (overrides `baseUrl` from the YAML file)
    #[arg(long, env = "BASE_URL", value_name = "URL")]
    pub base_url: Option<String>,

    /// Upper bound on concurrently active virtual users
    #[arg(long)]
    pub max_vus: Option<u64>,

    /// How long in-flight iterations may finish after the last stage (e.g. 30s)
    #[arg(long, value_parser = parse_duration)]
    pub drain_grace: Option<Duration>,

    /// Per-request timeout (e.g. 60s, 500ms)
    #[arg(long, value_parser = parse_duration)]
    pub request_timeout: Option<Duration>,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::HumanReadable)]
    pub output: OutputFormat,

    /// Log engine state transitions at info level
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

#[derive(Debug, Args)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub config: ConfigArgs,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_accepts_common_units() {
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration("10s"), Ok(Duration::from_secs(10)));
        assert_eq!(parse_duration("1m"), Ok(Duration::from_secs(60)));
        assert_eq!(parse_duration("0s"), Ok(Duration::ZERO));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("10x").is_err());
        assert!(parse_duration("-5s").is_err());
    }

    #[test]
    fn cli_parses_run_with_overrides() {
        let parsed = Cli::try_parse_from([
            "surge",
            "run",
            "--config",
            "load.yaml",
            "--base-url",
            "http://127.0.0.1:9000",
            "--max-vus",
            "20",
            "--drain-grace",
            "5s",
            "--request-timeout",
            "750ms",
            "--output",
            "json",
            "-v",
        ]);

        let cli = match parsed {
            Ok(v) => v,
            Err(err) => panic!("failed to parse args: {err}"),
        };

        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.config.config, Some(PathBuf::from("load.yaml")));
                assert_eq!(
                    args.config.base_url.as_deref(),
                    Some("http://127.0.0.1:9000")
                );
                assert_eq!(args.config.max_vus, Some(20));
                assert_eq!(args.config.drain_grace, Some(Duration::from_secs(5)));
                assert_eq!(
                    args.config.request_timeout,
                    Some(Duration::from_millis(750))
                );
                assert_eq!(args.output, OutputFormat::Json);
                assert!(args.verbose);
            }
            Command::Validate(_) => panic!("expected run command"),
        }
    }

    #[test]
    fn cli_rejects_negative_max_vus() {
        assert!(Cli::try_parse_from(["surge", "run", "--max-vus", "-1"]).is_err());
    }

    #[test]
    fn cli_parses_validate() {
        let parsed = Cli::try_parse_from(["surge", "validate", "-c", "load.yaml"]);
        let cli = match parsed {
            Ok(v) => v,
            Err(err) => panic!("failed to parse args: {err}"),
        };

        match cli.command {
            Command::Validate(args) => {
                assert_eq!(args.config.config, Some(PathBuf::from("load.yaml")));
                assert_eq!(args.config.max_vus, None);
            }
            Command::Run(_) => panic!("expected validate command"),
        }
    }
}
