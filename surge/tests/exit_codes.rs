use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::Context as _;
use surge_testserver::TestServer;

fn status_code(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

fn config_path(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/configs")
        .join(name)
}

async fn run_surge(args: Vec<String>) -> anyhow::Result<Output> {
    let exe = env!("CARGO_BIN_EXE_surge");
    tokio::task::spawn_blocking(move || {
        Command::new(exe)
            .args(&args)
            .env_remove("BASE_URL")
            .output()
    })
    .await
    .context("spawn_blocking join")?
    .context("run surge binary")
}

fn ensure_code(out: &Output, expected: i32) -> anyhow::Result<()> {
    anyhow::ensure!(
        status_code(out.status) == expected,
        "expected exit code {expected}, got {}\nstdout:\n{}\nstderr:\n{}",
        status_code(out.status),
        String::from_utf8_lossy(&out.stdout),
        String::from_utf8_lossy(&out.stderr)
    );
    Ok(())
}

fn run_args(config: &str, base_url: &str) -> Vec<String> {
    vec![
        "run".to_string(),
        "--config".to_string(),
        config_path(config).display().to_string(),
        "--base-url".to_string(),
        base_url.to_string(),
        "--output".to_string(),
        "json".to_string(),
    ]
}

#[test]
fn invalid_flags_exit_30() -> anyhow::Result<()> {
    let exe = env!("CARGO_BIN_EXE_surge");

    let out = Command::new(exe)
        .arg("run")
        .arg("--drain-grace")
        .arg("10x")
        .output()
        .context("run surge binary")?;

    ensure_code(&out, 30)
}

#[tokio::test]
async fn negative_stage_target_exit_30() -> anyhow::Result<()> {
    let out = run_surge(run_args("negative_target.yaml", "http://127.0.0.1:1")).await?;
    ensure_code(&out, 30)?;
    anyhow::ensure!(out.stdout.is_empty(), "nothing should run");
    Ok(())
}

#[tokio::test]
async fn oversized_drain_grace_exit_30() -> anyhow::Result<()> {
    let mut args = run_args("short_pass.yaml", "http://127.0.0.1:1");
    args.extend(["--drain-grace".to_string(), "300000000000years".to_string()]);
    let out = run_surge(args).await?;
    ensure_code(&out, 30)?;
    anyhow::ensure!(out.stdout.is_empty(), "nothing should run");
    Ok(())
}

#[tokio::test]
async fn missing_config_exit_30() -> anyhow::Result<()> {
    let out = run_surge(run_args("does-not-exist.yaml", "http://127.0.0.1:1")).await?;
    ensure_code(&out, 30)
}

#[tokio::test]
async fn invalid_base_url_exit_30() -> anyhow::Result<()> {
    let out = run_surge(run_args("short_pass.yaml", "not a url")).await?;
    ensure_code(&out, 30)
}

#[tokio::test]
async fn validate_accepts_the_default_profile() -> anyhow::Result<()> {
    let out = run_surge(vec!["validate".to_string()]).await?;
    ensure_code(&out, 0)?;
    let stdout = String::from_utf8_lossy(&out.stdout);
    anyhow::ensure!(stdout.contains("scenario=librarian"), "stdout:\n{stdout}");
    anyhow::ensure!(stdout.contains("stages=3"), "stdout:\n{stdout}");
    Ok(())
}

#[tokio::test]
async fn short_ramp_passes_exit_0() -> anyhow::Result<()> {
    let server = TestServer::start().await.context("start test server")?;
    let base_url = server.base_url().to_string();

    let out = run_surge(run_args("short_pass.yaml", &base_url)).await?;
    let logins = server.stats().logins_ok();
    let readers = server.stats().readers_created();
    server.shutdown().await;

    ensure_code(&out, 0)?;
    anyhow::ensure!(logins > 0, "no login reached the server");
    anyhow::ensure!(readers == logins, "logins={logins} readers={readers}");

    let stdout = String::from_utf8_lossy(&out.stdout);
    let line = stdout.lines().next().context("summary line")?;
    let summary: serde_json::Value = serde_json::from_str(line).context("parse summary")?;
    anyhow::ensure!(summary["kind"] == "summary", "{summary}");
    anyhow::ensure!(summary["passed"] == true, "{summary}");
    anyhow::ensure!(summary["scenario"] == "librarian", "{summary}");

    let checks = summary["checks"].as_array().context("checks array")?;
    let names: Vec<&str> = checks.iter().filter_map(|c| c["name"].as_str()).collect();
    anyhow::ensure!(
        names == ["create reader status 201", "login successful", "token received"],
        "{names:?}"
    );
    anyhow::ensure!(
        checks.iter().all(|c| c["fails"] == 0),
        "checks: {checks:?}"
    );
    Ok(())
}

#[tokio::test]
async fn thresholds_failed_exit_11() -> anyhow::Result<()> {
    let server = TestServer::start().await.context("start test server")?;
    let base_url = server.base_url().to_string();

    let out = run_surge(run_args("thresholds_fail.yaml", &base_url)).await?;
    server.shutdown().await;

    ensure_code(&out, 11)?;
    let stdout = String::from_utf8_lossy(&out.stdout);
    anyhow::ensure!(stdout.contains("\"status\":\"fail\""), "stdout:\n{stdout}");
    anyhow::ensure!(
        !stdout.contains("\"iterations_total\":0,"),
        "no iteration ran:\n{stdout}"
    );
    Ok(())
}

#[tokio::test]
async fn empty_profile_is_indeterminate_exit_11() -> anyhow::Result<()> {
    let out = run_surge(run_args("empty_profile.yaml", "http://127.0.0.1:1")).await?;
    ensure_code(&out, 11)?;
    let stdout = String::from_utf8_lossy(&out.stdout);
    anyhow::ensure!(
        stdout.contains("\"status\":\"indeterminate\""),
        "stdout:\n{stdout}"
    );
    Ok(())
}
