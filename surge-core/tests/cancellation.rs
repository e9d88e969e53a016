mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{Backend, FakeBackend, LoginThenCreate};
use surge_core::{
    CANCELLED_REASON, Controller, IterationContext, IterationError, RunState, Scenario, Stage,
};
use surge_metrics::Registry;

/// Never finishes an iteration on its own within a test.
struct Stuck;

#[async_trait]
impl Scenario for Stuck {
    async fn iteration(&self, ctx: &mut IterationContext) -> Result<(), IterationError> {
        ctx.get("/api/books").await;
        ctx.sleep(Duration::from_secs(3600)).await;
        Ok(())
    }
}

fn aborted_with(registry: &Registry, reason: &str) -> u64 {
    let Some((id, _)) = registry.lookup_metric("iterations_aborted") else {
        return 0;
    };
    let key = registry.resolve_key("reason");
    let value = registry.resolve_key(reason);
    registry.query(id).where_eq(key, value).sum_counter_total()
}

fn hold(vus: u64, for_: Duration) -> Vec<Stage> {
    vec![Stage::new(Duration::ZERO, vus), Stage::new(for_, vus)]
}

#[tokio::test(start_paused = true)]
async fn drain_grace_expiry_aborts_each_in_flight_iteration_once() -> anyhow::Result<()> {
    let mut cfg = common::config(hold(4, Duration::from_secs(2)));
    cfg.thresholds.clear();
    cfg.drain_grace = Duration::from_secs(5);

    let controller = Controller::new(cfg, Arc::new(Stuck), FakeBackend::new(Backend::Healthy));
    let registry = controller.registry();
    let result = controller.run().await?;

    anyhow::ensure!(result.state == RunState::Completed);
    anyhow::ensure!(aborted_with(&registry, CANCELLED_REASON) == 4);
    anyhow::ensure!(result.iterations_total == 4);
    anyhow::ensure!(result.iterations_aborted == 4);
    anyhow::ensure!(
        result.duration >= Duration::from_secs(7) && result.duration < Duration::from_secs(8),
        "duration={:?}",
        result.duration
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn cancel_skips_the_grace_period() -> anyhow::Result<()> {
    let cfg = common::config(hold(6, Duration::from_secs(600)));
    let controller = Controller::new(
        cfg,
        Arc::new(LoginThenCreate),
        FakeBackend::new(Backend::Healthy),
    );
    let registry = controller.registry();
    let mut handle = controller.handle();
    let canceller = handle.clone();

    let run = tokio::spawn(controller.run());
    tokio::time::sleep(Duration::from_millis(2_050)).await;
    anyhow::ensure!(handle.state() == RunState::Ramping);
    canceller.cancel();

    let result = run.await??;
    anyhow::ensure!(handle.finished().await == RunState::Completed);
    anyhow::ensure!(result.duration < Duration::from_secs(3), "{:?}", result.duration);

    // Every virtual user was somewhere inside an iteration when the run was cancelled.
    anyhow::ensure!(aborted_with(&registry, CANCELLED_REASON) == 6);
    anyhow::ensure!(result.iterations_aborted == 6);
    Ok(())
}
