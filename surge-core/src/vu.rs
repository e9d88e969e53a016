use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::runner::{
    CANCELLED_REASON, IterationContext, IterationError, RunContext, Scenario,
    record_iteration_result,
};

/// A spawned virtual user as seen by the scheduler.
#[derive(Debug)]
pub(crate) struct VuHandle {
    pub(crate) id: u64,
    retire: CancellationToken,
    pub(crate) join: JoinHandle<()>,
}

impl VuHandle {
    /// Lets the current iteration finish, then stops the virtual user.
    pub(crate) fn retire(&self) {
        self.retire.cancel();
    }
}

pub(crate) fn spawn_vu(
    id: u64,
    scenario: Arc<dyn Scenario>,
    run: Arc<RunContext>,
    hard: CancellationToken,
) -> VuHandle {
    let retire = CancellationToken::new();
    let join = tokio::spawn(vu_loop(id, scenario, run, retire.clone(), hard));
    VuHandle { id, retire, join }
}

async fn vu_loop(
    id: u64,
    scenario: Arc<dyn Scenario>,
    run: Arc<RunContext>,
    retire: CancellationToken,
    hard: CancellationToken,
) {
    let mut iteration = 0u64;
    while !retire.is_cancelled() && !hard.is_cancelled() {
        let mut ctx = IterationContext::new(id, iteration, run.clone());
        let started = Instant::now();

        // Forced cancellation wins over an iteration completing in the same poll.
        let result = tokio::select! {
            biased;
            _ = hard.cancelled() => Err(IterationError::aborted(CANCELLED_REASON)),
            res = scenario.iteration(&mut ctx) => res,
        };

        record_iteration_result(run.metrics(), id, &result, started.elapsed());
        iteration = iteration.saturating_add(1);

        // Scenarios that never await would otherwise starve the scheduler.
        tokio::task::yield_now().await;
    }
}
