use futures_util::future::join_all;
use studio_core::{ItemId, MacroOperation, OperationKind, OperationParams, Plan};
use studio_logging::studio_info;

use crate::runtime::{RunOutcome, RuntimeClosed, StudioHandle};

/// Tally of a batch, for logging. Per-item results live in the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchSummary {
    pub settled: usize,
    pub done: usize,
    pub failed: usize,
    pub rejected: usize,
}

impl BatchSummary {
    fn record(&mut self, outcome: Result<RunOutcome, RuntimeClosed>) {
        self.settled += 1;
        match outcome {
            Ok(RunOutcome::Done) => self.done += 1,
            Ok(RunOutcome::Failed) | Ok(RunOutcome::Removed) | Err(RuntimeClosed) => {
                self.failed += 1
            }
            Ok(RunOutcome::Rejected) => self.rejected += 1,
        }
    }
}

/// Run one operation on every listed item concurrently.
pub async fn run_batch(
    handle: &StudioHandle,
    kind: OperationKind,
    ids: &[ItemId],
    params: OperationParams,
) -> BatchSummary {
    run_plans(handle, ids, |_| Plan::single(kind, params.clone()), kind.as_str()).await
}

/// Run a macro on every listed item concurrently.
pub async fn run_macro_batch(
    handle: &StudioHandle,
    operation: MacroOperation,
    ids: &[ItemId],
    params: OperationParams,
) -> BatchSummary {
    run_plans(handle, ids, |_| operation.plan(params.clone()), operation.as_str()).await
}

async fn run_plans<F>(handle: &StudioHandle, ids: &[ItemId], plan_for: F, label: &str) -> BatchSummary
where
    F: Fn(ItemId) -> Plan,
{
    let runs = ids.iter().map(|&item_id| handle.run(item_id, plan_for(item_id)));
    let mut summary = BatchSummary::default();
    for outcome in join_all(runs).await {
        summary.record(outcome);
    }
    studio_info!(
        "Batch {} over {} items: {} done, {} failed, {} rejected",
        label,
        ids.len(),
        summary.done,
        summary.failed,
        summary.rejected
    );
    summary
}
