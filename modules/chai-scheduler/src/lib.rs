pub mod scheduler;

pub use scheduler::PipelineScheduler;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Run every configured pipeline concurrently, one worker per pipeline
/// (spec.md §5: "a pool of parallel workers, one per pipeline"). Returns
/// once every scheduler loop has exited — which happens only after `cancel`
/// fires.
pub async fn run_all(schedulers: Vec<PipelineScheduler>, cancel: CancellationToken) {
    let mut tasks = JoinSet::new();
    for scheduler in schedulers {
        let cancel = cancel.clone();
        tasks.spawn(async move { scheduler.run_loop(cancel).await });
    }
    while tasks.join_next().await.is_some() {}
}
