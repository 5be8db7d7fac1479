//! Task execution -- draining a task's records through provider clients.
//!
//! Split into focused submodules:
//! - [`record`] - Per-record translation shared by every strategy
//! - [`sequential`] - One provider, one worker, record order preserved
//! - [`partitioned`] - One provider, N workers over contiguous chunks
//! - [`shared_queue`] - Several providers pulling from one FIFO queue

mod record;
mod sequential;
mod partitioned;
mod shared_queue;


use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::LedgerSlot;
use crate::db::Database;
use crate::error::{Error, Result, TaskError};
use crate::provider::ProviderFactory;
use crate::types::{RecordStatus, Task, TaskId, TaskStatus};

use record::RecordWorker;

/// Everything an execution needs, independent of the translator handle
#[derive(Clone)]
pub(crate) struct ExecutionContext {
    pub(crate) task_id: TaskId,
    pub(crate) db: Arc<Database>,
    pub(crate) providers: Arc<dyn ProviderFactory>,
    pub(crate) worker_slots: Arc<Semaphore>,
    pub(crate) failure_threshold: u32,
    /// Cancelled by pause, delete or shutdown
    pub(crate) cancel: CancellationToken,
    /// Cancelled only by shutdown
    pub(crate) shutdown: CancellationToken,
}

/// How a task's records are drained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Strategy {
    /// Single provider with one worker
    Sequential,
    /// Single provider with several workers over static chunks
    Partitioned {
        /// Number of workers (and chunks)
        workers: usize,
    },
    /// Several providers draining one shared queue
    SharedQueue,
}

impl Strategy {
    /// Pick the strategy for a task's provider configuration
    pub(crate) fn for_task(task: &Task) -> Self {
        match task.providers.as_slice() {
            [single] if single.threads <= 1 => Strategy::Sequential,
            [single] => Strategy::Partitioned {
                workers: single.threads,
            },
            _ => Strategy::SharedQueue,
        }
    }
}

/// Counters shared by every worker of one execution
#[derive(Debug)]
pub(crate) struct Progress {
    completed: AtomicU32,
    failed: AtomicU32,
    consecutive_failures: AtomicU32,
    threshold: u32,
    threshold_breached: AtomicBool,
    paused_externally: AtomicBool,
    /// Cancelled to stop every worker at its next record boundary
    pub(crate) stop: CancellationToken,
}

impl Progress {
    pub(crate) fn new(completed: u32, failed: u32, threshold: u32, stop: CancellationToken) -> Self {
        Self {
            completed: AtomicU32::new(completed),
            failed: AtomicU32::new(failed),
            consecutive_failures: AtomicU32::new(0),
            threshold,
            threshold_breached: AtomicBool::new(false),
            paused_externally: AtomicBool::new(false),
            stop,
        }
    }

    /// Count a record that just completed; `previous` is its status before the attempt
    pub(crate) fn record_success(&self, previous: RecordStatus) {
        if previous == RecordStatus::Failed {
            self.failed.fetch_sub(1, Ordering::SeqCst);
        }
        self.completed.fetch_add(1, Ordering::SeqCst);
        self.consecutive_failures.store(0, Ordering::SeqCst);
    }

    /// Count a record that just failed
    ///
    /// Returns true if this failure reached the consecutive-failure threshold.
    pub(crate) fn record_failure(&self, previous: RecordStatus) -> bool {
        if previous != RecordStatus::Failed {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
        let streak = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        if streak >= self.threshold {
            self.threshold_breached.store(true, Ordering::SeqCst);
            self.stop.cancel();
            return true;
        }
        false
    }

    /// The persisted status left `running`: stop without touching it
    pub(crate) fn stop_for_external_pause(&self) {
        self.paused_externally.store(true, Ordering::SeqCst);
        self.stop.cancel();
    }

    /// Current `(completed, failed)` counts
    pub(crate) fn counts(&self) -> (u32, u32) {
        (
            self.completed.load(Ordering::SeqCst),
            self.failed.load(Ordering::SeqCst),
        )
    }

    pub(crate) fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::SeqCst)
    }

    pub(crate) fn threshold_breached(&self) -> bool {
        self.threshold_breached.load(Ordering::SeqCst)
    }

    pub(crate) fn paused_externally(&self) -> bool {
        self.paused_externally.load(Ordering::SeqCst)
    }
}

/// Status an execution leaves its task in
pub(crate) fn final_status(progress: &Progress, total: u32, shutting_down: bool) -> TaskStatus {
    let (completed, failed) = progress.counts();

    if progress.threshold_breached() || progress.paused_externally() {
        TaskStatus::Paused
    } else if completed + failed >= total {
        TaskStatus::Completed
    } else if shutting_down {
        // Interrupted by shutdown: picked up again on the next start
        TaskStatus::Pending
    } else {
        TaskStatus::Paused
    }
}

/// Run one task to its next resting state
///
/// Holds the task's ledger slot until it returns. Errors during setup or
/// execution move the task to `Failed`.
pub(crate) async fn run_task_execution(ctx: ExecutionContext, slot: LedgerSlot) {
    let _slot = slot;
    let task_id = ctx.task_id.clone();

    match execute(&ctx).await {
        Ok(status) => {
            tracing::info!(task_id = %task_id, status = %status, "Task execution finished");
        }
        Err(e) => {
            tracing::error!(task_id = %task_id, error = %e, "Task execution failed");
            if let Err(e) = mark_failed(&ctx.db, &task_id).await {
                tracing::error!(task_id = %task_id, error = %e, "Failed to mark task as failed");
            }
        }
    }
}

/// Move a task stuck in `running` to `failed` and free its stranded records
pub(crate) async fn mark_failed(db: &Database, task_id: &TaskId) -> Result<()> {
    if db
        .transition_status(task_id, TaskStatus::Running, TaskStatus::Failed)
        .await?
    {
        db.rollback_translating(task_id).await?;
        db.recount_task(task_id).await?;
    }
    Ok(())
}

async fn execute(ctx: &ExecutionContext) -> Result<TaskStatus> {
    let task = ctx
        .db
        .get_task(&ctx.task_id)
        .await?
        .filter(|task| !task.deleted)
        .ok_or_else(|| {
            Error::Task(TaskError::NotFound {
                id: ctx.task_id.to_string(),
            })
        })?;

    // Counters restart from what the records say, so re-attempted failures never double count
    let counts = ctx.db.count_records_by_status(&ctx.task_id).await?;
    let progress = Arc::new(Progress::new(
        counts.completed,
        counts.failed,
        ctx.failure_threshold,
        ctx.cancel.child_token(),
    ));
    ctx.db
        .update_task_progress(&ctx.task_id, counts.completed, counts.failed)
        .await?;

    let records: Vec<_> = ctx
        .db
        .list_records(&ctx.task_id)
        .await?
        .into_iter()
        .filter(|record| record.status != RecordStatus::Completed)
        .collect();

    let strategy = Strategy::for_task(&task);
    tracing::info!(
        task_id = %ctx.task_id,
        strategy = ?strategy,
        remaining = records.len(),
        total = task.total_count,
        "Starting task execution"
    );

    match strategy {
        Strategy::Sequential => sequential::run(ctx, &task, records, &progress).await?,
        Strategy::Partitioned { workers } => {
            partitioned::run(ctx, &task, records, &progress, workers).await?
        }
        Strategy::SharedQueue => shared_queue::run(ctx, &task, records, &progress).await?,
    }

    if progress.threshold_breached() {
        tracing::warn!(
            task_id = %ctx.task_id,
            consecutive_failures = progress.consecutive_failures(),
            "Consecutive failure threshold reached, pausing task"
        );
    }

    let next = final_status(&progress, task.total_count, ctx.shutdown.is_cancelled());
    let (completed, failed) = progress.counts();
    let status = ctx
        .db
        .finish_execution(&ctx.task_id, completed, failed, next)
        .await?
        .unwrap_or(next);

    Ok(status)
}

/// Wait for every worker; the first error stops the rest and is returned
async fn join_workers(mut workers: JoinSet<Result<()>>, progress: &Progress) -> Result<()> {
    let mut first_error = None;

    while let Some(joined) = workers.join_next().await {
        let outcome = joined.map_err(|e| Error::Other(format!("worker panicked: {}", e)));
        if let Err(e) = outcome.and_then(|result| result) {
            progress.stop.cancel();
            first_error.get_or_insert(e);
        }
    }

    first_error.map_or(Ok(()), Err)
}
