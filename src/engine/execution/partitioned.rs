//! Single provider, several workers over contiguous chunks.
//!
//! Chunks are fixed up front: a fast worker never steals from a slow one.

use std::sync::Arc;

use tokio::task::JoinSet;

use super::{ExecutionContext, Progress, RecordWorker, join_workers};
use crate::error::{Result, TaskError};
use crate::types::{Record, Task};

pub(super) async fn run(
    ctx: &ExecutionContext,
    task: &Task,
    records: Vec<Record>,
    progress: &Arc<Progress>,
    workers: usize,
) -> Result<()> {
    let provider = task
        .providers
        .first()
        .ok_or_else(|| TaskError::InvalidProviders {
            reason: "task has no providers".to_string(),
        })?;

    let mut set = JoinSet::new();
    for (chunk_index, chunk) in partition(records, workers).into_iter().enumerate() {
        let worker = RecordWorker::new(ctx, task, provider, progress)?;
        tracing::debug!(
            task_id = %ctx.task_id,
            chunk = chunk_index,
            records = chunk.len(),
            "Starting chunk worker"
        );

        set.spawn(async move {
            for record in chunk {
                if !worker.should_continue().await? || !worker.handle(record).await? {
                    break;
                }
            }
            Ok(())
        });
    }

    join_workers(set, progress).await
}

/// Split `records` into at most `workers` contiguous chunks of `ceil(n / workers)`
pub(crate) fn partition(records: Vec<Record>, workers: usize) -> Vec<Vec<Record>> {
    if records.is_empty() {
        return Vec::new();
    }

    let chunk_size = records.len().div_ceil(workers.max(1));
    let mut chunks = Vec::with_capacity(workers);
    let mut rest = records.into_iter().peekable();
    while rest.peek().is_some() {
        chunks.push(rest.by_ref().take(chunk_size).collect());
    }
    chunks
}
