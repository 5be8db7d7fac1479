//! Single provider, single worker: records are translated strictly in order.

use std::sync::Arc;

use super::{ExecutionContext, Progress, RecordWorker};
use crate::error::{Result, TaskError};
use crate::types::{Record, Task};

pub(super) async fn run(
    ctx: &ExecutionContext,
    task: &Task,
    records: Vec<Record>,
    progress: &Arc<Progress>,
) -> Result<()> {
    let provider = task
        .providers
        .first()
        .ok_or_else(|| TaskError::InvalidProviders {
            reason: "task has no providers".to_string(),
        })?;
    let worker = RecordWorker::new(ctx, task, provider, progress)?;

    for record in records {
        if !worker.should_continue().await? || !worker.handle(record).await? {
            break;
        }
    }

    Ok(())
}
