//! Several providers draining one FIFO queue.
//!
//! Each provider contributes `threads` workers. A record is popped by exactly
//! one worker, so faster providers naturally take a larger share.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinSet;

use super::{ExecutionContext, Progress, RecordWorker, join_workers};
use crate::error::Result;
use crate::types::{Record, Task};

pub(super) async fn run(
    ctx: &ExecutionContext,
    task: &Task,
    records: Vec<Record>,
    progress: &Arc<Progress>,
) -> Result<()> {
    let queue = Arc::new(Mutex::new(VecDeque::from(records)));

    let mut set = JoinSet::new();
    for provider in &task.providers {
        for _ in 0..provider.threads {
            let worker = RecordWorker::new(ctx, task, provider, progress)?;
            let queue = Arc::clone(&queue);

            set.spawn(async move {
                loop {
                    if !worker.should_continue().await? {
                        break;
                    }
                    let next = queue.lock().pop_front();
                    let Some(record) = next else {
                        break;
                    };
                    if !worker.handle(record).await? {
                        break;
                    }
                }
                Ok(())
            });
        }
    }

    join_workers(set, progress).await
}
