//! Startup restore and shutdown coordination.

use std::sync::atomic::Ordering;
use std::time::Duration;

use super::{BiblioTranslator, LiveExecution};
use crate::error::Result;
use crate::types::TaskId;

/// How often shutdown re-checks the live executions
const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(50);

impl BiblioTranslator {
    /// Return work interrupted by an unclean stop to the pending pool
    ///
    /// Tasks left `running` go back to `pending` and records left `translating`
    /// go back to `pending`; their translation is simply redone.
    pub(crate) async fn restore_interrupted(&self) -> Result<()> {
        let tasks = self.db.requeue_running_tasks().await?;
        let records = self.db.rollback_all_translating().await?;

        if tasks > 0 || records > 0 {
            tracing::info!(tasks, records, "Restored work interrupted by an unclean stop");
        }
        Ok(())
    }

    /// Gracefully shut down the translator
    ///
    /// 1. Stops accepting new tasks and dispatches
    /// 2. Cancels every execution (each finishes its in-flight records)
    /// 3. Joins the scheduler loop
    /// 4. Waits up to `shutdown_timeout` for executions to end; interrupted
    ///    tasks are left `pending` for the next start
    /// 5. Aborts stragglers and returns their tasks to `pending`
    ///
    /// # Errors
    ///
    /// Returns an error if database writes fail while cleaning up stragglers.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        self.scheduler.accepting_new.store(false, Ordering::SeqCst);
        self.scheduler.shutdown_token.cancel();

        let loop_handle = self.scheduler.loop_handle.lock().await.take();
        if let Some(handle) = loop_handle {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Scheduler loop ended abnormally");
            }
        }

        let timeout = self.config.scheduler.shutdown_timeout;
        match tokio::time::timeout(timeout, self.wait_for_live_executions()).await {
            Ok(()) => tracing::info!("All task executions stopped"),
            Err(_) => {
                tracing::warn!(
                    timeout_secs = timeout.as_secs(),
                    "Timeout waiting for task executions, aborting the rest"
                );
                self.abort_stragglers().await?;
            }
        }

        self.reap_finished().await;

        tracing::info!("Graceful shutdown complete");
        Ok(())
    }

    async fn wait_for_live_executions(&self) {
        loop {
            let remaining = self
                .scheduler
                .live_tasks
                .lock()
                .await
                .values()
                .filter(|execution| !execution.handle.is_finished())
                .count();

            if remaining == 0 {
                return;
            }

            tracing::debug!(remaining, "Waiting for task executions to stop");
            tokio::time::sleep(SHUTDOWN_POLL_INTERVAL).await;
        }
    }

    async fn abort_stragglers(&self) -> Result<()> {
        let stragglers: Vec<(TaskId, LiveExecution)> = {
            let mut live = self.scheduler.live_tasks.lock().await;
            let ids: Vec<TaskId> = live
                .iter()
                .filter(|(_, execution)| !execution.handle.is_finished())
                .map(|(id, _)| id.clone())
                .collect();
            ids.into_iter()
                .filter_map(|id| live.remove(&id).map(|execution| (id, execution)))
                .collect()
        };

        for (id, execution) in stragglers {
            execution.handle.abort();
            // Aborting drops the execution, which releases its ledger slot
            let _ = execution.handle.await;
            self.scheduler.scheduled.lock().remove(&id);
            tracing::warn!(task_id = %id, "Aborted task execution");
        }

        // Only aborted executions can still be running at this point
        let tasks = self.db.requeue_running_tasks().await?;
        let records = self.db.rollback_all_translating().await?;
        tracing::info!(tasks, records, "Returned aborted tasks to pending");

        Ok(())
    }
}
