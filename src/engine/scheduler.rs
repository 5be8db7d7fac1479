//! Scheduler control loop -- admission control, dispatch and reaping.

use std::sync::atomic::Ordering;

use super::execution::{ExecutionContext, mark_failed, run_task_execution};
use super::{BiblioTranslator, LiveExecution};
use crate::config::SchedulerLimits;
use crate::error::{Error, Result};
use crate::types::{SchedulerStatus, Task, TaskId, TaskStatus};

impl BiblioTranslator {
    /// Start the scheduler loop
    ///
    /// The loop runs one scheduling cycle every `poll_interval` until
    /// [`BiblioTranslator::shutdown`] is called. Calling `start` while the loop
    /// is already running does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShuttingDown`] once shutdown has begun.
    pub async fn start(&self) -> Result<()> {
        if !self.scheduler.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        let mut loop_handle = self.scheduler.loop_handle.lock().await;
        if loop_handle.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return Ok(());
        }

        let translator = self.clone();
        *loop_handle = Some(tokio::spawn(async move {
            translator.run_scheduler_loop().await;
        }));

        tracing::info!("Scheduler started");
        Ok(())
    }

    async fn run_scheduler_loop(&self) {
        let shutdown = self.scheduler.shutdown_token.clone();

        loop {
            let delay = match self.run_scheduling_cycle().await {
                Ok(dispatched) => {
                    if dispatched > 0 {
                        tracing::debug!(dispatched, "Scheduling cycle dispatched tasks");
                    }
                    self.config.scheduler.poll_interval
                }
                Err(e) => {
                    tracing::error!(error = %e, "Scheduling cycle failed");
                    self.config.scheduler.error_backoff
                }
            };

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        tracing::info!("Scheduler loop stopped");
    }

    /// Run one scheduling cycle: reap finished executions, then dispatch
    /// pending tasks in creation order while the ceilings allow
    ///
    /// Returns the number of tasks dispatched.
    pub(crate) async fn run_scheduling_cycle(&self) -> Result<usize> {
        self.reap_finished().await;

        if !self.scheduler.accepting_new.load(Ordering::SeqCst) {
            return Ok(0);
        }

        let limits = *self.limits.read().await;
        let ledger = &self.scheduler.ledger;
        if ledger.running_total() >= limits.max_concurrent_tasks {
            return Ok(0);
        }

        let pending = self.db.list_pending_tasks().await?;
        let mut dispatched = 0;

        for task in pending {
            if ledger.running_total() >= limits.max_concurrent_tasks {
                break;
            }
            if self.scheduler.scheduled.lock().contains(&task.task_id) {
                continue;
            }

            let Some(provider) = task.ledger_key().map(str::to_string) else {
                tracing::warn!(task_id = %task.task_id, "Pending task has no providers, skipping");
                continue;
            };
            if ledger.provider_count(&provider) >= limits.max_concurrent_tasks_per_provider {
                tracing::debug!(
                    task_id = %task.task_id,
                    provider = %provider,
                    "Provider at capacity, task stays pending"
                );
                continue;
            }

            match self.dispatch(&task, &provider, &limits).await {
                Ok(true) => dispatched += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(task_id = %task.task_id, error = %e, "Failed to dispatch task");
                    if let Err(e) = self
                        .db
                        .transition_status(&task.task_id, TaskStatus::Pending, TaskStatus::Failed)
                        .await
                    {
                        tracing::error!(task_id = %task.task_id, error = %e, "Failed to mark task as failed");
                    }
                }
            }
        }

        Ok(dispatched)
    }

    /// Bind `task` to `provider` and spawn its execution
    ///
    /// Returns false when the task lost a race (already scheduled, ledger full,
    /// or no longer `pending`).
    async fn dispatch(&self, task: &Task, provider: &str, limits: &SchedulerLimits) -> Result<bool> {
        let id = &task.task_id;

        if !self.scheduler.scheduled.lock().insert(id.clone()) {
            return Ok(false);
        }

        let Some(slot) = self.scheduler.ledger.try_acquire(
            id,
            provider,
            limits.max_concurrent_tasks_per_provider,
            limits.max_concurrent_tasks,
        ) else {
            self.scheduler.scheduled.lock().remove(id);
            return Ok(false);
        };

        let claimed = match self
            .db
            .transition_status(id, TaskStatus::Pending, TaskStatus::Running)
            .await
        {
            Ok(claimed) => claimed,
            Err(e) => {
                self.scheduler.scheduled.lock().remove(id);
                return Err(e);
            }
        };
        if !claimed {
            // Paused or deleted since the pending list was read
            self.scheduler.scheduled.lock().remove(id);
            return Ok(false);
        }

        let cancel = self.scheduler.shutdown_token.child_token();
        let ctx = ExecutionContext {
            task_id: id.clone(),
            db: self.db.clone(),
            providers: self.providers.clone(),
            worker_slots: self.scheduler.worker_slots.clone(),
            failure_threshold: limits.consecutive_failure_threshold,
            cancel: cancel.clone(),
            shutdown: self.scheduler.shutdown_token.clone(),
        };

        let handle = tokio::spawn(run_task_execution(ctx, slot));
        self.scheduler
            .live_tasks
            .lock()
            .await
            .insert(id.clone(), LiveExecution { handle, cancel });

        tracing::info!(task_id = %id, provider = %provider, "Dispatched task");
        Ok(true)
    }

    /// Collect executions that have ended
    ///
    /// A task still `running` after its execution ended never wrote its final
    /// status (the write failed or the execution panicked) and is forced to
    /// `failed`.
    pub(crate) async fn reap_finished(&self) {
        let finished: Vec<(TaskId, LiveExecution)> = {
            let mut live = self.scheduler.live_tasks.lock().await;
            let ids: Vec<TaskId> = live
                .iter()
                .filter(|(_, execution)| execution.handle.is_finished())
                .map(|(id, _)| id.clone())
                .collect();
            ids.into_iter()
                .filter_map(|id| live.remove(&id).map(|execution| (id, execution)))
                .collect()
        };

        for (id, execution) in finished {
            if let Err(e) = execution.handle.await {
                tracing::error!(task_id = %id, error = %e, "Task execution panicked");
            }

            match self.db.get_task_status(&id).await {
                Ok(Some(TaskStatus::Running)) => {
                    tracing::warn!(task_id = %id, "Execution ended without a final status, failing task");
                    if let Err(e) = mark_failed(&self.db, &id).await {
                        tracing::error!(task_id = %id, error = %e, "Failed to mark task as failed");
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(task_id = %id, error = %e, "Failed to read status of finished task");
                }
            }

            self.scheduler.scheduled.lock().remove(&id);
            tracing::debug!(task_id = %id, "Reaped task execution");
        }
    }

    /// Point-in-time view of the scheduler's bookkeeping
    pub async fn scheduler_status(&self) -> SchedulerStatus {
        let running = self
            .scheduler
            .loop_handle
            .lock()
            .await
            .as_ref()
            .is_some_and(|handle| !handle.is_finished());

        let mut scheduled: Vec<TaskId> = self.scheduler.scheduled.lock().iter().cloned().collect();
        scheduled.sort();

        SchedulerStatus {
            running,
            running_tasks: self.scheduler.ledger.running_total(),
            provider_load: self.scheduler.ledger.snapshot(),
            scheduled,
            limits: *self.limits.read().await,
        }
    }
}
