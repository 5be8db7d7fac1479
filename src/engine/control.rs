//! Operator control -- pause, resume, retry-failed, reset, delete.

use super::BiblioTranslator;
use super::tasks::not_found;
use crate::config::{ProviderConfig, validate_providers};
use crate::error::{Error, Result, TaskError};
use crate::types::{RequeueSummary, TaskId, TaskStatus};

impl BiblioTranslator {
    /// Pause a running task
    ///
    /// The execution stops at its next record boundary; records already being
    /// translated are finished and saved. Pausing a paused task does nothing.
    ///
    /// # Errors
    ///
    /// - [`TaskError::NotFound`] if the task does not exist or is deleted
    /// - [`TaskError::InvalidState`] unless the task is `running` (or already `paused`)
    pub async fn pause(&self, id: &TaskId) -> Result<()> {
        let _guard = self.scheduler.control_lock.lock().await;

        let task = self.get_task(id).await?;
        match task.status {
            TaskStatus::Paused => return Ok(()),
            TaskStatus::Running => {}
            other => return Err(invalid_state(id, "pause", other)),
        }

        if !self
            .db
            .transition_status(id, TaskStatus::Running, TaskStatus::Paused)
            .await?
        {
            // The execution finished between the read and the write
            return match self.db.get_task_status(id).await? {
                Some(TaskStatus::Paused) => Ok(()),
                Some(other) => Err(invalid_state(id, "pause", other)),
                None => Err(not_found(id)),
            };
        }

        if let Some(execution) = self.scheduler.live_tasks.lock().await.get(id) {
            execution.cancel.cancel();
        }

        tracing::info!(task_id = %id, "Task paused");
        Ok(())
    }

    /// Resume a paused task
    ///
    /// The task returns to `pending` and is picked up again in creation order.
    /// Completed records are kept; failed records are retried.
    pub async fn resume(&self, id: &TaskId) -> Result<()> {
        let _guard = self.scheduler.control_lock.lock().await;

        let task = self.get_task(id).await?;
        if task.status != TaskStatus::Paused {
            return Err(invalid_state(id, "resume", task.status));
        }

        if !self
            .db
            .transition_status(id, TaskStatus::Paused, TaskStatus::Pending)
            .await?
        {
            return Err(self.state_error(id, "resume").await);
        }

        let rolled_back = self.db.rollback_translating(id).await?;
        self.db.recount_task(id).await?;

        tracing::info!(task_id = %id, rolled_back, "Task resumed");
        Ok(())
    }

    /// Return a stopped task's failed records to `pending` and requeue it
    ///
    /// `providers` replaces the task's provider list when given.
    ///
    /// # Errors
    ///
    /// - [`TaskError::InvalidState`] unless the task is `paused`, `completed` or `failed`
    /// - [`TaskError::StillExecuting`] while its last execution is still winding down
    /// - [`TaskError::InvalidProviders`] if the replacement providers are unusable
    pub async fn retry_failed(
        &self,
        id: &TaskId,
        providers: Option<Vec<ProviderConfig>>,
    ) -> Result<RequeueSummary> {
        self.requeue(id, providers, true, "retry failed records of")
            .await
    }

    /// Return every record of a stopped task to `pending` and requeue it
    ///
    /// Same preconditions as [`BiblioTranslator::retry_failed`].
    pub async fn reset(
        &self,
        id: &TaskId,
        providers: Option<Vec<ProviderConfig>>,
    ) -> Result<RequeueSummary> {
        self.requeue(id, providers, false, "reset").await
    }

    async fn requeue(
        &self,
        id: &TaskId,
        providers: Option<Vec<ProviderConfig>>,
        failed_only: bool,
        operation: &str,
    ) -> Result<RequeueSummary> {
        if let Some(providers) = &providers {
            validate_providers(providers)?;
        }

        {
            let _guard = self.scheduler.control_lock.lock().await;

            let task = self.get_task(id).await?;
            if !task.status.allows_requeue() {
                return Err(invalid_state(id, operation, task.status));
            }
            if self.is_executing(id).await {
                return Err(Error::Task(TaskError::StillExecuting { id: id.to_string() }));
            }
        }

        // A stopped task cannot start executing until this claim moves it to
        // `pending`, and a concurrent requeue loses the claim.
        let Some(reset_count) = self
            .db
            .requeue_task(id, providers.as_deref(), failed_only)
            .await?
        else {
            return Err(self.state_error(id, operation).await);
        };

        tracing::info!(
            task_id = %id,
            reset_count,
            failed_only,
            providers_replaced = providers.is_some(),
            "Task requeued"
        );
        Ok(RequeueSummary { reset_count })
    }

    /// Soft-delete a task
    ///
    /// A live execution is cancelled and stops at its next record boundary.
    /// Deleted tasks are never dispatched again.
    pub async fn delete_task(&self, id: &TaskId) -> Result<()> {
        let _guard = self.scheduler.control_lock.lock().await;

        if !self.db.set_task_deleted(id).await? {
            return Err(not_found(id));
        }

        if let Some(execution) = self.scheduler.live_tasks.lock().await.get(id) {
            execution.cancel.cancel();
        }

        tracing::info!(task_id = %id, "Task deleted");
        Ok(())
    }

    /// Permanently remove a task and its records
    ///
    /// Works on soft-deleted tasks too.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::StillExecuting`] while an execution of the task is live.
    pub async fn purge_task(&self, id: &TaskId) -> Result<()> {
        let _guard = self.scheduler.control_lock.lock().await;

        match self.db.get_task(id).await? {
            None => return Err(not_found(id)),
            // Records are still being written without the control lock
            Some(task) if task.status == TaskStatus::Parsing => {
                return Err(invalid_state(id, "purge", task.status));
            }
            Some(_) => {}
        }
        if self.is_executing(id).await || self.scheduler.ledger.is_bound(id) {
            return Err(Error::Task(TaskError::StillExecuting { id: id.to_string() }));
        }

        if !self.db.delete_task_permanently(id).await? {
            return Err(not_found(id));
        }

        tracing::info!(task_id = %id, "Task purged");
        Ok(())
    }

    /// Whether an execution of `id` is still running (finished but unreaped ones are not)
    async fn is_executing(&self, id: &TaskId) -> bool {
        self.scheduler
            .live_tasks
            .lock()
            .await
            .get(id)
            .is_some_and(|execution| !execution.handle.is_finished())
    }

    /// Error for a conditional write that lost a race, based on the current status
    async fn state_error(&self, id: &TaskId, operation: &str) -> Error {
        match self.db.get_task_status(id).await {
            Ok(Some(status)) => invalid_state(id, operation, status),
            Ok(None) => not_found(id),
            Err(e) => e,
        }
    }
}

fn invalid_state(id: &TaskId, operation: &str, current: TaskStatus) -> Error {
    Error::Task(TaskError::InvalidState {
        id: id.to_string(),
        operation: operation.to_string(),
        current_state: current.to_string(),
    })
}
