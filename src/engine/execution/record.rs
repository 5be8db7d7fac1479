//! Per-record translation shared by every strategy.

use std::sync::Arc;

use tokio::sync::OwnedSemaphorePermit;

use super::{ExecutionContext, Progress};
use crate::config::ProviderConfig;
use crate::error::Result;
use crate::provider::ProviderClient;
use crate::types::{Record, RecordStatus, Task, TaskStatus, TranslateField};

/// One worker of an execution, bound to one provider client
pub(crate) struct RecordWorker {
    ctx: ExecutionContext,
    client: Arc<dyn ProviderClient>,
    model_name: String,
    translate_title: bool,
    translate_abstract: bool,
    progress: Arc<Progress>,
}

impl RecordWorker {
    /// Create a worker with its own client for `provider`
    pub(crate) fn new(
        ctx: &ExecutionContext,
        task: &Task,
        provider: &ProviderConfig,
        progress: &Arc<Progress>,
    ) -> Result<Self> {
        Ok(Self {
            ctx: ctx.clone(),
            client: ctx.providers.client(provider)?,
            model_name: provider.display_name().to_string(),
            translate_title: task.translate_title,
            translate_abstract: task.translate_abstract,
            progress: Arc::clone(progress),
        })
    }

    /// Record-boundary check: false once the execution must stop
    ///
    /// Re-reads the persisted status so that a pause landing before the
    /// execution registered its cancellation token is still observed.
    pub(crate) async fn should_continue(&self) -> Result<bool> {
        if self.progress.stop.is_cancelled() {
            return Ok(false);
        }

        match self.ctx.db.get_task_status(&self.ctx.task_id).await? {
            Some(TaskStatus::Running) => Ok(true),
            other => {
                tracing::debug!(
                    task_id = %self.ctx.task_id,
                    status = ?other,
                    "Task no longer running, stopping worker"
                );
                self.progress.stop_for_external_pause();
                Ok(false)
            }
        }
    }

    /// Wait for a global worker slot, or `None` if the execution is stopping
    async fn acquire_slot(&self) -> Option<OwnedSemaphorePermit> {
        tokio::select! {
            biased;
            _ = self.progress.stop.cancelled() => None,
            permit = Arc::clone(&self.ctx.worker_slots).acquire_owned() => permit.ok(),
        }
    }

    /// Translate one record while holding a worker slot
    ///
    /// Returns false when the worker should stop.
    pub(crate) async fn handle(&self, record: Record) -> Result<bool> {
        let Some(_permit) = self.acquire_slot().await else {
            return Ok(false);
        };
        self.process(record).await
    }

    async fn process(&self, mut record: Record) -> Result<bool> {
        if record.status == RecordStatus::Completed {
            return Ok(true);
        }

        let previous = record.status;
        record.status = RecordStatus::Translating;
        self.ctx.db.save_record(&self.ctx.task_id, &record).await?;

        let mut failure = None;

        if self.translate_title && !record.original_title.is_empty() {
            match self.translate(&record.original_title, TranslateField::Title).await {
                Ok(text) => record.translated_title = text,
                Err(message) => failure = Some(message),
            }
        }

        if failure.is_none() && self.translate_abstract && !record.original_abstract.is_empty() {
            match self
                .translate(&record.original_abstract, TranslateField::Abstract)
                .await
            {
                Ok(text) => record.translated_abstract = text,
                Err(message) => failure = Some(message),
            }
        }

        let breached = match failure {
            None => {
                record.status = RecordStatus::Completed;
                record.error_message.clear();
                record.translated_by_model = self.model_name.clone();
                self.progress.record_success(previous);
                false
            }
            Some(message) => {
                tracing::debug!(
                    task_id = %self.ctx.task_id,
                    record = record.index,
                    error = %message,
                    "Record translation failed"
                );
                record.status = RecordStatus::Failed;
                record.error_message = message;
                self.progress.record_failure(previous)
            }
        };

        self.ctx.db.save_record(&self.ctx.task_id, &record).await?;

        let (completed, failed) = self.progress.counts();
        let status = self
            .ctx
            .db
            .update_task_progress(&self.ctx.task_id, completed, failed)
            .await?;

        if status != Some(TaskStatus::Running) {
            self.progress.stop_for_external_pause();
            return Ok(false);
        }

        Ok(!breached)
    }

    async fn translate(&self, text: &str, field: TranslateField) -> std::result::Result<String, String> {
        let result = self.client.translate(text, field).await;
        if result.success {
            Ok(result.translated_text)
        } else {
            Err(format!("{}: {}", field.failure_prefix(), result.error_message))
        }
    }
}
