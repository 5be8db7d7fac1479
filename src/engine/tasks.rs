//! Task creation and read-only projections.

use std::sync::atomic::Ordering;

use super::BiblioTranslator;
use crate::config::validate_providers;
use crate::db::NewTaskRow;
use crate::error::{Error, Result, TaskError};
use crate::types::{NewTask, Record, Task, TaskId, TaskStatus};

impl BiblioTranslator {
    /// Create a task from already-parsed records
    ///
    /// The task is stored in `parsing` while its records are written, then moves
    /// to `pending` (or `failed` when there are no records). The scheduler picks
    /// it up on its next cycle.
    ///
    /// # Errors
    ///
    /// - [`Error::ShuttingDown`] once shutdown has begun
    /// - [`TaskError::InvalidProviders`] if the provider list is empty or unusable
    /// - Database errors while storing the task or its records
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use biblio_translate::{BiblioTranslator, NewTask};
    /// # async fn example(translator: BiblioTranslator, task: NewTask) -> biblio_translate::Result<()> {
    /// let id = translator.create_task(task).await?;
    /// println!("created {}", id);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn create_task(&self, new_task: NewTask) -> Result<TaskId> {
        if !self.scheduler.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }
        validate_providers(&new_task.providers)?;

        let file_names = if new_task.file_names.is_empty() {
            source_file_names(&new_task)
        } else {
            new_task.file_names.clone()
        };

        let (id, name) = self.register_task(&new_task, &file_names).await?;

        let inserted = match self.db.insert_records(&id, &new_task.records).await {
            Ok(inserted) => inserted,
            Err(e) => {
                tracing::error!(task_id = %id, error = %e, "Failed to store task records");
                self.db
                    .transition_status(&id, TaskStatus::Parsing, TaskStatus::Failed)
                    .await?;
                return Err(e);
            }
        };

        let status = if inserted == 0 {
            tracing::warn!(task_id = %id, "Task has no records");
            TaskStatus::Failed
        } else {
            TaskStatus::Pending
        };
        self.db
            .transition_status(&id, TaskStatus::Parsing, status)
            .await?;

        tracing::info!(
            task_id = %id,
            name = %name,
            records = inserted,
            providers = new_task.providers.len(),
            status = %status,
            "Task created"
        );

        Ok(id)
    }

    /// Allocate the next identifier of the day and store the task row in `parsing`
    ///
    /// Only this step runs under the control lock; records are written after it
    /// is released.
    pub(crate) async fn register_task(
        &self,
        new_task: &NewTask,
        file_names: &[String],
    ) -> Result<(TaskId, String)> {
        let _guard = self.scheduler.control_lock.lock().await;

        let date = TaskId::today_partition();
        let sequence = self
            .db
            .max_task_sequence(&date.format("%Y-%m-%d").to_string())
            .await?
            + 1;
        let id = TaskId::from_parts(date, sequence);

        let name = match new_task.task_name.trim() {
            "" => file_names
                .first()
                .cloned()
                .unwrap_or_else(|| id.to_string()),
            name => name.to_string(),
        };

        self.db
            .insert_task(
                &NewTaskRow {
                    id: &id,
                    name: &name,
                    file_names,
                    translate_title: new_task.translate_title,
                    translate_abstract: new_task.translate_abstract,
                    providers: &new_task.providers,
                },
                TaskStatus::Parsing,
            )
            .await?;

        Ok((id, name))
    }

    /// List tasks in creation order
    pub async fn list_tasks(&self, include_deleted: bool) -> Result<Vec<Task>> {
        self.db.list_tasks(include_deleted).await
    }

    /// Get a task that has not been deleted
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::NotFound`] if the task does not exist or is soft-deleted.
    pub async fn get_task(&self, id: &TaskId) -> Result<Task> {
        self.db
            .get_task(id)
            .await?
            .filter(|task| !task.deleted)
            .ok_or_else(|| not_found(id))
    }

    /// Get a task's records in index order
    pub async fn get_records(&self, id: &TaskId) -> Result<Vec<Record>> {
        self.get_task(id).await?;
        self.db.list_records(id).await
    }
}

pub(crate) fn not_found(id: &TaskId) -> Error {
    Error::Task(TaskError::NotFound { id: id.to_string() })
}

/// Distinct source file names of the records, in first-seen order
fn source_file_names(new_task: &NewTask) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for record in &new_task.records {
        let name = &record.source_file_name;
        if !name.is_empty() && !names.contains(name) {
            names.push(name.clone());
        }
    }
    names
}
