//! Task document CRUD, status transitions and counter writes.

use crate::config::ProviderConfig;
use crate::error::DatabaseError;
use crate::types::{Task, TaskId, TaskStatus};
use crate::{Error, Result};

use super::{Database, NewTaskRow, TaskRow, now_millis};

const TASK_COLUMNS: &str = r#"
    id, name, file_names, translate_title, translate_abstract, providers,
    total_count, completed_count, failed_count, status,
    created_at, updated_at, deleted
"#;

fn query_failed(action: &str, e: impl std::fmt::Display) -> Error {
    Error::Database(DatabaseError::QueryFailed(format!(
        "Failed to {}: {}",
        action, e
    )))
}

impl Database {
    /// Insert a new task document with zero counters
    pub async fn insert_task(&self, task: &NewTaskRow<'_>, status: TaskStatus) -> Result<()> {
        let now = now_millis();
        let file_names = serde_json::to_string(task.file_names)?;
        let providers = serde_json::to_string(task.providers)?;

        sqlx::query(
            r#"
            INSERT INTO tasks (
                id, name, file_names, translate_title, translate_abstract, providers,
                total_count, completed_count, failed_count, status,
                created_at, updated_at, deleted
            ) VALUES (?, ?, ?, ?, ?, ?, 0, 0, 0, ?, ?, ?, 0)
            "#,
        )
        .bind(task.id)
        .bind(task.name)
        .bind(file_names)
        .bind(task.translate_title as i32)
        .bind(task.translate_abstract as i32)
        .bind(providers)
        .bind(status.as_str())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| query_failed("insert task", e))?;

        Ok(())
    }

    /// Highest sequence number already used on `date` (`YYYY-MM-DD`), 0 if none
    ///
    /// Soft-deleted and purged identifiers are never reused within a day as long
    /// as a later one exists; deleted rows still count here.
    pub async fn max_task_sequence(&self, date: &str) -> Result<u32> {
        let ids: Vec<TaskId> = sqlx::query_scalar("SELECT id FROM tasks WHERE id LIKE ?")
            .bind(format!("{}/%", date))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| query_failed("query task sequences", e))?;

        Ok(ids.iter().filter_map(TaskId::sequence).max().unwrap_or(0))
    }

    /// Get a task by ID, including soft-deleted ones
    pub async fn get_task(&self, id: &TaskId) -> Result<Option<Task>> {
        let sql = format!("SELECT {} FROM tasks WHERE id = ?", TASK_COLUMNS);
        let row = sqlx::query_as::<_, TaskRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| query_failed("get task", e))?;

        row.map(Task::try_from).transpose()
    }

    /// List tasks in creation order
    pub async fn list_tasks(&self, include_deleted: bool) -> Result<Vec<Task>> {
        let sql = format!(
            "SELECT {} FROM tasks WHERE deleted = 0 OR ? ORDER BY created_at ASC, id ASC",
            TASK_COLUMNS
        );
        let rows = sqlx::query_as::<_, TaskRow>(&sql)
            .bind(include_deleted as i32)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| query_failed("list tasks", e))?;

        rows.into_iter().map(Task::try_from).collect()
    }

    /// Non-deleted `pending` tasks, oldest first (ties broken by ID)
    pub async fn list_pending_tasks(&self) -> Result<Vec<Task>> {
        let sql = format!(
            r#"
            SELECT {} FROM tasks
            WHERE status = 'pending' AND deleted = 0
            ORDER BY created_at ASC, id ASC
            "#,
            TASK_COLUMNS
        );
        let rows = sqlx::query_as::<_, TaskRow>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| query_failed("list pending tasks", e))?;

        rows.into_iter().map(Task::try_from).collect()
    }

    /// Current status of a non-deleted task
    pub async fn get_task_status(&self, id: &TaskId) -> Result<Option<TaskStatus>> {
        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM tasks WHERE id = ? AND deleted = 0")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| query_failed("get task status", e))?;

        Ok(status.as_deref().and_then(TaskStatus::parse))
    }

    /// Move a non-deleted task from `from` to `to`
    ///
    /// Returns false when the task was not in `from` (or is deleted); nothing is
    /// written in that case.
    pub async fn transition_status(
        &self,
        id: &TaskId,
        from: TaskStatus,
        to: TaskStatus,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE tasks SET status = ?, updated_at = ?
            WHERE id = ? AND status = ? AND deleted = 0
            "#,
        )
        .bind(to.as_str())
        .bind(now_millis())
        .bind(id)
        .bind(from.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| query_failed("transition task status", e))?;

        Ok(result.rows_affected() > 0)
    }

    /// Write live progress counters and return the task's current status
    ///
    /// Returns `None` if the task has been deleted underneath the execution.
    pub async fn update_task_progress(
        &self,
        id: &TaskId,
        completed: u32,
        failed: u32,
    ) -> Result<Option<TaskStatus>> {
        let status: Option<String> = sqlx::query_scalar(
            r#"
            UPDATE tasks SET completed_count = ?, failed_count = ?, updated_at = ?
            WHERE id = ? AND deleted = 0
            RETURNING status
            "#,
        )
        .bind(completed as i64)
        .bind(failed as i64)
        .bind(now_millis())
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| query_failed("update task progress", e))?;

        Ok(status.as_deref().and_then(TaskStatus::parse))
    }

    /// Persist the final counters of an execution
    ///
    /// The status only moves to `next` while the task is still `running`; a
    /// concurrent pause or delete wins. Returns the status after the write.
    pub async fn finish_execution(
        &self,
        id: &TaskId,
        completed: u32,
        failed: u32,
        next: TaskStatus,
    ) -> Result<Option<TaskStatus>> {
        let status: Option<String> = sqlx::query_scalar(
            r#"
            UPDATE tasks SET
                completed_count = ?,
                failed_count = ?,
                status = CASE WHEN status = 'running' THEN ? ELSE status END,
                updated_at = ?
            WHERE id = ?
            RETURNING status
            "#,
        )
        .bind(completed as i64)
        .bind(failed as i64)
        .bind(next.as_str())
        .bind(now_millis())
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| query_failed("finish task execution", e))?;

        Ok(status.as_deref().and_then(TaskStatus::parse))
    }

    /// Recompute a task's counters from its records
    pub async fn recount_task(&self, id: &TaskId) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE tasks SET
                completed_count = (
                    SELECT COUNT(*) FROM records WHERE task_id = tasks.id AND status = 'completed'
                ),
                failed_count = (
                    SELECT COUNT(*) FROM records WHERE task_id = tasks.id AND status = 'failed'
                ),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(now_millis())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| query_failed("recount task", e))?;

        Ok(())
    }

    /// Requeue a stopped task: reset records and move it back to `pending`
    ///
    /// Only `failed` records are reset when `failed_only` is set, otherwise every
    /// record is. Stranded `translating` records are always returned to `pending`.
    /// `providers` replaces the task's provider list when given.
    ///
    /// Returns the number of records reset, or `None` if the task was not in a
    /// requeueable state when the transaction ran.
    pub async fn requeue_task(
        &self,
        id: &TaskId,
        providers: Option<&[ProviderConfig]>,
        failed_only: bool,
    ) -> Result<Option<u32>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| query_failed("begin requeue transaction", e))?;

        let now = now_millis();
        let providers = providers.map(serde_json::to_string).transpose()?;

        let claimed = sqlx::query(
            r#"
            UPDATE tasks SET status = 'pending', providers = COALESCE(?, providers), updated_at = ?
            WHERE id = ? AND deleted = 0 AND status IN ('paused', 'completed', 'failed')
            "#,
        )
        .bind(providers)
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(|e| query_failed("requeue task", e))?;

        if claimed.rows_affected() == 0 {
            // Dropping the transaction rolls it back
            return Ok(None);
        }

        let reset_sql = if failed_only {
            r#"
            UPDATE records SET
                status = 'pending', translated_title = '', translated_abstract = '',
                error_message = '', translated_by_model = ''
            WHERE task_id = ? AND status = 'failed'
            "#
        } else {
            r#"
            UPDATE records SET
                status = 'pending', translated_title = '', translated_abstract = '',
                error_message = '', translated_by_model = ''
            WHERE task_id = ?
            "#
        };

        let reset = sqlx::query(reset_sql)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| query_failed("reset records", e))?;

        sqlx::query("UPDATE records SET status = 'pending' WHERE task_id = ? AND status = 'translating'")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| query_failed("roll back translating records", e))?;

        sqlx::query(
            r#"
            UPDATE tasks SET
                completed_count = (
                    SELECT COUNT(*) FROM records WHERE task_id = tasks.id AND status = 'completed'
                ),
                failed_count = (
                    SELECT COUNT(*) FROM records WHERE task_id = tasks.id AND status = 'failed'
                )
            WHERE id = ?
            "#,
        )
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(|e| query_failed("recount requeued task", e))?;

        tx.commit()
            .await
            .map_err(|e| query_failed("commit requeue transaction", e))?;

        Ok(Some(u32::try_from(reset.rows_affected()).unwrap_or(u32::MAX)))
    }

    /// Soft-delete a task; returns false if it does not exist or is already deleted
    pub async fn set_task_deleted(&self, id: &TaskId) -> Result<bool> {
        let result = sqlx::query("UPDATE tasks SET deleted = 1, updated_at = ? WHERE id = ? AND deleted = 0")
            .bind(now_millis())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| query_failed("soft-delete task", e))?;

        Ok(result.rows_affected() > 0)
    }

    /// Remove a task and its records; returns false if it did not exist
    pub async fn delete_task_permanently(&self, id: &TaskId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| query_failed("delete task", e))?;

        Ok(result.rows_affected() > 0)
    }

    /// Return every `running` task to `pending`
    ///
    /// Run at startup (no execution can be live yet) and after shutdown aborts
    /// stragglers. Returns the number of tasks requeued.
    pub async fn requeue_running_tasks(&self) -> Result<u64> {
        let result = sqlx::query("UPDATE tasks SET status = 'pending', updated_at = ? WHERE status = 'running'")
            .bind(now_millis())
            .execute(&self.pool)
            .await
            .map_err(|e| query_failed("requeue running tasks", e))?;

        Ok(result.rows_affected())
    }
}
