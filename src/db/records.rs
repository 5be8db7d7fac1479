//! Record storage: bulk ingestion, per-record translation writes and status counts.

use crate::error::DatabaseError;
use crate::types::{NewRecord, Record, RecordStatus, TaskId};
use crate::{Error, Result};

use super::{Database, RecordCounts, RecordRow, now_millis, to_count};

const RECORD_COLUMNS: &str = r#"
    task_id, idx, record_number, total_records, source_file_name, source_file_index,
    index_in_file, original_title, original_abstract, translated_title,
    translated_abstract, metadata, status, error_message, translated_by_model
"#;

impl Database {
    /// Insert a task's parsed records in one transaction and set its total count
    ///
    /// Records are numbered 1..=n in the given order; `index_in_file` defaults to
    /// the record's position when the parser did not supply one.
    pub async fn insert_records(&self, task_id: &TaskId, records: &[NewRecord]) -> Result<u32> {
        let total = u32::try_from(records.len()).map_err(|_| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Too many records for one task: {}",
                records.len()
            )))
        })?;

        let mut tx = self.pool.begin().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to begin record insert transaction: {}",
                e
            )))
        })?;

        for (position, record) in records.iter().enumerate() {
            let number = position as i64 + 1;
            let metadata = serde_json::to_string(&record.metadata)?;

            sqlx::query(
                r#"
                INSERT INTO records (
                    task_id, idx, record_number, total_records, source_file_name,
                    source_file_index, index_in_file, original_title, original_abstract,
                    metadata, status
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'pending')
                "#,
            )
            .bind(task_id)
            .bind(number)
            .bind(number)
            .bind(total as i64)
            .bind(&record.source_file_name)
            .bind(record.source_file_index as i64)
            .bind(record.index_in_file.map(i64::from).unwrap_or(number))
            .bind(&record.title)
            .bind(&record.abstract_text)
            .bind(metadata)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to insert record {}: {}",
                    number, e
                )))
            })?;
        }

        sqlx::query("UPDATE tasks SET total_count = ?, updated_at = ? WHERE id = ?")
            .bind(total as i64)
            .bind(now_millis())
            .bind(task_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to set task total: {}",
                    e
                )))
            })?;

        tx.commit().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to commit record insert transaction: {}",
                e
            )))
        })?;

        Ok(total)
    }

    /// All records of a task, in index order
    pub async fn list_records(&self, task_id: &TaskId) -> Result<Vec<Record>> {
        let sql = format!(
            "SELECT {} FROM records WHERE task_id = ? ORDER BY idx ASC",
            RECORD_COLUMNS
        );
        let rows = sqlx::query_as::<_, RecordRow>(&sql)
            .bind(task_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to list records: {}",
                    e
                )))
            })?;

        rows.into_iter().map(Record::try_from).collect()
    }

    /// One record by its 1-based index
    pub async fn get_record(&self, task_id: &TaskId, index: u32) -> Result<Option<Record>> {
        let sql = format!(
            "SELECT {} FROM records WHERE task_id = ? AND idx = ?",
            RECORD_COLUMNS
        );
        let row = sqlx::query_as::<_, RecordRow>(&sql)
            .bind(task_id)
            .bind(index as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to get record: {}",
                    e
                )))
            })?;

        row.map(Record::try_from).transpose()
    }

    /// Persist a record's translation state
    ///
    /// Only the mutable columns are written; originals and metadata never change
    /// after ingestion.
    pub async fn save_record(&self, task_id: &TaskId, record: &Record) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE records SET
                translated_title = ?,
                translated_abstract = ?,
                status = ?,
                error_message = ?,
                translated_by_model = ?
            WHERE task_id = ? AND idx = ?
            "#,
        )
        .bind(&record.translated_title)
        .bind(&record.translated_abstract)
        .bind(record.status.as_str())
        .bind(&record.error_message)
        .bind(&record.translated_by_model)
        .bind(task_id)
        .bind(record.index as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to save record {}: {}",
                record.index, e
            )))
        })?;

        Ok(())
    }

    /// Count a task's records per status
    pub async fn count_records_by_status(&self, task_id: &TaskId) -> Result<RecordCounts> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT status, COUNT(*) FROM records WHERE task_id = ? GROUP BY status",
        )
        .bind(task_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to count records: {}",
                e
            )))
        })?;

        let mut counts = RecordCounts::default();
        for (status, count) in rows {
            let count = to_count(count);
            match RecordStatus::parse(&status) {
                Some(RecordStatus::Pending) => counts.pending = count,
                Some(RecordStatus::Translating) => counts.translating = count,
                Some(RecordStatus::Completed) => counts.completed = count,
                Some(RecordStatus::Failed) => counts.failed = count,
                None => {
                    tracing::warn!(task_id = %task_id, status = %status, "ignoring records with unknown status");
                }
            }
        }

        Ok(counts)
    }

    /// Return a task's stranded `translating` records to `pending`
    pub async fn rollback_translating(&self, task_id: &TaskId) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE records SET status = 'pending' WHERE task_id = ? AND status = 'translating'",
        )
        .bind(task_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to roll back translating records: {}",
                e
            )))
        })?;

        Ok(result.rows_affected())
    }

    /// Return every stranded `translating` record to `pending`, across all tasks
    pub async fn rollback_all_translating(&self) -> Result<u64> {
        let result = sqlx::query("UPDATE records SET status = 'pending' WHERE status = 'translating'")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to roll back translating records: {}",
                    e
                )))
            })?;

        Ok(result.rows_affected())
    }
}
