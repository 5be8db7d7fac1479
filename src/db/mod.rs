//! Database layer for biblio-translate
//!
//! This is the Record Store: SQLite persistence for task documents and their
//! ordered records.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] - Database lifecycle, schema migrations
//! - [`tasks`] - Task documents, status and counter writes
//! - [`records`] - Per-record translation state

use crate::config::ProviderConfig;
use crate::error::DatabaseError;
use crate::types::{Record, RecordMetadata, RecordStatus, Task, TaskId, TaskStatus};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, sqlite::SqlitePool};

mod migrations;
mod records;
mod tasks;

/// New task to be inserted into the database
#[derive(Debug, Clone)]
pub struct NewTaskRow<'a> {
    /// Generated identifier
    pub id: &'a TaskId,
    /// Display name
    pub name: &'a str,
    /// Source file names
    pub file_names: &'a [String],
    /// Translate titles
    pub translate_title: bool,
    /// Translate abstracts
    pub translate_abstract: bool,
    /// Provider configurations
    pub providers: &'a [ProviderConfig],
}

/// Task row from database
#[derive(Debug, Clone, FromRow)]
pub struct TaskRow {
    /// Task identifier
    pub id: TaskId,
    /// Display name
    pub name: String,
    /// JSON array of source file names
    pub file_names: String,
    /// Translate titles (0/1)
    pub translate_title: i32,
    /// Translate abstracts (0/1)
    pub translate_abstract: i32,
    /// JSON array of provider configurations
    pub providers: String,
    /// Number of records
    pub total_count: i64,
    /// Records completed
    pub completed_count: i64,
    /// Records failed
    pub failed_count: i64,
    /// Lowercase status name
    pub status: String,
    /// Creation time, unix milliseconds
    pub created_at: i64,
    /// Last mutation time, unix milliseconds
    pub updated_at: i64,
    /// Soft-delete flag (0/1)
    pub deleted: i32,
}

impl TryFrom<TaskRow> for Task {
    type Error = Error;

    fn try_from(row: TaskRow) -> Result<Self> {
        let status = TaskStatus::parse(&row.status).ok_or_else(|| {
            Error::Database(DatabaseError::CorruptRow(format!(
                "task {} has unknown status '{}'",
                row.id, row.status
            )))
        })?;
        let file_names: Vec<String> = serde_json::from_str(&row.file_names)?;
        let providers: Vec<ProviderConfig> = serde_json::from_str(&row.providers)?;

        Ok(Task {
            file_name: file_names.first().cloned().unwrap_or_default(),
            task_id: row.id,
            task_name: row.name,
            file_names,
            translate_title: row.translate_title != 0,
            translate_abstract: row.translate_abstract != 0,
            providers,
            total_count: to_count(row.total_count),
            completed_count: to_count(row.completed_count),
            failed_count: to_count(row.failed_count),
            status,
            created_at: from_millis(row.created_at),
            updated_at: from_millis(row.updated_at),
            deleted: row.deleted != 0,
        })
    }
}

/// Record row from database
#[derive(Debug, Clone, FromRow)]
pub struct RecordRow {
    /// Owning task
    pub task_id: TaskId,
    /// Task-relative index (1-based)
    pub idx: i64,
    /// Global sequence number
    pub record_number: i64,
    /// Records in the task
    pub total_records: i64,
    /// Source file name
    pub source_file_name: String,
    /// 1-based source file position
    pub source_file_index: i64,
    /// 1-based position within the source file
    pub index_in_file: i64,
    /// Title as exported
    pub original_title: String,
    /// Abstract as exported
    pub original_abstract: String,
    /// Translated title
    pub translated_title: String,
    /// Translated abstract
    pub translated_abstract: String,
    /// JSON object of untouched bibliographic fields
    pub metadata: String,
    /// Lowercase status name
    pub status: String,
    /// Last error message
    pub error_message: String,
    /// Provider display name
    pub translated_by_model: String,
}

impl TryFrom<RecordRow> for Record {
    type Error = Error;

    fn try_from(row: RecordRow) -> Result<Self> {
        let status = RecordStatus::parse(&row.status).ok_or_else(|| {
            Error::Database(DatabaseError::CorruptRow(format!(
                "record {}#{} has unknown status '{}'",
                row.task_id, row.idx, row.status
            )))
        })?;
        let metadata: RecordMetadata = serde_json::from_str(&row.metadata)?;

        Ok(Record {
            index: to_count(row.idx),
            record_number: to_count(row.record_number),
            total_records: to_count(row.total_records),
            source_file_name: row.source_file_name,
            source_file_index: to_count(row.source_file_index),
            index_in_file: to_count(row.index_in_file),
            original_title: row.original_title,
            original_abstract: row.original_abstract,
            translated_title: row.translated_title,
            translated_abstract: row.translated_abstract,
            metadata,
            status,
            error_message: row.error_message,
            translated_by_model: row.translated_by_model,
        })
    }
}

/// Record counts grouped by status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordCounts {
    /// Records in `pending`
    pub pending: u32,
    /// Records in `translating`
    pub translating: u32,
    /// Records in `completed`
    pub completed: u32,
    /// Records in `failed`
    pub failed: u32,
}

/// Database handle for biblio-translate
pub struct Database {
    pool: SqlitePool,
}

fn to_count(value: i64) -> u32 {
    u32::try_from(value).unwrap_or(0)
}

fn from_millis(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
