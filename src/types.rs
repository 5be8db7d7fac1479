//! Core types for biblio-translate

use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::config::ProviderConfig;

/// Unique identifier for a task: `YYYY-MM-DD/NNNN`
///
/// The date is the local creation date and `NNNN` a per-day sequence number,
/// so identifiers sort in creation order within a day.
#[derive(
    Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    /// Build the identifier for sequence `seq` on `date`
    pub fn from_parts(date: NaiveDate, seq: u32) -> Self {
        Self(format!("{}/{:04}", date.format("%Y-%m-%d"), seq))
    }

    /// Today's date partition (local time), as used in new identifiers
    pub fn today_partition() -> NaiveDate {
        Local::now().date_naive()
    }

    /// The `YYYY-MM-DD` partition of this identifier
    pub fn date_partition(&self) -> &str {
        self.0.split_once('/').map(|(date, _)| date).unwrap_or("")
    }

    /// The per-day sequence number, if the identifier is well formed
    pub fn sequence(&self) -> Option<u32> {
        self.0.split_once('/').and_then(|(_, seq)| seq.parse().ok())
    }

    /// Borrow the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for TaskId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for TaskId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

// Implement sqlx Type, Encode, and Decode for database operations
impl sqlx::Type<sqlx::Sqlite> for TaskId {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <String as sqlx::Type<sqlx::Sqlite>>::type_info()
    }

    fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for TaskId {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        sqlx::Encode::<sqlx::Sqlite>::encode_by_ref(&self.0, buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for TaskId {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let id = <String as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        Ok(Self(id))
    }
}

/// Task status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Ingestion is still splitting source files into records
    Parsing,
    /// Waiting for the scheduler
    Pending,
    /// An execution is draining the task's records
    Running,
    /// Stopped by an operator or by the consecutive-failure threshold
    Paused,
    /// Every record reached a final state
    Completed,
    /// Setup or execution failed unrecoverably
    Failed,
}

impl TaskStatus {
    /// Lowercase name, as stored and serialized
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Parsing => "parsing",
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Paused => "paused",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    /// Parse the stored lowercase name
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "parsing" => Some(TaskStatus::Parsing),
            "pending" => Some(TaskStatus::Pending),
            "running" => Some(TaskStatus::Running),
            "paused" => Some(TaskStatus::Paused),
            "completed" => Some(TaskStatus::Completed),
            "failed" => Some(TaskStatus::Failed),
            _ => None,
        }
    }

    /// States from which retry-failed and reset may rewrite records
    pub fn allows_requeue(&self) -> bool {
        matches!(
            self,
            TaskStatus::Paused | TaskStatus::Completed | TaskStatus::Failed
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    /// Not yet attempted in the current cycle
    Pending,
    /// Owned by exactly one worker
    Translating,
    /// Every requested field translated
    Completed,
    /// A requested field could not be translated
    Failed,
}

impl RecordStatus {
    /// Lowercase name, as stored and serialized
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Pending => "pending",
            RecordStatus::Translating => "translating",
            RecordStatus::Completed => "completed",
            RecordStatus::Failed => "failed",
        }
    }

    /// Parse the stored lowercase name
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(RecordStatus::Pending),
            "translating" => Some(RecordStatus::Translating),
            "completed" => Some(RecordStatus::Completed),
            "failed" => Some(RecordStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One translation job
///
/// Serialized with the camelCase field names of stored task documents.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Task identifier
    pub task_id: TaskId,
    /// Display name
    pub task_name: String,
    /// Primary source file name
    pub file_name: String,
    /// All source file names
    pub file_names: Vec<String>,
    /// Translate record titles
    pub translate_title: bool,
    /// Translate record abstracts
    pub translate_abstract: bool,
    /// Providers draining this task, with their worker counts
    #[serde(rename = "modelConfigs")]
    pub providers: Vec<ProviderConfig>,
    /// Number of records
    pub total_count: u32,
    /// Records completed
    pub completed_count: u32,
    /// Records failed
    pub failed_count: u32,
    /// Lifecycle status
    pub status: TaskStatus,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
    /// Soft-delete flag
    pub deleted: bool,
}

impl Task {
    /// Ledger key of the provider this task is bound to (its first provider)
    pub fn ledger_key(&self) -> Option<&str> {
        self.providers.first().map(ProviderConfig::ledger_key)
    }

    /// Copy with provider API keys masked
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        copy.providers = self.providers.iter().map(ProviderConfig::redacted).collect();
        copy
    }
}

/// Bibliographic fields carried through translation untouched
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecordMetadata {
    /// Author list as exported
    #[serde(default)]
    pub authors: String,
    /// Journal or proceedings title
    #[serde(default)]
    pub source: String,
    /// Volume
    #[serde(default)]
    pub volume: String,
    /// Issue
    #[serde(default)]
    pub issue: String,
    /// Page range
    #[serde(default)]
    pub pages: String,
    /// DOI
    #[serde(default)]
    pub doi: String,
    /// Early access date
    #[serde(default)]
    pub early_access_date: String,
    /// Publication date
    #[serde(default)]
    pub published_date: String,
    /// Accession number in the exporting database
    #[serde(default)]
    pub accession_number: String,
    /// Print ISSN
    #[serde(default)]
    pub issn: String,
    /// Electronic ISSN
    #[serde(default)]
    pub eissn: String,
}

/// One bibliographic entry belonging to a task
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Task-relative index (1-based)
    pub index: u32,
    /// Global sequence number across all source files
    pub record_number: u32,
    /// Number of records in the task
    pub total_records: u32,
    /// Source file this record came from
    pub source_file_name: String,
    /// 1-based position of the source file
    pub source_file_index: u32,
    /// 1-based position within the source file
    pub index_in_file: u32,
    /// Title as exported
    pub original_title: String,
    /// Abstract as exported
    pub original_abstract: String,
    /// Translated title
    pub translated_title: String,
    /// Translated abstract
    pub translated_abstract: String,
    /// Untouched bibliographic fields
    #[serde(flatten)]
    pub metadata: RecordMetadata,
    /// Translation status
    pub status: RecordStatus,
    /// Last error message
    pub error_message: String,
    /// Display name of the provider that translated the record
    pub translated_by_model: String,
}

impl Record {
    /// Return the record to `pending`, clearing every translation artifact
    pub fn clear_translation(&mut self) {
        self.status = RecordStatus::Pending;
        self.translated_title.clear();
        self.translated_abstract.clear();
        self.error_message.clear();
        self.translated_by_model.clear();
    }
}

/// A parsed record handed over by ingestion
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewRecord {
    /// Source file this record came from
    #[serde(default)]
    pub source_file_name: String,
    /// 1-based position of the source file (default: 1)
    #[serde(default = "default_one")]
    pub source_file_index: u32,
    /// 1-based position within the source file (default: its position in the batch)
    #[serde(default)]
    pub index_in_file: Option<u32>,
    /// Title as exported
    #[serde(default)]
    pub title: String,
    /// Abstract as exported
    #[serde(default, rename = "abstract")]
    pub abstract_text: String,
    /// Untouched bibliographic fields
    #[serde(flatten)]
    pub metadata: RecordMetadata,
}

/// Options for creating a task from already-parsed records
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    /// Display name (defaults to the first file name)
    #[serde(default)]
    pub task_name: String,
    /// Source file names
    #[serde(default)]
    pub file_names: Vec<String>,
    /// Translate record titles (default: true)
    #[serde(default = "default_true")]
    pub translate_title: bool,
    /// Translate record abstracts (default: true)
    #[serde(default = "default_true")]
    pub translate_abstract: bool,
    /// Providers that will drain the task
    #[serde(rename = "modelConfigs")]
    pub providers: Vec<ProviderConfig>,
    /// Parsed records, in source order
    pub records: Vec<NewRecord>,
}

/// Field of a record being translated
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TranslateField {
    /// Record title
    Title,
    /// Record abstract
    Abstract,
}

impl TranslateField {
    /// Label inserted into the translation instruction
    pub fn prompt_label(&self) -> &'static str {
        match self {
            TranslateField::Title => "标题",
            TranslateField::Abstract => "摘要",
        }
    }

    /// Prefix of the record error message when this field fails
    pub fn failure_prefix(&self) -> &'static str {
        match self {
            TranslateField::Title => "Title translation failed",
            TranslateField::Abstract => "Abstract translation failed",
        }
    }
}

/// Outcome of translating one fragment, retries included
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationResult {
    /// The fragment was translated
    pub success: bool,
    /// Translated text (empty on failure)
    pub translated_text: String,
    /// Last error message (empty on success)
    pub error_message: String,
    /// Index of the attempt that produced this result (0 = first try)
    pub retry_count: u32,
}

impl TranslationResult {
    /// Successful translation after `retry_count` retries
    pub fn translated(text: String, retry_count: u32) -> Self {
        Self {
            success: true,
            translated_text: text,
            error_message: String::new(),
            retry_count,
        }
    }

    /// Failed translation after `retry_count` retries
    pub fn failed(message: impl Into<String>, retry_count: u32) -> Self {
        Self {
            success: false,
            translated_text: String::new(),
            error_message: message.into(),
            retry_count,
        }
    }
}

/// Result of probing a provider endpoint
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionTestResult {
    /// The endpoint accepted the request
    pub success: bool,
    /// HTTP status, if a response was received
    pub http_code: Option<u16>,
    /// Why the probe failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Round-trip time in milliseconds
    pub latency_ms: u64,
}

/// Number of records rewritten by retry-failed or reset
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RequeueSummary {
    /// Records moved back to `pending`
    pub reset_count: u32,
}

/// Point-in-time view of the scheduler's bookkeeping
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct SchedulerStatus {
    /// The control loop is running
    pub running: bool,
    /// Tasks holding a ledger slot
    pub running_tasks: usize,
    /// Ledger slots held per provider
    pub provider_load: std::collections::BTreeMap<String, usize>,
    /// Tasks selected or executing and not yet reaped
    #[schema(value_type = Vec<String>)]
    pub scheduled: Vec<TaskId>,
    /// Current ceilings
    pub limits: crate::config::SchedulerLimits,
}

fn default_one() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_id_formats_date_and_zero_padded_sequence() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let id = TaskId::from_parts(date, 7);

        assert_eq!(id.as_str(), "2024-05-01/0007");
        assert_eq!(id.date_partition(), "2024-05-01");
        assert_eq!(id.sequence(), Some(7));
    }

    #[test]
    fn malformed_task_id_has_no_sequence() {
        assert_eq!(TaskId::from("legacy").sequence(), None);
        assert_eq!(TaskId::from("2024-05-01/x").sequence(), None);
    }

    #[test]
    fn statuses_round_trip_through_stored_names() {
        for status in [
            TaskStatus::Parsing,
            TaskStatus::Pending,
            TaskStatus::Running,
            TaskStatus::Paused,
            TaskStatus::Completed,
            TaskStatus::Failed,
        ] {
            assert_eq!(TaskStatus::parse(status.as_str()), Some(status));
            assert_eq!(
                serde_json::to_value(status).unwrap(),
                serde_json::Value::String(status.as_str().to_string())
            );
        }
        assert_eq!(RecordStatus::parse("translating"), Some(RecordStatus::Translating));
        assert_eq!(RecordStatus::parse("done"), None);
    }

    #[test]
    fn only_stopped_states_allow_requeue() {
        assert!(TaskStatus::Paused.allows_requeue());
        assert!(TaskStatus::Completed.allows_requeue());
        assert!(TaskStatus::Failed.allows_requeue());
        assert!(!TaskStatus::Running.allows_requeue());
        assert!(!TaskStatus::Pending.allows_requeue());
        assert!(!TaskStatus::Parsing.allows_requeue());
    }

    #[test]
    fn record_serializes_flat_document_fields() {
        let record = Record {
            index: 1,
            record_number: 1,
            total_records: 2,
            source_file_name: "savedrecs.html".into(),
            source_file_index: 1,
            index_in_file: 1,
            original_title: "Deep learning".into(),
            original_abstract: String::new(),
            translated_title: "深度学习".into(),
            translated_abstract: String::new(),
            metadata: RecordMetadata {
                doi: "10.1000/xyz".into(),
                ..Default::default()
            },
            status: RecordStatus::Completed,
            error_message: String::new(),
            translated_by_model: "gpt".into(),
        };

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["recordNumber"], 1);
        assert_eq!(value["translatedTitle"], "深度学习");
        assert_eq!(value["doi"], "10.1000/xyz");
        assert_eq!(value["status"], "completed");
        assert_eq!(value["translatedByModel"], "gpt");
        assert!(value.get("metadata").is_none(), "metadata must be flattened");
    }

    #[test]
    fn clear_translation_resets_every_artifact() {
        let mut record = Record {
            index: 3,
            record_number: 3,
            total_records: 3,
            source_file_name: String::new(),
            source_file_index: 1,
            index_in_file: 3,
            original_title: "t".into(),
            original_abstract: "a".into(),
            translated_title: "x".into(),
            translated_abstract: "y".into(),
            metadata: RecordMetadata::default(),
            status: RecordStatus::Failed,
            error_message: "Title translation failed: HTTP 500".into(),
            translated_by_model: "m".into(),
        };

        record.clear_translation();

        assert_eq!(record.status, RecordStatus::Pending);
        assert!(record.translated_title.is_empty());
        assert!(record.translated_abstract.is_empty());
        assert!(record.error_message.is_empty());
        assert!(record.translated_by_model.is_empty());
        assert_eq!(record.original_title, "t", "originals must survive");
    }

    #[test]
    fn new_task_accepts_document_shape() {
        let json = r#"{
            "taskName": "batch",
            "fileNames": ["a.html"],
            "modelConfigs": [{"url": "https://x.test", "modelId": "m", "threads": 2}],
            "records": [{"title": "T", "abstract": "A", "doi": "10.1/1"}]
        }"#;
        let task: NewTask = serde_json::from_str(json).unwrap();

        assert!(task.translate_title && task.translate_abstract);
        assert_eq!(task.providers[0].threads, 2);
        assert_eq!(task.records[0].abstract_text, "A");
        assert_eq!(task.records[0].metadata.doi, "10.1/1");
        assert_eq!(task.records[0].source_file_index, 1);
    }
}
