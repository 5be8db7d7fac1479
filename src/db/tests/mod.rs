use crate::config::ProviderConfig;
use crate::db::*;
use crate::types::{NewRecord, TaskId, TaskStatus};
use chrono::NaiveDate;
use tempfile::NamedTempFile;


fn provider(id: &str) -> ProviderConfig {
    serde_json::from_value(serde_json::json!({
        "id": id,
        "name": format!("{id} model"),
        "url": "https://api.example.com/v1",
        "apiKey": "sk-test",
        "modelId": format!("{id}-model"),
    }))
    .unwrap()
}

fn new_record(n: usize) -> NewRecord {
    NewRecord {
        source_file_name: "savedrecs.html".to_string(),
        title: format!("Title {n}"),
        abstract_text: format!("Abstract {n}"),
        ..Default::default()
    }
}

fn task_id(seq: u32) -> TaskId {
    TaskId::from_parts(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(), seq)
}

/// Open a fresh database, keeping the backing file alive alongside it
async fn open_db() -> (NamedTempFile, Database) {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();
    (temp_file, db)
}

/// Insert a task with `records` pending records in the given status
async fn seed_task(db: &Database, id: &TaskId, records: usize, status: TaskStatus) {
    let file_names = vec!["savedrecs.html".to_string()];
    let providers = vec![provider("p1")];
    let row = NewTaskRow {
        id,
        name: "batch",
        file_names: &file_names,
        translate_title: true,
        translate_abstract: true,
        providers: &providers,
    };
    db.insert_task(&row, status).await.unwrap();

    let new_records: Vec<NewRecord> = (1..=records).map(new_record).collect();
    db.insert_records(id, &new_records).await.unwrap();
}
