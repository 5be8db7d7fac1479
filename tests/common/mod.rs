//! Common test utilities for biblio-translate end-to-end tests

#![allow(dead_code)]

use biblio_translate::{BiblioTranslator, Config, NewTask, Task, TaskId, TaskStatus};
use serde_json::{Value, json};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Answers chat-completion requests with `译:` plus the text to translate,
/// preceded by a reasoning block the client must strip
pub struct EchoTranslation;

impl Respond for EchoTranslation {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = serde_json::from_slice(&request.body).unwrap_or_default();
        let prompt = body["messages"][1]["content"].as_str().unwrap_or_default();
        let text = prompt.split_once("\n\n").map(|(_, text)| text).unwrap_or(prompt);

        ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": format!("<think>thinking about it</think>\n译:{text}")
                }
            }]
        }))
    }
}

/// Mount a provider that translates every request
pub async fn mount_echo_provider(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(EchoTranslation)
        .mount(server)
        .await;
}

/// Mount a provider that rejects every request with `status`
pub async fn mount_failing_provider(server: &MockServer, status: u16, message: &str) {
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(status).set_body_json(json!({"error": {"message": message}})),
        )
        .mount(server)
        .await;
}

/// Configuration with a temporary database and fast timings
pub fn test_config(temp_dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.persistence.database_path = temp_dir.path().join("translate.db");
    config.scheduler.poll_interval = Duration::from_millis(20);
    config.scheduler.error_backoff = Duration::from_millis(20);
    config.scheduler.shutdown_timeout = Duration::from_secs(5);
    config.retry.max_retries = 0;
    config
}

/// Start a translator on `config` with its scheduler loop running
pub async fn start_translator(config: Config) -> BiblioTranslator {
    let translator = BiblioTranslator::new(config).await.unwrap();
    translator.start().await.unwrap();
    translator
}

/// Provider configuration pointing at `server`
pub fn provider_json(server: &MockServer, id: &str, threads: usize) -> Value {
    json!({
        "id": id,
        "name": format!("{id} model"),
        "url": format!("{}/v1", server.uri()),
        "apiKey": "sk-test",
        "modelId": format!("{id}-model"),
        "threads": threads,
    })
}

/// Task document with `records` records titled `Title N`, as ingestion would submit it
pub fn task_json(providers: Vec<Value>, records: usize) -> Value {
    let records: Vec<Value> = (1..=records)
        .map(|n| {
            json!({
                "sourceFileName": "savedrecs.html",
                "title": format!("Title {n}"),
                "abstract": format!("Abstract {n}"),
                "authors": format!("Author {n}"),
                "doi": format!("10.1000/{n}"),
            })
        })
        .collect();

    json!({
        "taskName": "Survey",
        "fileNames": ["savedrecs.html"],
        "modelConfigs": providers,
        "records": records,
    })
}

/// Deserialize a task document
pub fn new_task(document: Value) -> NewTask {
    serde_json::from_value(document).unwrap()
}

/// Poll until the task reaches `status`
pub async fn wait_for_status(translator: &BiblioTranslator, id: &TaskId, status: TaskStatus) -> Task {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(15);
    loop {
        let task = translator.get_task(id).await.unwrap();
        if task.status == status {
            return task;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "task {id} stuck in {} waiting for {status}",
            task.status
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Poll until every execution has ended and been reaped
pub async fn wait_until_idle(translator: &BiblioTranslator) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(15);
    loop {
        let status = translator.scheduler_status().await;
        if status.running_tasks == 0 && status.scheduled.is_empty() {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "scheduler never went idle"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
