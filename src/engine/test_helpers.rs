//! Shared test helpers: scripted providers and translator construction.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::sync::{Semaphore, mpsc};

use crate::config::{Config, ProviderConfig};
use crate::engine::BiblioTranslator;
use crate::error::{Error, Result};
use crate::provider::{ProviderClient, ProviderFactory};
use crate::types::{
    ConnectionTestResult, NewRecord, NewTask, Task, TaskId, TaskStatus, TranslateField,
    TranslationResult,
};

/// How a scripted provider answers
#[derive(Clone, Debug)]
pub(crate) enum Behaviour {
    /// Translate everything as `译:{text}`
    Succeed,
    /// Fail every request with this message
    Fail(String),
    /// Fail requests whose text contains this fragment, translate the rest
    FailMatching(String),
}

/// One translate call seen by a scripted provider
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Call {
    pub(crate) provider: String,
    pub(crate) text: String,
}

/// Holds translate calls until the test lets them through
pub(crate) struct Gate {
    started_tx: mpsc::UnboundedSender<String>,
    started_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<String>>,
    permits: Semaphore,
}

impl Gate {
    fn new() -> Self {
        let (started_tx, started_rx) = mpsc::unbounded_channel();
        Self {
            started_tx,
            started_rx: tokio::sync::Mutex::new(started_rx),
            permits: Semaphore::new(0),
        }
    }

    async fn enter(&self, text: &str) {
        let _ = self.started_tx.send(text.to_string());
        if let Ok(permit) = self.permits.acquire().await {
            permit.forget();
        }
    }

    /// Wait until a call reaches the gate and return its text
    pub(crate) async fn wait_started(&self) -> String {
        let mut rx = self.started_rx.lock().await;
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("no translate call reached the gate")
            .expect("gate channel closed")
    }

    /// Let `n` held or future calls through
    pub(crate) fn release(&self, n: usize) {
        self.permits.add_permits(n);
    }
}

#[derive(Default)]
struct MockState {
    default: Mutex<Option<Behaviour>>,
    behaviours: Mutex<HashMap<String, Behaviour>>,
    calls: Mutex<Vec<Call>>,
    gate: Mutex<Option<Arc<Gate>>>,
    delay: Mutex<Duration>,
    clients_built: AtomicUsize,
    refuse_clients: AtomicBool,
}

impl MockState {
    fn behaviour_for(&self, provider: &str) -> Behaviour {
        self.behaviours
            .lock()
            .get(provider)
            .cloned()
            .or_else(|| self.default.lock().clone())
            .unwrap_or(Behaviour::Succeed)
    }
}

/// Builds scripted clients sharing one call log
#[derive(Default)]
pub(crate) struct MockProviderFactory {
    state: Arc<MockState>,
}

impl MockProviderFactory {
    /// Behaviour of providers without an explicit one
    pub(crate) fn set_default(&self, behaviour: Behaviour) {
        *self.state.default.lock() = Some(behaviour);
    }

    /// Behaviour of the provider configured with id `provider`
    pub(crate) fn set_behaviour(&self, provider: &str, behaviour: Behaviour) {
        self.state
            .behaviours
            .lock()
            .insert(provider.to_string(), behaviour);
    }

    /// Delay every translate call by `delay`
    pub(crate) fn set_delay(&self, delay: Duration) {
        *self.state.delay.lock() = delay;
    }

    /// Hold every translate call at a gate from now on
    pub(crate) fn install_gate(&self) -> Arc<Gate> {
        let gate = Arc::new(Gate::new());
        *self.state.gate.lock() = Some(Arc::clone(&gate));
        gate
    }

    /// Make `client` fail, as if the provider configuration were unusable
    pub(crate) fn refuse_clients(&self) {
        self.state.refuse_clients.store(true, Ordering::SeqCst);
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.state.calls.lock().clone()
    }

    pub(crate) fn clients_built(&self) -> usize {
        self.state.clients_built.load(Ordering::SeqCst)
    }
}

impl ProviderFactory for MockProviderFactory {
    fn client(&self, provider: &ProviderConfig) -> Result<Arc<dyn ProviderClient>> {
        if self.state.refuse_clients.load(Ordering::SeqCst) {
            return Err(Error::Other("provider client unavailable".into()));
        }
        self.state.clients_built.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockProvider {
            provider: provider.id.clone(),
            state: Arc::clone(&self.state),
        }))
    }
}

struct MockProvider {
    provider: String,
    state: Arc<MockState>,
}

#[async_trait]
impl ProviderClient for MockProvider {
    async fn translate(&self, text: &str, _field: TranslateField) -> TranslationResult {
        let gate = self.state.gate.lock().clone();
        if let Some(gate) = gate {
            gate.enter(text).await;
        }
        let delay = *self.state.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.state.calls.lock().push(Call {
            provider: self.provider.clone(),
            text: text.to_string(),
        });

        match self.state.behaviour_for(&self.provider) {
            Behaviour::Succeed => TranslationResult::translated(format!("译:{text}"), 0),
            Behaviour::Fail(message) => TranslationResult::failed(message, 3),
            Behaviour::FailMatching(fragment) if text.contains(&fragment) => {
                TranslationResult::failed("HTTP 500", 3)
            }
            Behaviour::FailMatching(_) => TranslationResult::translated(format!("译:{text}"), 0),
        }
    }

    async fn test_connection(&self) -> ConnectionTestResult {
        match self.state.behaviour_for(&self.provider) {
            Behaviour::Fail(message) => ConnectionTestResult {
                success: false,
                http_code: Some(401),
                error_message: Some(message),
                latency_ms: 1,
            },
            _ => ConnectionTestResult {
                success: true,
                http_code: Some(200),
                error_message: None,
                latency_ms: 1,
            },
        }
    }
}

/// Create a translator backed by scripted providers and a temporary database
///
/// The scheduler loop is not started; tests either call
/// `run_scheduling_cycle` directly or `start` the loop.
pub(crate) async fn create_test_translator() -> (BiblioTranslator, Arc<MockProviderFactory>, TempDir)
{
    create_test_translator_with(|_| {}).await
}

/// Like [`create_test_translator`], with a chance to adjust the configuration
pub(crate) async fn create_test_translator_with(
    configure: impl FnOnce(&mut Config),
) -> (BiblioTranslator, Arc<MockProviderFactory>, TempDir) {
    let temp_dir = tempfile::tempdir().unwrap();

    let mut config = Config::default();
    config.persistence.database_path = temp_dir.path().join("test.db");
    config.scheduler.poll_interval = Duration::from_millis(20);
    config.scheduler.error_backoff = Duration::from_millis(20);
    config.scheduler.shutdown_timeout = Duration::from_secs(5);
    configure(&mut config);

    let factory = Arc::new(MockProviderFactory::default());
    let translator = BiblioTranslator::with_provider_factory(config, factory.clone())
        .await
        .unwrap();

    (translator, factory, temp_dir)
}

/// A provider configuration named `{id} model` with `threads` workers
pub(crate) fn provider_config(id: &str, threads: usize) -> ProviderConfig {
    serde_json::from_value(serde_json::json!({
        "id": id,
        "name": format!("{id} model"),
        "url": format!("https://{id}.example.com/v1"),
        "apiKey": "sk-test",
        "modelId": format!("{id}-model"),
        "threads": threads,
    }))
    .unwrap()
}

/// A task of `records` records titled `Title N` with abstracts `Abstract N`
pub(crate) fn new_task(providers: Vec<ProviderConfig>, records: usize) -> NewTask {
    NewTask {
        task_name: String::new(),
        file_names: vec!["savedrecs.html".into()],
        translate_title: true,
        translate_abstract: true,
        providers,
        records: (1..=records)
            .map(|n| NewRecord {
                source_file_name: "savedrecs.html".into(),
                source_file_index: 1,
                index_in_file: None,
                title: format!("Title {n}"),
                abstract_text: format!("Abstract {n}"),
                metadata: Default::default(),
            })
            .collect(),
    }
}

/// Poll until the task reaches `status`
pub(crate) async fn wait_for_status(
    translator: &BiblioTranslator,
    id: &TaskId,
    status: TaskStatus,
) -> Task {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let task = translator.db.get_task(id).await.unwrap().unwrap();
        if task.status == status {
            return task;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "task {id} stuck in {} waiting for {status}",
            task.status
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Wait for every live execution to end, then reap them
pub(crate) async fn settle(translator: &BiblioTranslator) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let idle = translator
            .scheduler
            .live_tasks
            .lock()
            .await
            .values()
            .all(|execution| execution.handle.is_finished());
        if idle {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "executions did not finish"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    translator.reap_finished().await;
}
