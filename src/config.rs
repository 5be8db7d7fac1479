//! Configuration types for biblio-translate

use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::PathBuf, time::Duration};
use utoipa::ToSchema;

use crate::error::{Error, Result, TaskError};

/// Scheduler admission and execution limits
///
/// Used as a nested sub-config within [`Config`]. The three ceilings in
/// [`SchedulerLimits`] can also be changed at runtime through
/// [`crate::BiblioTranslator::update_config`].
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct SchedulerConfig {
    /// Maximum number of tasks executing at once across all providers (default: 1)
    #[serde(default = "default_one")]
    pub max_concurrent_tasks: usize,

    /// Maximum number of tasks bound to the same provider at once (default: 1)
    #[serde(default = "default_one")]
    pub max_concurrent_tasks_per_provider: usize,

    /// Back-to-back record failures that auto-pause a task (default: 5)
    #[serde(default = "default_failure_threshold")]
    pub consecutive_failure_threshold: u32,

    /// Upper bound on concurrently translating workers across all tasks (default: 16)
    #[serde(default = "default_max_worker_slots")]
    pub max_worker_slots: usize,

    /// Interval between scheduling cycles in milliseconds (default: 500)
    #[serde(default = "default_poll_interval", with = "duration_millis_serde")]
    #[schema(value_type = u64)]
    pub poll_interval: Duration,

    /// Delay after a failed scheduling cycle in milliseconds (default: 1000)
    #[serde(default = "default_error_backoff", with = "duration_millis_serde")]
    #[schema(value_type = u64)]
    pub error_backoff: Duration,

    /// How long shutdown waits for live executions, in seconds (default: 30)
    #[serde(default = "default_shutdown_timeout", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub shutdown_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 1,
            max_concurrent_tasks_per_provider: 1,
            consecutive_failure_threshold: default_failure_threshold(),
            max_worker_slots: default_max_worker_slots(),
            poll_interval: default_poll_interval(),
            error_backoff: default_error_backoff(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

impl SchedulerConfig {
    /// The runtime-mutable subset of this configuration
    pub fn limits(&self) -> SchedulerLimits {
        SchedulerLimits {
            max_concurrent_tasks: self.max_concurrent_tasks,
            max_concurrent_tasks_per_provider: self.max_concurrent_tasks_per_provider,
            consecutive_failure_threshold: self.consecutive_failure_threshold,
        }
    }
}

/// Ceilings the scheduler re-reads on every cycle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SchedulerLimits {
    /// Global ceiling on executing tasks
    pub max_concurrent_tasks: usize,
    /// Per-provider ceiling on executing tasks
    pub max_concurrent_tasks_per_provider: usize,
    /// Consecutive-failure auto-pause threshold
    pub consecutive_failure_threshold: u32,
}

/// Retry configuration for translation requests
///
/// The delay before retry `n` (0-based) is `initial_delay * backoff_multiplier^n`,
/// capped at `max_delay`. The defaults give 2s, 4s, 8s.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt (default: 3)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry in seconds (default: 2)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub initial_delay: Duration,

    /// Maximum delay between retries in seconds (default: 60)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

/// Timeouts for provider HTTP requests
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct HttpClientConfig {
    /// Total timeout for one translation request in seconds (default: 60)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub request_timeout: Duration,

    /// Connect timeout for translation requests in seconds (default: 15)
    #[serde(default = "default_connect_timeout", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub connect_timeout: Duration,

    /// Total timeout for a connection probe in seconds (default: 15)
    #[serde(default = "default_probe_timeout", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub probe_timeout: Duration,

    /// Connect timeout for a connection probe in seconds (default: 10)
    #[serde(default = "default_probe_connect_timeout", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub probe_connect_timeout: Duration,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: default_request_timeout(),
            connect_timeout: default_connect_timeout(),
            probe_timeout: default_probe_timeout(),
            probe_connect_timeout: default_probe_connect_timeout(),
        }
    }
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct PersistenceConfig {
    /// Database path (default: "./biblio-translate.db")
    #[serde(default = "default_database_path")]
    #[schema(value_type = String)]
    pub database_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// REST API configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiConfig {
    /// Address to bind to (default: 127.0.0.1:8080)
    #[serde(default = "default_bind_address")]
    #[schema(value_type = String)]
    pub bind_address: SocketAddr,

    /// Enable CORS for browser access (default: true)
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Allowed CORS origins (default: ["*"])
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Enable Swagger UI at /swagger-ui (default: true)
    #[serde(default = "default_true")]
    pub swagger_ui: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            cors_enabled: true,
            cors_origins: default_cors_origins(),
            swagger_ui: true,
        }
    }
}

/// Main configuration for the translation service
///
/// Fields are organized into logical sub-configs:
/// - [`scheduler`](SchedulerConfig) - ceilings, thresholds, polling
/// - [`retry`](RetryConfig) - provider request backoff
/// - [`http`](HttpClientConfig) - provider request timeouts
/// - [`persistence`](PersistenceConfig) - database location
/// - [`api`](ApiConfig) - REST front end
///
/// The scheduler settings are flattened so they sit at the top level of the
/// serialized form.
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct Config {
    /// Scheduler ceilings and timing
    #[serde(flatten)]
    pub scheduler: SchedulerConfig,

    /// Provider request retry behaviour
    #[serde(default)]
    pub retry: RetryConfig,

    /// Provider request timeouts
    #[serde(default)]
    pub http: HttpClientConfig,

    /// Data storage
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// REST API
    #[serde(default)]
    pub api: ApiConfig,
}

impl Config {
    /// Check that every ceiling and threshold is usable
    pub fn validate(&self) -> Result<()> {
        self.scheduler.limits().validate()?;
        if self.scheduler.max_worker_slots == 0 {
            return Err(config_error("max_worker_slots", "must be at least 1"));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(config_error("backoff_multiplier", "must be at least 1.0"));
        }
        Ok(())
    }
}

impl SchedulerLimits {
    /// Check that every ceiling is at least 1
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_tasks == 0 {
            return Err(config_error("max_concurrent_tasks", "must be at least 1"));
        }
        if self.max_concurrent_tasks_per_provider == 0 {
            return Err(config_error(
                "max_concurrent_tasks_per_provider",
                "must be at least 1",
            ));
        }
        if self.consecutive_failure_threshold == 0 {
            return Err(config_error(
                "consecutive_failure_threshold",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

fn config_error(key: &str, message: &str) -> Error {
    Error::Config {
        message: format!("{key} {message}"),
        key: Some(key.to_string()),
    }
}

/// Wire dialect of a provider endpoint
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI-compatible chat completions with bearer auth (default)
    #[default]
    OpenAi,
    /// `api-key` header and an explicit `thinking` switch
    Xiaomi,
    /// Requests reasoning to be split out of the answer
    Minimax,
}

/// One translation provider: endpoint, model, credentials and worker count
///
/// Serialized with the camelCase field names used by stored task documents.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    /// Stable identifier of this provider configuration
    #[serde(default)]
    pub id: String,

    /// Display name, recorded on the records it translates
    #[serde(default)]
    pub name: String,

    /// Base URL of the endpoint
    pub url: String,

    /// API key sent with every request
    #[serde(default)]
    pub api_key: String,

    /// Model identifier sent in the request body
    pub model_id: String,

    /// Sampling temperature (default: 0.3)
    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// System prompt; the built-in academic translation prompt when empty
    #[serde(default)]
    pub system_prompt: String,

    /// Wire dialect (default: openai)
    #[serde(default)]
    pub provider: ProviderKind,

    /// Enable provider-side reasoning where the dialect supports a switch
    #[serde(default)]
    pub enable_thinking: bool,

    /// Append `chat/completions` to `url` (default: true)
    #[serde(default = "default_true")]
    pub auto_append_path: bool,

    /// Number of concurrent workers this provider contributes to a task (default: 1)
    #[serde(default = "default_threads")]
    pub threads: usize,
}

impl ProviderConfig {
    /// Key under which tasks bound to this provider are counted in the ledger
    ///
    /// Entries naming the same model share one ceiling whatever their `id`.
    pub fn ledger_key(&self) -> &str {
        &self.model_id
    }

    /// Name recorded on records this provider translated
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.model_id
        } else {
            &self.name
        }
    }

    /// Copy with the API key masked, for returning over the API
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if !copy.api_key.is_empty() {
            copy.api_key = "***".to_string();
        }
        copy
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.model_id.trim().is_empty() {
            return Err("modelId must not be empty".to_string());
        }
        if let Err(e) = url::Url::parse(&self.url) {
            return Err(format!("invalid url '{}': {}", self.url, e));
        }
        if self.threads == 0 {
            return Err(format!(
                "provider '{}' must have at least one worker",
                self.display_name()
            ));
        }
        Ok(())
    }
}

/// Validate the provider list attached to a task
pub(crate) fn validate_providers(providers: &[ProviderConfig]) -> Result<()> {
    if providers.is_empty() {
        return Err(TaskError::InvalidProviders {
            reason: "at least one provider is required".to_string(),
        }
        .into());
    }
    for provider in providers {
        provider
            .validate()
            .map_err(|reason| TaskError::InvalidProviders { reason })?;
    }
    Ok(())
}

/// Runtime configuration updates
///
/// Only the scheduler ceilings can change while the service is running; every
/// other setting requires a restart.
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct ConfigUpdate {
    /// New global ceiling on executing tasks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent_tasks: Option<usize>,

    /// New per-provider ceiling on executing tasks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent_tasks_per_provider: Option<usize>,

    /// New consecutive-failure threshold (applies to executions dispatched afterwards)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consecutive_failure_threshold: Option<u32>,
}

impl ConfigUpdate {
    /// Apply this update on top of `limits`, returning the result
    pub fn apply_to(&self, limits: SchedulerLimits) -> SchedulerLimits {
        SchedulerLimits {
            max_concurrent_tasks: self
                .max_concurrent_tasks
                .unwrap_or(limits.max_concurrent_tasks),
            max_concurrent_tasks_per_provider: self
                .max_concurrent_tasks_per_provider
                .unwrap_or(limits.max_concurrent_tasks_per_provider),
            consecutive_failure_threshold: self
                .consecutive_failure_threshold
                .unwrap_or(limits.consecutive_failure_threshold),
        }
    }
}

// Default value functions
fn default_one() -> usize {
    1
}

fn default_true() -> bool {
    true
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_max_worker_slots() -> usize {
    16
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(500)
}

fn default_error_backoff() -> Duration {
    Duration::from_secs(1)
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(2)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(15)
}

fn default_probe_timeout() -> Duration {
    Duration::from_secs(15)
}

fn default_probe_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./biblio-translate.db")
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_temperature() -> f64 {
    0.3
}

fn default_threads() -> usize {
    1
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Duration serialization helper (milliseconds)
mod duration_millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
