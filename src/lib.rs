//! # biblio-translate
//!
//! Batch translation scheduler for bibliographic records.
//!
//! A task is a batch of records (title, abstract and untouched bibliographic
//! fields) plus the LLM providers that should translate them. The scheduler
//! admits pending tasks under a global ceiling and a per-provider ceiling,
//! drains each admitted task with one of three execution strategies, and
//! auto-pauses a task after too many back-to-back record failures.
//!
//! ## Quick Start
//!
//! ```no_run
//! use biblio_translate::{BiblioTranslator, Config, NewTask, run_with_shutdown};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let translator = BiblioTranslator::new(Config::default()).await?;
//!     translator.start().await?;
//!
//!     let task: NewTask = serde_json::from_str(&std::fs::read_to_string("task.json")?)?;
//!     let id = translator.create_task(task).await?;
//!     println!("queued {id}");
//!
//!     run_with_shutdown(translator).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// REST API module
pub mod api;
/// Configuration types
pub mod config;
/// Database persistence layer
pub mod db;
/// Task scheduler and execution engine (decomposed into focused submodules)
pub mod engine;
/// Error types
pub mod error;
/// Translation provider clients
pub mod provider;
/// Retry logic with exponential backoff
pub mod retry;
/// Core types
pub mod types;

// Re-export commonly used types
pub use config::{Config, ConfigUpdate, ProviderConfig, ProviderKind, SchedulerLimits};
pub use db::Database;
pub use engine::BiblioTranslator;
pub use error::{
    ApiError, DatabaseError, Error, ErrorDetail, ProviderError, Result, TaskError, ToHttpStatus,
};
pub use provider::{HttpProviderClient, HttpProviderFactory, ProviderClient, ProviderFactory};
pub use types::{
    ConnectionTestResult, NewRecord, NewTask, Record, RecordMetadata, RecordStatus,
    RequeueSummary, SchedulerStatus, Task, TaskId, TaskStatus, TranslationResult,
};

/// Run until SIGTERM or SIGINT (Ctrl+C off Unix), then shut the translator down.
///
/// Returns without a second shutdown if the translator was already shut down
/// elsewhere, for example by an embedding service.
///
/// # Example
///
/// ```no_run
/// use biblio_translate::{BiblioTranslator, Config, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let translator = BiblioTranslator::new(Config::default()).await?;
///     translator.start().await?;
///     run_with_shutdown(translator).await?;
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(translator: BiblioTranslator) -> Result<()> {
    let stopped = translator.scheduler.shutdown_token.clone();
    tokio::select! {
        signal = wait_for_signal() => {
            tracing::info!(signal, "Received shutdown signal");
        }
        _ = stopped.cancelled() => return Ok(()),
    }
    translator.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() -> &'static str {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            signal = ctrl_c() => signal,
        },
        Err(e) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            ctrl_c().await
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> &'static str {
    ctrl_c().await
}

async fn ctrl_c() -> &'static str {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C, shutting down");
    }
    "SIGINT"
}
