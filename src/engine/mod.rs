//! Translation engine split into focused submodules.
//!
//! The `BiblioTranslator` struct and its methods are organized by domain:
//! - [`tasks`] - Task creation and read-only projections
//! - [`control`] - Pause, resume, retry-failed, reset, delete
//! - [`scheduler`] - Admission control loop, dispatch and reaping
//! - [`execution`] - Execution strategies draining a task's records
//! - [`ledger`] - Provider concurrency ledger
//! - [`lifecycle`] - Startup restore and shutdown coordination
//! - [`config_ops`] - Runtime limit updates
//! - [`providers`] - Provider connectivity testing

mod config_ops;
mod control;
mod execution;
mod ledger;
mod lifecycle;
mod providers;
mod scheduler;
mod tasks;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use ledger::{LedgerSlot, ProviderLedger};

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use tokio::sync::{Mutex, RwLock, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, SchedulerLimits};
use crate::db::Database;
use crate::error::Result;
use crate::provider::{HttpProviderFactory, ProviderFactory};
use crate::types::TaskId;

/// A dispatched execution that has not been reaped yet
pub(crate) struct LiveExecution {
    /// Handle of the spawned execution
    pub(crate) handle: JoinHandle<()>,
    /// Cancelled by pause, delete and shutdown; observed at record boundaries
    pub(crate) cancel: CancellationToken,
}

/// Scheduler bookkeeping shared by every clone of the translator
///
/// Lock order when more than one is held: `control_lock`, `live_tasks`,
/// `scheduled`, then the ledger's internal lock.
#[derive(Clone)]
pub(crate) struct SchedulerState {
    /// Serializes task registration and operator control operations; never held
    /// across bulk record writes or provider calls
    pub(crate) control_lock: Arc<Mutex<()>>,
    /// Tasks bound to each provider
    pub(crate) ledger: Arc<ProviderLedger>,
    /// Executions spawned by the scheduler, keyed by task
    pub(crate) live_tasks: Arc<Mutex<HashMap<TaskId, LiveExecution>>>,
    /// Tasks selected for dispatch or executing, until reaped
    pub(crate) scheduled: Arc<parking_lot::Mutex<HashSet<TaskId>>>,
    /// Caps concurrently translating workers across all tasks
    pub(crate) worker_slots: Arc<Semaphore>,
    /// Cleared when shutdown begins
    pub(crate) accepting_new: Arc<AtomicBool>,
    /// Parent of every execution's cancellation token
    pub(crate) shutdown_token: CancellationToken,
    /// The control loop, while running
    pub(crate) loop_handle: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl SchedulerState {
    fn new(max_worker_slots: usize) -> Self {
        Self {
            control_lock: Arc::new(Mutex::new(())),
            ledger: Arc::new(ProviderLedger::new()),
            live_tasks: Arc::new(Mutex::new(HashMap::new())),
            scheduled: Arc::new(parking_lot::Mutex::new(HashSet::new())),
            worker_slots: Arc::new(Semaphore::new(max_worker_slots)),
            accepting_new: Arc::new(AtomicBool::new(true)),
            shutdown_token: CancellationToken::new(),
            loop_handle: Arc::new(Mutex::new(None)),
        }
    }
}

/// Main translator instance (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct BiblioTranslator {
    /// Record store (public for integration tests to inspect persisted state)
    pub db: Arc<Database>,
    /// Static configuration
    pub(crate) config: Arc<Config>,
    /// Ceilings re-read by every scheduling cycle
    pub(crate) limits: Arc<RwLock<SchedulerLimits>>,
    /// Builds one provider client per execution worker
    pub(crate) providers: Arc<dyn ProviderFactory>,
    /// Scheduler bookkeeping
    pub(crate) scheduler: SchedulerState,
}

impl BiblioTranslator {
    /// Create a new translator using HTTP provider clients
    ///
    /// Opens (and migrates) the database and returns tasks interrupted by an
    /// unclean stop to the pending pool. The scheduler loop is not started; call
    /// [`BiblioTranslator::start`].
    pub async fn new(config: Config) -> Result<Self> {
        let factory = Arc::new(HttpProviderFactory::new(
            config.retry.clone(),
            config.http.clone(),
        ));
        Self::with_provider_factory(config, factory).await
    }

    /// Create a new translator with a custom provider factory
    pub async fn with_provider_factory(
        config: Config,
        providers: Arc<dyn ProviderFactory>,
    ) -> Result<Self> {
        config.validate()?;

        let db = Database::new(&config.persistence.database_path).await?;

        let translator = Self {
            db: Arc::new(db),
            limits: Arc::new(RwLock::new(config.scheduler.limits())),
            scheduler: SchedulerState::new(config.scheduler.max_worker_slots),
            config: Arc::new(config),
            providers,
        };

        translator.restore_interrupted().await?;

        Ok(translator)
    }

    /// Get the current configuration
    ///
    /// Runtime limit changes are reflected by [`BiblioTranslator::limits`], not here.
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }
}
