//! Provider concurrency ledger.
//!
//! Counts the tasks currently bound to each provider and remembers which
//! provider each executing task is bound to. A slot is handed out as an RAII
//! [`LedgerSlot`]; dropping it releases the slot exactly once, however the
//! execution ends.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::types::TaskId;

#[derive(Debug, Default)]
struct LedgerState {
    per_provider: HashMap<String, usize>,
    bindings: HashMap<TaskId, String>,
}

/// Process-wide map from provider to the number of tasks using it
#[derive(Debug, Default)]
pub struct ProviderLedger {
    state: Mutex<LedgerState>,
}

impl ProviderLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `task_id` to `provider` if both ceilings allow it
    ///
    /// Returns `None` when the task already holds a slot, the provider has
    /// `per_provider` tasks, or `global` tasks are bound overall.
    pub fn try_acquire(
        self: &Arc<Self>,
        task_id: &TaskId,
        provider: &str,
        per_provider: usize,
        global: usize,
    ) -> Option<LedgerSlot> {
        let mut state = self.state.lock();

        if state.bindings.contains_key(task_id) || state.bindings.len() >= global {
            return None;
        }
        let count = state.per_provider.get(provider).copied().unwrap_or(0);
        if count >= per_provider {
            return None;
        }

        state.per_provider.insert(provider.to_string(), count + 1);
        state
            .bindings
            .insert(task_id.clone(), provider.to_string());

        Some(LedgerSlot {
            ledger: Arc::clone(self),
            task_id: task_id.clone(),
            provider: provider.to_string(),
        })
    }

    fn release(&self, task_id: &TaskId) {
        let mut state = self.state.lock();

        let Some(provider) = state.bindings.remove(task_id) else {
            return;
        };
        if let Some(count) = state.per_provider.get_mut(&provider) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                state.per_provider.remove(&provider);
            }
        }
    }

    /// Number of tasks holding a slot
    pub fn running_total(&self) -> usize {
        self.state.lock().bindings.len()
    }

    /// Number of tasks bound to `provider`
    pub fn provider_count(&self, provider: &str) -> usize {
        self.state
            .lock()
            .per_provider
            .get(provider)
            .copied()
            .unwrap_or(0)
    }

    /// Whether `task_id` holds a slot
    pub fn is_bound(&self, task_id: &TaskId) -> bool {
        self.state.lock().bindings.contains_key(task_id)
    }

    /// Per-provider counts, sorted by provider key
    pub fn snapshot(&self) -> BTreeMap<String, usize> {
        self.state
            .lock()
            .per_provider
            .iter()
            .map(|(provider, count)| (provider.clone(), *count))
            .collect()
    }
}

/// A task's slot in the [`ProviderLedger`], released on drop
#[derive(Debug)]
pub struct LedgerSlot {
    ledger: Arc<ProviderLedger>,
    task_id: TaskId,
    provider: String,
}

impl LedgerSlot {
    /// The task holding this slot
    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    /// The provider key the task is bound to
    pub fn provider(&self) -> &str {
        &self.provider
    }
}

impl Drop for LedgerSlot {
    fn drop(&mut self) {
        self.ledger.release(&self.task_id);
    }
}
