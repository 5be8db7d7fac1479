//! Runtime configuration updates -- scheduler ceilings and thresholds.

use super::BiblioTranslator;
use crate::config::{ConfigUpdate, SchedulerLimits};
use crate::error::Result;

impl BiblioTranslator {
    /// Current scheduler ceilings
    pub async fn limits(&self) -> SchedulerLimits {
        *self.limits.read().await
    }

    /// Update the scheduler ceilings
    ///
    /// The new ceilings apply from the next scheduling cycle; executions already
    /// running keep the failure threshold they were dispatched with. Lowering a
    /// ceiling never stops running tasks.
    ///
    /// # Errors
    ///
    /// Returns a configuration error (and changes nothing) if any resulting
    /// value is zero.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use biblio_translate::{BiblioTranslator, config::ConfigUpdate};
    /// # async fn example(translator: BiblioTranslator) -> biblio_translate::Result<()> {
    /// let limits = translator
    ///     .update_config(ConfigUpdate {
    ///         max_concurrent_tasks: Some(4),
    ///         ..Default::default()
    ///     })
    ///     .await?;
    /// assert_eq!(limits.max_concurrent_tasks, 4);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn update_config(&self, update: ConfigUpdate) -> Result<SchedulerLimits> {
        let mut limits = self.limits.write().await;

        let updated = update.apply_to(*limits);
        updated.validate()?;
        *limits = updated;

        tracing::info!(
            max_concurrent_tasks = updated.max_concurrent_tasks,
            max_concurrent_tasks_per_provider = updated.max_concurrent_tasks_per_provider,
            consecutive_failure_threshold = updated.consecutive_failure_threshold,
            "Scheduler limits updated"
        );

        Ok(updated)
    }
}
