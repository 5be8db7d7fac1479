//! Route handlers for the REST API
//!
//! Handlers are organized by domain:
//! - [`tasks`] - Task creation, inspection and control
//! - [`providers`] - Provider connectivity testing
//! - [`config`] - Configuration and scheduler limits
//! - [`system`] - Health, scheduler status, OpenAPI

use serde::{Deserialize, Serialize};

use crate::config::ProviderConfig;
use crate::types::TaskId;

mod config;
mod providers;
mod system;
mod tasks;

// Re-export all handlers so `routes::function_name` continues to work
pub use config::*;
pub use providers::*;
pub use system::*;
pub use tasks::*;

// ============================================================================
// Query/Request Types (shared across handlers)
// ============================================================================

/// Query parameters for GET /tasks
#[derive(Debug, Default, Deserialize, Serialize, utoipa::ToSchema)]
pub struct ListTasksQuery {
    /// Include soft-deleted tasks (default: false)
    #[serde(default)]
    pub include_deleted: bool,
}

/// Query parameters for DELETE /tasks/:date/:seq
#[derive(Debug, Default, Deserialize, Serialize, utoipa::ToSchema)]
pub struct DeleteTaskQuery {
    /// Remove the task and its records instead of soft-deleting (default: false)
    #[serde(default)]
    pub permanent: bool,
}

/// Optional body for POST /tasks/:date/:seq/retry-failed and /reset
#[derive(Debug, Default, Deserialize, Serialize, utoipa::ToSchema)]
pub struct RequeueRequest {
    /// Replacement provider list; the task keeps its providers when absent
    #[serde(default, rename = "modelConfigs")]
    pub providers: Option<Vec<ProviderConfig>>,
}

/// Response for POST /tasks
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskResponse {
    /// Identifier of the created task
    #[schema(value_type = String)]
    pub task_id: TaskId,
}

/// Rebuild a task identifier from its `/:date/:seq` path segments
pub(crate) fn task_id_from_path(date: &str, seq: &str) -> TaskId {
    TaskId::from(format!("{date}/{seq}"))
}
