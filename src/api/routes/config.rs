//! Configuration handlers.

use crate::api::AppState;
use crate::config::{Config, ConfigUpdate};
use crate::error::Error;
use axum::{Json, extract::State};

/// GET /config - Get the current configuration
///
/// The scheduler ceilings reflect runtime updates.
#[utoipa::path(
    get,
    path = "/config",
    tag = "config",
    responses(
        (status = 200, description = "Current configuration", body = crate::config::Config),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn get_config(State(state): State<AppState>) -> Json<Config> {
    let mut config = (*state.translator.get_config()).clone();
    let limits = state.translator.limits().await;

    config.scheduler.max_concurrent_tasks = limits.max_concurrent_tasks;
    config.scheduler.max_concurrent_tasks_per_provider = limits.max_concurrent_tasks_per_provider;
    config.scheduler.consecutive_failure_threshold = limits.consecutive_failure_threshold;

    Json(config)
}

/// PATCH /config - Update scheduler ceilings
#[utoipa::path(
    patch,
    path = "/config",
    tag = "config",
    request_body(content = crate::config::ConfigUpdate, description = "Configuration updates (runtime-changeable fields only)"),
    responses(
        (status = 200, description = "Configuration updated", body = crate::config::Config),
        (status = 400, description = "Invalid configuration"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn update_config(
    State(state): State<AppState>,
    Json(update): Json<ConfigUpdate>,
) -> Result<Json<Config>, Error> {
    state.translator.update_config(update).await?;

    Ok(get_config(State(state)).await)
}
