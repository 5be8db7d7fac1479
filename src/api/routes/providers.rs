//! Provider handlers.

use crate::api::AppState;
use crate::config::ProviderConfig;
use crate::error::Error;
use crate::types::ConnectionTestResult;
use axum::{Json, extract::State};

/// POST /providers/test - Probe a provider endpoint
///
/// A reachable endpoint that rejects the request still answers 200; the
/// failure is reported in the body.
#[utoipa::path(
    post,
    path = "/providers/test",
    tag = "providers",
    request_body = crate::config::ProviderConfig,
    responses(
        (status = 200, description = "Probe result", body = crate::types::ConnectionTestResult),
        (status = 400, description = "Invalid provider configuration"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn test_provider(
    State(state): State<AppState>,
    Json(provider): Json<ProviderConfig>,
) -> Result<Json<ConnectionTestResult>, Error> {
    let result = state.translator.test_provider(&provider).await?;

    tracing::info!(
        provider = %provider.display_name(),
        success = result.success,
        http_code = ?result.http_code,
        latency_ms = result.latency_ms,
        "Provider connection test finished"
    );

    Ok(Json(result))
}
