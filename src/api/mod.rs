//! REST API server module
//!
//! Provides an OpenAPI 3.1 compliant REST API for creating translation tasks,
//! controlling them, and monitoring the scheduler.

use crate::{BiblioTranslator, Config, Result};
use axum::{
    Router,
    http::HeaderValue,
    routing::{get, post, put},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod error_response;
pub mod openapi;
pub mod routes;
pub mod state;

pub use openapi::ApiDoc;
pub use state::AppState;

/// Create the API router with all route definitions
///
/// # Routes
///
/// ## Tasks
/// - `POST /tasks` - Create a task from parsed records
/// - `GET /tasks` - List tasks (`?include_deleted=true` for soft-deleted ones)
/// - `GET /tasks/:date/:seq` - Get single task
/// - `GET /tasks/:date/:seq/records` - Get a task's records
/// - `PUT /tasks/:date/:seq/pause` - Pause a running task
/// - `PUT /tasks/:date/:seq/resume` - Resume a paused task
/// - `POST /tasks/:date/:seq/retry-failed` - Requeue failed records
/// - `POST /tasks/:date/:seq/reset` - Clear all records and requeue
/// - `DELETE /tasks/:date/:seq` - Soft-delete (`?permanent=true` to purge)
///
/// ## Providers
/// - `POST /providers/test` - Probe a provider endpoint
///
/// ## Configuration
/// - `GET /config` - Get current config
/// - `PATCH /config` - Update scheduler ceilings
///
/// ## System
/// - `GET /scheduler` - Scheduler status snapshot
/// - `GET /health` - Health check
/// - `GET /openapi.json` - OpenAPI specification
/// - `GET /swagger-ui` - Interactive Swagger UI documentation (if enabled)
pub fn create_router(translator: Arc<BiblioTranslator>, config: Arc<Config>) -> Router {
    let state = AppState::new(translator, config.clone());

    let router = Router::new()
        // Tasks
        .route("/tasks", post(routes::create_task).get(routes::list_tasks))
        .route(
            "/tasks/:date/:seq",
            get(routes::get_task).delete(routes::delete_task),
        )
        .route("/tasks/:date/:seq/records", get(routes::get_records))
        .route("/tasks/:date/:seq/pause", put(routes::pause_task))
        .route("/tasks/:date/:seq/resume", put(routes::resume_task))
        .route(
            "/tasks/:date/:seq/retry-failed",
            post(routes::retry_failed_records),
        )
        .route("/tasks/:date/:seq/reset", post(routes::reset_task))
        // Providers
        .route("/providers/test", post(routes::test_provider))
        // Configuration
        .route(
            "/config",
            get(routes::get_config).patch(routes::update_config),
        )
        // System
        .route("/scheduler", get(routes::scheduler_status))
        .route("/health", get(routes::health_check))
        .route("/openapi.json", get(routes::openapi_spec));

    // Merge Swagger UI routes before applying state
    let router = if config.api.swagger_ui {
        router.merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
    } else {
        router
    };

    let router = router
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if config.api.cors_enabled {
        router.layer(build_cors_layer(&config.api.cors_origins))
    } else {
        router
    }
}

/// Build a CORS layer based on configured origins
///
/// `"*"` (or an empty list) allows any origin; otherwise only the listed
/// origins are allowed. All methods and headers are allowed.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_any = origins.iter().any(|o| o == "*");

    if allow_any || origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Start the API server on the configured bind address.
///
/// Serves until the translator shuts down or the listener fails.
///
/// # Example
///
/// ```no_run
/// use biblio_translate::{BiblioTranslator, Config};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Arc::new(Config::default());
/// let translator = Arc::new(BiblioTranslator::new((*config).clone()).await?);
/// translator.start().await?;
///
/// biblio_translate::api::start_api_server(translator, config).await?;
/// # Ok(())
/// # }
/// ```
pub async fn start_api_server(translator: Arc<BiblioTranslator>, config: Arc<Config>) -> Result<()> {
    let bind_address = config.api.bind_address;

    tracing::info!(address = %bind_address, "Starting API server");

    let stopped = translator.scheduler.shutdown_token.clone();
    let app = create_router(translator, config);

    let listener = TcpListener::bind(bind_address)
        .await
        .map_err(crate::error::Error::Io)?;

    tracing::info!(address = %bind_address, "API server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { stopped.cancelled().await })
        .await
        .map_err(|e| crate::error::Error::ApiServerError(e.to_string()))?;

    tracing::info!("API server stopped");
    Ok(())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
