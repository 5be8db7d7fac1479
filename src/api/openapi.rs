//! OpenAPI documentation and schema generation
//!
//! The document is generated at compile time with utoipa and served at
//! `/openapi.json` (and through Swagger UI at `/swagger-ui` when enabled).

use utoipa::OpenApi;

/// OpenAPI documentation for the biblio-translate REST API
#[derive(OpenApi)]
#[openapi(
    info(
        title = "biblio-translate REST API",
        version = "0.1.0",
        description = "REST API for scheduling bibliographic record translation tasks across LLM providers",
        license(
            name = "MIT OR Apache-2.0"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development server")
    ),
    paths(
        // Tasks
        crate::api::routes::create_task,
        crate::api::routes::list_tasks,
        crate::api::routes::get_task,
        crate::api::routes::get_records,
        crate::api::routes::pause_task,
        crate::api::routes::resume_task,
        crate::api::routes::retry_failed_records,
        crate::api::routes::reset_task,
        crate::api::routes::delete_task,

        // Providers
        crate::api::routes::test_provider,

        // Configuration
        crate::api::routes::get_config,
        crate::api::routes::update_config,

        // System
        crate::api::routes::health_check,
        crate::api::routes::scheduler_status,
        crate::api::routes::openapi_spec,
    ),
    components(schemas(
        // Core types from types.rs
        crate::types::TaskId,
        crate::types::TaskStatus,
        crate::types::RecordStatus,
        crate::types::Task,
        crate::types::Record,
        crate::types::RecordMetadata,
        crate::types::NewTask,
        crate::types::NewRecord,
        crate::types::ConnectionTestResult,
        crate::types::RequeueSummary,
        crate::types::SchedulerStatus,

        // Config types from config.rs
        crate::config::Config,
        crate::config::ConfigUpdate,
        crate::config::SchedulerConfig,
        crate::config::SchedulerLimits,
        crate::config::RetryConfig,
        crate::config::HttpClientConfig,
        crate::config::PersistenceConfig,
        crate::config::ApiConfig,
        crate::config::ProviderConfig,
        crate::config::ProviderKind,

        // API request/response types
        crate::api::routes::RequeueRequest,
        crate::api::routes::CreateTaskResponse,
        crate::api::routes::ListTasksQuery,
        crate::api::routes::DeleteTaskQuery,

        // Error types from error.rs
        crate::error::ApiError,
        crate::error::ErrorDetail,
    )),
    tags(
        (name = "tasks", description = "Translation tasks - Create, inspect, pause, resume, requeue and delete"),
        (name = "providers", description = "Translation providers - Test endpoint connectivity"),
        (name = "config", description = "Configuration - Get configuration and update scheduler ceilings"),
        (name = "system", description = "System endpoints - Health, scheduler status, OpenAPI spec"),
    )
)]
pub struct ApiDoc;
