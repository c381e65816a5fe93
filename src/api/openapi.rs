//! OpenAPI documentation and schema generation
//!
//! This module defines the OpenAPI specification for the http-dl REST API
//! using utoipa for compile-time spec generation.

use utoipa::OpenApi;

/// OpenAPI documentation for the http-dl REST API
///
/// Served as JSON from `/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "http-dl REST API",
        version = "0.1.0",
        description = "REST API for registering, starting, stopping and monitoring resumable HTTP downloads",
        license(
            name = "MIT OR Apache-2.0"
        )
    ),
    servers(
        (url = "http://localhost:6789", description = "Local development server")
    ),
    paths(
        // Downloads
        crate::api::routes::list_downloads,
        crate::api::routes::get_download,
        crate::api::routes::add_download,
        crate::api::routes::delete_download,
        crate::api::routes::start_download,
        crate::api::routes::stop_download,
        crate::api::routes::retry_download,

        // Proxy
        crate::api::routes::get_proxy,
        crate::api::routes::set_proxy,

        // System
        crate::api::routes::health_check,
        crate::api::routes::openapi_spec,
        crate::api::routes::progress_stream,
        crate::api::routes::event_stream,
    ),
    components(schemas(
        // Core types
        crate::types::TaskId,
        crate::types::TaskState,
        crate::types::DownloadRequest,
        crate::types::TaskInfo,
        crate::types::Event,
        crate::task::DownloadTask,

        // API request/response types
        crate::api::routes::AddDownloadQuery,
        crate::api::routes::ProxySetting,

        // Error types
        crate::error::ApiError,
        crate::error::ErrorDetail,
    )),
    tags(
        (name = "downloads", description = "Download tasks - Register, start, stop, retry and remove downloads"),
        (name = "proxy", description = "Proxy - Read and replace the forward proxy address"),
        (name = "system", description = "System endpoints - Health, OpenAPI spec, progress and event streams"),
    )
)]
pub struct ApiDoc;
