//! Download task handlers.

use super::AddDownloadQuery;
use crate::api::AppState;
use crate::error::Result;
use crate::task::DownloadTask;
use crate::types::{DownloadRequest, TaskId};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

/// GET /downloads - List all download tasks
#[utoipa::path(
    get,
    path = "/downloads",
    tag = "downloads",
    responses(
        (status = 200, description = "Every registered task, oldest first", body = Vec<DownloadTask>)
    )
)]
pub async fn list_downloads(State(state): State<AppState>) -> Json<Vec<DownloadTask>> {
    Json(state.downloader.list())
}

/// GET /downloads/:id - Get a single task
#[utoipa::path(
    get,
    path = "/downloads/{id}",
    tag = "downloads",
    params(
        ("id" = String, Path, description = "Task ID")
    ),
    responses(
        (status = 200, description = "Task snapshot", body = DownloadTask),
        (status = 404, description = "Task not found", body = crate::error::ApiError)
    )
)]
pub async fn get_download(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DownloadTask>> {
    Ok(Json(state.downloader.get_required(&TaskId::from(id))?))
}

/// POST /downloads - Register a download and (by default) start it
#[utoipa::path(
    post,
    path = "/downloads",
    tag = "downloads",
    params(AddDownloadQuery),
    request_body = DownloadRequest,
    responses(
        (status = 201, description = "Task registered", body = DownloadTask),
        (status = 400, description = "Invalid URL, destination or chunk size", body = crate::error::ApiError),
        (status = 503, description = "Shutting down", body = crate::error::ApiError)
    )
)]
pub async fn add_download(
    State(state): State<AppState>,
    Query(query): Query<AddDownloadQuery>,
    Json(request): Json<DownloadRequest>,
) -> Result<(StatusCode, Json<DownloadTask>)> {
    let task = if query.start {
        state.downloader.submit(request).await?
    } else {
        state.downloader.add(request)?
    };
    Ok((StatusCode::CREATED, Json(task)))
}

/// DELETE /downloads/:id - Remove a task that is not loading
#[utoipa::path(
    delete,
    path = "/downloads/{id}",
    tag = "downloads",
    params(
        ("id" = String, Path, description = "Task ID")
    ),
    responses(
        (status = 200, description = "Removed task (last snapshot)", body = DownloadTask),
        (status = 404, description = "Task not found", body = crate::error::ApiError),
        (status = 409, description = "Task is loading", body = crate::error::ApiError)
    )
)]
pub async fn delete_download(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DownloadTask>> {
    Ok(Json(state.downloader.remove(&TaskId::from(id)).await?))
}

/// POST /downloads/:id/start - Start or resume a task
#[utoipa::path(
    post,
    path = "/downloads/{id}/start",
    tag = "downloads",
    params(
        ("id" = String, Path, description = "Task ID")
    ),
    responses(
        (status = 200, description = "Task is loading", body = DownloadTask),
        (status = 404, description = "Task not found", body = crate::error::ApiError),
        (status = 409, description = "Task is already loading or succeeded", body = crate::error::ApiError)
    )
)]
pub async fn start_download(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DownloadTask>> {
    Ok(Json(state.downloader.start(&TaskId::from(id)).await?))
}

/// POST /downloads/:id/stop - Stop a task, keeping its partial file
#[utoipa::path(
    post,
    path = "/downloads/{id}/stop",
    tag = "downloads",
    params(
        ("id" = String, Path, description = "Task ID")
    ),
    responses(
        (status = 200, description = "Task after the stop took effect", body = DownloadTask),
        (status = 404, description = "Task not found", body = crate::error::ApiError)
    )
)]
pub async fn stop_download(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DownloadTask>> {
    Ok(Json(state.downloader.stop(&TaskId::from(id)).await?))
}

/// POST /downloads/:id/retry - Reset a failed task and start it again
#[utoipa::path(
    post,
    path = "/downloads/{id}/retry",
    tag = "downloads",
    params(
        ("id" = String, Path, description = "Task ID")
    ),
    responses(
        (status = 200, description = "Task is loading again", body = DownloadTask),
        (status = 404, description = "Task not found", body = crate::error::ApiError),
        (status = 409, description = "Task has not failed", body = crate::error::ApiError)
    )
)]
pub async fn retry_download(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DownloadTask>> {
    let id = TaskId::from(id);
    state.downloader.retry(&id).await?;
    Ok(Json(state.downloader.start(&id).await?))
}
