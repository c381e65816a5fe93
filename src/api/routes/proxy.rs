//! Proxy address handlers.

use super::ProxySetting;
use crate::api::AppState;
use axum::{Json, extract::State};

/// GET /proxy - Current forward proxy address
#[utoipa::path(
    get,
    path = "/proxy",
    tag = "proxy",
    responses(
        (status = 200, description = "Configured proxy address (null if none)", body = ProxySetting)
    )
)]
pub async fn get_proxy(State(state): State<AppState>) -> Json<ProxySetting> {
    Json(ProxySetting {
        address: state.downloader.proxy(),
    })
}

/// PUT /proxy - Replace the forward proxy address
///
/// Applies to the next fetch attempt; running fetches keep their connection.
#[utoipa::path(
    put,
    path = "/proxy",
    tag = "proxy",
    request_body = ProxySetting,
    responses(
        (status = 200, description = "Proxy address after the update", body = ProxySetting)
    )
)]
pub async fn set_proxy(
    State(state): State<AppState>,
    Json(setting): Json<ProxySetting>,
) -> Json<ProxySetting> {
    state.downloader.set_proxy(setting.address);
    Json(ProxySetting {
        address: state.downloader.proxy(),
    })
}
