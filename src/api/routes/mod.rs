//! Route handlers for the REST API
//!
//! Handlers are organized by domain:
//! - [`downloads`] — Task registration and lifecycle commands
//! - [`proxy`] — Runtime proxy address
//! - [`system`] — Health, progress and event streams, OpenAPI

use serde::{Deserialize, Serialize};

mod downloads;
mod proxy;
mod system;

// Re-export all handlers so `routes::function_name` continues to work
pub use downloads::*;
pub use proxy::*;
pub use system::*;

// ============================================================================
// Query/Request Types (shared across handlers)
// ============================================================================

/// Query parameters for POST /downloads
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AddDownloadQuery {
    /// Start fetching right away (default: true). `false` only registers the task.
    #[serde(default = "default_start")]
    pub start: bool,
}

fn default_start() -> bool {
    true
}

/// Request and response body for the proxy endpoints
#[derive(Debug, Default, Deserialize, Serialize, utoipa::ToSchema)]
pub struct ProxySetting {
    /// Proxy address, e.g. "http://127.0.0.1:8118". Use null to clear it.
    #[serde(default)]
    pub address: Option<String>,
}
