//! Configuration types for http-dl

use crate::error::{Error, Result};
use crate::types::MAX_CHUNK_SIZE;
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::PathBuf, time::Duration};

/// Where files go and how they are written
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Destination root directory (default: "./downloads")
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Scratch directory for partial files, named after the task id (default: "./temp")
    ///
    /// Must differ from `download_dir` so a partial file can never collide with a
    /// finished one.
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    /// Write size used when a request does not set one (default: 16384 bytes)
    #[serde(default = "default_chunk_size")]
    pub default_chunk_size: usize,

    /// Replace an existing destination file on finalize instead of failing (default: false)
    ///
    /// Meant for development setups where the same resource is fetched repeatedly.
    #[serde(default)]
    pub overwrite_existing: bool,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            temp_dir: default_temp_dir(),
            default_chunk_size: default_chunk_size(),
            overwrite_existing: false,
        }
    }
}

/// Forward proxy settings
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Proxy address, e.g. "http://127.0.0.1:8118" (None = no proxy configured)
    #[serde(default)]
    pub address: Option<String>,
}

impl ProxyConfig {
    /// Read the proxy address from the process environment
    ///
    /// `PROXY` takes precedence over `http_proxy`. Empty values count as unset.
    pub fn from_env() -> Self {
        let address = ["PROXY", "http_proxy"]
            .iter()
            .filter_map(|key| std::env::var(key).ok())
            .map(|value| value.trim().to_string())
            .find(|value| !value.is_empty());

        Self { address }
    }
}

/// Worker and HTTP client tuning
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Capacity of the command channel into the worker (default: 256)
    #[serde(default = "default_command_buffer")]
    pub command_buffer: usize,

    /// Capacity of the event broadcast channel (default: 1000)
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    /// TCP connect timeout for outgoing requests (default: 30 seconds)
    #[serde(default = "default_connect_timeout", with = "duration_serde")]
    pub connect_timeout: Duration,

    /// How long shutdown waits for cancelled fetches to wind down (default: 30 seconds)
    #[serde(default = "default_shutdown_timeout", with = "duration_serde")]
    pub shutdown_timeout: Duration,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            command_buffer: default_command_buffer(),
            event_buffer: default_event_buffer(),
            connect_timeout: default_connect_timeout(),
            shutdown_timeout: default_shutdown_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

/// Main configuration for HttpDownloader
///
/// Sub-configs are flattened, so the serialized form is a single flat object
/// (except `proxy`, which stays nested).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Directories and write behavior
    #[serde(flatten)]
    pub download: DownloadConfig,

    /// Forward proxy
    #[serde(default)]
    pub proxy: ProxyConfig,

    /// Worker and client tuning
    #[serde(flatten)]
    pub engine: EngineConfig,

    /// API and external server integration
    #[serde(flatten)]
    pub server: ServerIntegrationConfig,
}

impl Config {
    /// Download directory
    pub fn download_dir(&self) -> &PathBuf {
        &self.download.download_dir
    }

    /// Temporary directory
    pub fn temp_dir(&self) -> &PathBuf {
        &self.download.temp_dir
    }

    /// Check settings that would make the orchestrator misbehave
    pub fn validate(&self) -> Result<()> {
        if self.download.default_chunk_size == 0 {
            return Err(config_error(
                "default_chunk_size must be greater than zero",
                "default_chunk_size",
            ));
        }
        if self.download.default_chunk_size > MAX_CHUNK_SIZE {
            return Err(config_error(
                "default_chunk_size exceeds the 16 MiB limit",
                "default_chunk_size",
            ));
        }
        if self.engine.command_buffer == 0 {
            return Err(config_error(
                "command_buffer must be greater than zero",
                "command_buffer",
            ));
        }
        if self.engine.event_buffer == 0 {
            return Err(config_error(
                "event_buffer must be greater than zero",
                "event_buffer",
            ));
        }
        if self.download.temp_dir == self.download.download_dir {
            return Err(config_error(
                "temp_dir must differ from download_dir",
                "temp_dir",
            ));
        }
        if self.server.api.progress_interval.is_zero() {
            return Err(config_error(
                "progress_interval must be greater than zero",
                "progress_interval",
            ));
        }
        Ok(())
    }
}

fn config_error(message: &str, key: &str) -> Error {
    Error::Config {
        message: message.to_string(),
        key: Some(key.to_string()),
    }
}

/// API and external server integration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ServerIntegrationConfig {
    /// REST API configuration
    #[serde(default)]
    pub api: ApiConfig,
}

/// REST API configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Address to bind to (default: 127.0.0.1:6789)
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,

    /// Enable CORS for browser access (default: true)
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Allowed CORS origins (default: ["*"])
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// How often `/progress` pushes a snapshot (default: 1 second)
    #[serde(default = "default_progress_interval", with = "duration_serde")]
    pub progress_interval: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            cors_enabled: true,
            cors_origins: default_cors_origins(),
            progress_interval: default_progress_interval(),
        }
    }
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("./downloads")
}

fn default_temp_dir() -> PathBuf {
    PathBuf::from("./temp")
}

fn default_chunk_size() -> usize {
    16 * 1024
}

fn default_command_buffer() -> usize {
    256
}

fn default_event_buffer() -> usize {
    1000
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_user_agent() -> String {
    format!("http-dl/{}", env!("CARGO_PKG_VERSION"))
}

fn default_true() -> bool {
    true
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 6789))
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_progress_interval() -> Duration {
    Duration::from_secs(1)
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
