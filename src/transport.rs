//! HTTP transport seam for the fetch algorithm
//!
//! [`crate::fetch`] only talks to a [`Transport`]. Production uses
//! [`ReqwestTransport`]; tests plug in scripted transports to control statuses,
//! headers and body pacing without a network.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use reqwest::header::{CONTENT_RANGE, RANGE};

use crate::config::EngineConfig;
use crate::error::{Error, FetchError, Result};

/// One outgoing request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchRequest {
    /// Target URL
    pub url: String,
    /// First byte wanted; sent as `Range: bytes=<start>-`
    pub range_start: Option<u64>,
    /// Proxy to route through, as decided by [`crate::ProxyPolicy`]
    pub proxy: Option<String>,
}

/// Response headers plus a body stream
pub struct FetchResponse {
    /// HTTP status code
    pub status: u16,
    /// Declared length of this response's body
    pub content_length: Option<u64>,
    /// First byte position from `Content-Range`, if present
    pub content_range_start: Option<u64>,
    /// Body chunks as they arrive, in whatever sizes the server sends
    pub body: BoxStream<'static, std::result::Result<Bytes, FetchError>>,
}

impl std::fmt::Debug for FetchResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchResponse")
            .field("status", &self.status)
            .field("content_length", &self.content_length)
            .field("content_range_start", &self.content_range_start)
            .finish_non_exhaustive()
    }
}

/// Issues HTTP requests for the fetch algorithm
///
/// `fetch` resolves once response headers are in; the body is consumed through
/// [`FetchResponse::body`].
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Send `request` and return the response headers and body stream
    async fn fetch(&self, request: FetchRequest) -> std::result::Result<FetchResponse, FetchError>;
}

/// [`Transport`] backed by reqwest
///
/// Holds one direct client and lazily builds one client per proxy address.
/// Environment proxy variables are ignored by every client: proxying is only
/// applied when the request names a proxy.
pub struct ReqwestTransport {
    direct: reqwest::Client,
    proxied: Mutex<HashMap<String, reqwest::Client>>,
    config: EngineConfig,
}

impl ReqwestTransport {
    /// Build the direct client from the engine settings
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let direct = Self::builder(config)
            .build()
            .map_err(|e| Error::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            direct,
            proxied: Mutex::new(HashMap::new()),
            config: config.clone(),
        })
    }

    fn builder(config: &EngineConfig) -> reqwest::ClientBuilder {
        reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(config.connect_timeout)
            .no_proxy()
    }

    fn client_for(&self, proxy: Option<&str>) -> std::result::Result<reqwest::Client, FetchError> {
        let Some(address) = proxy else {
            return Ok(self.direct.clone());
        };

        let mut proxied = self.proxied.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = proxied.get(address) {
            return Ok(client.clone());
        }

        let invalid = |e: reqwest::Error| FetchError::InvalidProxy {
            address: address.to_string(),
            reason: e.to_string(),
        };
        let client = Self::builder(&self.config)
            .proxy(reqwest::Proxy::all(address).map_err(invalid)?)
            .build()
            .map_err(invalid)?;

        tracing::debug!(proxy = %address, "created proxied HTTP client");
        proxied.insert(address.to_string(), client.clone());
        Ok(client)
    }
}

#[async_trait::async_trait]
impl Transport for ReqwestTransport {
    async fn fetch(&self, request: FetchRequest) -> std::result::Result<FetchResponse, FetchError> {
        let client = self.client_for(request.proxy.as_deref())?;

        let mut builder = client.get(&request.url);
        if let Some(start) = request.range_start {
            builder = builder.header(RANGE, format!("bytes={start}-"));
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let content_length = response.content_length();
        let content_range_start = response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_content_range_start);

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(FetchError::from))
            .boxed();

        Ok(FetchResponse {
            status,
            content_length,
            content_range_start,
            body,
        })
    }
}

/// First byte position of a `Content-Range: bytes <start>-<end>/<size>` header
///
/// Returns None for unsatisfied ranges (`bytes */<size>`) and other units.
pub fn parse_content_range_start(value: &str) -> Option<u64> {
    let range = value.trim().strip_prefix("bytes")?.trim_start();
    let (start, _) = range.split_once('-')?;
    start.trim().parse().ok()
}
