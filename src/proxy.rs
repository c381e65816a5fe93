//! Forward proxy routing decisions

use std::net::IpAddr;
use std::sync::{Arc, PoisonError, RwLock};

use url::{Host, Url};

use crate::error::FetchError;

/// Decides whether a fetch goes through the configured forward proxy
///
/// The address can be replaced at runtime; [`resolve`](Self::resolve) reads it
/// fresh on every call so a change applies to the next fetch attempt.
#[derive(Clone, Debug, Default)]
pub struct ProxyPolicy {
    address: Arc<RwLock<Option<String>>>,
}

impl ProxyPolicy {
    /// Create a policy with an optional proxy address
    pub fn new(address: Option<String>) -> Self {
        Self {
            address: Arc::new(RwLock::new(address)),
        }
    }

    /// Currently configured proxy address
    pub fn address(&self) -> Option<String> {
        self.address
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the proxy address (None disables proxying)
    pub fn set_address(&self, address: Option<String>) {
        *self.address.write().unwrap_or_else(PoisonError::into_inner) = address;
    }

    /// Proxy address to use for a fetch of `url`
    ///
    /// Loopback targets never use the proxy, even when asked to.
    pub fn resolve(&self, url: &str, use_proxy: bool) -> Result<Option<String>, FetchError> {
        if !use_proxy {
            return Ok(None);
        }

        if is_loopback(url) {
            tracing::warn!(url = %url, "proxy requested for a loopback target, connecting directly");
            return Ok(None);
        }

        match self.address() {
            Some(address) => Ok(Some(address)),
            None => Err(FetchError::ProxyUnavailable {
                url: url.to_string(),
            }),
        }
    }
}

/// Whether `url` points at this machine
///
/// Unparseable URLs are treated as remote.
pub fn is_loopback(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };

    match parsed.host() {
        Some(Host::Domain(domain)) => {
            let domain = domain.trim_end_matches('.').to_ascii_lowercase();
            domain == "localhost" || domain.ends_with(".localhost")
        }
        Some(Host::Ipv4(ip)) => IpAddr::V4(ip).is_loopback(),
        Some(Host::Ipv6(ip)) => IpAddr::V6(ip).is_loopback(),
        None => false,
    }
}
