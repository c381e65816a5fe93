//! Runtime configuration updates (proxy address).

use super::HttpDownloader;

impl HttpDownloader {
    /// Get the configured forward proxy address
    ///
    /// Starts out as `Config::proxy.address` and follows [`set_proxy`](Self::set_proxy).
    pub fn proxy(&self) -> Option<String> {
        self.proxy.address()
    }

    /// Replace the forward proxy address
    ///
    /// The proxy decision is made once per fetch attempt, so the change applies
    /// to the next `start`; fetches already running keep their connection.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use http_dl::HttpDownloader;
    /// # fn example(downloader: HttpDownloader) {
    /// downloader.set_proxy(Some("http://127.0.0.1:8118".to_string()));
    ///
    /// // Proxy-requesting tasks for remote hosts now fail with ProxyUnavailable
    /// downloader.set_proxy(None);
    /// # }
    /// ```
    pub fn set_proxy(&self, address: Option<String>) {
        let address = address
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty());

        self.proxy.set_address(address.clone());

        tracing::info!(proxy = ?address, "Proxy address changed");
    }
}
