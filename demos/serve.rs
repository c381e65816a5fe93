//! REST API server demo
//!
//! Runs http-dl with the REST API enabled until Ctrl+C.
//!
//! ```bash
//! cargo run --example serve              # defaults
//! cargo run --example serve config.json  # JSON config file
//! ```
//!
//! After starting, you can:
//! - Add a download via POST http://localhost:6789/downloads
//! - Watch progress via GET http://localhost:6789/progress
//! - Stream lifecycle events via GET http://localhost:6789/events

use http_dl::config::{Config, ProxyConfig};
use http_dl::{HttpDownloader, run_with_shutdown};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("http_dl=info")),
        )
        .init();

    let mut config: Config = match std::env::args().nth(1) {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => Config::default(),
    };
    if config.proxy.address.is_none() {
        config.proxy = ProxyConfig::from_env();
    }

    let downloader = HttpDownloader::new(config.clone()).await?;
    let api = downloader.spawn_api_server();

    let base = format!("http://{}", config.server.api.bind_address);
    println!("http-dl API: {base}");
    println!();
    println!("Example commands:");
    println!("  curl -X POST {base}/downloads \\");
    println!("    -H 'Content-Type: application/json' \\");
    println!(
        "    -d '{{\"source_url\": \"https://example.com/video.mp4\", \"destination_file\": \"video.mp4\"}}'"
    );
    println!("  curl {base}/downloads");
    println!("  curl -N {base}/progress");
    println!("  curl -N {base}/events");

    run_with_shutdown(downloader).await?;
    api.abort();

    Ok(())
}
