//! Shared test helpers: a scripted transport and downloader constructors.

use crate::config::Config;
use crate::downloader::HttpDownloader;
use crate::error::FetchError;
use crate::transport::{FetchRequest, FetchResponse, Transport};
use crate::types::{Event, TaskId, TaskState};
use bytes::Bytes;
use futures::StreamExt;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::tempdir;
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::ReceiverStream;

/// Deterministic test payload of `len` bytes
pub(crate) fn body_of(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Body source of a scripted response
pub(crate) enum ScriptedBody {
    /// Pieces delivered as fast as they are polled
    Pieces(Vec<Bytes>),
    /// Pieces delivered when the test sends them; the body ends when the sender drops
    Channel(mpsc::Receiver<Result<Bytes, FetchError>>),
}

/// One scripted answer, consumed by the next request
pub(crate) enum ScriptedResponse {
    Respond {
        status: u16,
        content_length: Option<u64>,
        content_range_start: Option<u64>,
        body: ScriptedBody,
    },
    /// Fail before headers arrive
    Fail(FetchError),
    /// Never deliver headers
    Hang,
}

fn split(data: &[u8], piece: usize) -> Vec<Bytes> {
    data.chunks(piece.max(1))
        .map(Bytes::copy_from_slice)
        .collect()
}

impl ScriptedResponse {
    /// `200 OK` with the whole body, sent in `piece`-sized parts
    pub(crate) fn full(data: &[u8], piece: usize) -> Self {
        Self::Respond {
            status: 200,
            content_length: Some(data.len() as u64),
            content_range_start: None,
            body: ScriptedBody::Pieces(split(data, piece)),
        }
    }

    /// `206 Partial Content` carrying `data` as the bytes from `start` on
    pub(crate) fn partial(data: &[u8], start: u64, piece: usize) -> Self {
        Self::Respond {
            status: 206,
            content_length: Some(data.len() as u64),
            content_range_start: Some(start),
            body: ScriptedBody::Pieces(split(data, piece)),
        }
    }

    /// Bare status with an empty body
    pub(crate) fn status(status: u16) -> Self {
        Self::Respond {
            status,
            content_length: Some(0),
            content_range_start: None,
            body: ScriptedBody::Pieces(Vec::new()),
        }
    }

    /// Body driven by the returned sender
    pub(crate) fn streamed(
        status: u16,
        content_length: Option<u64>,
    ) -> (Self, mpsc::Sender<Result<Bytes, FetchError>>) {
        let (tx, rx) = mpsc::channel(64);
        let response = Self::Respond {
            status,
            content_length,
            content_range_start: None,
            body: ScriptedBody::Channel(rx),
        };
        (response, tx)
    }

    pub(crate) fn hang() -> Self {
        Self::Hang
    }

    pub(crate) fn fail(error: FetchError) -> Self {
        Self::Fail(error)
    }

    /// Override the declared content length
    pub(crate) fn with_length(mut self, len: u64) -> Self {
        if let Self::Respond { content_length, .. } = &mut self {
            *content_length = Some(len);
        }
        self
    }

    /// Drop the declared content length
    pub(crate) fn without_length(mut self) -> Self {
        if let Self::Respond { content_length, .. } = &mut self {
            *content_length = None;
        }
        self
    }
}

/// [`Transport`] answering from a queue of scripted responses
///
/// Every request is recorded, so tests can assert on range offsets and proxies.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    scripts: Mutex<VecDeque<ScriptedResponse>>,
    requests: Mutex<Vec<FetchRequest>>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn push(&self, response: ScriptedResponse) {
        self.scripts.lock().unwrap().push_back(response);
    }

    pub(crate) fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Transport for ScriptedTransport {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError> {
        self.requests.lock().unwrap().push(request);
        let script = self.scripts.lock().unwrap().pop_front();

        match script {
            Some(ScriptedResponse::Respond {
                status,
                content_length,
                content_range_start,
                body,
            }) => {
                let body = match body {
                    ScriptedBody::Pieces(pieces) => {
                        futures::stream::iter(pieces.into_iter().map(Ok)).boxed()
                    }
                    ScriptedBody::Channel(rx) => ReceiverStream::new(rx).boxed(),
                };
                Ok(FetchResponse {
                    status,
                    content_length,
                    content_range_start,
                    body,
                })
            }
            Some(ScriptedResponse::Fail(error)) => Err(error),
            Some(ScriptedResponse::Hang) => std::future::pending().await,
            None => Err(FetchError::Network("no scripted response left".to_string())),
        }
    }
}

/// Config rooted in `dir` with short timeouts
pub(crate) fn test_config(dir: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.download.download_dir = dir.join("downloads");
    config.download.temp_dir = dir.join("temp");
    config.engine.shutdown_timeout = Duration::from_secs(5);
    config
}

/// Create a test HttpDownloader backed by a [`ScriptedTransport`]
/// Returns the tempdir too, which must be kept alive.
pub(crate) async fn create_test_downloader() -> (
    HttpDownloader,
    Arc<ScriptedTransport>,
    tempfile::TempDir,
) {
    let temp_dir = tempdir().unwrap();
    let transport = ScriptedTransport::new();
    let downloader =
        HttpDownloader::with_transport(test_config(temp_dir.path()), transport.clone())
            .await
            .unwrap();
    (downloader, transport, temp_dir)
}

/// Poll until the task reaches `state`, panicking after five seconds
pub(crate) async fn wait_for_state(downloader: &HttpDownloader, id: &TaskId, state: TaskState) {
    let reached = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if downloader.get(id).map(|t| t.state()) == Some(state) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;

    assert!(
        reached.is_ok(),
        "task {id} did not reach {state}, last seen {:?}",
        downloader.get(id).map(|t| t.state())
    );
}

/// Next event, panicking after five seconds
pub(crate) async fn next_event(rx: &mut broadcast::Receiver<Event>) -> Event {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

/// Names of the lifecycle events received so far
pub(crate) fn drain_lifecycle(rx: &mut broadcast::Receiver<Event>) -> Vec<&'static str> {
    let mut names = Vec::new();
    while let Ok(event) = rx.try_recv() {
        names.push(event.name());
    }
    names
}

/// `loaded_bytes` of every progress event received so far
pub(crate) fn drain_progress(rx: &mut broadcast::Receiver<Event>) -> Vec<u64> {
    let mut loaded = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let Event::Progress { loaded_bytes, .. } = event {
            loaded.push(loaded_bytes);
        }
    }
    loaded
}
