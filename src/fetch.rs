//! Resumable fetch of a single task into its temp file
//!
//! One call of [`run_fetch`] is one attempt:
//! 1. resume offset = current temp file length (0 if absent)
//! 2. resolve the proxy for this attempt
//! 3. request `Range: bytes=<offset>-` when resuming
//! 4. validate the response; restart from 0 if the server ignored the range
//! 5. stream the body into the temp file in `chunk_size` writes, publishing
//!    progress after each durable write
//! 6. verify the final length and move the temp file to its destination
//!
//! The only suspension points that observe cancellation are waiting for response
//! headers and waiting for the next body chunk. A cancelled attempt returns
//! [`FetchError::Cancelled`] and leaves the temp file as it was after the last
//! completed write.

use std::path::Path;
use std::sync::Arc;

use bytes::BytesMut;
use futures::StreamExt;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::error::{FetchError, Result};
use crate::events::EventBus;
use crate::proxy::ProxyPolicy;
use crate::registry::TaskRegistry;
use crate::task::DownloadTask;
use crate::transport::{FetchRequest, FetchResponse, Transport};
use crate::types::{Event, TaskId};

const STATUS_PARTIAL_CONTENT: u16 = 206;
const STATUS_RANGE_NOT_SATISFIABLE: u16 = 416;

/// Everything one fetch attempt needs
pub(crate) struct FetchContext {
    /// Snapshot of the task taken when the attempt started
    pub(crate) task: DownloadTask,
    pub(crate) registry: TaskRegistry,
    pub(crate) events: EventBus,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) proxy: ProxyPolicy,
    pub(crate) cancel: CancellationToken,
    pub(crate) overwrite_existing: bool,
}

impl FetchContext {
    fn id(&self) -> &TaskId {
        self.task.id()
    }

    fn set_progress(&self, loaded_bytes: u64, total_bytes: u64) -> Result<()> {
        self.registry
            .update(self.id(), |task| task.set_progress(loaded_bytes, total_bytes))?;
        Ok(())
    }

    /// Send a request, giving up as soon as the attempt is cancelled
    async fn send(&self, range_start: u64, proxy: Option<String>) -> Result<FetchResponse> {
        let request = FetchRequest {
            url: self.task.source_url().to_string(),
            range_start: (range_start > 0).then_some(range_start),
            proxy,
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(FetchError::Cancelled.into()),
            response = self.transport.fetch(request) => Ok(response?),
        }
    }

    /// Append one chunk, flush it, then publish the new length
    async fn write_chunk(
        &self,
        file: &mut File,
        chunk: &[u8],
        loaded_bytes: u64,
        total_bytes: u64,
    ) -> Result<u64> {
        file.write_all(chunk).await?;
        file.flush().await?;

        let loaded_bytes = loaded_bytes + chunk.len() as u64;
        self.set_progress(loaded_bytes, total_bytes)?;
        self.events.emit(Event::Progress {
            id: self.id().clone(),
            loaded_bytes,
            total_bytes,
        });
        tracing::trace!(task_id = %self.id(), loaded_bytes, total_bytes, "chunk written");

        Ok(loaded_bytes)
    }
}

/// Length of the file at `path`, 0 if it does not exist
pub(crate) async fn file_len(path: &Path) -> std::io::Result<u64> {
    match tokio::fs::metadata(path).await {
        Ok(metadata) => Ok(metadata.len()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e),
    }
}

async fn open_temp(path: &Path, append: bool) -> std::io::Result<File> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    if append {
        OpenOptions::new().append(true).open(path).await
    } else {
        OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .await
    }
}

/// Run one fetch attempt; returns the final file size on success
///
/// Does not change the task's state: the caller maps the outcome to
/// `Succeeded`, `Failed` or `Stopped`.
pub(crate) async fn run_fetch(ctx: &FetchContext) -> Result<u64> {
    let task = &ctx.task;
    let id = task.id();
    let temp_path = task.temp_path();

    let mut offset = file_len(temp_path).await?;
    ctx.set_progress(offset, task.total_bytes())?;

    let proxy = ctx.proxy.resolve(task.source_url(), task.use_proxy())?;

    tracing::info!(
        task_id = %id,
        url = %task.source_url(),
        offset,
        proxied = proxy.is_some(),
        "fetch started"
    );

    let mut response = ctx.send(offset, proxy.clone()).await?;

    // The partial file is at least as long as the resource: start over
    if response.status == STATUS_RANGE_NOT_SATISFIABLE && offset > 0 {
        tracing::warn!(task_id = %id, offset, "resume offset not satisfiable, restarting from zero");
        offset = 0;
        response = ctx.send(0, proxy).await?;
    }

    if !(200..300).contains(&response.status) {
        return Err(FetchError::Http {
            status: response.status,
        }
        .into());
    }

    if offset > 0 {
        match (response.status, response.content_range_start) {
            (STATUS_PARTIAL_CONTENT, Some(start)) if start != offset => {
                return Err(FetchError::RangeMismatch {
                    expected: offset,
                    actual: start,
                }
                .into());
            }
            (STATUS_PARTIAL_CONTENT, _) => {}
            (status, _) => {
                tracing::warn!(
                    task_id = %id,
                    offset,
                    status,
                    "server ignored range request, restarting from zero"
                );
                offset = 0;
            }
        }
    }

    let total_bytes = response
        .content_length
        .map(|len| offset + len)
        .unwrap_or(0);

    // Publish before truncating so loaded_bytes never runs ahead of the file
    ctx.set_progress(offset, total_bytes)?;
    let mut file = open_temp(temp_path, offset > 0).await?;

    let chunk_size = task.chunk_size().max(1);
    let mut buffer = BytesMut::new();
    let mut loaded_bytes = offset;

    loop {
        let next = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => {
                tracing::info!(task_id = %id, loaded_bytes, "fetch cancelled");
                return Err(FetchError::Cancelled.into());
            }
            next = response.body.next() => next,
        };

        match next {
            Some(Ok(bytes)) => {
                buffer.extend_from_slice(&bytes);
                while buffer.len() >= chunk_size {
                    let chunk = buffer.split_to(chunk_size);
                    loaded_bytes = ctx
                        .write_chunk(&mut file, &chunk, loaded_bytes, total_bytes)
                        .await?;
                }
            }
            Some(Err(e)) => return Err(e.into()),
            None => break,
        }
    }

    if !buffer.is_empty() {
        loaded_bytes = ctx
            .write_chunk(&mut file, &buffer, loaded_bytes, total_bytes)
            .await?;
    }
    file.sync_all().await?;
    drop(file);

    let size = file_len(temp_path).await?;
    if total_bytes > 0 && size < total_bytes {
        return Err(FetchError::Network(format!(
            "body ended early: received {size} of {total_bytes} bytes"
        ))
        .into());
    }
    if size != loaded_bytes {
        tracing::debug!(task_id = %id, loaded_bytes, size, "corrected byte count from disk");
    }
    ctx.set_progress(size, size)?;

    finalize(temp_path, task.destination_path(), ctx.overwrite_existing).await?;

    tracing::info!(
        task_id = %id,
        size,
        destination = %task.destination_path().display(),
        "fetch finished"
    );
    Ok(size)
}

/// Move the finished temp file to its destination
async fn finalize(temp_path: &Path, destination: &Path, overwrite: bool) -> Result<()> {
    if let Some(parent) = destination.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    if !overwrite && tokio::fs::try_exists(destination).await? {
        return Err(FetchError::DestinationExists {
            path: destination.to_path_buf(),
        }
        .into());
    }
    tokio::fs::rename(temp_path, destination).await?;
    Ok(())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::test_helpers::{ScriptedResponse, ScriptedTransport, body_of};
    use crate::error::Error;
    use crate::types::DownloadRequest;

    struct Fixture {
        ctx: FetchContext,
        transport: Arc<ScriptedTransport>,
        _dirs: tempfile::TempDir,
    }

    fn fixture(request: DownloadRequest) -> Fixture {
        let dirs = tempfile::tempdir().unwrap();
        let task = DownloadTask::new(
            TaskId::from("f00dcafe"),
            request,
            &dirs.path().join("downloads"),
            &dirs.path().join("temp"),
            16384,
        );
        let registry = TaskRegistry::new();
        registry.add(task.clone());

        let transport = ScriptedTransport::new();
        let ctx = FetchContext {
            task,
            registry,
            events: EventBus::new(64),
            transport: transport.clone(),
            proxy: ProxyPolicy::new(None),
            cancel: CancellationToken::new(),
            overwrite_existing: false,
        };
        Fixture {
            ctx,
            transport,
            _dirs: dirs,
        }
    }

    fn request(chunk_size: usize) -> DownloadRequest {
        let mut request = DownloadRequest::new("https://example.com/file.bin", "out/file.bin");
        request.chunk_size = Some(chunk_size);
        request
    }

    #[tokio::test]
    async fn rechunks_server_pieces_into_exact_writes() {
        let fx = fixture(request(100));
        let mut rx = fx.ctx.events.subscribe_progress();
        // Server pieces of 64 bytes do not line up with the 100 byte write size
        fx.transport
            .push(ScriptedResponse::full(&body_of(250), 64));

        let size = run_fetch(&fx.ctx).await.unwrap();
        assert_eq!(size, 250);

        let mut writes = Vec::new();
        while let Ok(Event::Progress { loaded_bytes, .. }) = rx.try_recv() {
            writes.push(loaded_bytes);
        }
        assert_eq!(writes, vec![100, 200, 250]);

        let data = tokio::fs::read(fx.ctx.task.destination_path()).await.unwrap();
        assert_eq!(data, body_of(250));
        assert!(!fx.ctx.task.temp_path().exists());
    }

    #[tokio::test]
    async fn resumes_with_range_from_existing_temp_length() {
        let fx = fixture(request(100));
        let data = body_of(1000);
        tokio::fs::create_dir_all(fx.ctx.task.temp_path().parent().unwrap())
            .await
            .unwrap();
        tokio::fs::write(fx.ctx.task.temp_path(), &data[..400])
            .await
            .unwrap();
        fx.transport
            .push(ScriptedResponse::partial(&data[400..], 400, 100));

        run_fetch(&fx.ctx).await.unwrap();

        assert_eq!(fx.transport.requests()[0].range_start, Some(400));
        let written = tokio::fs::read(fx.ctx.task.destination_path()).await.unwrap();
        assert_eq!(written, data);
    }

    #[tokio::test]
    async fn ignored_range_truncates_and_restarts() {
        let fx = fixture(request(100));
        let data = body_of(500);
        tokio::fs::create_dir_all(fx.ctx.task.temp_path().parent().unwrap())
            .await
            .unwrap();
        tokio::fs::write(fx.ctx.task.temp_path(), b"stale partial content")
            .await
            .unwrap();
        fx.transport.push(ScriptedResponse::full(&data, 100));

        let size = run_fetch(&fx.ctx).await.unwrap();

        assert_eq!(size, 500, "full body must not be appended to the stale prefix");
        let written = tokio::fs::read(fx.ctx.task.destination_path()).await.unwrap();
        assert_eq!(written, data);
    }

    #[tokio::test]
    async fn range_mismatch_fails_without_touching_temp() {
        let fx = fixture(request(100));
        tokio::fs::create_dir_all(fx.ctx.task.temp_path().parent().unwrap())
            .await
            .unwrap();
        tokio::fs::write(fx.ctx.task.temp_path(), body_of(300))
            .await
            .unwrap();
        fx.transport
            .push(ScriptedResponse::partial(&body_of(500), 200, 100));

        let err = run_fetch(&fx.ctx).await.unwrap_err();
        assert!(
            matches!(
                err,
                Error::Fetch(FetchError::RangeMismatch {
                    expected: 300,
                    actual: 200
                })
            ),
            "unexpected error {err:?}"
        );
        assert_eq!(file_len(fx.ctx.task.temp_path()).await.unwrap(), 300);
    }

    #[tokio::test]
    async fn unsatisfiable_range_retries_once_from_zero() {
        let fx = fixture(request(100));
        tokio::fs::create_dir_all(fx.ctx.task.temp_path().parent().unwrap())
            .await
            .unwrap();
        tokio::fs::write(fx.ctx.task.temp_path(), body_of(800))
            .await
            .unwrap();
        fx.transport.push(ScriptedResponse::status(416));
        fx.transport.push(ScriptedResponse::full(&body_of(600), 600));

        assert_eq!(run_fetch(&fx.ctx).await.unwrap(), 600);

        let requests = fx.transport.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].range_start, Some(800));
        assert_eq!(requests[1].range_start, None);
    }

    #[tokio::test]
    async fn unknown_length_reports_zero_total_until_done() {
        let fx = fixture(request(100));
        let mut rx = fx.ctx.events.subscribe_progress();
        fx.transport
            .push(ScriptedResponse::full(&body_of(150), 150).without_length());

        assert_eq!(run_fetch(&fx.ctx).await.unwrap(), 150);

        while let Ok(Event::Progress { total_bytes, .. }) = rx.try_recv() {
            assert_eq!(total_bytes, 0);
        }
        let task = fx.ctx.registry.get(fx.ctx.id()).unwrap();
        assert_eq!((task.loaded_bytes(), task.total_bytes()), (150, 150));
    }

    #[tokio::test]
    async fn short_body_is_a_network_error_and_keeps_temp() {
        let fx = fixture(request(100));
        fx.transport
            .push(ScriptedResponse::full(&body_of(300), 100).with_length(1000));

        let err = run_fetch(&fx.ctx).await.unwrap_err();
        assert!(matches!(err, Error::Fetch(FetchError::Network(_))), "got {err:?}");
        assert_eq!(file_len(fx.ctx.task.temp_path()).await.unwrap(), 300);
        assert!(!fx.ctx.task.destination_path().exists());
    }

    #[tokio::test]
    async fn existing_destination_is_not_overwritten() {
        let fx = fixture(request(100));
        let destination = fx.ctx.task.destination_path().to_path_buf();
        tokio::fs::create_dir_all(destination.parent().unwrap())
            .await
            .unwrap();
        tokio::fs::write(&destination, b"keep me").await.unwrap();
        fx.transport.push(ScriptedResponse::full(&body_of(100), 100));

        let err = run_fetch(&fx.ctx).await.unwrap_err();
        assert!(
            matches!(err, Error::Fetch(FetchError::DestinationExists { .. })),
            "got {err:?}"
        );
        assert_eq!(tokio::fs::read(&destination).await.unwrap(), b"keep me");
        assert_eq!(file_len(fx.ctx.task.temp_path()).await.unwrap(), 100);
    }

    #[tokio::test]
    async fn overwrite_mode_replaces_destination() {
        let mut fx = fixture(request(100));
        fx.ctx.overwrite_existing = true;
        let destination = fx.ctx.task.destination_path().to_path_buf();
        tokio::fs::create_dir_all(destination.parent().unwrap())
            .await
            .unwrap();
        tokio::fs::write(&destination, b"old").await.unwrap();
        fx.transport.push(ScriptedResponse::full(&body_of(100), 100));

        run_fetch(&fx.ctx).await.unwrap();
        assert_eq!(tokio::fs::read(&destination).await.unwrap(), body_of(100));
    }

    #[tokio::test]
    async fn cancellation_while_waiting_for_headers() {
        let fx = fixture(request(100));
        fx.transport.push(ScriptedResponse::hang());
        fx.ctx.cancel.cancel();

        let err = run_fetch(&fx.ctx).await.unwrap_err();
        assert!(err.is_cancelled(), "got {err:?}");
    }

    #[tokio::test]
    async fn missing_proxy_fails_before_any_request() {
        let mut fx = fixture(DownloadRequest {
            use_proxy: true,
            ..request(100)
        });
        fx.ctx.proxy = ProxyPolicy::new(None);

        let err = run_fetch(&fx.ctx).await.unwrap_err();
        assert!(
            matches!(err, Error::Fetch(FetchError::ProxyUnavailable { .. })),
            "got {err:?}"
        );
        assert!(fx.transport.requests().is_empty());
    }
}
