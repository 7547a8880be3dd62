use std::io;

use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, HeaderMap, HeaderValue};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::backoff::{Sleeper, TokioSleeper};
use super::chunk::{ChunkSource, ChunkWindow};
use super::transport::UploadTransport;
use super::{CancelReason, UploadConfig, UploadError, UploadSession};

/// How the driver reacts to the status of one chunk PUT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkOutcome {
    Continue,
    Complete,
    Retry,
    Fatal,
}

pub fn classify_status(status: StatusCode) -> ChunkOutcome {
    match status {
        StatusCode::ACCEPTED => ChunkOutcome::Continue,
        StatusCode::OK | StatusCode::CREATED => ChunkOutcome::Complete,
        status if status.is_server_error() => ChunkOutcome::Retry,
        _ => ChunkOutcome::Fatal,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadReport {
    /// Status of the response that completed the upload.
    pub status: StatusCode,
    pub bytes_sent: u64,
    pub requests: u32,
    pub retries: u32,
}

#[derive(Debug, Default)]
struct TransferState {
    position: u64,
    error_count: u16,
    requests: u32,
    retries: u32,
}

enum UploadState {
    Reading,
    Sending(ChunkWindow),
    Retrying {
        chunk: ChunkWindow,
        status: StatusCode,
    },
    Completed(StatusCode),
    Failed(UploadError),
}

pub struct UploadDriver<T, S = TokioSleeper> {
    transport: T,
    sleeper: S,
    config: UploadConfig,
}

impl<T: UploadTransport> UploadDriver<T> {
    pub fn new(transport: T, config: UploadConfig) -> Self {
        Self::with_sleeper(transport, TokioSleeper, config)
    }
}

impl<T: UploadTransport, S: Sleeper> UploadDriver<T, S> {
    pub fn with_sleeper(transport: T, sleeper: S, config: UploadConfig) -> Self {
        Self {
            transport,
            sleeper,
            config,
        }
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// Drives `source` to completion against `session`. Resolves exactly once,
    /// with either the completing response or the first fatal error.
    pub async fn upload<C>(
        &self,
        session: &UploadSession,
        source: &mut C,
        cancel: &CancellationToken,
    ) -> Result<UploadReport, UploadError>
    where
        C: ChunkSource + ?Sized,
    {
        if self.config.chunk_size == 0 {
            return Err(UploadError::InvalidChunkSize);
        }
        let run = self.run(session, source, cancel);
        match self.config.timeout {
            Some(limit) => tokio::time::timeout(limit, run)
                .await
                .unwrap_or_else(|_| Err(UploadError::Cancelled(CancelReason::TimedOut))),
            None => run.await,
        }
    }

    async fn run<C>(
        &self,
        session: &UploadSession,
        source: &mut C,
        cancel: &CancellationToken,
    ) -> Result<UploadReport, UploadError>
    where
        C: ChunkSource + ?Sized,
    {
        let mut transfer = TransferState::default();
        let mut state = UploadState::Reading;
        loop {
            if cancel.is_cancelled() && !is_terminal(&state) {
                state = UploadState::Failed(UploadError::Cancelled(CancelReason::Requested));
            }
            state = match state {
                UploadState::Reading => self.read_next(session, source, &transfer).await,
                UploadState::Sending(chunk) => {
                    self.send(session, chunk, &mut transfer, cancel).await
                }
                UploadState::Retrying { chunk, status } => {
                    self.retry(chunk, status, &mut transfer, cancel).await
                }
                UploadState::Completed(status) => {
                    info!(
                        bytes = transfer.position,
                        requests = transfer.requests,
                        "upload completed"
                    );
                    return Ok(UploadReport {
                        status,
                        bytes_sent: transfer.position,
                        requests: transfer.requests,
                        retries: transfer.retries,
                    });
                }
                UploadState::Failed(err) => return Err(err),
            };
        }
    }

    async fn read_next<C>(
        &self,
        session: &UploadSession,
        source: &mut C,
        transfer: &TransferState,
    ) -> UploadState
    where
        C: ChunkSource + ?Sized,
    {
        let total_size = session.total_size;
        let remaining = total_size.saturating_sub(transfer.position);
        if remaining == 0 {
            // An empty file still needs one request to commit the session.
            if total_size == 0 && transfer.requests == 0 {
                return UploadState::Sending(ChunkWindow::new(0, Bytes::new()));
            }
            return UploadState::Failed(UploadError::NotCommitted { total_size });
        }

        let want = remaining.min(u64::from(self.config.chunk_size)) as u32;
        let data = match source.read_at(transfer.position, want).await {
            Ok(data) => data,
            Err(err) => return UploadState::Failed(err.into()),
        };
        if (data.len() as u64) < u64::from(want) {
            return UploadState::Failed(UploadError::ShortFile {
                position: transfer.position + data.len() as u64,
                total_size,
            });
        }
        UploadState::Sending(ChunkWindow::new(transfer.position, data))
    }

    async fn send(
        &self,
        session: &UploadSession,
        chunk: ChunkWindow,
        transfer: &mut TransferState,
        cancel: &CancellationToken,
    ) -> UploadState {
        let range = chunk.content_range(session.total_size);
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_LENGTH, HeaderValue::from(chunk.len()));
        match HeaderValue::try_from(range.as_str()) {
            Ok(value) => headers.insert(CONTENT_RANGE, value),
            Err(err) => {
                return UploadState::Failed(UploadError::Io(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    err,
                )));
            }
        };

        debug!(range = %range, attempt = u32::from(transfer.error_count) + 1, "sending chunk");
        transfer.requests += 1;
        let sent = tokio::select! {
            _ = cancel.cancelled() => {
                return UploadState::Failed(UploadError::Cancelled(CancelReason::Requested));
            }
            sent = self.transport.put(&session.upload_url, chunk.data.clone(), headers) => sent,
        };
        let status = match sent {
            Ok(status) => status,
            Err(err) => return UploadState::Failed(err.into()),
        };

        match classify_status(status) {
            ChunkOutcome::Continue => {
                transfer.position += u64::from(chunk.len());
                transfer.error_count = 0;
                UploadState::Reading
            }
            ChunkOutcome::Complete => {
                transfer.position += u64::from(chunk.len());
                UploadState::Completed(status)
            }
            ChunkOutcome::Retry => {
                transfer.error_count = transfer.error_count.saturating_add(1);
                UploadState::Retrying { chunk, status }
            }
            ChunkOutcome::Fatal => UploadState::Failed(UploadError::UnexpectedStatus { status }),
        }
    }

    async fn retry(
        &self,
        chunk: ChunkWindow,
        status: StatusCode,
        transfer: &mut TransferState,
        cancel: &CancellationToken,
    ) -> UploadState {
        let policy = self.config.backoff;
        if !policy.allows(transfer.error_count) {
            warn!(
                offset = chunk.offset,
                status = %status,
                attempts = transfer.error_count,
                "chunk upload failed too many times"
            );
            return UploadState::Failed(UploadError::TooManyRetries {
                status,
                attempts: transfer.error_count,
            });
        }

        let delay = policy.delay(transfer.error_count);
        warn!(
            offset = chunk.offset,
            status = %status,
            retry = transfer.error_count,
            delay_ms = delay.as_millis() as u64,
            "chunk upload failed, retrying"
        );
        tokio::select! {
            _ = cancel.cancelled() => {
                return UploadState::Failed(UploadError::Cancelled(CancelReason::Requested));
            }
            _ = self.sleeper.sleep(delay) => {}
        }
        transfer.retries += 1;
        UploadState::Sending(chunk)
    }
}

fn is_terminal(state: &UploadState) -> bool {
    matches!(state, UploadState::Completed(_) | UploadState::Failed(_))
}
