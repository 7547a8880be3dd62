//! Resumable upload of large files through a server-issued session URL.
//!
//! A [`ChunkSource`] cuts the file into windows, and the [`UploadDriver`]
//! sends them one by one with `Content-Range` framing, retrying 5xx answers
//! with exponential backoff.

mod backoff;
mod chunk;
mod driver;
mod transport;

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;
use url::Url;

use crate::client::DriveError;

pub use backoff::{
    BackoffPolicy, DEFAULT_BASE_DELAY, DEFAULT_MAX_RETRIES, DEFAULT_MULTIPLIER, Sleeper,
    TokioSleeper,
};
pub use chunk::{
    CHUNK_ALIGNMENT, ChunkSource, ChunkWindow, DEFAULT_CHUNK_SIZE, FileChunkSource,
    MemoryChunkSource, content_range,
};
pub use driver::{ChunkOutcome, UploadDriver, UploadReport, classify_status};
pub use transport::{ReqwestTransport, TransportError, UploadTransport};

/// Target of one resumable upload. The URL carries its own authorization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSession {
    pub upload_url: Url,
    pub total_size: u64,
}

impl UploadSession {
    pub fn new(upload_url: Url, total_size: u64) -> Self {
        Self {
            upload_url,
            total_size,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadConfig {
    pub chunk_size: u32,
    pub backoff: BackoffPolicy,
    /// Bound on the whole upload call, not on a single request.
    pub timeout: Option<Duration>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            backoff: BackoffPolicy::default(),
            timeout: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    Requested,
    TimedOut,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::Requested => f.write_str("cancelled by caller"),
            CancelReason::TimedOut => f.write_str("operation timed out"),
        }
    }
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("source file does not exist: {}", .0.display())]
    NotFound(PathBuf),
    #[error("source ended at byte {position}, expected {total_size} bytes")]
    ShortFile { position: u64, total_size: u64 },
    #[error("server acknowledged all {total_size} bytes without completing the upload")]
    NotCommitted { total_size: u64 },
    #[error("gave up after {attempts} attempts, last status {status}")]
    TooManyRetries { status: StatusCode, attempts: u16 },
    #[error("unexpected status code: {status}")]
    UnexpectedStatus { status: StatusCode },
    #[error("upload {0}")]
    Cancelled(CancelReason),
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("upload session request failed: {0}")]
    Session(#[from] DriveError),
}

impl UploadError {
    /// Status code the server answered with, when the failure came from one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            UploadError::TooManyRetries { status, .. }
            | UploadError::UnexpectedStatus { status } => Some(*status),
            _ => None,
        }
    }
}
