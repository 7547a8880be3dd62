use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use super::UploadError;

/// Block size the upload endpoint requires every non-final chunk to be a
/// multiple of.
pub const CHUNK_ALIGNMENT: u32 = 320 * 1024;

pub const DEFAULT_CHUNK_SIZE: u32 = CHUNK_ALIGNMENT;

/// A contiguous slice of the source at an absolute offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkWindow {
    pub offset: u64,
    pub data: Bytes,
}

impl ChunkWindow {
    pub fn new(offset: u64, data: Bytes) -> Self {
        Self { offset, data }
    }

    pub fn len(&self) -> u32 {
        self.data.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn content_range(&self, total_size: u64) -> String {
        content_range(self.offset, self.len(), total_size)
    }
}

/// `bytes {start}-{end}/{total}` with an inclusive end. An empty window at
/// offset 0 renders as `bytes 0--1/0`.
pub fn content_range(offset: u64, len: u32, total_size: u64) -> String {
    let end = i128::from(offset) + i128::from(len) - 1;
    format!("bytes {offset}-{end}/{total_size}")
}

/// Sequential reader that hands out windows of a byte source.
#[async_trait]
pub trait ChunkSource: Send {
    fn size(&self) -> u64;

    /// Returns up to `max_len` bytes starting at `offset`. The result is only
    /// shorter than `max_len` at the end of the data, and empty iff
    /// `offset >= size`.
    async fn read_at(&mut self, offset: u64, max_len: u32) -> io::Result<Bytes>;
}

#[derive(Debug)]
pub struct FileChunkSource {
    file: tokio::fs::File,
    path: PathBuf,
    size: u64,
}

impl FileChunkSource {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, UploadError> {
        let path = path.as_ref();
        let file = match tokio::fs::File::open(path).await {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(UploadError::NotFound(path.to_path_buf()));
            }
            Err(err) => return Err(err.into()),
        };
        let size = file.metadata().await?.len();
        Ok(Self {
            file,
            path: path.to_path_buf(),
            size,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ChunkSource for FileChunkSource {
    fn size(&self) -> u64 {
        self.size
    }

    async fn read_at(&mut self, offset: u64, max_len: u32) -> io::Result<Bytes> {
        if offset >= self.size || max_len == 0 {
            return Ok(Bytes::new());
        }
        let want = (self.size - offset).min(u64::from(max_len)) as usize;
        self.file.seek(SeekFrom::Start(offset)).await?;
        let mut buf = BytesMut::zeroed(want);
        let mut filled = 0;
        while filled < want {
            let n = self.file.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        buf.truncate(filled);
        Ok(buf.freeze())
    }
}

/// In-memory source, for payloads that never touch the filesystem.
#[derive(Debug, Clone)]
pub struct MemoryChunkSource {
    data: Bytes,
}

impl MemoryChunkSource {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }
}

#[async_trait]
impl ChunkSource for MemoryChunkSource {
    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    async fn read_at(&mut self, offset: u64, max_len: u32) -> io::Result<Bytes> {
        let len = self.data.len() as u64;
        if offset >= len {
            return Ok(Bytes::new());
        }
        let start = offset as usize;
        let end = (offset + u64::from(max_len)).min(len) as usize;
        Ok(self.data.slice(start..end))
    }
}
