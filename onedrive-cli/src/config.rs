use std::time::Duration;

use anyhow::{Context, bail};
use onedrive_core::upload::{
    BackoffPolicy, CHUNK_ALIGNMENT, DEFAULT_BASE_DELAY, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_RETRIES,
    DEFAULT_MULTIPLIER,
};
use onedrive_core::{DEFAULT_BASE_URL, DriveTarget, SIMPLE_UPLOAD_LIMIT, UploadConfig};

#[derive(Clone, Debug)]
pub struct CliConfig {
    pub access_token: String,
    pub graph_url: String,
    pub drive: DriveTarget,
    pub max_duration: Option<Duration>,
    pub upload: UploadConfig,
    pub simple_upload_limit: u64,
}

impl CliConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let access_token = lookup("ONEDRIVE_ACCESS_TOKEN")
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty())
            .context("ONEDRIVE_ACCESS_TOKEN is not set")?;
        let graph_url =
            lookup("ONEDRIVE_GRAPH_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let drive = match lookup("ONEDRIVE_DRIVE") {
            Some(value) => value
                .parse::<DriveTarget>()
                .with_context(|| format!("invalid ONEDRIVE_DRIVE value {value:?}"))?,
            None => DriveTarget::Me,
        };
        let max_duration =
            read_u64(&lookup, "ONEDRIVE_MAX_DURATION_MS").map(Duration::from_millis);

        let chunk_size = read_u64(&lookup, "ONEDRIVE_CHUNK_SIZE")
            .unwrap_or(u64::from(DEFAULT_CHUNK_SIZE));
        let Ok(chunk_size) = u32::try_from(chunk_size) else {
            bail!("ONEDRIVE_CHUNK_SIZE is too large: {chunk_size}");
        };
        if chunk_size % CHUNK_ALIGNMENT != 0 {
            tracing::warn!(
                chunk_size,
                alignment = CHUNK_ALIGNMENT,
                "chunk size is not a multiple of the upload block size"
            );
        }
        let max_retries = read_count(&lookup, "ONEDRIVE_UPLOAD_RETRIES")
            .map(|value| u8::try_from(value).unwrap_or(u8::MAX))
            .unwrap_or(DEFAULT_MAX_RETRIES);
        let base_delay = read_u64(&lookup, "ONEDRIVE_BACKOFF_BASE_MS")
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_BASE_DELAY);
        let timeout =
            read_u64(&lookup, "ONEDRIVE_UPLOAD_TIMEOUT_SECS").map(Duration::from_secs);
        let simple_upload_limit =
            read_u64(&lookup, "ONEDRIVE_SIMPLE_UPLOAD_LIMIT").unwrap_or(SIMPLE_UPLOAD_LIMIT);

        Ok(Self {
            access_token,
            graph_url,
            drive,
            max_duration,
            upload: UploadConfig {
                chunk_size,
                backoff: BackoffPolicy::new(base_delay, DEFAULT_MULTIPLIER, max_retries),
                timeout,
            },
            simple_upload_limit,
        })
    }
}

/// Positive integer from the environment; zero, garbage, and unset are `None`.
fn read_u64<F>(lookup: &F, name: &str) -> Option<u64>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
}

/// Non-negative integer from the environment, where zero is meaningful.
fn read_count<F>(lookup: &F, name: &str) -> Option<u64>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name).and_then(|value| value.trim().parse::<u64>().ok())
}
