//! HTTP downloads with stall detection.
//!
//! Async reqwest on a shared tokio runtime behind a blocking interface, so
//! sources stay synchronous.

use std::path::Path;
use std::sync::{LazyLock, OnceLock};
use std::time::Duration;

use futures_util::StreamExt;
use indicatif::ProgressBar;
use nanodata_store::{Error, Result};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use crate::progress::upgrade_to_bar;

/// Network tunables, set once at startup.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Seconds without any body bytes before a download is abandoned.
    pub read_timeout: u64,
    pub connect_timeout: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            read_timeout: 30,
            connect_timeout: 30,
        }
    }
}

static HTTP_CONFIG: OnceLock<HttpConfig> = OnceLock::new();

/// Install the global HTTP config. Only the first call takes effect.
pub fn set_http_config(config: HttpConfig) {
    if HTTP_CONFIG.set(config).is_err() {
        log::debug!("http config already set, ignoring");
    }
}

pub fn http_config() -> HttpConfig {
    HTTP_CONFIG.get().copied().unwrap_or_default()
}

static SHARED_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(http_config().connect_timeout))
        .user_agent(concat!("nanodata/", env!("CARGO_PKG_VERSION")))
        .pool_max_idle_per_host(8)
        .build()
        .expect("failed to build HTTP client")
});

/// Shared tokio runtime for HTTP operations.
static SHARED_RUNTIME: LazyLock<tokio::runtime::Runtime> = LazyLock::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
});

fn http_error(url: &str, e: &reqwest::Error) -> Error {
    Error::Http {
        url: url.to_string(),
        status: e.status().map(|s| s.as_u16()),
        message: e.to_string(),
    }
}

/// Download `url` to `dest`, reporting bytes on `pb`. Returns bytes written.
///
/// Fails with [`Error::Http`] on a non-success status or when no body bytes
/// arrive for `read_timeout` seconds.
pub fn download_to_file(url: &str, dest: &Path, pb: &ProgressBar) -> Result<u64> {
    let read_timeout = Duration::from_secs(http_config().read_timeout);

    SHARED_RUNTIME.block_on(async {
        let response = SHARED_CLIENT
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| http_error(url, &e))?;

        if let Some(total) = response.content_length() {
            upgrade_to_bar(pb, total);
        }

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| Error::io(dest, e))?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;
        loop {
            let chunk = match tokio::time::timeout(read_timeout, stream.next()).await {
                Ok(Some(chunk)) => chunk.map_err(|e| http_error(url, &e))?,
                Ok(None) => break,
                Err(_) => {
                    return Err(Error::Http {
                        url: url.to_string(),
                        status: None,
                        message: format!("read stalled for {}s", read_timeout.as_secs()),
                    });
                }
            };
            file.write_all(&chunk)
                .await
                .map_err(|e| Error::io(dest, e))?;
            written += chunk.len() as u64;
            pb.inc(chunk.len() as u64);
        }
        file.flush().await.map_err(|e| Error::io(dest, e))?;
        log::debug!("downloaded {url} ({written} bytes)");
        Ok(written)
    })
}
