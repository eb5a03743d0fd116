use crate::config::NetworkConfig;
use crate::error::{BergamotError, Result};
use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

/// Headroom kept free on the target filesystem when downloading
const DISK_HEADROOM_BYTES: u64 = 100 * 1_024 * 1_024;

/// What a call to [`ResourceFetcher::fetch`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Destination already existed, nothing was requested
    Skipped,
    Downloaded { bytes: u64 },
}

/// Streams remote resources to disk
#[derive(Debug, Clone)]
pub struct ResourceFetcher {
    client: reqwest::Client,
    request_timeout: Duration,
    idle_timeout: Duration,
    show_progress: bool,
}

impl ResourceFetcher {
    /// Create new fetcher
    pub fn new(network: &NetworkConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(network.connect_timeout_secs))
            .user_agent(network.user_agent.clone())
            .build()
            .map_err(|e| BergamotError::Network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            request_timeout: Duration::from_secs(network.request_timeout_secs),
            idle_timeout: Duration::from_secs(network.idle_timeout_secs),
            show_progress: network.show_progress,
        })
    }

    /// Download `url` to `dest` unless `dest` already exists
    ///
    /// The body is streamed into `<dest>.part` and renamed onto `dest` once
    /// complete, so an interrupted transfer never leaves a file at `dest`.
    pub async fn fetch(&self, url: &str, dest: &Path, force: bool) -> Result<FetchOutcome> {
        if !force && dest.exists() {
            tracing::debug!("{} already present, not fetching {url}", dest.display());
            return Ok(FetchOutcome::Skipped);
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| BergamotError::Network(format!("Request to {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BergamotError::Network(format!("HTTP {status} for {url}")));
        }

        let total = response.content_length();
        if let (Some(total), Some(parent)) = (total, dest.parent()) {
            check_disk_space(parent, total)?;
        }

        let part = part_path(dest);
        match self.stream_to_file(response, &part, total).await {
            Ok(bytes) => {
                tokio::fs::rename(&part, dest).await?;
                tracing::info!("Fetched {url} ({})", format_bytes(bytes));
                Ok(FetchOutcome::Downloaded { bytes })
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&part).await;
                Err(e)
            }
        }
    }

    /// Fetch a small text document such as a catalog listing
    pub async fn fetch_text(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| BergamotError::Network(format!("Request to {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BergamotError::Network(format!("HTTP {status} for {url}")));
        }

        response
            .text()
            .await
            .map_err(|e| BergamotError::Network(format!("Failed to read {url}: {e}")))
    }

    async fn stream_to_file(
        &self,
        response: reqwest::Response,
        part: &Path,
        total: Option<u64>,
    ) -> Result<u64> {
        let mut file = tokio::fs::File::create(part).await?;
        let progress = self.progress_bar(total, part);

        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;
        loop {
            let next = tokio::time::timeout(self.idle_timeout, stream.next())
                .await
                .map_err(|_| {
                    BergamotError::Network(format!(
                        "Transfer stalled: no data for {}s after {written} bytes",
                        self.idle_timeout.as_secs()
                    ))
                })?;
            let Some(chunk) = next else { break };
            let chunk = chunk
                .map_err(|e| BergamotError::Network(format!("Transfer interrupted: {e}")))?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
            progress.set_position(written);
        }

        file.flush().await?;
        file.sync_all().await?;
        progress.finish_and_clear();

        if let Some(total) = total {
            if written != total {
                return Err(BergamotError::Network(format!(
                    "Transfer truncated: received {written} of {total} bytes"
                )));
            }
        }

        Ok(written)
    }

    fn progress_bar(&self, total: Option<u64>, part: &Path) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }

        let progress = match total {
            Some(total) => ProgressBar::new(total),
            None => ProgressBar::new_spinner(),
        };
        if let Ok(style) = ProgressStyle::with_template(
            "{msg} [{elapsed_precise}] {bar:30} {bytes}/{total_bytes} ({bytes_per_sec})",
        ) {
            progress.set_style(style);
        }

        let name = part
            .file_name()
            .map(|n| n.to_string_lossy().trim_end_matches(".part").to_string())
            .unwrap_or_default();
        progress.set_message(name);
        progress
    }
}

/// Temporary path a download is streamed into
#[must_use]
pub fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

/// Check if enough disk space is available
#[allow(clippy::unnecessary_cast)]
fn check_disk_space(dir: &Path, required_bytes: u64) -> Result<()> {
    let stats = nix::sys::statvfs::statvfs(dir).map_err(|e| {
        BergamotError::FileSystem(format!(
            "Failed to check disk space at {}: {e}",
            dir.display()
        ))
    })?;

    let available_bytes = stats.blocks_available() as u64 * stats.fragment_size() as u64;
    let required_with_buffer = required_bytes + DISK_HEADROOM_BYTES;

    if available_bytes < required_with_buffer {
        return Err(BergamotError::FileSystem(format!(
            "Not enough disk space in {}: {} required, {} available",
            dir.display(),
            format_bytes(required_with_buffer),
            format_bytes(available_bytes)
        )));
    }

    Ok(())
}

/// Format bytes as human-readable string
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}
