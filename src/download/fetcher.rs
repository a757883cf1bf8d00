//! Media fetching: direct HTTP for photos, an external tool for videos.
//!
//! The [`MediaFetcher`] trait is the seam between the worker pool and the
//! outside world. Production uses [`MediaDownloader`]; tests substitute a
//! recording mock so the pipeline can run without network or subprocess.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, instrument};

use super::error::DownloadError;
use super::task::{DownloadTask, MediaKind};
use crate::user_agent;

/// Timeout for a direct photo fetch.
const PHOTO_TIMEOUT: Duration = Duration::from_secs(15);

/// Time budget for one video tool invocation; the process is killed on expiry.
const VIDEO_TOOL_TIMEOUT: Duration = Duration::from_secs(45);

/// Size cap passed to the video tool.
const VIDEO_MAX_FILESIZE: &str = "100M";

/// Default external video download tool.
const DEFAULT_VIDEO_TOOL: &str = "yt-dlp";

/// Capability interface for fetching one media item to disk.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Fetches the task's media to its destination path.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError`] on any fetch or write failure. Errors are
    /// terminal for the task; the caller does not retry.
    async fn fetch(&self, task: &DownloadTask) -> Result<(), DownloadError>;
}

/// Production fetcher: reqwest for photos, a subprocess tool for videos.
#[derive(Debug, Clone)]
pub struct MediaDownloader {
    client: reqwest::Client,
    video_tool: String,
    user_agent: String,
}

impl Default for MediaDownloader {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaDownloader {
    /// Creates a fetcher with the default photo timeout and video tool.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        let user_agent = user_agent::identifying_user_agent();
        let client = reqwest::Client::builder()
            .user_agent(&user_agent)
            .timeout(PHOTO_TIMEOUT)
            .build()
            .expect("failed to build HTTP client with static configuration");
        Self {
            client,
            video_tool: DEFAULT_VIDEO_TOOL.to_string(),
            user_agent,
        }
    }

    /// Overrides the video tool binary (e.g. a wrapper script in tests).
    #[must_use]
    pub fn with_video_tool(mut self, program: impl Into<String>) -> Self {
        self.video_tool = program.into();
        self
    }

    /// Direct HTTP fetch of a photo, written whole to the destination path.
    ///
    /// Photos on the allow-listed hosts are small enough that streaming
    /// writes would buy nothing over a single buffered write.
    #[instrument(skip(self, task), fields(id = %task.id, url = %task.url))]
    async fn fetch_photo(&self, task: &DownloadTask) -> Result<(), DownloadError> {
        let response = self
            .client
            .get(&task.url)
            .send()
            .await
            .map_err(|err| DownloadError::network(&task.url, err))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(DownloadError::http_status(&task.url, status.as_u16()));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|err| DownloadError::network(&task.url, err))?;

        let dest = task.dest_path();
        tokio::fs::write(&dest, &bytes)
            .await
            .map_err(|err| DownloadError::io(&dest, err))?;

        debug!(bytes = bytes.len(), dest = %dest.display(), "photo written");
        Ok(())
    }

    /// Invokes the external video tool with a size cap and a bounded timeout.
    ///
    /// The tool picks the final extension, so it receives an output template
    /// (`<dest>/<id>.%(ext)s`) rather than the task's literal filename.
    #[instrument(skip(self, task), fields(id = %task.id, url = %task.url))]
    async fn fetch_video(&self, task: &DownloadTask) -> Result<(), DownloadError> {
        let stem = task
            .filename
            .rsplit_once('.')
            .map_or(task.filename.as_str(), |(stem, _)| stem);
        let template = task.dest_dir.join(format!("{stem}.%(ext)s"));

        let mut child = Command::new(&self.video_tool)
            .arg("--quiet")
            .arg("--ignore-errors")
            .arg("--max-filesize")
            .arg(VIDEO_MAX_FILESIZE)
            .arg("--user-agent")
            .arg(&self.user_agent)
            .arg("-o")
            .arg(&template)
            .arg(&task.url)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| DownloadError::ToolSpawn {
                program: self.video_tool.clone(),
                source,
            })?;

        let status = match tokio::time::timeout(VIDEO_TOOL_TIMEOUT, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(source)) => {
                return Err(DownloadError::ToolSpawn {
                    program: self.video_tool.clone(),
                    source,
                });
            }
            Err(_elapsed) => {
                let _ = child.kill().await;
                return Err(DownloadError::ToolTimeout {
                    url: task.url.clone(),
                });
            }
        };

        if !status.success() {
            return Err(DownloadError::ToolFailed {
                url: task.url.clone(),
                code: status.code(),
            });
        }

        debug!(dest = %template.display(), "video tool finished");
        Ok(())
    }
}

#[async_trait]
impl MediaFetcher for MediaDownloader {
    async fn fetch(&self, task: &DownloadTask) -> Result<(), DownloadError> {
        match task.kind {
            MediaKind::Photo => self.fetch_photo(task).await,
            MediaKind::Video => self.fetch_video(task).await,
        }
    }
}
