//! Error types for media downloads.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while fetching one media item.
///
/// Every variant is terminal for its task: the worker logs it and drops the
/// task, leaving the id unrecorded and eligible for a future run.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network-level error (DNS, connection refused, TLS, mid-body drop).
    #[error("network error fetching {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// HTTP error response on a photo fetch.
    #[error("HTTP {status} fetching {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// File system error writing the fetched bytes.
    #[error("IO error writing {path}: {source}")]
    Io {
        /// The destination path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// External video tool could not be spawned.
    #[error("cannot spawn video tool {program}: {source}")]
    ToolSpawn {
        /// The configured tool binary.
        program: String,
        /// The underlying spawn error.
        #[source]
        source: std::io::Error,
    },

    /// External video tool exited with a non-zero status.
    #[error("video tool failed for {url} (exit code {code:?})")]
    ToolFailed {
        /// The URL passed to the tool.
        url: String,
        /// The exit code, if the process was not killed by a signal.
        code: Option<i32>,
    },

    /// External video tool exceeded its time budget and was killed.
    #[error("video tool timed out for {url}")]
    ToolTimeout {
        /// The URL passed to the tool.
        url: String,
    },
}

impl DownloadError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
