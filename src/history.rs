//! Durable, append-only record of already-downloaded item identifiers.
//!
//! The history file is one id per line, UTF-8, shared across runs and across
//! crawl targets. It is only ever appended to - never rewritten - so the
//! file doubles as an audit log, and concurrent appenders from the same run
//! cannot corrupt each other's lines beyond interleaving whole writes.
//!
//! Two read paths exist on purpose:
//! - [`HistoryStore::load`] snapshots the set once at startup for the
//!   discovery side, where a slightly stale view only costs a duplicate
//!   enqueue that the worker-side re-check catches.
//! - [`HistoryStore::contains`] re-reads the file per call, used by download
//!   workers to observe appends from concurrent workers in the same run.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rand::Rng;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument, warn};

/// Bounded retry attempts for a failed append.
const APPEND_ATTEMPTS: u32 = 10;

/// Jitter range slept between append attempts, in milliseconds.
const APPEND_RETRY_JITTER_MS: (u64, u64) = (100, 400);

/// Append-only set of processed item ids, persisted to a single file.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    /// Creates a store backed by the given file path.
    ///
    /// The file is created lazily on the first [`HistoryStore::add`].
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the full set of recorded ids.
    ///
    /// A missing or unreadable file yields the empty set: history that
    /// cannot be read only means some items may be re-downloaded, which is
    /// safe because downloads are idempotent by destination filename.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub async fn load(&self) -> HashSet<String> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => {
                let set: HashSet<String> = text
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .map(str::to_string)
                    .collect();
                debug!(ids = set.len(), "loaded history");
                set
            }
            Err(err) => {
                debug!(error = %err, "no readable history, starting empty");
                HashSet::new()
            }
        }
    }

    /// Fresh membership check against the file on disk.
    ///
    /// Workers call this right before fetching so an id appended by another
    /// worker after this run's snapshot was taken is still skipped.
    pub async fn contains(&self, id: &str) -> bool {
        self.load().await.contains(id)
    }

    /// Appends an id, returning `true` once the write has durably succeeded.
    ///
    /// A transient failure (e.g. a lock conflict with another appender) is
    /// retried up to 10 times with 100-400ms jitter. `false` is non-fatal:
    /// the item simply stays unmarked and eligible for a future run.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub async fn add(&self, id: &str) -> bool {
        for attempt in 1..=APPEND_ATTEMPTS {
            match self.try_append(id).await {
                Ok(()) => return true,
                Err(err) => {
                    warn!(attempt, error = %err, "history append failed");
                    let (lo, hi) = APPEND_RETRY_JITTER_MS;
                    let pause = rand::thread_rng().gen_range(lo..=hi);
                    tokio::time::sleep(Duration::from_millis(pause)).await;
                }
            }
        }
        warn!(id, "giving up on history append; item stays eligible for a future run");
        false
    }

    /// One append attempt: open in append mode, write the line, flush.
    async fn try_append(&self, id: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(format!("{id}\n").as_bytes()).await?;
        file.flush().await
    }
}
