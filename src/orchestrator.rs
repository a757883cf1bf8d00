//! Orchestrator: wires discovery, the queue, and the worker pool into one
//! resumable run.
//!
//! The orchestrator owns the checkpoint cursor. It drives the walker across
//! the remaining (query, sort) pairs in checkpoint order, advances the
//! cursor to the *next* pair after each one completes (so a restart never
//! re-issues a completed pair), and checks the free-space floor before each
//! unit of discovery work. On disk exhaustion it stops discovering, drains
//! the queue, and returns an error - queued work is finished, not dropped.

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, instrument, warn};
use tokio::sync::mpsc;

use crate::checkpoint::{CheckpointError, CheckpointStore, Cursor};
use crate::config::{Config, ConfigError};
use crate::download::{MediaFetcher, WorkerPool};
use crate::history::HistoryStore;
use crate::label::Labeler;
use crate::ratelimit::RateLimiter;
use crate::search::{DEFAULT_API_BASE, SearchClient, SearchError, SearchWalker, WalkStats};

/// Errors that end a whole run.
///
/// Everything below the run level (a failed page, a failed download, a
/// failed history append) is absorbed by its enclosing loop.
#[derive(Debug, Error)]
pub enum RunError {
    /// Configuration failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Storage layout could not be created.
    #[error("cannot create storage directory {path}: {source}")]
    Storage {
        /// The directory that failed.
        path: std::path::PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Checkpoint persistence failed; without it a restart would repeat work.
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    /// Search client rejected the API base URL.
    #[error(transparent)]
    ApiBase(#[from] SearchError),

    /// Free space fell below the configured floor.
    #[error("disk exhausted: {available} bytes available, floor is {required}")]
    DiskExhausted {
        /// Bytes still available when the run stopped.
        available: u64,
        /// The configured floor.
        required: u64,
    },
}

/// Final counts for one run.
#[derive(Debug, Default, Clone, Copy)]
pub struct RunSummary {
    /// Download tasks discovered and enqueued.
    pub enqueued: usize,
    /// Posts discovery skipped as already seen.
    pub skipped: usize,
    /// Posts discarded as unsupported media.
    pub discarded: usize,
    /// Tasks fetched and recorded in history.
    pub downloaded: usize,
    /// Tasks dropped after a fetch failure.
    pub failed: usize,
}

/// One configured harvest run.
pub struct Orchestrator {
    config: Config,
    fetcher: Arc<dyn MediaFetcher>,
    api_base: String,
}

impl Orchestrator {
    /// Creates an orchestrator against the production API host.
    #[must_use]
    pub fn new(config: Config, fetcher: Arc<dyn MediaFetcher>) -> Self {
        Self {
            config,
            fetcher,
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }

    /// Points the search client at an explicit API base (tests use a local
    /// mock server).
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Runs the pipeline to completion or disk exhaustion.
    ///
    /// # Errors
    ///
    /// Returns [`RunError`] for invalid configuration, a bad API base URL,
    /// storage setup failure, checkpoint write failure, or disk exhaustion.
    /// In the disk and checkpoint cases the queue has already been drained
    /// and the checkpoint reflects the last durably recorded pair.
    #[instrument(skip(self), fields(target = %self.config.target))]
    pub async fn run(self) -> Result<RunSummary, RunError> {
        self.config.validate()?;
        let limiter = Arc::new(RateLimiter::new(&self.config.rate));
        let client = SearchClient::with_base_url(&self.api_base, limiter)?;

        let labeler = Labeler::new(self.config.labels.clone());
        self.create_layout(&labeler)?;

        let history = HistoryStore::new(self.config.history_path());
        let snapshot = history.load().await;
        let checkpoints = CheckpointStore::new(self.config.checkpoint_path());
        let cursor = checkpoints.load(&self.config.target);

        info!(
            known_ids = snapshot.len(),
            query_idx = cursor.query_idx,
            sort_idx = cursor.sort_idx,
            "starting harvest"
        );

        let (sender, receiver) = mpsc::channel(self.config.queue_capacity);
        let pool = WorkerPool::spawn(
            self.config.workers,
            receiver,
            Arc::clone(&self.fetcher),
            history.clone(),
        );

        let mut walker = SearchWalker::new(
            client,
            labeler,
            &self.config.target,
            &self.config.base_dir,
            self.config.max_pages_per_task,
            snapshot,
            sender,
        );

        let mut discovery = WalkStats::default();
        // An error here ends discovery but must not abandon queued work;
        // it is returned only after the pool has drained.
        let mut failure: Option<RunError> = None;

        'discovery: for query_idx in cursor.query_idx..self.config.queries.len() {
            let sort_start = if query_idx == cursor.query_idx {
                cursor.sort_idx
            } else {
                0
            };
            for sort_idx in sort_start..self.config.sort_modes.len() {
                if let Some(available) = self.below_space_floor() {
                    warn!(available, floor = self.config.min_free_bytes, "disk floor hit");
                    failure = Some(RunError::DiskExhausted {
                        available,
                        required: self.config.min_free_bytes,
                    });
                    break 'discovery;
                }

                let query = &self.config.queries[query_idx];
                let sort = self.config.sort_modes[sort_idx];
                info!(query = %query, sort = sort.as_str(), "searching");

                let stats = walker.walk_task(query, sort).await;
                discovery.enqueued += stats.enqueued;
                discovery.skipped += stats.skipped;
                discovery.discarded += stats.discarded;

                let next = self.next_cursor(query_idx, sort_idx);
                if let Err(err) = checkpoints.save(&next) {
                    warn!(error = %err, "checkpoint write failed, stopping discovery");
                    failure = Some(err.into());
                    break 'discovery;
                }
            }
        }

        // Dropping the walker drops the queue sender; join then guarantees
        // every queued task was processed before we report anything.
        drop(walker);
        let worker_stats = pool.join().await;

        let summary = RunSummary {
            enqueued: discovery.enqueued,
            skipped: discovery.skipped,
            discarded: discovery.discarded,
            downloaded: worker_stats.downloaded(),
            failed: worker_stats.failed(),
        };
        info!(
            enqueued = summary.enqueued,
            downloaded = summary.downloaded,
            failed = summary.failed,
            "harvest finished"
        );

        match failure {
            Some(err) => Err(err),
            None => Ok(summary),
        }
    }

    /// Creates `<base>/<label>/{video,photo}` for every configured label.
    fn create_layout(&self, labeler: &Labeler) -> Result<(), RunError> {
        for label in labeler.all_labels() {
            for kind in ["video", "photo"] {
                let dir = self.config.base_dir.join(label).join(kind);
                std::fs::create_dir_all(&dir).map_err(|source| RunError::Storage {
                    path: dir.clone(),
                    source,
                })?;
            }
        }
        Ok(())
    }

    /// Returns the available byte count when it is below the floor.
    ///
    /// An unreadable filesystem statistic is treated as "enough": stopping a
    /// run over a polling error would be worse than trusting the last check.
    fn below_space_floor(&self) -> Option<u64> {
        match free_space(&self.config.base_dir) {
            Some(available) if available < self.config.min_free_bytes => Some(available),
            _ => None,
        }
    }

    /// Cursor for the pair after (query_idx, sort_idx).
    fn next_cursor(&self, query_idx: usize, sort_idx: usize) -> Cursor {
        if sort_idx + 1 < self.config.sort_modes.len() {
            Cursor {
                target: self.config.target.clone(),
                query_idx,
                sort_idx: sort_idx + 1,
            }
        } else {
            Cursor {
                target: self.config.target.clone(),
                query_idx: query_idx + 1,
                sort_idx: 0,
            }
        }
    }
}

/// Available bytes on the volume holding `path`, or `None` if unknown.
fn free_space(path: &Path) -> Option<u64> {
    fs2::available_space(path).ok()
}
