//! Durable cursor marking progress through the ordered search space.
//!
//! The cursor records which (query, sort) pair completed last for a given
//! crawl target. It is saved once per completed pair - never per page - so
//! a restart re-walks the interrupted pair from page 1 and relies on history
//! deduplication to make that cheap.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Persisted position in the (query, sort) search space.
///
/// Monotonically non-decreasing within a run. A cursor loaded for a
/// different target than it was saved for resets to zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    /// Crawl target the cursor belongs to.
    pub target: String,
    /// Index into the configured query list.
    pub query_idx: usize,
    /// Index into the configured sort-mode list.
    pub sort_idx: usize,
}

impl Cursor {
    /// The zero cursor for a target: start of the search space.
    #[must_use]
    pub fn start(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            query_idx: 0,
            sort_idx: 0,
        }
    }
}

/// Errors raised while persisting a cursor.
///
/// Loading never fails: any unreadable or mismatched state degrades to the
/// zero cursor, which is always safe to resume from.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// Cursor could not be serialized (should not occur for this shape).
    #[error("cannot serialize checkpoint: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Temp write or atomic rename failed.
    #[error("cannot write checkpoint {path}: {source}")]
    Io {
        /// Destination checkpoint path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

/// File-backed checkpoint store, single writer (the orchestrator).
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    /// Creates a store backed by the given file path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the cursor for `target`.
    ///
    /// Yields the zero cursor when the file is absent, unreadable, or was
    /// saved for a different target (a stale subject resets progress).
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn load(&self, target: &str) -> Cursor {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) => {
                debug!(error = %err, "no readable checkpoint, starting from zero");
                return Cursor::start(target);
            }
        };

        match serde_json::from_str::<Cursor>(&text) {
            Ok(cursor) if cursor.target == target => {
                debug!(query_idx = cursor.query_idx, sort_idx = cursor.sort_idx, "resuming");
                cursor
            }
            Ok(cursor) => {
                debug!(
                    saved_target = %cursor.target,
                    "checkpoint belongs to a different target, starting from zero"
                );
                Cursor::start(target)
            }
            Err(err) => {
                warn!(error = %err, "corrupt checkpoint, starting from zero");
                Cursor::start(target)
            }
        }
    }

    /// Atomically overwrites the persisted cursor.
    ///
    /// Writes to a sibling temp file and renames it into place so a crash
    /// mid-save never leaves a truncated checkpoint behind.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError`] on serialization or filesystem failure.
    #[instrument(skip(self, cursor), fields(path = %self.path.display(), query_idx = cursor.query_idx, sort_idx = cursor.sort_idx))]
    pub fn save(&self, cursor: &Cursor) -> Result<(), CheckpointError> {
        let json = serde_json::to_string(cursor)?;
        let tmp = self.path.with_extension("json.tmp");

        std::fs::write(&tmp, json).map_err(|source| CheckpointError::Io {
            path: self.path.clone(),
            source,
        })?;
        std::fs::rename(&tmp, &self.path).map_err(|source| {
            // Best-effort cleanup so a stray temp file does not accumulate.
            let _ = std::fs::remove_file(&tmp);
            CheckpointError::Io {
                path: self.path.clone(),
                source,
            }
        })?;
        Ok(())
    }
}
