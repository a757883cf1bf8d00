//! Search walker: turns one (query, sort) pair into queued download tasks.
//!
//! The walker owns the discovery side of the pipeline. For each search task
//! it pages through results in API-cursor order, skips everything history or
//! this run has already seen, classifies the rest, and pushes the resulting
//! download tasks into the bounded queue (blocking there when downloads lag
//! behind - that is the back-pressure). Page-level failures end the current
//! search task only; the orchestrator moves on to the next pair.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use super::client::{Post, SearchClient};
use crate::config::SortMode;
use crate::download::{DownloadTask, MediaKind, image_extension, route_media};
use crate::label::Labeler;

/// Courtesy delay between page fetches, independent of the rate limiter.
const PAGE_COURTESY_DELAY: Duration = Duration::from_millis(1500);

/// Per-search-task discovery counts, for progress logging.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WalkStats {
    /// Tasks pushed into the download queue.
    pub enqueued: usize,
    /// Posts skipped because history or this run already has them.
    pub skipped: usize,
    /// Posts discarded as unsupported media.
    pub discarded: usize,
}

impl WalkStats {
    fn absorb(&mut self, other: WalkStats) {
        self.enqueued += other.enqueued;
        self.skipped += other.skipped;
        self.discarded += other.discarded;
    }
}

/// Discovery-side walker over the (query × sort × page) space.
pub struct SearchWalker {
    client: SearchClient,
    labeler: Labeler,
    target: String,
    base_dir: PathBuf,
    max_pages: u32,
    /// Snapshot of history taken at startup; the worker-side fresh re-check
    /// covers anything recorded after this.
    history: HashSet<String>,
    /// Ids enqueued this run, so a post surfacing under several queries is
    /// queued once even before history catches up.
    queued: HashSet<String>,
    sender: mpsc::Sender<DownloadTask>,
}

impl SearchWalker {
    /// Creates a walker producing into `sender`.
    #[must_use]
    pub fn new(
        client: SearchClient,
        labeler: Labeler,
        target: impl Into<String>,
        base_dir: impl Into<PathBuf>,
        max_pages: u32,
        history: HashSet<String>,
        sender: mpsc::Sender<DownloadTask>,
    ) -> Self {
        Self {
            client,
            labeler,
            target: target.into(),
            base_dir: base_dir.into(),
            max_pages,
            history,
            queued: HashSet::new(),
            sender,
        }
    }

    /// Walks every page of one (query, sort) pair.
    ///
    /// Stops when the next-page token is absent, the page limit is reached,
    /// or a page fails; a failure is logged and absorbed, since losing the
    /// rest of one search task must not end the run.
    #[instrument(skip(self, sort), fields(target = %self.target, sort = sort.as_str()))]
    pub async fn walk_task(&mut self, query: &str, sort: SortMode) -> WalkStats {
        let mut stats = WalkStats::default();
        let mut after: Option<String> = None;

        for page in 1..=self.max_pages {
            let listing = match self
                .client
                .fetch_page(&self.target, query, sort, after.as_deref())
                .await
            {
                Ok(listing) => listing,
                Err(err) => {
                    warn!(page, error = %err, "page failed, ending this search task");
                    break;
                }
            };

            let mut page_stats = WalkStats::default();
            for child in listing.children {
                if self.process_post(&child.data, &mut page_stats).await.is_err() {
                    // Queue closed: downloads are shutting down, stop discovering.
                    stats.absorb(page_stats);
                    return stats;
                }
            }
            debug!(page, enqueued = page_stats.enqueued, "page processed");
            stats.absorb(page_stats);

            after = listing.after;
            if after.is_none() {
                break;
            }
            if page < self.max_pages {
                // Courtesy pause between pages, on top of the rate limiter.
                tokio::time::sleep(PAGE_COURTESY_DELAY).await;
            }
        }

        info!(
            enqueued = stats.enqueued,
            skipped = stats.skipped,
            discarded = stats.discarded,
            "search task finished"
        );
        stats
    }

    /// Classifies one post and enqueues it if it is new, supported media.
    ///
    /// The only error is a closed queue; everything else is a counted skip
    /// or discard.
    async fn process_post(
        &mut self,
        post: &Post,
        stats: &mut WalkStats,
    ) -> Result<(), mpsc::error::SendError<DownloadTask>> {
        if self.history.contains(&post.id) || self.queued.contains(&post.id) {
            stats.skipped += 1;
            return Ok(());
        }

        let Some(task) = self.build_task(post) else {
            stats.discarded += 1;
            return Ok(());
        };

        self.queued.insert(post.id.clone());
        self.sender.send(task).await?;
        stats.enqueued += 1;
        Ok(())
    }

    /// Builds the download task for a post, or `None` for unsupported media.
    fn build_task(&self, post: &Post) -> Option<DownloadTask> {
        let resolved = post.resolved_url()?;
        let kind = route_media(resolved, post.is_video)?;

        let label = self
            .labeler
            .detect(post.link_flair_text.as_deref(), post.title.as_deref());
        let dest_dir = self.base_dir.join(label).join(kind.subdir());

        let (url, filename) = match kind {
            MediaKind::Video => {
                // The video tool wants the post page, not the stream URL.
                let permalink = post.permalink.as_deref()?;
                (self.client.absolute_url(permalink), format!("{}.mp4", post.id))
            }
            MediaKind::Photo => {
                let ext = image_extension(resolved)?;
                (resolved.to_string(), format!("{}{ext}", post.id))
            }
        };

        Some(DownloadTask {
            id: post.id.clone(),
            url,
            dest_dir,
            filename,
            kind,
        })
    }
}
