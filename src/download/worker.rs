//! Bounded download queue and the worker pool draining it.
//!
//! Discovery produces [`DownloadTask`]s into a bounded `mpsc` channel; the
//! send side blocks when the channel is full, which is the back-pressure
//! that keeps discovery from outrunning downloads without bound. N workers
//! share the receive side behind a mutex and run until the channel closes -
//! dropping the sender is the shutdown signal, and joining the pool after
//! that guarantees the queue fully drains before the process exits.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::fetcher::MediaFetcher;
use super::task::DownloadTask;
use crate::history::HistoryStore;

/// Counters shared by all workers in a pool.
///
/// Atomics because workers update them concurrently; read once at join time.
#[derive(Debug, Default)]
pub struct WorkerStats {
    downloaded: AtomicUsize,
    failed: AtomicUsize,
    skipped: AtomicUsize,
}

impl WorkerStats {
    /// Number of tasks fetched and recorded in history.
    #[must_use]
    pub fn downloaded(&self) -> usize {
        self.downloaded.load(Ordering::SeqCst)
    }

    /// Number of tasks dropped after a fetch failure.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// Number of tasks skipped by the defensive history re-check.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.skipped.load(Ordering::SeqCst)
    }
}

/// Fixed-size pool of download workers over one shared bounded queue.
#[derive(Debug)]
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    stats: Arc<WorkerStats>,
}

impl WorkerPool {
    /// Spawns `workers` tasks draining `receiver`.
    ///
    /// Each worker loops: receive (a closed channel ends the loop), re-check
    /// history against the file on disk, fetch, and on success append the id
    /// to history. Fetch failures are logged and dropped - there is no retry
    /// queue; the id stays eligible for a future run.
    #[must_use]
    pub fn spawn(
        workers: usize,
        receiver: mpsc::Receiver<DownloadTask>,
        fetcher: Arc<dyn MediaFetcher>,
        history: HistoryStore,
    ) -> Self {
        let receiver = Arc::new(Mutex::new(receiver));
        let stats = Arc::new(WorkerStats::default());

        let handles = (0..workers)
            .map(|worker_id| {
                let receiver = Arc::clone(&receiver);
                let fetcher = Arc::clone(&fetcher);
                let history = history.clone();
                let stats = Arc::clone(&stats);
                tokio::spawn(async move {
                    worker_loop(worker_id, &receiver, fetcher.as_ref(), &history, &stats).await;
                })
            })
            .collect();

        Self { handles, stats }
    }

    /// Waits for every worker to finish and returns the pool counters.
    ///
    /// Callers must drop all queue senders first, or this waits forever.
    pub async fn join(self) -> Arc<WorkerStats> {
        for handle in self.handles {
            // A worker panicking is a bug, but one lost worker must not
            // take down the drain of the others.
            if let Err(err) = handle.await {
                warn!(error = %err, "download worker aborted");
            }
        }
        self.stats
    }
}

/// One worker's drain loop.
async fn worker_loop(
    worker_id: usize,
    receiver: &Mutex<mpsc::Receiver<DownloadTask>>,
    fetcher: &dyn MediaFetcher,
    history: &HistoryStore,
    stats: &WorkerStats,
) {
    debug!(worker_id, "download worker started");
    loop {
        // Hold the receiver lock only for the recv itself, so other workers
        // can pick up tasks while this one fetches.
        let task = {
            let mut receiver = receiver.lock().await;
            receiver.recv().await
        };
        let Some(task) = task else {
            debug!(worker_id, "queue closed, worker exiting");
            return;
        };

        // Fresh re-check catches ids another worker recorded after this
        // run's discovery snapshot was taken.
        if history.contains(&task.id).await {
            debug!(worker_id, id = %task.id, "already in history, skipping");
            stats.skipped.fetch_add(1, Ordering::SeqCst);
            continue;
        }

        match fetcher.fetch(&task).await {
            Ok(()) => {
                if history.add(&task.id).await {
                    stats.downloaded.fetch_add(1, Ordering::SeqCst);
                    info!(worker_id, id = %task.id, file = %task.filename, "saved");
                } else {
                    // Unrecorded success: the file exists, so a future run
                    // re-fetches idempotently onto the same path.
                    stats.failed.fetch_add(1, Ordering::SeqCst);
                }
            }
            Err(err) => {
                warn!(worker_id, id = %task.id, error = %err, "download failed, dropping task");
                stats.failed.fetch_add(1, Ordering::SeqCst);
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashSet;
    use std::path::PathBuf;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::download::error::DownloadError;
    use crate::download::task::MediaKind;

    /// Records fetched ids; fails ids listed in `fail`.
    #[derive(Debug, Default)]
    struct RecordingFetcher {
        fetched: StdMutex<Vec<String>>,
        fail: HashSet<String>,
    }

    #[async_trait]
    impl MediaFetcher for RecordingFetcher {
        async fn fetch(&self, task: &DownloadTask) -> Result<(), DownloadError> {
            self.fetched.lock().unwrap().push(task.id.clone());
            if self.fail.contains(&task.id) {
                return Err(DownloadError::http_status(&task.url, 500));
            }
            Ok(())
        }
    }

    fn task(id: &str) -> DownloadTask {
        DownloadTask {
            id: id.to_string(),
            url: format!("https://i.redd.it/{id}.png"),
            dest_dir: PathBuf::from("/tmp"),
            filename: format!("{id}.png"),
            kind: MediaKind::Photo,
        }
    }

    #[tokio::test]
    async fn test_pool_drains_queue_and_records_history() {
        let dir = tempfile::tempdir().unwrap();
        let history = HistoryStore::new(dir.path().join("history.txt"));
        let fetcher = Arc::new(RecordingFetcher::default());
        let (tx, rx) = mpsc::channel(10);

        let pool = WorkerPool::spawn(3, rx, Arc::clone(&fetcher) as _, history.clone());
        for id in ["a1", "b2", "c3", "d4"] {
            tx.send(task(id)).await.unwrap();
        }
        drop(tx);
        let stats = pool.join().await;

        assert_eq!(stats.downloaded(), 4);
        assert_eq!(stats.failed(), 0);
        let recorded = history.load().await;
        for id in ["a1", "b2", "c3", "d4"] {
            assert!(recorded.contains(id), "{id} missing from history");
        }
    }

    #[tokio::test]
    async fn test_failed_fetch_is_dropped_not_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let history = HistoryStore::new(dir.path().join("history.txt"));
        let fetcher = Arc::new(RecordingFetcher {
            fail: HashSet::from(["bad1".to_string()]),
            ..RecordingFetcher::default()
        });
        let (tx, rx) = mpsc::channel(10);

        let pool = WorkerPool::spawn(2, rx, Arc::clone(&fetcher) as _, history.clone());
        tx.send(task("good1")).await.unwrap();
        tx.send(task("bad1")).await.unwrap();
        drop(tx);
        let stats = pool.join().await;

        assert_eq!(stats.downloaded(), 1);
        assert_eq!(stats.failed(), 1);
        let recorded = history.load().await;
        assert!(recorded.contains("good1"));
        assert!(!recorded.contains("bad1"), "failed task must stay eligible");
    }

    #[tokio::test]
    async fn test_history_recheck_skips_already_recorded_id() {
        let dir = tempfile::tempdir().unwrap();
        let history = HistoryStore::new(dir.path().join("history.txt"));
        history.add("seen1").await;

        let fetcher = Arc::new(RecordingFetcher::default());
        let (tx, rx) = mpsc::channel(10);
        let pool = WorkerPool::spawn(1, rx, Arc::clone(&fetcher) as _, history.clone());
        tx.send(task("seen1")).await.unwrap();
        drop(tx);
        let stats = pool.join().await;

        assert_eq!(stats.skipped(), 1);
        assert_eq!(stats.downloaded(), 0);
        assert!(
            fetcher.fetched.lock().unwrap().is_empty(),
            "fetcher must not run for a recorded id"
        );
    }

    #[tokio::test]
    async fn test_bounded_send_applies_backpressure() {
        let dir = tempfile::tempdir().unwrap();
        let history = HistoryStore::new(dir.path().join("history.txt"));
        let (tx, rx) = mpsc::channel(2);

        // No pool yet: with capacity 2, the third send must not complete.
        tx.send(task("a1")).await.unwrap();
        tx.send(task("b2")).await.unwrap();
        let blocked =
            tokio::time::timeout(Duration::from_millis(50), tx.send(task("c3"))).await;
        assert!(blocked.is_err(), "send beyond capacity must block");

        // Once workers drain, the producer resumes.
        let fetcher = Arc::new(RecordingFetcher::default());
        let pool = WorkerPool::spawn(1, rx, Arc::clone(&fetcher) as _, history);
        tokio::time::timeout(Duration::from_secs(5), tx.send(task("c3")))
            .await
            .expect("send must resume once workers drain")
            .unwrap();
        drop(tx);
        pool.join().await;
    }

    #[tokio::test]
    async fn test_join_waits_for_full_drain() {
        let dir = tempfile::tempdir().unwrap();
        let history = HistoryStore::new(dir.path().join("history.txt"));
        let fetcher = Arc::new(RecordingFetcher::default());
        let (tx, rx) = mpsc::channel(50);

        let pool = WorkerPool::spawn(2, rx, Arc::clone(&fetcher) as _, history);
        for i in 0..30 {
            tx.send(task(&format!("id{i}"))).await.unwrap();
        }
        drop(tx);
        let stats = pool.join().await;

        assert_eq!(
            stats.downloaded() + stats.failed() + stats.skipped(),
            30,
            "every queued task must be processed before join returns"
        );
    }
}
