//! Download side of the pipeline: task routing, fetchers, and the worker pool.
//!
//! Discovery hands [`DownloadTask`]s over a bounded queue; a fixed pool of
//! workers fetches each task (direct HTTP for photos, an external tool for
//! videos) and records success in history. Failures are dropped, never
//! retried within a run.

mod error;
mod fetcher;
mod task;
mod worker;

pub use error::DownloadError;
pub use fetcher::{MediaDownloader, MediaFetcher};
pub use task::{DownloadTask, IMAGE_EXTENSIONS, MediaKind, VIDEO_HOST, image_extension, route_media};
pub use worker::{WorkerPool, WorkerStats};
