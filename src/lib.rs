//! Harvester core library.
//!
//! Harvests media posts from subreddit search results into a categorized
//! local archive. The pipeline walks a deterministic (query × sort × page)
//! search space under a global rate limit, labels posts by keyword, routes
//! them to video or photo storage, and downloads through a bounded worker
//! pool. Progress is durable: an append-only history file deduplicates
//! across runs, and a per-target checkpoint cursor makes the walk resumable.
//!
//! # Architecture
//!
//! - [`config`] - run configuration and the static query/label vocabulary
//! - [`ratelimit`] - global request budget, cool-down, exponential backoff
//! - [`history`] / [`checkpoint`] - durable progress stores
//! - [`label`] - keyword-based destination classifier
//! - [`search`] - API client and page walker (discovery side)
//! - [`download`] - task routing, fetchers, bounded queue worker pool
//! - [`orchestrator`] - wires the above into one resumable run

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod checkpoint;
pub mod config;
pub mod download;
pub mod history;
pub mod label;
pub mod orchestrator;
pub mod ratelimit;
pub mod search;
pub mod user_agent;

// Re-export commonly used types
pub use checkpoint::{CheckpointStore, Cursor};
pub use config::{Config, RateConfig, SortMode};
pub use download::{DownloadTask, MediaDownloader, MediaFetcher, MediaKind, WorkerPool};
pub use history::HistoryStore;
pub use label::Labeler;
pub use orchestrator::{Orchestrator, RunError, RunSummary};
pub use ratelimit::RateLimiter;
pub use search::{SearchClient, SearchWalker};
