//! Discovery side of the pipeline: the search API client and the walker
//! that turns listing pages into queued download tasks.

mod client;
mod walker;

pub use client::{Child, DEFAULT_API_BASE, Listing, ListingData, Post, SearchClient, SearchError};
pub use walker::{SearchWalker, WalkStats};
