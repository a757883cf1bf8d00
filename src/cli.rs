//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

/// Harvest media posts from subreddit search results into a categorized
/// local archive.
///
/// Walks a fixed list of search queries across sort modes, downloads
/// matching videos and photos into per-label folders, and resumes where it
/// left off on restart.
#[derive(Parser, Debug)]
#[command(name = "harvester")]
#[command(author, version, about)]
pub struct Args {
    /// Crawl target: the subreddit name, without the r/ prefix
    #[arg(value_name = "TARGET")]
    pub target: Option<String>,

    /// JSON config file; CLI flags override its values
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Base storage directory
    #[arg(short = 'd', long, value_name = "DIR")]
    pub base_dir: Option<PathBuf>,

    /// Number of concurrent download workers (1-32)
    #[arg(short = 'w', long, value_parser = clap::value_parser!(u8).range(1..=32))]
    pub workers: Option<u8>,

    /// Download queue capacity (1-10000)
    #[arg(long, value_parser = clap::value_parser!(u16).range(1..=10000))]
    pub queue_capacity: Option<u16>,

    /// Pages walked per (query, sort) pair (1-10)
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=10))]
    pub max_pages: Option<u8>,

    /// Search request budget in requests per minute (1-600)
    #[arg(long, value_parser = clap::value_parser!(u16).range(1..=600))]
    pub rpm: Option<u16>,

    /// Free-space floor in GiB; the run stops below it
    #[arg(long, value_name = "GIB")]
    pub min_free_gb: Option<f64>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}
