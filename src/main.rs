//! CLI entry point for the harvester tool.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use harvester::config::Config;
use harvester::download::MediaDownloader;
use harvester::orchestrator::{Orchestrator, RunError};
use tracing::{debug, info};

mod cli;

use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Determine log level based on verbose/quiet flags
    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");

    let config = build_config(&args)?;
    info!(
        target = %config.target,
        base_dir = %config.base_dir.display(),
        workers = config.workers,
        "Harvester starting"
    );

    let fetcher = Arc::new(MediaDownloader::new());
    let orchestrator = Orchestrator::new(config, fetcher);

    match orchestrator.run().await {
        Ok(summary) => {
            info!(
                enqueued = summary.enqueued,
                downloaded = summary.downloaded,
                failed = summary.failed,
                skipped = summary.skipped,
                "Harvest complete"
            );
            Ok(())
        }
        Err(err @ RunError::DiskExhausted { .. }) => {
            // Queued work was drained and the checkpoint saved before this
            // surfaced; a later run resumes cleanly once space is freed.
            Err(err).context("run stopped at the free-space floor")
        }
        Err(err) => Err(err.into()),
    }
}

/// Assembles the run configuration: file (if given) over defaults, CLI
/// flags over both.
fn build_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    if let Some(target) = &args.target {
        config.target.clone_from(target);
    }
    if let Some(base_dir) = &args.base_dir {
        config.base_dir.clone_from(base_dir);
    }
    if let Some(workers) = args.workers {
        config.workers = usize::from(workers);
    }
    if let Some(capacity) = args.queue_capacity {
        config.queue_capacity = usize::from(capacity);
    }
    if let Some(pages) = args.max_pages {
        config.max_pages_per_task = u32::from(pages);
    }
    if let Some(rpm) = args.rpm {
        config.rate.requests_per_minute = u32::from(rpm);
    }
    if let Some(gib) = args.min_free_gb {
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        {
            config.min_free_bytes = (gib.max(0.0) * 1024.0 * 1024.0 * 1024.0) as u64;
        }
    }

    if config.target.is_empty() {
        bail!("no crawl target: pass one as an argument or set `target` in the config file");
    }
    config.validate()?;
    Ok(config)
}
