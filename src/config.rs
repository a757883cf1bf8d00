//! Run configuration: crawl target, storage layout, pacing, and the static
//! query/label vocabulary.
//!
//! Defaults cover a full harvest run out of the box; a JSON config file can
//! override any subset of fields, and CLI flags override both (wiring lives
//! in `main.rs`). The query list and keyword table are data, not behavior —
//! the pipeline never inspects them beyond iteration order.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default number of concurrent download workers.
pub const DEFAULT_WORKERS: usize = 3;

/// Default bounded queue capacity between discovery and downloads.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Default page depth walked per (query, sort) pair.
pub const DEFAULT_MAX_PAGES: u32 = 5;

/// Default outbound search budget in requests per minute.
pub const DEFAULT_RPM: u32 = 70;

/// Default free-space floor below which the run stops (10 GiB).
pub const DEFAULT_MIN_FREE_BYTES: u64 = 10 * 1024 * 1024 * 1024;

/// Sort modes offered by the search endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortMode {
    Relevance,
    New,
    Top,
}

impl SortMode {
    /// Query-string value for this sort mode.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SortMode::Relevance => "relevance",
            SortMode::New => "new",
            SortMode::Top => "top",
        }
    }
}

/// Pacing parameters for the global search rate limiter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateConfig {
    /// Outbound request budget in requests per minute.
    pub requests_per_minute: u32,
    /// Jitter range added after each paced wait, in milliseconds.
    pub jitter_ms: (u64, u64),
    /// Starting exponential backoff after a throttling signal.
    pub initial_backoff: Duration,
    /// Cap on the exponential backoff.
    pub max_backoff: Duration,
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: DEFAULT_RPM,
            jitter_ms: (150, 450),
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(60),
        }
    }
}

impl RateConfig {
    /// Minimum interval between outbound search requests.
    #[must_use]
    pub fn min_interval(&self) -> Duration {
        Duration::from_secs_f64(60.0 / f64::from(self.requests_per_minute.max(1)))
    }
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("cannot read config file {path}: {source}")]
    Io {
        /// Path that failed to load.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid JSON for the expected shape.
    #[error("cannot parse config file {path}: {source}")]
    Parse {
        /// Path that failed to parse.
        path: PathBuf,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// A field holds a value the pipeline cannot run with.
    #[error("invalid config: {reason}")]
    Invalid {
        /// Human-readable validation failure.
        reason: String,
    },
}

/// Complete configuration for one harvest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Crawl target identifier (the subreddit name, without the `r/` prefix).
    pub target: String,
    /// Base storage directory; `<base>/<label>/{video,photo}/` is created under it.
    pub base_dir: PathBuf,
    /// Free-space floor in bytes; discovery stops below it.
    pub min_free_bytes: u64,
    /// Number of concurrent download workers.
    pub workers: usize,
    /// Bounded queue capacity between the walker and the workers.
    pub queue_capacity: usize,
    /// Pages walked per (query, sort) pair before moving on.
    pub max_pages_per_task: u32,
    /// Global search pacing.
    pub rate: RateConfig,
    /// Ordered search query list.
    pub queries: Vec<String>,
    /// Ordered sort-mode list.
    pub sort_modes: Vec<SortMode>,
    /// Ordered keyword-to-label table.
    pub labels: Vec<(String, String)>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target: String::new(),
            base_dir: PathBuf::from("./harvest_data"),
            min_free_bytes: DEFAULT_MIN_FREE_BYTES,
            workers: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_pages_per_task: DEFAULT_MAX_PAGES,
            rate: RateConfig::default(),
            queries: default_queries(),
            sort_modes: vec![SortMode::Relevance, SortMode::New, SortMode::Top],
            labels: default_labels(),
        }
    }
}

impl Config {
    /// Loads configuration from a JSON file, with defaults for absent fields.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed, or if
    /// the resulting configuration fails validation.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validates cross-field constraints the type system cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid {
                reason: "workers must be at least 1".to_string(),
            });
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid {
                reason: "queue_capacity must be at least 1".to_string(),
            });
        }
        if self.queries.is_empty() {
            return Err(ConfigError::Invalid {
                reason: "queries must not be empty".to_string(),
            });
        }
        if self.sort_modes.is_empty() {
            return Err(ConfigError::Invalid {
                reason: "sort_modes must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// History file shared across runs and targets.
    #[must_use]
    pub fn history_path(&self) -> PathBuf {
        self.base_dir.join("history_MASTER.txt")
    }

    /// Checkpoint file for the current target.
    #[must_use]
    pub fn checkpoint_path(&self) -> PathBuf {
        self.base_dir.join(format!("checkpoint_{}.json", self.target))
    }
}

/// The default search vocabulary: model names, aesthetic qualifiers,
/// tooling terms, and a tail of single letters to sweep loosely-titled posts.
fn default_queries() -> Vec<String> {
    [
        "Sora", "Kling", "Luma", "Dream Machine", "Runway Gen-3", "Pika Labs",
        "Midjourney", "Stable Diffusion", "SDXL", "Flux.1", "DALL-E 3",
        "Leonardo AI", "Udio", "Suno", "Haiper", "Vidu", "Hedra", "LivePortrait",
        "photorealistic", "cinematic", "unreal engine", "octane render", "8k",
        "masterpiece", "high resolution", "hyperrealistic", "volumetric lighting",
        "workflow", "comfyui", "automatic1111", "lora", "checkpoint",
        "slow motion", "panning", "drone shot", "timelapse", "morphing",
        "cyberpunk", "surreal", "fantasy", "steampunk", "anime style", "waifu",
        "q", "z", "x", "j", "v", "k",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

/// The default keyword-to-label table. Order matters: first match wins.
fn default_labels() -> Vec<(String, String)> {
    [
        ("kling", "kling"),
        ("runway", "runway"),
        ("pika", "pika"),
        ("sora", "sora"),
        ("midjourney", "midjourney"),
        ("stable diffusion", "stable-diffusion"),
        ("sd", "stable-diffusion"),
        ("flux", "flux"),
        ("dalle", "dall-e"),
        ("anime", "anime-models"),
        ("leonardo", "leonardo"),
        ("dreambooth", "dreambooth"),
        ("luma", "luma-dream-machine"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.workers, DEFAULT_WORKERS);
        assert_eq!(config.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert_eq!(config.max_pages_per_task, DEFAULT_MAX_PAGES);
        assert_eq!(config.queries.len(), 48);
        assert_eq!(config.sort_modes.len(), 3);
    }

    #[test]
    fn test_rate_config_min_interval_from_budget() {
        let rate = RateConfig::default();
        // 70 RPM is roughly 857ms between requests.
        let interval = rate.min_interval();
        assert!(interval > Duration::from_millis(850));
        assert!(interval < Duration::from_millis(870));
    }

    #[test]
    fn test_rate_config_min_interval_zero_budget_does_not_divide_by_zero() {
        let rate = RateConfig {
            requests_per_minute: 0,
            ..RateConfig::default()
        };
        assert_eq!(rate.min_interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let config = Config {
            workers: 0,
            ..Config::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("workers"));
    }

    #[test]
    fn test_validate_rejects_zero_queue_capacity() {
        let config = Config {
            queue_capacity: 0,
            ..Config::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("queue_capacity"));
    }

    #[test]
    fn test_validate_rejects_empty_queries() {
        let config = Config {
            queries: vec![],
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_merges_partial_file_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"target": "aivideo", "workers": 5}"#).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.target, "aivideo");
        assert_eq!(config.workers, 5);
        // Untouched fields keep their defaults.
        assert_eq!(config.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert!(!config.queries.is_empty());
    }

    #[test]
    fn test_load_rejects_malformed_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(Config::load(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        assert!(matches!(Config::load(&path), Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_paths_derive_from_base_dir_and_target() {
        let config = Config {
            target: "aivideo".to_string(),
            base_dir: PathBuf::from("/data"),
            ..Config::default()
        };
        assert_eq!(config.history_path(), PathBuf::from("/data/history_MASTER.txt"));
        assert_eq!(
            config.checkpoint_path(),
            PathBuf::from("/data/checkpoint_aivideo.json")
        );
    }

    #[test]
    fn test_sort_mode_query_values() {
        assert_eq!(SortMode::Relevance.as_str(), "relevance");
        assert_eq!(SortMode::New.as_str(), "new");
        assert_eq!(SortMode::Top.as_str(), "top");
    }
}
