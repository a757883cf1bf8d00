//! Global rate limiting for outbound search requests.
//!
//! This module provides the [`RateLimiter`] struct which serializes search
//! traffic to a fixed requests-per-minute budget, adds jitter so paced
//! requests do not align, and escalates a shared cool-down window when the
//! server signals throttling.
//!
//! # Overview
//!
//! Unlike a per-domain limiter, all search requests share one budget: the
//! whole pipeline talks to a single API host, and that host's limit is
//! global per client. Three pieces of timing state live under one lock:
//!
//! - `last_request` - enforces the minimum inter-request interval
//! - `blocked_until` - server-mandated cool-down (Retry-After plus a pad)
//! - `backoff` - exponential penalty, doubling per throttle, reset on success
//!
//! # Example
//!
//! ```no_run
//! use harvester::config::RateConfig;
//! use harvester::ratelimit::RateLimiter;
//!
//! # async fn example() {
//! let limiter = RateLimiter::new(&RateConfig::default());
//! limiter.acquire().await;
//! // ... issue exactly one search request
//! limiter.report_success().await;
//! # }
//! ```

use std::time::Duration;

use rand::Rng;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use crate::config::RateConfig;

/// Fallback cool-down when a throttling response carries no Retry-After.
const DEFAULT_RETRY_HINT: Duration = Duration::from_secs(30);

/// Random pad added on top of the server's Retry-After hint (5-10s).
const RETRY_PAD_MS: (u64, u64) = (5_000, 10_000);

/// Maximum honored Retry-After value (1 hour) to prevent excessive stalls.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// Shared timing state, guarded by a single mutex.
#[derive(Debug)]
struct RateState {
    /// Completion time of the last paced request, `None` before the first.
    last_request: Option<Instant>,
    /// Active server-mandated cool-down deadline, if any.
    blocked_until: Option<Instant>,
    /// Current exponential backoff magnitude.
    backoff: Duration,
}

/// Global rate limiter for search requests.
///
/// Designed to be wrapped in `Arc` and shared by every task that issues
/// search traffic. The pacing sleeps happen *while holding* the state lock:
/// a paced decision is checked-then-act, and releasing the lock mid-wait
/// would let a second task observe a stale "safe to proceed" answer and
/// burst past the budget.
#[derive(Debug)]
pub struct RateLimiter {
    /// Minimum interval between requests, derived from the RPM budget.
    min_interval: Duration,
    /// Jitter range in milliseconds, added after each paced wait.
    jitter_ms: (u64, u64),
    /// Backoff starting value, restored by [`RateLimiter::report_success`].
    initial_backoff: Duration,
    /// Backoff cap.
    max_backoff: Duration,
    /// Shared timing state.
    state: Mutex<RateState>,
}

impl RateLimiter {
    /// Creates a limiter from the configured pacing parameters.
    #[must_use]
    pub fn new(config: &RateConfig) -> Self {
        debug!(
            rpm = config.requests_per_minute,
            interval_ms = config.min_interval().as_millis(),
            "creating rate limiter"
        );
        Self {
            min_interval: config.min_interval(),
            jitter_ms: config.jitter_ms,
            initial_backoff: config.initial_backoff,
            max_backoff: config.max_backoff,
            state: Mutex::new(RateState {
                last_request: None,
                blocked_until: None,
                backoff: config.initial_backoff,
            }),
        }
    }

    /// Returns the minimum interval between requests.
    #[must_use]
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Blocks until it is safe to issue exactly one search request.
    ///
    /// Waits, in order: any active server cool-down window, the remainder of
    /// the minimum inter-request interval, then a random jitter. The state
    /// lock is held across all three waits so concurrent callers serialize
    /// and each observes the previous caller's updated `last_request`.
    #[instrument(skip(self))]
    pub async fn acquire(&self) {
        let mut state = self.state.lock().await;

        if let Some(blocked_until) = state.blocked_until {
            let now = Instant::now();
            if now < blocked_until {
                let wait = blocked_until - now;
                warn!(wait_secs = wait.as_secs(), "waiting out global cool-down");
                tokio::time::sleep(wait).await;
            }
            state.blocked_until = None;
        }

        if let Some(last_request) = state.last_request {
            let elapsed = last_request.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }

        // Jitter de-aligns paced requests across retries and restarts.
        let jitter = Duration::from_millis(self.sample_ms(self.jitter_ms));
        tokio::time::sleep(jitter).await;

        state.last_request = Some(Instant::now());
    }

    /// Records a throttling signal (HTTP 429/403).
    ///
    /// Extends the shared cool-down window to the server's Retry-After hint
    /// plus a random 5-10s pad, and returns the exponential backoff delay the
    /// *calling attempt* should sleep before retrying. The backoff doubles on
    /// each call up to the configured cap.
    #[instrument(skip(self))]
    pub async fn report_throttled(&self, retry_after: Option<Duration>) -> Duration {
        let hint = retry_after.unwrap_or(DEFAULT_RETRY_HINT);
        let pad = Duration::from_millis(self.sample_ms(RETRY_PAD_MS));

        let mut state = self.state.lock().await;
        state.blocked_until = Some(Instant::now() + hint + pad);

        let penalty = state.backoff;
        state.backoff = (state.backoff * 2).min(self.max_backoff);

        warn!(
            retry_after_secs = hint.as_secs(),
            penalty_secs = penalty.as_secs(),
            "throttled - extending cool-down window"
        );
        penalty
    }

    /// Records a successful response, resetting the exponential backoff.
    pub async fn report_success(&self) {
        let mut state = self.state.lock().await;
        state.backoff = self.initial_backoff;
    }

    /// Samples a random millisecond count from an inclusive range.
    ///
    /// Kept synchronous so the thread-local RNG is never held across an await.
    fn sample_ms(&self, (lo, hi): (u64, u64)) -> u64 {
        rand::thread_rng().gen_range(lo..=hi.max(lo))
    }
}

/// Parses a Retry-After header value into a Duration.
///
/// Supports both RFC 7231 forms:
/// - Integer seconds: `Retry-After: 120`
/// - HTTP-date: `Retry-After: Wed, 21 Oct 2026 07:28:00 GMT`
///
/// Returns `None` for unparseable or negative values. Caps at 1 hour.
#[must_use]
pub fn parse_retry_after(header_value: &str) -> Option<Duration> {
    let header_value = header_value.trim();

    if let Ok(seconds) = header_value.parse::<i64>() {
        if seconds < 0 {
            debug!(seconds, "negative Retry-After value, ignoring");
            return None;
        }
        #[allow(clippy::cast_sign_loss)]
        return Some(Duration::from_secs(seconds as u64).min(MAX_RETRY_AFTER));
    }

    if let Ok(datetime) = httpdate::parse_http_date(header_value) {
        let now = std::time::SystemTime::now();
        // A date in the past means the window already elapsed.
        let duration = datetime.duration_since(now).unwrap_or(Duration::ZERO);
        Some(duration.min(MAX_RETRY_AFTER))
    } else {
        debug!(header_value, "unparseable Retry-After value");
        None
    }
}
