//! Search API client: one paced, endlessly-retried GET per listing page.
//!
//! Every request goes through the shared [`RateLimiter`]. Throttling
//! responses (429, and 403 which the API uses for User-Agent throttling)
//! extend the global cool-down and retry; transient network errors retry
//! after a short fixed delay; the client never gives up on its own. Only a
//! permanent non-success status or an unparseable body is surfaced, and the
//! walker treats either as the end of the current search task.

use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::RETRY_AFTER;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::config::SortMode;
use crate::ratelimit::{RateLimiter, parse_retry_after};
use crate::user_agent;

/// Production search API host.
pub const DEFAULT_API_BASE: &str = "https://www.reddit.com";

/// Items requested per listing page (the API maximum).
const PAGE_LIMIT: u32 = 100;

/// Fixed delay before retrying a transient network failure.
const TRANSIENT_RETRY_DELAY: Duration = Duration::from_secs(3);

/// Errors a page fetch can surface to the walker.
#[derive(Debug, Error)]
pub enum SearchError {
    /// API base URL could not be parsed or has no host.
    #[error("invalid search API base URL {url}: {source}")]
    InvalidBaseUrl {
        /// The rejected base URL.
        url: String,
        /// Why the URL was rejected.
        #[source]
        source: url::ParseError,
    },

    /// Permanent, non-throttling HTTP error status.
    #[error("HTTP {status} from search endpoint {url}")]
    HttpStatus {
        /// The request URL.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// Response body did not match the listing shape.
    #[error("cannot parse search listing from {url}: {source}")]
    Parse {
        /// The request URL.
        url: String,
        /// The underlying decode error.
        #[source]
        source: reqwest::Error,
    },
}

/// One page of search results.
#[derive(Debug, Deserialize)]
pub struct Listing {
    /// Listing payload.
    pub data: ListingData,
}

/// Payload of a listing page: the posts plus the next-page token.
#[derive(Debug, Default, Deserialize)]
pub struct ListingData {
    /// Posts on this page.
    #[serde(default)]
    pub children: Vec<Child>,
    /// Opaque token for the next page; `None` means end of results.
    #[serde(default)]
    pub after: Option<String>,
}

/// Wrapper the API puts around each post.
#[derive(Debug, Deserialize)]
pub struct Child {
    /// The post itself.
    pub data: Post,
}

/// Post metadata, reduced to the fields the pipeline consumes.
#[derive(Debug, Deserialize)]
pub struct Post {
    /// API-assigned unique id.
    pub id: String,
    /// Post title.
    #[serde(default)]
    pub title: Option<String>,
    /// Flair text, if the post carries one.
    #[serde(default)]
    pub link_flair_text: Option<String>,
    /// Post URL as submitted.
    #[serde(default)]
    pub url: Option<String>,
    /// Resolved destination URL, preferred over `url` when present.
    #[serde(default)]
    pub url_overridden_by_dest: Option<String>,
    /// Whether the API hosts this post's video natively.
    #[serde(default)]
    pub is_video: bool,
    /// Site-relative permalink to the post.
    #[serde(default)]
    pub permalink: Option<String>,
}

impl Post {
    /// The URL the media decision rule runs against.
    #[must_use]
    pub fn resolved_url(&self) -> Option<&str> {
        self.url_overridden_by_dest
            .as_deref()
            .or(self.url.as_deref())
    }
}

/// Rate-limited client for the subreddit search endpoint.
#[derive(Debug, Clone)]
pub struct SearchClient {
    client: reqwest::Client,
    base_url: Url,
    limiter: Arc<RateLimiter>,
}

impl SearchClient {
    /// Creates a client against the given base URL (production uses
    /// [`DEFAULT_API_BASE`]; tests point this at a local mock server).
    ///
    /// The base URL is parsed here, once, so request-time URL construction
    /// cannot fail.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::InvalidBaseUrl`] if the URL cannot be parsed
    /// or has no host.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with the static
    /// configuration. This should never happen in practice.
    #[allow(clippy::expect_used)]
    pub fn with_base_url(
        base_url: impl AsRef<str>,
        limiter: Arc<RateLimiter>,
    ) -> Result<Self, SearchError> {
        let base_url = base_url.as_ref();
        let parsed = Url::parse(base_url).map_err(|source| SearchError::InvalidBaseUrl {
            url: base_url.to_string(),
            source,
        })?;
        if parsed.cannot_be_a_base() || parsed.host_str().is_none() {
            return Err(SearchError::InvalidBaseUrl {
                url: base_url.to_string(),
                source: url::ParseError::EmptyHost,
            });
        }

        let client = reqwest::Client::builder()
            .user_agent(user_agent::identifying_user_agent())
            .timeout(Duration::from_secs(15))
            .build()
            .expect("failed to build HTTP client with static configuration");
        Ok(Self {
            client,
            base_url: parsed,
            limiter,
        })
    }

    /// Base URL this client talks to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// Joins a site-relative permalink onto this client's base URL.
    #[must_use]
    pub fn absolute_url(&self, relative: &str) -> String {
        // `Url` renders a bare authority with a trailing slash; permalinks
        // already lead with one.
        format!("{}{relative}", self.base_url.as_str().trim_end_matches('/'))
    }

    /// Fetches one listing page, pacing and retrying until it either
    /// succeeds or fails permanently.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError`] only for a permanent non-success status or an
    /// undecodable body; throttling and transient network errors are retried
    /// internally without limit.
    #[instrument(skip(self, sort), fields(sort = sort.as_str()))]
    pub async fn fetch_page(
        &self,
        target: &str,
        query: &str,
        sort: SortMode,
        after: Option<&str>,
    ) -> Result<ListingData, SearchError> {
        let url = self.page_url(target, query, sort, after);

        loop {
            self.limiter.acquire().await;

            let response = match self.client.get(&url).send().await {
                Ok(response) => response,
                Err(err) => {
                    warn!(error = %err, "transient search error, retrying");
                    tokio::time::sleep(TRANSIENT_RETRY_DELAY).await;
                    continue;
                }
            };

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::FORBIDDEN {
                let hint = response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|value| value.to_str().ok())
                    .and_then(parse_retry_after);
                let penalty = self.limiter.report_throttled(hint).await;
                warn!(
                    status = status.as_u16(),
                    penalty_secs = penalty.as_secs(),
                    "throttled by search endpoint"
                );
                tokio::time::sleep(penalty).await;
                continue;
            }

            if !status.is_success() {
                return Err(SearchError::HttpStatus {
                    url,
                    status: status.as_u16(),
                });
            }

            return match response.json::<Listing>().await {
                Ok(listing) => {
                    self.limiter.report_success().await;
                    debug!(
                        posts = listing.data.children.len(),
                        has_next = listing.data.after.is_some(),
                        "fetched search page"
                    );
                    Ok(listing.data)
                }
                Err(source) => Err(SearchError::Parse { url, source }),
            };
        }
    }

    /// Builds the search URL for one page.
    fn page_url(&self, target: &str, query: &str, sort: SortMode, after: Option<&str>) -> String {
        let mut url = self.base_url.clone();
        url.set_path(&format!("/r/{target}/search.json"));
        url.set_query(None);
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("q", query)
                .append_pair("restrict_sr", "1")
                .append_pair("sort", sort.as_str())
                .append_pair("limit", &PAGE_LIMIT.to_string());
            if let Some(after) = after {
                pairs.append_pair("after", after);
            }
        }
        url.into()
    }
}
