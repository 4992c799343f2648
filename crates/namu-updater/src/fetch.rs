//! Rate-limit aware HTTP fetching.
//!
//! Wraps a single GET with exponential-backoff retries. Rate-limit headers
//! (`X-RateLimit-Remaining`, `X-RateLimit-Reset`, `Retry-After`) stretch the
//! wait up to a configured ceiling; beyond that the fetch gives up at once so
//! the caller can try another source.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::{FetchError, UpdateError};

/// Header carrying the remaining request budget.
pub const RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";

/// Header carrying the budget reset time in epoch seconds.
pub const RATE_LIMIT_RESET: &str = "x-ratelimit-reset";

/// Retry and timeout policy for one fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each further retry
    pub base_delay: Duration,
    /// Longest rate-limit reset worth sleeping through
    pub max_rate_limit_wait: Duration,
    /// Timeout of a single attempt, body included
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_rate_limit_wait: Duration::from_secs(60),
            attempt_timeout: Duration::from_secs(15),
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry number `attempt + 1` (`base * 2^attempt`).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor)
    }
}

/// Rate-limit state reported by the upstream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimitInfo {
    /// Requests left in the current window
    pub remaining: Option<u64>,
    /// When the window resets
    pub reset_at: Option<DateTime<Utc>>,
    /// Explicit `Retry-After` delay
    pub retry_after: Option<Duration>,
}

impl RateLimitInfo {
    /// Extract rate-limit headers, ignoring malformed values.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let header_u64 = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok())
        };

        let reset_at = header_u64(RATE_LIMIT_RESET)
            .and_then(|secs| i64::try_from(secs).ok())
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single());

        Self {
            remaining: header_u64(RATE_LIMIT_REMAINING),
            reset_at,
            retry_after: header_u64("retry-after").map(Duration::from_secs),
        }
    }

    /// Whether the upstream says the budget is used up.
    pub fn is_exhausted(&self) -> bool {
        self.remaining == Some(0)
    }

    /// How long the upstream asked us to wait, measured from `now`.
    pub fn wait_hint(&self, now: DateTime<Utc>) -> Option<Duration> {
        if let Some(retry_after) = self.retry_after {
            return Some(retry_after);
        }
        self.reset_at
            .map(|reset| (reset - now).to_std().unwrap_or(Duration::ZERO))
    }
}

/// A GET request description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    url: String,
    query: Vec<(String, String)>,
    headers: Vec<(String, String)>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
        }
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// A successful response with its rate-limit state.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub body: Bytes,
    pub rate_limit: RateLimitInfo,
}

impl FetchResponse {
    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, FetchError> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// Outcome of one attempt that did not succeed.
struct AttemptFailure {
    error: FetchError,
    wait_hint: Option<Duration>,
    retryable: bool,
}

/// HTTP GET with retries, backoff, and rate-limit awareness.
pub struct RateLimitAwareFetcher {
    client: reqwest::Client,
    policy: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl RateLimitAwareFetcher {
    /// Create a fetcher with the given policy and user agent.
    pub fn new(policy: RetryPolicy, user_agent: &str) -> Result<Self, UpdateError> {
        let client = reqwest::Client::builder()
            .timeout(policy.attempt_timeout)
            .user_agent(user_agent)
            .build()?;

        Ok(Self {
            client,
            policy,
            clock: Arc::new(SystemClock),
        })
    }

    /// Replace the clock used to interpret reset timestamps.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// The underlying client, shared with the package downloader.
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Perform the request, retrying transient failures.
    ///
    /// Never panics on HTTP errors: every failure is a [`FetchError`].
    pub async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        let mut attempt = 0u32;

        loop {
            let failure = match self.attempt(request).await {
                Ok(response) => return Ok(response),
                Err(failure) => failure,
            };

            if !failure.retryable {
                debug!("Not retrying {}: {}", request.url, failure.error);
                return Err(failure.error);
            }

            if attempt >= self.policy.max_retries {
                warn!(
                    "Giving up on {} after {} attempts: {}",
                    request.url,
                    attempt + 1,
                    failure.error
                );
                return Err(failure.error);
            }

            let backoff = self.policy.backoff_delay(attempt);
            let wait = match failure.wait_hint {
                Some(hint) if hint > backoff => {
                    if hint > self.policy.max_rate_limit_wait {
                        warn!(
                            "Rate limit on {} resets in {:?}, not waiting",
                            request.url, hint
                        );
                        let mut error = failure.error;
                        error.retry_after = Some(hint);
                        return Err(error);
                    }
                    hint
                }
                _ => backoff,
            };

            debug!(
                "Attempt {} for {} failed ({}), retrying in {:?}",
                attempt + 1,
                request.url,
                failure.error,
                wait
            );
            tokio::time::sleep(wait).await;
            attempt += 1;
        }
    }

    async fn attempt(&self, request: &FetchRequest) -> Result<FetchResponse, AttemptFailure> {
        let mut builder = self.client.get(&request.url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await.map_err(|e| AttemptFailure {
            error: e.into(),
            wait_hint: None,
            retryable: true,
        })?;

        let status = response.status();
        let rate_limit = RateLimitInfo::from_headers(response.headers());
        let now = self.clock.now();

        if status.is_success() {
            let body = response.bytes().await.map_err(|e| AttemptFailure {
                error: e.into(),
                wait_hint: None,
                retryable: true,
            })?;
            if let Some(remaining) = rate_limit.remaining {
                debug!("{} has {} requests left", request.url, remaining);
            }
            return Ok(FetchResponse {
                status: status.as_u16(),
                body,
                rate_limit,
            });
        }

        if is_rate_limited(status, &rate_limit) {
            let hint = rate_limit.wait_hint(now);
            return Err(AttemptFailure {
                error: FetchError::rate_limited(status.as_u16(), hint),
                wait_hint: hint,
                retryable: true,
            });
        }

        Err(AttemptFailure {
            error: FetchError::server(status.as_u16()),
            wait_hint: None,
            retryable: status.is_server_error(),
        })
    }
}

/// 429 always; 403 only when the budget header says it is used up.
fn is_rate_limited(status: StatusCode, rate_limit: &RateLimitInfo) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || (status == StatusCode::FORBIDDEN && rate_limit.is_exhausted())
}
