//! Quota bookkeeping for the metered GitHub API.
//!
//! [`QuotaState`] is refreshed from the `x-ratelimit-*` headers of every metered
//! response. [`QuotaState::decide`] is pure so the blocking policy can be tested
//! without a clock.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use reqwest::header::HeaderMap;

use skillsync_shared::GitHubConfig;

/// Remaining-call floor under which a 403 is treated as quota exhaustion.
const EXHAUSTED_FLOOR: u32 = 10;

/// Base delay for exponential backoff between 5xx retries.
const RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// RateLimitPolicy
// ---------------------------------------------------------------------------

/// Tunables for quota waits and server-error retries.
#[derive(Debug, Clone)]
pub struct RateLimitPolicy {
    /// Below this many remaining calls the client blocks until the window resets.
    pub safety_threshold: u32,
    /// Added to the reset time for a pre-emptive wait.
    pub wait_margin: Duration,
    /// Added to the reset time after a quota-exhaustion response.
    pub exhausted_margin: Duration,
    /// Longest allowed single wait.
    pub max_wait: Duration,
    /// Retries for 5xx responses (on top of the first attempt).
    pub server_retries: u32,
    pub backoff_base: Duration,
}

impl RateLimitPolicy {
    pub fn from_config(config: &GitHubConfig) -> Self {
        Self {
            safety_threshold: config.safety_threshold,
            wait_margin: Duration::from_secs(config.wait_margin_secs),
            exhausted_margin: Duration::from_secs(config.exhausted_margin_secs),
            max_wait: Duration::from_secs(config.max_wait_secs),
            server_retries: config.server_retries,
            backoff_base: RETRY_BASE_DELAY,
        }
    }

    /// Delay before 5xx retry number `attempt` (1-based): base, 2x base, 4x base...
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_base * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self::from_config(&GitHubConfig::default())
    }
}

// ---------------------------------------------------------------------------
// QuotaState
// ---------------------------------------------------------------------------

/// What the client should do before its next metered call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaDecision {
    Proceed,
    /// Block for this long, then proceed.
    Wait(Duration),
    /// The required wait is longer than the policy allows.
    Exceeded(Duration),
}

/// Last known quota, as reported by the API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuotaState {
    pub limit: Option<u32>,
    /// `None` until a response reports it, and again right after a completed wait.
    pub remaining: Option<u32>,
    pub reset_at: Option<DateTime<Utc>>,
    /// Set by a completed pre-emptive wait; kept while responses still report
    /// a quota below the safety threshold.
    pub waited_for_reset: bool,
}

impl QuotaState {
    /// Read `x-ratelimit-remaining` / `x-ratelimit-reset` (epoch seconds).
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let remaining = header_number::<u32>(headers, "x-ratelimit-remaining")?;
        let reset_at = header_number::<i64>(headers, "x-ratelimit-reset")
            .and_then(|ts| DateTime::from_timestamp(ts, 0));
        let limit = header_number::<u32>(headers, "x-ratelimit-limit");

        Some(Self {
            limit,
            remaining: Some(remaining),
            reset_at,
            waited_for_reset: false,
        })
    }

    pub fn is_below(&self, threshold: u32) -> bool {
        self.remaining.is_some_and(|r| r < threshold)
    }

    /// Pre-call check against the safety threshold.
    ///
    /// A quota still below the threshold after a completed wait is `Exceeded`:
    /// waiting again would not help.
    pub fn decide(&self, policy: &RateLimitPolicy, now: DateTime<Utc>) -> QuotaDecision {
        if !self.is_below(policy.safety_threshold) {
            return QuotaDecision::Proceed;
        }
        match self.wait_decision(policy.wait_margin, policy.max_wait, now) {
            QuotaDecision::Wait(wait) if self.waited_for_reset => QuotaDecision::Exceeded(wait),
            decision => decision,
        }
    }

    /// Wait for the window to reset plus `margin`, bounded by `max_wait`.
    pub fn wait_decision(
        &self,
        margin: Duration,
        max_wait: Duration,
        now: DateTime<Utc>,
    ) -> QuotaDecision {
        let until_reset = self
            .reset_at
            .and_then(|reset| (reset - now).to_std().ok())
            .unwrap_or(Duration::ZERO);
        let wait = until_reset + margin;

        if wait > max_wait {
            QuotaDecision::Exceeded(wait)
        } else {
            QuotaDecision::Wait(wait)
        }
    }

    /// Whether a response means the quota is used up (as opposed to a plain 403).
    pub fn is_exhausted_response(&self, status: StatusCode) -> bool {
        let low = self.remaining.is_some_and(|r| r < EXHAUSTED_FLOOR);
        status == StatusCode::TOO_MANY_REQUESTS || (status == StatusCode::FORBIDDEN && low)
    }
}

fn header_number<T: std::str::FromStr>(headers: &HeaderMap, name: &str) -> Option<T> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}
