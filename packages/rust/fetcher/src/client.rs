//! Quota-aware GitHub client.
//!
//! One [`GitHubClient`] is created per run and passed to every phase. Metered
//! API calls go through [`GitHubClient::api_get`]; raw file downloads use the
//! unmetered content host and never touch the quota state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT, HeaderMap};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};
use url::Url;

use skillsync_shared::{GitHubConfig, Result, SkillSyncError};

use crate::rate_limit::{QuotaDecision, QuotaState, RateLimitPolicy};

/// User-Agent string for all requests.
const USER_AGENT: &str = concat!("SkillSync/", env!("CARGO_PKG_VERSION"));

/// Snapshot of the core quota bucket as reported by `/rate_limit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateStatus {
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct RateLimitBody {
    resources: RateResources,
}

#[derive(Deserialize)]
struct RateResources {
    core: CoreBucket,
}

#[derive(Deserialize)]
struct CoreBucket {
    limit: u32,
    remaining: u32,
    reset: i64,
}

// ---------------------------------------------------------------------------
// GitHubClient
// ---------------------------------------------------------------------------

/// HTTP client that owns the run's quota state.
pub struct GitHubClient {
    http: Client,
    api_base: String,
    raw_base: String,
    token: String,
    policy: RateLimitPolicy,
    /// Held across quota waits so every caller blocks on the same wait.
    quota: Mutex<QuotaState>,
    api_calls: AtomicU64,
}

impl GitHubClient {
    pub fn new(config: &GitHubConfig, token: impl Into<String>) -> Result<Self> {
        let api_base = validate_base(&config.api_base, "github.api_base")?;
        let raw_base = validate_base(&config.raw_base, "github.raw_base")?;

        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SkillSyncError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            api_base,
            raw_base,
            token: token.into(),
            policy: RateLimitPolicy::from_config(config),
            quota: Mutex::new(QuotaState::default()),
            api_calls: AtomicU64::new(0),
        })
    }

    /// Replace the wait/retry policy.
    pub fn with_policy(mut self, policy: RateLimitPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Number of metered calls issued so far, retries included.
    pub fn api_calls(&self) -> u64 {
        self.api_calls.load(Ordering::Relaxed)
    }

    /// Last known quota.
    pub async fn quota(&self) -> QuotaState {
        *self.quota.lock().await
    }

    /// Metered GET, `path` relative to the API base.
    ///
    /// Blocks first if the last known quota is under the safety threshold.
    pub async fn api_get(&self, path: &str) -> Result<Response> {
        self.wait_for_quota().await?;
        self.execute(&self.api_url(path)).await
    }

    /// Metered GET decoded as JSON. A 404 is `Ok(None)`.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        let resp = self.api_get(path).await?;
        decode_json(resp).await
    }

    /// Download a file from the raw content host. A 404 is `Ok(None)`.
    pub async fn raw_get(&self, repo: &str, branch: &str, path: &str) -> Result<Option<String>> {
        let url = format!("{}/{repo}/{branch}/{path}", self.raw_base);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| SkillSyncError::Network(format!("{url}: {e}")))?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(SkillSyncError::HttpStatus {
                url,
                status: status.as_u16(),
            });
        }

        resp.text()
            .await
            .map(Some)
            .map_err(|e| SkillSyncError::Network(format!("{url}: {e}")))
    }

    /// Query `/rate_limit` and refresh the quota state from the core bucket.
    pub async fn rate_status(&self) -> Result<RateStatus> {
        let resp = self.execute(&self.api_url("rate_limit")).await?;
        let body: RateLimitBody = decode_json(resp)
            .await?
            .ok_or_else(|| SkillSyncError::parse("rate limit endpoint returned 404"))?;

        let core = body.resources.core;
        let reset_at = DateTime::from_timestamp(core.reset, 0)
            .ok_or_else(|| SkillSyncError::parse(format!("invalid reset epoch {}", core.reset)))?;

        *self.quota.lock().await = QuotaState {
            limit: Some(core.limit),
            remaining: Some(core.remaining),
            reset_at: Some(reset_at),
            waited_for_reset: false,
        };

        Ok(RateStatus {
            limit: core.limit,
            remaining: core.remaining,
            reset_at,
        })
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn api_url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path.trim_start_matches('/'))
    }

    async fn wait_for_quota(&self) -> Result<()> {
        let mut quota = self.quota.lock().await;

        match quota.decide(&self.policy, Utc::now()) {
            QuotaDecision::Proceed => Ok(()),
            QuotaDecision::Wait(wait) => {
                warn!(
                    remaining = quota.remaining,
                    wait_secs = wait.as_secs(),
                    "quota below safety threshold, waiting for reset"
                );
                tokio::time::sleep(wait).await;
                quota.remaining = None;
                quota.waited_for_reset = true;
                Ok(())
            }
            QuotaDecision::Exceeded(wait) => {
                error!(
                    remaining = quota.remaining,
                    after_wait = quota.waited_for_reset,
                    "quota cannot recover within the allowed wait"
                );
                Err(exhausted_error(&quota, wait))
            }
        }
    }

    /// Send with 5xx retries and a single sleep-then-retry on quota exhaustion.
    async fn execute(&self, url: &str) -> Result<Response> {
        let mut attempt: u32 = 0;
        let mut quota_retry_used = false;

        loop {
            attempt += 1;
            self.api_calls.fetch_add(1, Ordering::Relaxed);

            let resp = self
                .http
                .get(url)
                .bearer_auth(&self.token)
                .header(ACCEPT, "application/vnd.github+json")
                .send()
                .await
                .map_err(|e| SkillSyncError::Network(format!("{url}: {e}")))?;

            let status = resp.status();
            let reported = self.record_quota(resp.headers()).await;

            if status.is_server_error() {
                if attempt <= self.policy.server_retries {
                    let delay = self.policy.backoff(attempt);
                    debug!(url, %status, attempt, delay_ms = delay.as_millis() as u64, "retrying after server error");
                    tokio::time::sleep(delay).await;
                    continue;
                }
                return Err(SkillSyncError::RetriesExhausted {
                    url: url.to_string(),
                    attempts: attempt,
                });
            }

            if reported.is_exhausted_response(status) {
                if quota_retry_used {
                    return Err(exhausted_error(&reported, Duration::ZERO));
                }
                quota_retry_used = true;
                self.sleep_out_exhaustion(&reported).await?;
                continue;
            }

            return Ok(resp);
        }
    }

    async fn sleep_out_exhaustion(&self, reported: &QuotaState) -> Result<()> {
        let mut quota = self.quota.lock().await;

        match reported.wait_decision(self.policy.exhausted_margin, self.policy.max_wait, Utc::now()) {
            QuotaDecision::Wait(wait) => {
                warn!(wait_secs = wait.as_secs(), "rate limited, sleeping before one retry");
                tokio::time::sleep(wait).await;
                quota.remaining = None;
                Ok(())
            }
            QuotaDecision::Exceeded(wait) => Err(exhausted_error(reported, wait)),
            QuotaDecision::Proceed => Ok(()),
        }
    }

    /// Refresh the quota state from response headers; returns the state in effect.
    async fn record_quota(&self, headers: &HeaderMap) -> QuotaState {
        let mut quota = self.quota.lock().await;
        if let Some(mut reported) = QuotaState::from_headers(headers) {
            reported.waited_for_reset =
                quota.waited_for_reset && reported.is_below(self.policy.safety_threshold);
            *quota = reported;
        }
        *quota
    }
}

fn validate_base(raw: &str, field: &str) -> Result<String> {
    Url::parse(raw).map_err(|e| SkillSyncError::config(format!("invalid {field} {raw:?}: {e}")))?;
    Ok(raw.trim_end_matches('/').to_string())
}

fn exhausted_error(quota: &QuotaState, wait: Duration) -> SkillSyncError {
    let reset_at = quota.reset_at.unwrap_or_else(|| {
        Utc::now() + chrono::Duration::from_std(wait).unwrap_or_else(|_| chrono::Duration::zero())
    });
    SkillSyncError::QuotaExhausted {
        remaining: quota.remaining.unwrap_or(0),
        reset_at,
    }
}

async fn decode_json<T: DeserializeOwned>(resp: Response) -> Result<Option<T>> {
    let status = resp.status();
    let url = resp.url().to_string();

    if status == StatusCode::NOT_FOUND {
        return Ok(None);
    }
    if !status.is_success() {
        return Err(SkillSyncError::HttpStatus {
            url,
            status: status.as_u16(),
        });
    }

    resp.json::<T>()
        .await
        .map(Some)
        .map_err(|e| SkillSyncError::parse(format!("{url}: {e}")))
}
