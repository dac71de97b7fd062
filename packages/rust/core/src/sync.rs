//! Optional push of the final catalog to a downstream endpoint.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use skillsync_shared::{CatalogRecord, Result, SkillSyncError, SyncConfig};

#[derive(Serialize)]
struct SyncBatch<'a> {
    skills: &'a [CatalogRecord],
}

#[derive(Debug, Deserialize)]
struct SyncReply {
    #[serde(default)]
    created: usize,
    #[serde(default)]
    updated: usize,
}

/// Totals across all batches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    pub created: usize,
    pub updated: usize,
    /// Records in batches that were rejected or never answered.
    pub failed: usize,
    pub batches_failed: usize,
}

impl SyncOutcome {
    pub fn synced(&self) -> usize {
        self.created + self.updated
    }
}

/// Posts the catalog in fixed-size batches with bearer auth.
pub struct SyncClient {
    http: Client,
    url: String,
    api_key: String,
    batch_size: usize,
}

impl SyncClient {
    pub fn new(config: &SyncConfig, api_key: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SkillSyncError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            url: config.url.clone(),
            api_key: api_key.into(),
            batch_size: config.batch_size.max(1),
        })
    }

    /// Send every batch once. A failed batch is counted, not retried.
    #[instrument(skip_all, fields(records = records.len(), batch_size = self.batch_size))]
    pub async fn push(&self, records: &[CatalogRecord]) -> SyncOutcome {
        let mut outcome = SyncOutcome::default();

        for (idx, batch) in records.chunks(self.batch_size).enumerate() {
            match self.send_batch(batch).await {
                Ok(reply) => {
                    info!(batch = idx, created = reply.created, updated = reply.updated, "batch synced");
                    outcome.created += reply.created;
                    outcome.updated += reply.updated;
                }
                Err(e) => {
                    warn!(batch = idx, size = batch.len(), error = %e, "batch sync failed");
                    outcome.failed += batch.len();
                    outcome.batches_failed += 1;
                }
            }
        }

        info!(synced = outcome.synced(), failed = outcome.failed, "sync complete");
        outcome
    }

    async fn send_batch(&self, batch: &[CatalogRecord]) -> Result<SyncReply> {
        let resp = self
            .http
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&SyncBatch { skills: batch })
            .send()
            .await
            .map_err(|e| SkillSyncError::Network(format!("{}: {e}", self.url)))?;

        if resp.status() != StatusCode::OK {
            return Err(SkillSyncError::HttpStatus {
                url: self.url.clone(),
                status: resp.status().as_u16(),
            });
        }

        resp.json::<SyncReply>()
            .await
            .map_err(|e| SkillSyncError::parse(format!("{}: unreadable sync reply: {e}", self.url)))
    }
}
