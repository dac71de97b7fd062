//! End-to-end catalog sync: quota probe → discovery → reconcile → fetch → enrich → save → sync.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Local;
use tracing::{error, info, instrument, warn};

use skillsync_discovery::{discover, fetch_tree};
use skillsync_fetcher::{ContentFetcher, EntrySource, GitHubClient, RecordOptions};
use skillsync_shared::{
    AppConfig, CatalogRecord, DataPaths, DraftRecord, Result, SkillSyncError, record_id,
};

use crate::catalog;
use crate::checkpoint::ProgressCheckpointer;
use crate::enrichment::{EnrichmentOptions, EnrichmentScheduler, MergeRules};
use crate::generation::LlmClient;
use crate::reconcile::{Candidate, dedup, reconcile};
use crate::sync::{SyncClient, SyncOutcome};

/// Number of tags listed in the run summary.
const TOP_TAGS: usize = 10;

/// Everything one run needs, with secrets already resolved.
#[derive(Debug, Clone)]
pub struct SyncRunConfig {
    pub app: AppConfig,
    pub data: DataPaths,
    pub github_token: String,
    /// `None` skips enrichment.
    pub llm_api_key: Option<String>,
    /// `None` skips the downstream sync.
    pub sync_api_key: Option<String>,
    /// Discover, fetch and enrich, but write nothing.
    pub dry_run: bool,
    /// Per-seed cap on discovered entries. `Some(0)` means no cap.
    pub limit: Option<usize>,
}

/// Result of a completed run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub seeds_processed: usize,
    pub seeds_failed: usize,
    /// Seeds whose tree listing was capped upstream.
    pub seeds_truncated: usize,
    pub discovered: usize,
    pub unique: usize,
    pub reused_from_snapshot: usize,
    pub reused_from_catalog: usize,
    pub fetched: usize,
    pub skipped: usize,
    pub enrichment_queued: usize,
    pub enrichment_succeeded: usize,
    pub enrichment_failed: usize,
    /// Queued but not attempted because no generation key was configured.
    pub enrichment_skipped: usize,
    pub total_records: usize,
    pub with_payload: usize,
    pub with_tags: usize,
    pub top_tags: Vec<(String, usize)>,
    pub api_calls: u64,
    pub quota_remaining: Option<u32>,
    pub backup: Option<PathBuf>,
    pub sync: Option<SyncOutcome>,
    pub dry_run: bool,
    pub elapsed: Duration,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called per processed item within a phase.
    fn item_progress(&self, current: usize, total: usize, detail: &str);
    /// Called when the pipeline completes.
    fn done(&self, summary: &RunSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn item_progress(&self, _current: usize, _total: usize, _detail: &str) {}
    fn done(&self, _summary: &RunSummary) {}
}

/// Run the full sync pipeline.
///
/// 1. Preflight: token, seeds, catalog, snapshot (no network)
/// 2. Quota probe
/// 3. Discovery per seed
/// 4. Reconcile and fetch changed entries
/// 5. Enrichment
/// 6. Save (backup, catalog, snapshot cleanup) and optional downstream sync
#[instrument(skip_all, fields(data_dir = %config.data.root.display(), dry_run = config.dry_run))]
pub async fn run_sync(config: &SyncRunConfig, progress: &dyn ProgressReporter) -> Result<RunSummary> {
    let start = Instant::now();
    let app = &config.app;
    let mut summary = RunSummary {
        dry_run: config.dry_run,
        ..Default::default()
    };

    // --- Preflight ---
    if config.github_token.trim().is_empty() {
        return Err(SkillSyncError::config(format!(
            "GitHub token is empty. Set the {} environment variable.",
            app.github.token_env
        )));
    }
    let seeds = catalog::load_seeds(&config.data.seeds_file())?;
    let rules = MergeRules::from_config(&app.catalog)?;
    let client = GitHubClient::new(&app.github, config.github_token.clone())?;
    let persisted = catalog::load_catalog(&config.data.catalog_file())?;
    let checkpointer = ProgressCheckpointer::new(
        config.data.snapshot_file(),
        chrono::Duration::hours(app.catalog.snapshot_max_age_hours),
    );
    let snapshot = checkpointer.restore();

    info!(
        seeds = seeds.len(),
        existing = persisted.len(),
        snapshot = snapshot.len(),
        llm = config.llm_api_key.is_some(),
        "starting sync"
    );

    // --- Quota probe ---
    progress.phase("Checking API quota");
    let status = client.rate_status().await?;
    info!(
        remaining = status.remaining,
        limit = status.limit,
        reset_at = %status.reset_at,
        "API quota"
    );
    if status.remaining < app.github.min_start_quota {
        error!(remaining = status.remaining, "quota too low to start");
        return Err(SkillSyncError::QuotaExhausted {
            remaining: status.remaining,
            reset_at: status.reset_at,
        });
    }

    // --- Discovery ---
    progress.phase("Discovering entries");
    let mut candidates: Vec<Candidate> = Vec::new();

    for (idx, seed) in seeds.iter().enumerate() {
        progress.item_progress(idx + 1, seeds.len(), &seed.repo);

        let tree = match fetch_tree(&client, &seed.repo, &app.github.branches).await {
            Ok(tree) => tree,
            Err(e) if e.is_quota_exhausted() => return Err(e),
            Err(e) => {
                warn!(repo = %seed.repo, error = %e, "seed skipped");
                summary.seeds_failed += 1;
                continue;
            }
        };
        summary.seeds_processed += 1;

        let found = discover(seed, &tree, &app.catalog.doc_files);
        if found.truncated {
            summary.seeds_truncated += 1;
        }

        let mut entries = found.entries;
        if let Some(limit) = config.limit.filter(|n| *n > 0) {
            entries.truncate(limit);
        }
        info!(repo = %seed.repo, layout = seed.layout.as_str(), entries = entries.len(), "seed discovered");
        summary.discovered += entries.len();

        for entry in entries {
            candidates.push(Candidate {
                id: record_id(seed, &entry.author, &entry.name, &app.catalog.canonical_repos),
                repo: seed.repo.clone(),
                branch: tree.branch.clone(),
                entry,
            });
        }
    }

    let unique = dedup(candidates);
    summary.unique = unique.len();

    // --- Reconcile and fetch ---
    progress.phase("Fetching changed entries");
    let plan = reconcile(unique, &persisted, &snapshot);
    summary.reused_from_snapshot = plan.from_snapshot;
    summary.reused_from_catalog = plan.from_catalog;

    let mut records = plan.reusable;
    let mut needs_enrichment = plan.needs_enrichment;
    let mut fetcher = ContentFetcher::new(&client, RecordOptions::from_config(app));
    let every = app.catalog.checkpoint_every;
    let fetch_total = plan.to_fetch.len();

    for (idx, candidate) in plan.to_fetch.iter().enumerate() {
        progress.item_progress(idx + 1, fetch_total, &candidate.id);

        let source = EntrySource {
            id: &candidate.id,
            repo: &candidate.repo,
            branch: &candidate.branch,
            entry: &candidate.entry,
        };

        match fetcher.fetch_draft(source).await {
            Ok(Some(draft)) => {
                records.insert(candidate.id.clone(), draft);
                needs_enrichment.push(candidate.id.clone());
                summary.fetched += 1;

                if !config.dry_run && every > 0 && summary.fetched % every == 0 {
                    save_snapshot(&checkpointer, &records);
                }
            }
            Ok(None) => summary.skipped += 1,
            Err(e) => {
                error!(id = %candidate.id, error = %e, "aborting fetch phase");
                if !config.dry_run {
                    save_snapshot(&checkpointer, &records);
                }
                return Err(e);
            }
        }
    }

    info!(
        fetched = summary.fetched,
        skipped = summary.skipped,
        reused = summary.reused_from_snapshot + summary.reused_from_catalog,
        repos = fetcher.repos_seen(),
        api_calls = client.api_calls(),
        "fetch phase complete"
    );

    // --- Enrichment ---
    summary.enrichment_queued = needs_enrichment.len();
    if !needs_enrichment.is_empty() {
        match config.llm_api_key.as_deref() {
            Some(key) => {
                progress.phase("Generating descriptions");
                let llm = Arc::new(LlmClient::new(&app.generation, key)?);
                let scheduler = EnrichmentScheduler::new(
                    llm,
                    EnrichmentOptions::from_config(&app.generation, &app.catalog),
                    rules,
                );

                let outcome = scheduler
                    .enrich(&mut records, &needs_enrichment, |tick, current| {
                        progress.item_progress(tick.completed, tick.total, "generation");
                        if tick.checkpoint_due && !config.dry_run {
                            save_snapshot(&checkpointer, current);
                        }
                    })
                    .await;

                summary.enrichment_succeeded = outcome.succeeded;
                summary.enrichment_failed = outcome.failed;
            }
            None => {
                warn!(
                    count = needs_enrichment.len(),
                    env = %app.generation.api_key_env,
                    "generation key not set, skipping enrichment"
                );
                summary.enrichment_skipped = needs_enrichment.len();
            }
        }
    }

    // --- Save ---
    progress.phase("Saving catalog");
    let mut final_records: Vec<CatalogRecord> =
        records.into_values().map(DraftRecord::finalize).collect();
    catalog::sort_records(&mut final_records);
    fill_catalog_stats(&mut summary, &final_records);

    if config.dry_run {
        info!(count = final_records.len(), "dry run, catalog not written");
    } else {
        let catalog_file = config.data.catalog_file();
        summary.backup =
            catalog::backup_catalog(&catalog_file, &config.data.backup_dir(), Local::now())?;
        catalog::save_catalog(&catalog_file, &final_records)?;
        checkpointer.clear()?;
    }

    // --- Downstream sync ---
    if !config.dry_run && !app.sync.url.trim().is_empty() {
        match config.sync_api_key.as_deref() {
            Some(key) => {
                progress.phase("Syncing downstream");
                let sync = SyncClient::new(&app.sync, key)?;
                summary.sync = Some(sync.push(&final_records).await);
            }
            None => warn!(env = %app.sync.api_key_env, "sync url set but key missing, skipping"),
        }
    }

    summary.api_calls = client.api_calls();
    summary.quota_remaining = client.quota().await.remaining;
    summary.elapsed = start.elapsed();

    summary.log();
    progress.done(&summary);
    Ok(summary)
}

/// Snapshot failures only cost resumability, so they are logged and ignored.
fn save_snapshot(checkpointer: &ProgressCheckpointer, records: &BTreeMap<String, DraftRecord>) {
    match checkpointer.checkpoint(records) {
        Ok(()) => info!(count = records.len(), "progress saved"),
        Err(e) => warn!(error = %e, "failed to save progress snapshot"),
    }
}

fn fill_catalog_stats(summary: &mut RunSummary, records: &[CatalogRecord]) {
    summary.total_records = records.len();
    summary.with_payload = records.iter().filter(|r| r.is_enriched()).count();
    summary.with_tags = records.iter().filter(|r| !r.tags.is_empty()).count();

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for tag in records.iter().flat_map(|r| &r.tags) {
        *counts.entry(tag.as_str()).or_default() += 1;
    }

    let mut top: Vec<(String, usize)> = counts
        .into_iter()
        .map(|(tag, count)| (tag.to_string(), count))
        .collect();
    top.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    top.truncate(TOP_TAGS);
    summary.top_tags = top;
}

impl RunSummary {
    fn log(&self) {
        info!(
            total = self.total_records,
            with_payload = self.with_payload,
            with_tags = self.with_tags,
            fetched = self.fetched,
            reused = self.reused_from_snapshot + self.reused_from_catalog,
            enriched = self.enrichment_succeeded,
            enrichment_failed = self.enrichment_failed,
            seeds_failed = self.seeds_failed,
            seeds_truncated = self.seeds_truncated,
            api_calls = self.api_calls,
            quota_remaining = self.quota_remaining,
            elapsed_ms = self.elapsed.as_millis() as u64,
            "sync complete"
        );
    }
}
