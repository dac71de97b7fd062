//! Bounded-concurrency enrichment of draft records.
//!
//! Record ids are pushed through a bounded queue to `N` worker tasks. Each
//! worker makes one generation call per id with a per-call timeout and sends
//! the outcome back; the coordinator (the caller's task) is the only place
//! records are mutated. Failures are counted and never retried.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use skillsync_shared::{
    CatalogConfig, CatalogRecord, DraftRecord, EnrichmentPayload, GenerationConfig, Result,
    SkillSyncError,
};

use crate::generation::{GeneratedContent, GenerationRequest, TextGenerator};

/// Most tags adopted from a generation result.
const MAX_TAGS: usize = 5;

// ---------------------------------------------------------------------------
// Merge rules
// ---------------------------------------------------------------------------

/// How a generation result is folded into an existing record.
#[derive(Debug, Clone)]
pub struct MergeRules {
    /// Matches generic fallback short descriptions.
    pub placeholder: Regex,
    /// Short descriptions below this many characters are placeholders.
    pub placeholder_min_len: usize,
    /// Generated long descriptions must exceed this many characters.
    pub long_desc_min_len: usize,
}

impl MergeRules {
    pub fn from_config(config: &CatalogConfig) -> Result<Self> {
        let placeholder = Regex::new(&config.placeholder_pattern).map_err(|e| {
            SkillSyncError::config(format!(
                "invalid catalog.placeholder_pattern {:?}: {e}",
                config.placeholder_pattern
            ))
        })?;

        Ok(Self {
            placeholder,
            placeholder_min_len: config.placeholder_min_len,
            long_desc_min_len: config.long_desc_min_len,
        })
    }

    pub fn is_placeholder(&self, short_desc: &str) -> bool {
        short_desc.chars().count() < self.placeholder_min_len || self.placeholder.is_match(short_desc)
    }

    /// Apply a successful result. Curated text and existing tags are kept.
    pub fn apply(&self, record: &mut CatalogRecord, generated: GeneratedContent) {
        record.seo_content = Some(EnrichmentPayload {
            seo_title: generated.seo_title,
            seo_description: generated.seo_description,
        });

        if !generated.short_desc.trim().is_empty() && self.is_placeholder(&record.short_desc) {
            record.short_desc = generated.short_desc;
        }

        if generated.long_desc.chars().count() > self.long_desc_min_len {
            record.long_desc = generated.long_desc;
        }

        if record.tags.is_empty() {
            record.tags = generated
                .tags
                .iter()
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .take(MAX_TAGS)
                .collect();
        }
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Scheduler tunables.
#[derive(Debug, Clone)]
pub struct EnrichmentOptions {
    pub concurrency: usize,
    pub call_timeout: Duration,
    /// Characters of documentation sent per request.
    pub prompt_chars: usize,
    /// Completed calls between `checkpoint_due` progress ticks (0 = never).
    pub checkpoint_every: usize,
}

impl EnrichmentOptions {
    pub fn from_config(generation: &GenerationConfig, catalog: &CatalogConfig) -> Self {
        Self {
            concurrency: generation.concurrency,
            call_timeout: Duration::from_secs(generation.timeout_secs),
            prompt_chars: generation.prompt_chars,
            checkpoint_every: catalog.checkpoint_every,
        }
    }
}

/// Progress tick passed to the caller after every completed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnrichmentProgress {
    pub completed: usize,
    pub total: usize,
    pub failed: usize,
    /// A checkpoint boundary was just crossed.
    pub checkpoint_due: bool,
}

/// Final counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnrichmentOutcome {
    pub succeeded: usize,
    pub failed: usize,
}

struct Job {
    id: String,
    request: GenerationRequest,
}

/// Runs generation calls over a worker pool and merges results.
pub struct EnrichmentScheduler<G> {
    generator: Arc<G>,
    options: EnrichmentOptions,
    rules: MergeRules,
}

impl<G: TextGenerator + 'static> EnrichmentScheduler<G> {
    pub fn new(generator: Arc<G>, options: EnrichmentOptions, rules: MergeRules) -> Self {
        Self {
            generator,
            options,
            rules,
        }
    }

    /// Enrich the records named by `ids`, mutating them in place.
    ///
    /// Each id is dispatched at most once, even if listed repeatedly. Ids not
    /// present in `records` are ignored.
    #[instrument(skip_all, fields(queued = ids.len(), concurrency = self.options.concurrency))]
    pub async fn enrich<F>(
        &self,
        records: &mut BTreeMap<String, DraftRecord>,
        ids: &[String],
        mut on_progress: F,
    ) -> EnrichmentOutcome
    where
        F: FnMut(EnrichmentProgress, &BTreeMap<String, DraftRecord>),
    {
        let jobs = self.build_jobs(records, ids);
        let total = jobs.len();
        let mut outcome = EnrichmentOutcome::default();
        if total == 0 {
            return outcome;
        }

        let workers = self.options.concurrency.clamp(1, total);
        info!(total, workers, "starting enrichment");

        let (job_tx, job_rx) = mpsc::channel::<Job>(workers * 2);
        let job_rx = Arc::new(Mutex::new(job_rx));
        let (result_tx, mut result_rx) = mpsc::unbounded_channel::<(String, Result<GeneratedContent>)>();

        let mut pool = JoinSet::new();
        for _ in 0..workers {
            let job_rx = Arc::clone(&job_rx);
            let result_tx = result_tx.clone();
            let generator = Arc::clone(&self.generator);
            let call_timeout = self.options.call_timeout;

            pool.spawn(async move {
                loop {
                    let next = job_rx.lock().await.recv().await;
                    let Some(job) = next else { break };

                    let result = match tokio::time::timeout(call_timeout, generator.generate(&job.request)).await {
                        Ok(result) => result,
                        Err(_) => Err(SkillSyncError::Enrichment(format!(
                            "timed out after {}s",
                            call_timeout.as_secs()
                        ))),
                    };

                    if result_tx.send((job.id, result)).is_err() {
                        break;
                    }
                }
            });
        }
        drop(result_tx);

        pool.spawn(async move {
            for job in jobs {
                if job_tx.send(job).await.is_err() {
                    break;
                }
            }
        });

        let mut completed = 0;
        while let Some((id, result)) = result_rx.recv().await {
            completed += 1;

            match result {
                Ok(generated) => match records.get_mut(&id) {
                    Some(draft) => {
                        self.rules.apply(&mut draft.record, generated);
                        outcome.succeeded += 1;
                        debug!(%id, "enriched");
                    }
                    None => outcome.failed += 1,
                },
                Err(e) => {
                    outcome.failed += 1;
                    warn!(%id, error = %e, "enrichment failed");
                }
            }

            let every = self.options.checkpoint_every;
            on_progress(
                EnrichmentProgress {
                    completed,
                    total,
                    failed: outcome.failed,
                    checkpoint_due: every > 0 && completed % every == 0,
                },
                records,
            );
        }

        while let Some(joined) = pool.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "enrichment worker panicked");
            }
        }

        info!(succeeded = outcome.succeeded, failed = outcome.failed, "enrichment complete");
        outcome
    }

    fn build_jobs(&self, records: &BTreeMap<String, DraftRecord>, ids: &[String]) -> Vec<Job> {
        let mut seen = HashSet::with_capacity(ids.len());
        ids.iter()
            .filter(|id| seen.insert(id.as_str()))
            .filter_map(|id| {
                let draft = records.get(id)?;
                let source = draft.raw_body.as_deref().unwrap_or(&draft.record.long_desc);
                Some(Job {
                    id: id.clone(),
                    request: GenerationRequest {
                        name: draft.record.name.clone(),
                        author: draft.record.author.clone(),
                        content: source.chars().take(self.options.prompt_chars).collect(),
                    },
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn rules() -> MergeRules {
        MergeRules::from_config(&CatalogConfig::default()).unwrap()
    }

    fn generated() -> GeneratedContent {
        GeneratedContent {
            seo_title: "Format code with Tool A | ClawKit".into(),
            seo_description: "Formats code.".into(),
            short_desc: "Formats source files in place using project rules and editor settings.".into(),
            long_desc: "Tool A formats source files.\n\nIt reads project settings and rewrites files in place.".into(),
            tags: vec!["Format".into(), " cli ".into(), "".into(), "a".into(), "b".into(), "c".into(), "d".into()],
        }
    }

    fn draft(id: &str, short_desc: &str) -> DraftRecord {
        DraftRecord {
            record: CatalogRecord {
                id: id.into(),
                name: id.into(),
                author: "alice".into(),
                short_desc: short_desc.into(),
                long_desc: "original long".into(),
                ..Default::default()
            },
            raw_body: Some(format!("# {id}\n{}", "x".repeat(5000))),
        }
    }

    // -----------------------------------------------------------------------
    // Merge rules
    // -----------------------------------------------------------------------

    #[test]
    fn placeholder_detection() {
        let r = rules();
        assert!(r.is_placeholder("Skill by alice and a long tail of words"));
        assert!(r.is_placeholder("Too short"));
        assert!(!r.is_placeholder("A carefully written curated description"));
    }

    #[test]
    fn curated_short_desc_is_kept() {
        let mut record = draft("a", "A carefully written curated description").record;
        rules().apply(&mut record, generated());
        assert_eq!(record.short_desc, "A carefully written curated description");
        assert!(record.is_enriched());
    }

    #[test]
    fn placeholder_short_desc_is_replaced() {
        let mut record = draft("a", "Skill by alice").record;
        rules().apply(&mut record, generated());
        assert!(record.short_desc.starts_with("Formats source files"));
        assert!(record.long_desc.starts_with("Tool A formats"));
        assert_eq!(record.tags, vec!["format", "cli", "a", "b", "c"]);
    }

    #[test]
    fn short_long_desc_and_existing_tags_are_kept() {
        let mut record = draft("a", "Skill by alice").record;
        record.tags = vec!["curated".into()];
        let mut result = generated();
        result.long_desc = "Too short to adopt.".into();

        rules().apply(&mut record, result);
        assert_eq!(record.long_desc, "original long");
        assert_eq!(record.tags, vec!["curated"]);
    }

    #[test]
    fn invalid_placeholder_pattern_is_config_error() {
        let config = CatalogConfig {
            placeholder_pattern: "([".into(),
            ..Default::default()
        };
        assert!(matches!(MergeRules::from_config(&config), Err(SkillSyncError::Config { .. })));
    }

    // -----------------------------------------------------------------------
    // Scheduler
    // -----------------------------------------------------------------------

    /// Succeeds unless the name starts with "fail"; records peak concurrency.
    struct FakeGenerator {
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        delay: Duration,
        max_content: AtomicUsize,
    }

    impl FakeGenerator {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                delay,
                max_content: AtomicUsize::new(0),
            })
        }
    }

    impl TextGenerator for FakeGenerator {
        async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedContent> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.max_content.fetch_max(request.content.chars().count(), Ordering::SeqCst);

            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if request.name.starts_with("fail") {
                Err(SkillSyncError::parse("bad json"))
            } else {
                Ok(generated())
            }
        }
    }

    fn options(concurrency: usize) -> EnrichmentOptions {
        EnrichmentOptions {
            concurrency,
            call_timeout: Duration::from_secs(5),
            prompt_chars: 4000,
            checkpoint_every: 2,
        }
    }

    fn records(ids: &[&str]) -> BTreeMap<String, DraftRecord> {
        ids.iter()
            .map(|id| (id.to_string(), draft(id, "Skill by alice")))
            .collect()
    }

    #[tokio::test]
    async fn enriches_with_bounded_concurrency() {
        let generator = FakeGenerator::new(Duration::from_millis(20));
        let scheduler = EnrichmentScheduler::new(Arc::clone(&generator), options(3), rules());

        let names: Vec<String> = (0..10).map(|i| format!("tool-{i}")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let mut map = records(&refs);

        let mut ticks = Vec::new();
        let outcome = scheduler
            .enrich(&mut map, &names, |p, _| ticks.push(p))
            .await;

        assert_eq!(outcome, EnrichmentOutcome { succeeded: 10, failed: 0 });
        assert!(generator.peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(generator.max_content.load(Ordering::SeqCst), 4000);
        assert!(map.values().all(|d| d.record.is_enriched()));
        assert_eq!(ticks.len(), 10);
        assert_eq!(ticks.iter().filter(|t| t.checkpoint_due).count(), 5);
        assert_eq!(ticks.last().unwrap().completed, 10);
    }

    #[tokio::test]
    async fn failures_are_counted_and_leave_records_untouched() {
        let generator = FakeGenerator::new(Duration::ZERO);
        let scheduler = EnrichmentScheduler::new(Arc::clone(&generator), options(2), rules());
        let mut map = records(&["ok-1", "fail-1", "ok-2"]);
        let ids: Vec<String> = map.keys().cloned().collect();

        let outcome = scheduler.enrich(&mut map, &ids, |_, _| {}).await;

        assert_eq!(outcome, EnrichmentOutcome { succeeded: 2, failed: 1 });
        let failed = &map["fail-1"].record;
        assert!(!failed.is_enriched());
        assert_eq!(failed.short_desc, "Skill by alice");
        assert_eq!(failed.long_desc, "original long");
        // No retry
        assert_eq!(generator.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn duplicate_ids_are_dispatched_once() {
        let generator = FakeGenerator::new(Duration::ZERO);
        let scheduler = EnrichmentScheduler::new(Arc::clone(&generator), options(4), rules());
        let mut map = records(&["a", "b"]);
        let ids = vec!["a".to_string(), "b".to_string(), "a".to_string(), "missing".to_string()];

        let outcome = scheduler.enrich(&mut map, &ids, |_, _| {}).await;

        assert_eq!(outcome.succeeded, 2);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn slow_calls_time_out_individually() {
        let generator = FakeGenerator::new(Duration::from_secs(2));
        let mut opts = options(2);
        opts.call_timeout = Duration::from_millis(50);
        let scheduler = EnrichmentScheduler::new(generator, opts, rules());
        let mut map = records(&["a", "b"]);
        let ids: Vec<String> = map.keys().cloned().collect();

        let outcome = scheduler.enrich(&mut map, &ids, |_, _| {}).await;
        assert_eq!(outcome, EnrichmentOutcome { succeeded: 0, failed: 2 });
    }

    #[tokio::test]
    async fn falls_back_to_long_desc_without_raw_body() {
        let generator = FakeGenerator::new(Duration::ZERO);
        let scheduler = EnrichmentScheduler::new(Arc::clone(&generator), options(1), rules());
        let mut map = records(&["a"]);
        map.get_mut("a").unwrap().raw_body = None;

        let jobs = scheduler.build_jobs(&map, &["a".to_string()]);
        assert_eq!(jobs[0].request.content, "original long");
    }
}
