//! Core pipeline orchestration and domain logic for SkillSync.
//!
//! This crate ties together discovery, change detection, content fetching,
//! enrichment and persistence into the end-to-end [`run_sync`] workflow.

pub mod catalog;
pub mod checkpoint;
pub mod enrichment;
pub mod generation;
pub mod pipeline;
pub mod reconcile;
pub mod sync;

pub use checkpoint::ProgressCheckpointer;
pub use enrichment::{EnrichmentOptions, EnrichmentOutcome, EnrichmentScheduler, MergeRules};
pub use generation::{GeneratedContent, GenerationRequest, LlmClient, TextGenerator};
pub use pipeline::{ProgressReporter, RunSummary, SilentProgress, SyncRunConfig, run_sync};
pub use reconcile::{Candidate, Reconciliation, dedup, reconcile};
pub use sync::{SyncClient, SyncOutcome};
