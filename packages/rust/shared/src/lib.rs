//! Shared types, error model, and configuration for SkillSync.
//!
//! This crate is the foundation depended on by all other SkillSync crates.
//! It provides:
//! - [`SkillSyncError`]: the unified error type
//! - Domain types ([`Seed`], [`DiscoveredEntry`], [`CatalogRecord`], [`DraftRecord`])
//! - Configuration ([`AppConfig`], config loading, secret lookup)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CatalogConfig, DataPaths, GenerationConfig, GitHubConfig, PathsConfig, SyncConfig,
    config_dir, config_file_path, init_config, load_config, load_config_from, read_secret,
    require_github_token,
};
pub use error::{Result, SkillSyncError};
pub use types::{
    CatalogRecord, DiscoveredEntry, DraftRecord, EnrichmentPayload, Layout, Seed, record_id,
};
