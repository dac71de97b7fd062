//! Quota-aware GitHub access and content fetching.
//!
//! This crate provides:
//! - [`GitHubClient`]: metered API calls with quota tracking, blocking waits and retries
//! - [`ContentFetcher`]: raw documentation downloads, memoized repo metadata, draft records
//! - [`parse_document`] / [`truncate_text`]: lenient front matter and boundary-aware truncation

pub mod client;
pub mod content;
pub mod frontmatter;
pub mod rate_limit;
pub mod truncate;

pub use client::{GitHubClient, RateStatus};
pub use content::{ContentFetcher, EntrySource, RecordOptions, RepoMeta, build_draft};
pub use frontmatter::{DocHeader, ParsedDoc, parse_document};
pub use rate_limit::{QuotaDecision, QuotaState, RateLimitPolicy};
pub use truncate::{ELLIPSIS, truncate_text};
