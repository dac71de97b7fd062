//! Deduplication and reuse decisions for discovered entries.
//!
//! Reuse precedence per id:
//! 1. the progress snapshot (an interrupted run is newer than the catalog),
//! 2. the persisted catalog when the fingerprint is unchanged and the record is
//!    already enriched and has a source locator,
//! 3. otherwise the entry is fetched.

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use skillsync_shared::{CatalogRecord, DiscoveredEntry, DraftRecord};

/// A discovered entry together with where it came from and its catalog id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub id: String,
    pub repo: String,
    pub branch: String,
    pub entry: DiscoveredEntry,
}

/// Where a record for a candidate comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    FromSnapshot,
    FromCatalog,
    Fetch,
}

/// Output of [`reconcile`].
#[derive(Debug, Default)]
pub struct Reconciliation {
    /// Records carried over without any network call, keyed by id.
    pub reusable: BTreeMap<String, DraftRecord>,
    /// Candidates whose content must be downloaded.
    pub to_fetch: Vec<Candidate>,
    /// Snapshot records that still lack an enrichment payload.
    pub needs_enrichment: Vec<String>,
    pub from_snapshot: usize,
    pub from_catalog: usize,
}

/// Collapse candidates sharing an id. The later one wins but keeps the first one's position.
pub fn dedup(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut position: HashMap<String, usize> = HashMap::with_capacity(candidates.len());
    let mut unique: Vec<Candidate> = Vec::with_capacity(candidates.len());

    for candidate in candidates {
        match position.get(&candidate.id) {
            Some(&idx) => {
                debug!(id = %candidate.id, repo = %candidate.repo, "duplicate id, later seed wins");
                unique[idx] = candidate;
            }
            None => {
                position.insert(candidate.id.clone(), unique.len());
                unique.push(candidate);
            }
        }
    }

    unique
}

/// Decide how a single candidate is sourced.
pub fn classify(
    candidate: &Candidate,
    persisted: &HashMap<String, CatalogRecord>,
    snapshot: &BTreeMap<String, DraftRecord>,
) -> Decision {
    if snapshot.contains_key(&candidate.id) {
        return Decision::FromSnapshot;
    }

    match persisted.get(&candidate.id) {
        Some(old)
            if old.file_sha == candidate.entry.fingerprint
                && old.is_enriched()
                && old.has_source_locator() =>
        {
            Decision::FromCatalog
        }
        _ => Decision::Fetch,
    }
}

/// Split deduplicated candidates into reusable records and fetch work.
pub fn reconcile(
    candidates: Vec<Candidate>,
    persisted: &HashMap<String, CatalogRecord>,
    snapshot: &BTreeMap<String, DraftRecord>,
) -> Reconciliation {
    let mut out = Reconciliation::default();

    for candidate in candidates {
        match classify(&candidate, persisted, snapshot) {
            Decision::FromSnapshot => {
                let draft = snapshot[&candidate.id].clone();
                if !draft.record.is_enriched() {
                    out.needs_enrichment.push(candidate.id.clone());
                }
                out.from_snapshot += 1;
                out.reusable.insert(candidate.id, draft);
            }
            Decision::FromCatalog => {
                let record = persisted[&candidate.id].clone();
                out.from_catalog += 1;
                out.reusable.insert(candidate.id, DraftRecord::reused(record));
            }
            Decision::Fetch => out.to_fetch.push(candidate),
        }
    }

    debug!(
        snapshot = out.from_snapshot,
        catalog = out.from_catalog,
        fetch = out.to_fetch.len(),
        "reconciled"
    );
    out
}
