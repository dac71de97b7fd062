//! Catalog entry discovery from full repository tree listings.
//!
//! Each seed costs two metered calls: one to resolve the branch reference and
//! one for the recursive tree. Entries are then extracted from the listing
//! locally according to the seed's [`Layout`](skillsync_shared::Layout).

mod tree;

use std::collections::BTreeMap;

use tracing::{debug, info, instrument, warn};

use skillsync_fetcher::GitHubClient;
use skillsync_shared::{DiscoveredEntry, Result, Seed, SkillSyncError};

pub use tree::{ItemKind, RepoTree, TreeItem};
use tree::{GitRef, TreeListing};

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

/// Entries found for one seed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Discovery {
    /// Ordered by `(author, name)`.
    pub entries: Vec<DiscoveredEntry>,
    /// Carried over from the listing so coverage gaps stay visible.
    pub truncated: bool,
}

/// Extract entries from a tree listing.
///
/// Only blobs under `<prefix>/` whose relative path has exactly the layout's
/// segment count are considered. When one entry directory holds several
/// accepted documentation files, the earliest in `doc_files` wins.
pub fn discover(seed: &Seed, tree: &RepoTree, doc_files: &[String]) -> Discovery {
    let priorities: Vec<String> = doc_files.iter().map(|f| f.to_lowercase()).collect();
    let prefix = format!("{}/", seed.prefix());
    let segments = seed.layout.segment_count();

    // (author, name) -> (priority, path, sha)
    let mut best: BTreeMap<(String, String), (usize, &str, &str)> = BTreeMap::new();

    for item in &tree.items {
        if item.kind != ItemKind::Blob {
            continue;
        }
        let Some(rel) = item.path.strip_prefix(&prefix) else {
            continue;
        };

        let parts: Vec<&str> = rel.split('/').collect();
        if parts.len() != segments || parts.iter().any(|p| p.is_empty()) {
            continue;
        }

        let (author, name, file) = match parts.as_slice() {
            [name, file] => (seed.owner(), *name, *file),
            [author, name, file] => (*author, *name, *file),
            _ => continue,
        };

        let file_lower = file.to_lowercase();
        let Some(priority) = priorities.iter().position(|p| *p == file_lower) else {
            continue;
        };

        let key = (author.to_string(), name.to_string());
        match best.get(&key) {
            Some((existing, _, _)) if *existing <= priority => {}
            _ => {
                best.insert(key, (priority, item.path.as_str(), item.sha.as_str()));
            }
        }
    }

    let entries = best
        .into_iter()
        .map(|((author, name), (_, path, sha))| DiscoveredEntry {
            author,
            name,
            doc_path: path.to_string(),
            fingerprint: sha.to_string(),
        })
        .collect();

    Discovery {
        entries,
        truncated: tree.truncated,
    }
}

// ---------------------------------------------------------------------------
// Tree retrieval
// ---------------------------------------------------------------------------

/// Resolve the first existing branch of `branches` and fetch its recursive tree.
#[instrument(skip_all, fields(repo = %repo))]
pub async fn fetch_tree(client: &GitHubClient, repo: &str, branches: &[String]) -> Result<RepoTree> {
    let (branch, commit_sha) = resolve_branch(client, repo, branches).await?;

    let listing: TreeListing = client
        .get_json(&format!("repos/{repo}/git/trees/{commit_sha}?recursive=1"))
        .await?
        .ok_or_else(|| {
            SkillSyncError::validation(format!("tree {commit_sha} of {repo} not found"))
        })?;

    if listing.truncated {
        warn!(
            items = listing.tree.len(),
            "tree listing truncated, some entries may be missing"
        );
    } else {
        info!(branch = %branch, items = listing.tree.len(), "tree loaded");
    }

    Ok(RepoTree {
        branch,
        items: listing.tree,
        truncated: listing.truncated,
    })
}

async fn resolve_branch(
    client: &GitHubClient,
    repo: &str,
    branches: &[String],
) -> Result<(String, String)> {
    for branch in branches {
        match client
            .get_json::<GitRef>(&format!("repos/{repo}/git/ref/heads/{branch}"))
            .await
        {
            Ok(Some(git_ref)) => return Ok((branch.clone(), git_ref.object.sha)),
            Ok(None) => debug!(%branch, "branch not found"),
            Err(SkillSyncError::HttpStatus { status, .. }) => {
                debug!(%branch, status, "branch lookup rejected")
            }
            Err(e) => return Err(e),
        }
    }

    Err(SkillSyncError::validation(format!(
        "none of the branches [{}] exist in {repo}",
        branches.join(", ")
    )))
}
