//! Git data API payloads used for tree retrieval.

use serde::Deserialize;

/// Kind of a tree listing item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Blob,
    Tree,
    Commit,
    #[serde(other)]
    Other,
}

/// One item of a recursive tree listing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TreeItem {
    pub path: String,
    #[serde(rename = "type")]
    pub kind: ItemKind,
    /// Git object id; for blobs this is the content fingerprint.
    #[serde(default)]
    pub sha: String,
}

impl TreeItem {
    pub fn blob(path: impl Into<String>, sha: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: ItemKind::Blob,
            sha: sha.into(),
        }
    }
}

/// Full recursive listing of one repository at a resolved branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoTree {
    pub branch: String,
    pub items: Vec<TreeItem>,
    /// The upstream capped the listing; some entries may be missing.
    pub truncated: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GitRef {
    pub object: GitObject,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GitObject {
    pub sha: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TreeListing {
    #[serde(default)]
    pub tree: Vec<TreeItem>,
    #[serde(default)]
    pub truncated: bool,
}
