//! Core domain types for the skills catalog.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Seed
// ---------------------------------------------------------------------------

/// Directory layout of a seed repository, i.e. how paths map to entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layout {
    /// `<prefix>/<name>/<doc-file>`; the author is the repository owner.
    Flat,
    /// `<prefix>/<author>/<name>/<doc-file>`.
    RecursiveAuthor,
}

impl Layout {
    /// Number of path segments below the seed prefix for a documentation file.
    pub fn segment_count(self) -> usize {
        match self {
            Self::Flat => 2,
            Self::RecursiveAuthor => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Flat => "flat",
            Self::RecursiveAuthor => "recursive_author",
        }
    }
}

/// One external source repository and how its directory layout maps to entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seed {
    /// Repository identity, `owner/name`.
    pub repo: String,
    /// Path prefix inside the repository (no leading or trailing slash).
    pub path: String,
    /// Layout used to segment paths under `path`.
    #[serde(rename = "type")]
    pub layout: Layout,
}

impl Seed {
    /// Repository owner (the part before the first `/`).
    pub fn owner(&self) -> &str {
        self.repo.split('/').next().unwrap_or(&self.repo)
    }

    /// Whether this seed belongs to the canonical (official) namespace.
    pub fn is_canonical(&self, canonical_repos: &[String]) -> bool {
        canonical_repos.iter().any(|r| r == &self.repo)
    }

    /// Prefix with surrounding slashes trimmed.
    pub fn prefix(&self) -> &str {
        self.path.trim_matches('/')
    }
}

/// Derive a stable catalog id for an entry discovered under `seed`.
///
/// Canonical seeds share the `official-` namespace keyed by author; community
/// seeds are namespaced by repository so two forks never collide.
pub fn record_id(seed: &Seed, author: &str, name: &str, canonical_repos: &[String]) -> String {
    let id = if seed.is_canonical(canonical_repos) {
        format!("official-{author}-{name}")
    } else {
        let safe_repo = seed.repo.replace('/', "-");
        match seed.layout {
            Layout::Flat => format!("community-{safe_repo}-{name}"),
            Layout::RecursiveAuthor => format!("community-{safe_repo}-{author}-{name}"),
        }
    };
    id.to_lowercase()
}

// ---------------------------------------------------------------------------
// DiscoveredEntry
// ---------------------------------------------------------------------------

/// A catalog entry found in a repository tree listing. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredEntry {
    pub author: String,
    pub name: String,
    /// Full repository path of the selected documentation file.
    pub doc_path: String,
    /// Content fingerprint (git blob sha) of the documentation file.
    pub fingerprint: String,
}

impl DiscoveredEntry {
    /// Directory that holds the documentation file.
    pub fn entry_dir(&self) -> &str {
        self.doc_path
            .rsplit_once('/')
            .map_or(self.doc_path.as_str(), |(dir, _)| dir)
    }
}

// ---------------------------------------------------------------------------
// CatalogRecord
// ---------------------------------------------------------------------------

/// Generated SEO fields; its presence marks a record as enriched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentPayload {
    #[serde(default)]
    pub seo_title: String,
    #[serde(default)]
    pub seo_description: String,
}

impl EnrichmentPayload {
    /// An `{}` or all-blank payload carries nothing.
    pub fn is_empty(&self) -> bool {
        self.seo_title.trim().is_empty() && self.seo_description.trim().is_empty()
    }
}

/// A persisted catalog entry. Field names follow the published `skills.json` format.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogRecord {
    pub id: String,
    pub name: String,
    #[serde(rename = "shortDesc", default)]
    pub short_desc: String,
    #[serde(rename = "longDesc", default)]
    pub long_desc: String,
    #[serde(default)]
    pub author: String,
    #[serde(rename = "authorUrl", default)]
    pub author_url: String,
    /// Popularity metric (repository stars).
    #[serde(default)]
    pub stars: u64,
    #[serde(rename = "lastUpdated", default)]
    pub last_updated: String,
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Content fingerprint of the documentation file this record was built from.
    #[serde(default)]
    pub file_sha: String,
    #[serde(default)]
    pub seo_content: Option<EnrichmentPayload>,
    /// Source locator (browsable URL of the entry directory).
    #[serde(rename = "downloadUrl", default)]
    pub download_url: String,
    #[serde(default)]
    pub source_repo: String,
    #[serde(default)]
    pub source_path: String,
}

impl CatalogRecord {
    pub fn is_enriched(&self) -> bool {
        self.seo_content.as_ref().is_some_and(|p| !p.is_empty())
    }

    pub fn has_source_locator(&self) -> bool {
        !self.download_url.trim().is_empty()
    }
}

/// An in-flight record: a catalog record plus the raw documentation body that
/// only lives until enrichment is done. Snapshots store these; the persisted
/// catalog only ever stores the inner [`CatalogRecord`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftRecord {
    #[serde(flatten)]
    pub record: CatalogRecord,
    #[serde(rename = "_raw_content", default, skip_serializing_if = "Option::is_none")]
    pub raw_body: Option<String>,
}

impl DraftRecord {
    /// Wrap a record carried over from a previous catalog (no staging data).
    pub fn reused(record: CatalogRecord) -> Self {
        Self {
            record,
            raw_body: None,
        }
    }

    /// Strip staging-only fields.
    pub fn finalize(self) -> CatalogRecord {
        self.record
    }

    pub fn id(&self) -> &str {
        &self.record.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed(repo: &str, layout: Layout) -> Seed {
        Seed {
            repo: repo.into(),
            path: "skills".into(),
            layout,
        }
    }

    fn canonical() -> Vec<String> {
        vec!["org/skills".to_string()]
    }

    #[test]
    fn canonical_ids_use_official_namespace() {
        let s = seed("org/skills", Layout::RecursiveAuthor);
        assert_eq!(record_id(&s, "Alice", "Tool-A", &canonical()), "official-alice-tool-a");
    }

    #[test]
    fn community_ids_are_namespaced_by_repo() {
        let flat = seed("bob/my-skills", Layout::Flat);
        assert_eq!(record_id(&flat, "bob", "lint", &canonical()), "community-bob-my-skills-lint");

        let nested = seed("bob/mirror", Layout::RecursiveAuthor);
        assert_eq!(
            record_id(&nested, "alice", "tool-a", &canonical()),
            "community-bob-mirror-alice-tool-a"
        );
        assert_ne!(
            record_id(&nested, "alice", "tool-a", &canonical()),
            record_id(&seed("org/skills", Layout::RecursiveAuthor), "alice", "tool-a", &canonical())
        );
    }

    #[test]
    fn seed_parses_type_field() {
        let json = r#"[{"repo":"org/skills","path":"skills","type":"recursive_author"},
                       {"repo":"bob/x","path":"/tools/","type":"flat"}]"#;
        let seeds: Vec<Seed> = serde_json::from_str(json).unwrap();
        assert_eq!(seeds[0].layout, Layout::RecursiveAuthor);
        assert_eq!(seeds[1].layout, Layout::Flat);
        assert_eq!(seeds[1].prefix(), "tools");
        assert_eq!(seeds[1].owner(), "bob");
    }

    #[test]
    fn unknown_layout_is_rejected() {
        let json = r#"{"repo":"a/b","path":"x","type":"nested"}"#;
        assert!(serde_json::from_str::<Seed>(json).is_err());
    }

    #[test]
    fn entry_dir_strips_file_name() {
        let entry = DiscoveredEntry {
            author: "alice".into(),
            name: "tool-a".into(),
            doc_path: "skills/alice/tool-a/SKILL.md".into(),
            fingerprint: "abc".into(),
        };
        assert_eq!(entry.entry_dir(), "skills/alice/tool-a");
    }

    #[test]
    fn finalized_record_has_no_staging_field() {
        let draft = DraftRecord {
            record: CatalogRecord {
                id: "official-alice-tool-a".into(),
                name: "Tool A".into(),
                ..Default::default()
            },
            raw_body: Some("# Tool A\nbody".into()),
        };

        let staged = serde_json::to_string(&draft).unwrap();
        assert!(staged.contains("_raw_content"));

        let persisted = serde_json::to_string(&draft.finalize()).unwrap();
        assert!(!persisted.contains("_raw_content"));
        assert!(persisted.contains(r#""shortDesc""#));
    }

    #[test]
    fn lenient_record_deserialization() {
        let json = r#"{"id":"x","name":"X","stars":3}"#;
        let record: CatalogRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.stars, 3);
        assert!(record.tags.is_empty());
        assert!(!record.is_enriched());
        assert!(!record.has_source_locator());
    }

    #[test]
    fn empty_payload_is_not_enriched() {
        let json = r#"{"id":"x","name":"X","seo_content":{}}"#;
        let record: CatalogRecord = serde_json::from_str(json).unwrap();
        assert!(record.seo_content.is_some());
        assert!(!record.is_enriched());

        let json = r#"{"id":"x","name":"X","seo_content":{"seo_title":"Tool X | ClawKit"}}"#;
        let record: CatalogRecord = serde_json::from_str(json).unwrap();
        assert!(record.is_enriched());
    }
}
