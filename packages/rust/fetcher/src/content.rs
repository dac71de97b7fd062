//! Raw documentation download and draft-record building.

use std::collections::HashMap;

use serde::Deserialize;
use tracing::{debug, warn};

use skillsync_shared::{AppConfig, CatalogRecord, DiscoveredEntry, DraftRecord, Result};

use crate::client::GitHubClient;
use crate::frontmatter::parse_document;
use crate::truncate::truncate_text;

/// Per-repository metadata; fetched once per repository per run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RepoMeta {
    #[serde(rename = "stargazers_count", default)]
    pub stars: u64,
}

/// Values stamped onto every freshly built record.
#[derive(Debug, Clone)]
pub struct RecordOptions {
    pub web_base: String,
    pub install_command: String,
    /// 0 = keep the full body.
    pub long_desc_max: usize,
    /// `lastUpdated` value, `YYYY-MM-DD`.
    pub today: String,
}

impl RecordOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            web_base: config.github.web_base.trim_end_matches('/').to_string(),
            install_command: config.catalog.install_command.clone(),
            long_desc_max: config.catalog.long_desc_max,
            today: chrono::Local::now().format("%Y-%m-%d").to_string(),
        }
    }
}

/// Where a discovered entry lives.
#[derive(Debug, Clone, Copy)]
pub struct EntrySource<'a> {
    pub id: &'a str,
    pub repo: &'a str,
    pub branch: &'a str,
    pub entry: &'a DiscoveredEntry,
}

// ---------------------------------------------------------------------------
// ContentFetcher
// ---------------------------------------------------------------------------

/// Downloads bodies and builds [`DraftRecord`]s, memoizing repository metadata.
pub struct ContentFetcher<'a> {
    client: &'a GitHubClient,
    options: RecordOptions,
    repo_meta: HashMap<String, RepoMeta>,
}

impl<'a> ContentFetcher<'a> {
    pub fn new(client: &'a GitHubClient, options: RecordOptions) -> Self {
        Self {
            client,
            options,
            repo_meta: HashMap::new(),
        }
    }

    /// Download a documentation body from the unmetered content host.
    ///
    /// `None` is a soft failure: the caller skips the entry and counts it.
    pub async fn fetch_body(&self, repo: &str, branch: &str, path: &str) -> Option<String> {
        match self.client.raw_get(repo, branch, path).await {
            Ok(Some(body)) if !body.trim().is_empty() => Some(body),
            Ok(Some(_)) => {
                warn!(repo, path, "documentation file is empty");
                None
            }
            Ok(None) => {
                warn!(repo, path, "documentation file not found");
                None
            }
            Err(e) => {
                warn!(repo, path, error = %e, "download failed");
                None
            }
        }
    }

    /// Repository metadata, fetched with one metered call the first time a repo is seen.
    ///
    /// Failures other than quota exhaustion memoize defaults so the repo is not retried.
    pub async fn fetch_repo_meta(&mut self, repo: &str) -> Result<RepoMeta> {
        if let Some(meta) = self.repo_meta.get(repo) {
            return Ok(meta.clone());
        }

        let meta = match self.client.get_json::<RepoMeta>(&format!("repos/{repo}")).await {
            Ok(Some(meta)) => meta,
            Ok(None) => {
                warn!(repo, "repository metadata not found");
                RepoMeta::default()
            }
            Err(e) if e.is_quota_exhausted() => return Err(e),
            Err(e) => {
                warn!(repo, error = %e, "repository metadata unavailable");
                RepoMeta::default()
            }
        };

        debug!(repo, stars = meta.stars, "repository metadata cached");
        self.repo_meta.insert(repo.to_string(), meta.clone());
        Ok(meta)
    }

    /// Number of distinct repositories whose metadata has been resolved.
    pub fn repos_seen(&self) -> usize {
        self.repo_meta.len()
    }

    /// Fetch body and metadata and build a draft. `Ok(None)` when the body is unavailable.
    pub async fn fetch_draft(&mut self, source: EntrySource<'_>) -> Result<Option<DraftRecord>> {
        let Some(content) = self
            .fetch_body(source.repo, source.branch, &source.entry.doc_path)
            .await
        else {
            return Ok(None);
        };

        let meta = self.fetch_repo_meta(source.repo).await?;
        Ok(Some(build_draft(&self.options, source, &content, &meta)))
    }
}

/// Build a draft record from a downloaded documentation file.
///
/// The full original content is kept as the staging raw body for enrichment.
pub fn build_draft(
    options: &RecordOptions,
    source: EntrySource<'_>,
    content: &str,
    meta: &RepoMeta,
) -> DraftRecord {
    let entry = source.entry;
    let doc = parse_document(content);
    let entry_dir = entry.entry_dir();

    let name = doc
        .header
        .text("name")
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| title_case(&entry.name));
    let short_desc = doc
        .header
        .text("description")
        .filter(|d| !d.trim().is_empty())
        .unwrap_or_else(|| format!("Skill by {}", entry.author));

    let record = CatalogRecord {
        id: source.id.to_string(),
        name,
        short_desc,
        long_desc: truncate_text(&doc.body, options.long_desc_max),
        author: entry.author.clone(),
        author_url: format!("{}/{}", options.web_base, entry.author),
        stars: meta.stars,
        last_updated: options.today.clone(),
        command: format!("{} {}/{}", options.install_command, source.repo, entry_dir),
        tags: doc.header.tags(),
        file_sha: entry.fingerprint.clone(),
        seo_content: None,
        download_url: format!(
            "{}/{}/tree/{}/{}",
            options.web_base, source.repo, source.branch, entry_dir
        ),
        source_repo: source.repo.to_string(),
        source_path: entry_dir.to_string(),
    };

    DraftRecord {
        record,
        raw_body: Some(content.to_string()),
    }
}

/// `"my-cool_tool"` -> `"My Cool_tool"`: dashes become spaces, words capitalized.
fn title_case(slug: &str) -> String {
    slug.replace('-', " ")
        .split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use skillsync_shared::GitHubConfig;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn options() -> RecordOptions {
        RecordOptions {
            web_base: "https://github.com".into(),
            install_command: "clawhub install".into(),
            long_desc_max: 3000,
            today: "2026-01-02".into(),
        }
    }

    fn entry() -> DiscoveredEntry {
        DiscoveredEntry {
            author: "alice".into(),
            name: "tool-a".into(),
            doc_path: "skills/alice/tool-a/SKILL.md".into(),
            fingerprint: "abc".into(),
        }
    }

    fn client(server: &MockServer) -> GitHubClient {
        let config = GitHubConfig {
            api_base: server.uri(),
            raw_base: format!("{}/raw", server.uri()),
            ..Default::default()
        };
        GitHubClient::new(&config, "t").unwrap()
    }

    #[test]
    fn draft_uses_header_fields() {
        let e = entry();
        let source = EntrySource {
            id: "official-alice-tool-a",
            repo: "org/skills",
            branch: "main",
            entry: &e,
        };
        let content = "---\nname: Tool A\ndescription: Formats things nicely\ntags: Format, CLI\n---\n# Tool A\n\nBody text.";
        let draft = build_draft(&options(), source, content, &RepoMeta { stars: 12 });

        let r = &draft.record;
        assert_eq!(r.name, "Tool A");
        assert_eq!(r.short_desc, "Formats things nicely");
        assert_eq!(r.long_desc, "# Tool A\n\nBody text.");
        assert_eq!(r.tags, vec!["format", "cli"]);
        assert_eq!(r.stars, 12);
        assert_eq!(r.file_sha, "abc");
        assert_eq!(r.command, "clawhub install org/skills/skills/alice/tool-a");
        assert_eq!(r.download_url, "https://github.com/org/skills/tree/main/skills/alice/tool-a");
        assert_eq!(r.author_url, "https://github.com/alice");
        assert_eq!(r.source_path, "skills/alice/tool-a");
        assert_eq!(r.last_updated, "2026-01-02");
        assert!(r.seo_content.is_none());
        assert_eq!(draft.raw_body.as_deref(), Some(content));
    }

    #[test]
    fn draft_falls_back_without_header() {
        let e = entry();
        let source = EntrySource {
            id: "official-alice-tool-a",
            repo: "org/skills",
            branch: "master",
            entry: &e,
        };
        let draft = build_draft(&options(), source, "plain body", &RepoMeta::default());
        assert_eq!(draft.record.name, "Tool A");
        assert_eq!(draft.record.short_desc, "Skill by alice");
        assert!(draft.record.tags.is_empty());
        assert_eq!(draft.record.stars, 0);
    }

    #[test]
    fn title_case_slugs() {
        assert_eq!(title_case("game-light-tracker"), "Game Light Tracker");
        assert_eq!(title_case("PDF-tools"), "Pdf Tools");
    }

    #[tokio::test]
    async fn repo_meta_is_memoized_per_repo() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/repos/org/skills"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"stargazers_count": 321})))
            .expect(1)
            .mount(&server)
            .await;

        let gh = client(&server);
        let mut fetcher = ContentFetcher::new(&gh, options());
        for _ in 0..5 {
            let meta = fetcher.fetch_repo_meta("org/skills").await.unwrap();
            assert_eq!(meta.stars, 321);
        }
        assert_eq!(fetcher.repos_seen(), 1);
        assert_eq!(gh.api_calls(), 1);
    }

    #[tokio::test]
    async fn failed_meta_defaults_and_is_memoized() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/repos/org/gone"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let gh = client(&server);
        let mut fetcher = ContentFetcher::new(&gh, options());
        assert_eq!(fetcher.fetch_repo_meta("org/gone").await.unwrap().stars, 0);
        assert_eq!(fetcher.fetch_repo_meta("org/gone").await.unwrap().stars, 0);
    }

    #[tokio::test]
    async fn missing_body_is_soft_failure_without_meta_call() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/raw/org/skills/main/skills/alice/tool-a/SKILL.md"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/org/skills"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(0)
            .mount(&server)
            .await;

        let gh = client(&server);
        let mut fetcher = ContentFetcher::new(&gh, options());
        let e = entry();
        let draft = fetcher
            .fetch_draft(EntrySource {
                id: "official-alice-tool-a",
                repo: "org/skills",
                branch: "main",
                entry: &e,
            })
            .await
            .unwrap();
        assert!(draft.is_none());
    }

    #[tokio::test]
    async fn fetch_draft_builds_record() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/raw/org/skills/main/skills/alice/tool-a/SKILL.md"))
            .respond_with(ResponseTemplate::new(200).set_body_string("---\nname: Tool A\n---\nBody"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/org/skills"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"stargazers_count": 9})))
            .expect(1)
            .mount(&server)
            .await;

        let gh = client(&server);
        let mut fetcher = ContentFetcher::new(&gh, options());
        let e = entry();
        let draft = fetcher
            .fetch_draft(EntrySource {
                id: "official-alice-tool-a",
                repo: "org/skills",
                branch: "main",
                entry: &e,
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(draft.record.name, "Tool A");
        assert_eq!(draft.record.stars, 9);
        assert_eq!(draft.record.long_desc, "Body");
    }
}
