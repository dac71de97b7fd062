//! External text-generation service.
//!
//! [`TextGenerator`] is the seam the enrichment scheduler talks to;
//! [`LlmClient`] implements it against an OpenAI-compatible chat-completions API.

use std::future::Future;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use skillsync_shared::{GenerationConfig, Result, SkillSyncError};

/// Leading ```` ``` ```` / ```` ```json ```` fence.
static FENCE_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^```(?:json)?\s*").expect("valid regex"));

/// Trailing ```` ``` ```` fence.
static FENCE_CLOSE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s*```$").expect("valid regex"));

const SYSTEM_PROMPT: &str =
    "You write concise, developer-friendly tool descriptions. Always respond with valid JSON only.";

/// What is sent for one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub name: String,
    pub author: String,
    /// Bounded prefix of the documentation body.
    pub content: String,
}

/// Structured result of one generation call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedContent {
    #[serde(default)]
    pub seo_title: String,
    #[serde(default)]
    pub seo_description: String,
    #[serde(rename = "shortDesc", default)]
    pub short_desc: String,
    #[serde(rename = "longDesc", default)]
    pub long_desc: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// A service that turns a documentation excerpt into descriptive fields.
pub trait TextGenerator: Send + Sync {
    fn generate(
        &self,
        request: &GenerationRequest,
    ) -> impl Future<Output = Result<GeneratedContent>> + Send;
}

/// Strip code fences and parse the structured result.
pub fn parse_generated(raw: &str) -> Result<GeneratedContent> {
    let trimmed = raw.trim();
    let unfenced = if trimmed.starts_with("```") {
        let opened = FENCE_OPEN.replace(trimmed, "");
        FENCE_CLOSE.replace(&opened, "").into_owned()
    } else {
        trimmed.to_string()
    };

    serde_json::from_str(&unfenced)
        .map_err(|e| SkillSyncError::parse(format!("generation response is not valid JSON: {e}")))
}

/// Build the user prompt for one record.
pub fn build_prompt(request: &GenerationRequest) -> String {
    format!(
        r#"Describe this open-source tool for a developer directory. Be direct and specific.

Tool name: {name}
Author: {author}

Documentation:
---
{content}
---

Return a JSON object with exactly these fields:
"seo_title": page title, 50-70 characters, ending with "| ClawKit".
"seo_description": one or two sentences under 160 characters for a search snippet.
"shortDesc": one concrete sentence of 15-30 words saying what the tool does.
"longDesc": two or three short paragraphs, 100-150 words total, separated by \n\n.
"tags": array of 3-5 lowercase category tags."#,
        name = request.name,
        author = request.author,
        content = request.content,
    )
}

// ---------------------------------------------------------------------------
// LlmClient
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: String,
}

/// Chat-completions client with bearer auth.
pub struct LlmClient {
    http: Client,
    api_url: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl LlmClient {
    pub fn new(config: &GenerationConfig, api_key: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SkillSyncError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            api_url: config.api_url.clone(),
            api_key: api_key.into(),
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl TextGenerator for LlmClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedContent> {
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": build_prompt(request)},
            ],
            "temperature": self.temperature,
            "response_format": {"type": "json_object"},
        });

        let resp = self
            .http
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| SkillSyncError::Enrichment(format!("request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let snippet: String = text.chars().take(200).collect();
            return Err(SkillSyncError::Enrichment(format!("HTTP {status}: {snippet}")));
        }

        let chat: ChatResponse = resp
            .json()
            .await
            .map_err(|e| SkillSyncError::parse(format!("unexpected response shape: {e}")))?;
        let raw = chat
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| SkillSyncError::parse("response has no choices"))?;

        debug!(name = %request.name, chars = raw.len(), "generation response received");
        parse_generated(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> GenerationRequest {
        GenerationRequest {
            name: "Tool A".into(),
            author: "alice".into(),
            content: "# Tool A\nFormats things.".into(),
        }
    }

    #[test]
    fn parses_plain_json() {
        let out = parse_generated(r#"{"seo_title":"T","shortDesc":"S","tags":["a","b"]}"#).unwrap();
        assert_eq!(out.seo_title, "T");
        assert_eq!(out.short_desc, "S");
        assert_eq!(out.tags, vec!["a", "b"]);
        assert!(out.long_desc.is_empty());
    }

    #[test]
    fn strips_code_fences() {
        let raw = "```json\n{\"seo_title\": \"T\", \"longDesc\": \"L\"}\n```";
        let out = parse_generated(raw).unwrap();
        assert_eq!(out.seo_title, "T");
        assert_eq!(out.long_desc, "L");

        let bare = "```\n{\"seo_description\": \"D\"}\n```\n";
        assert_eq!(parse_generated(bare).unwrap().seo_description, "D");
    }

    #[test]
    fn garbage_is_parse_error() {
        let err = parse_generated("Sure! Here is your JSON:").unwrap_err();
        assert!(matches!(err, SkillSyncError::Parse { .. }));
    }

    #[test]
    fn prompt_carries_identity_and_content() {
        let prompt = build_prompt(&request());
        assert!(prompt.contains("Tool name: Tool A"));
        assert!(prompt.contains("Author: alice"));
        assert!(prompt.contains("Formats things."));
    }

    fn config_for(server: &MockServer) -> GenerationConfig {
        GenerationConfig {
            api_url: format!("{}/chat/completions", server.uri()),
            model: "test-model".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn llm_client_round_trip() {
        let server = MockServer::start().await;
        let content = "```json\n{\"seo_title\":\"Format with Tool A | ClawKit\",\"seo_description\":\"D\",\"shortDesc\":\"S\",\"longDesc\":\"L\",\"tags\":[\"cli\"]}\n```";

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer llm-key"))
            .and(body_partial_json(serde_json::json!({
                "model": "test-model",
                "response_format": {"type": "json_object"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": content}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = LlmClient::new(&config_for(&server), "llm-key").unwrap();
        let out = client.generate(&request()).await.unwrap();
        assert_eq!(out.seo_title, "Format with Tool A | ClawKit");
        assert_eq!(out.tags, vec!["cli"]);
    }

    #[tokio::test]
    async fn llm_error_status_is_enrichment_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("overloaded"))
            .expect(1)
            .mount(&server)
            .await;

        let client = LlmClient::new(&config_for(&server), "llm-key").unwrap();
        let err = client.generate(&request()).await.unwrap_err();
        assert!(matches!(err, SkillSyncError::Enrichment(_)));
        assert!(err.to_string().contains("overloaded"));
    }
}
