//! Lenient YAML front-matter parsing for documentation files.
//!
//! A document may open with a `---` delimited YAML block. Anything that does
//! not parse into a mapping degrades to an empty header plus the full text.

use serde_yaml::{Mapping, Value};
use tracing::debug;

const DELIMITER: &str = "---";

/// Parsed header block with per-field coercion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocHeader {
    fields: Mapping,
}

/// A documentation file split into its header and markdown body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedDoc {
    pub header: DocHeader,
    pub body: String,
}

/// Split `content` into header and body. Never fails.
pub fn parse_document(content: &str) -> ParsedDoc {
    match split_front_matter(content) {
        Some((yaml, body)) => match serde_yaml::from_str::<Value>(yaml) {
            Ok(Value::Mapping(fields)) => ParsedDoc {
                header: DocHeader { fields },
                body: body.trim().to_string(),
            },
            Ok(Value::Null) => ParsedDoc {
                header: DocHeader::default(),
                body: body.trim().to_string(),
            },
            Ok(_) => ParsedDoc {
                header: DocHeader::default(),
                body: content.to_string(),
            },
            Err(e) => {
                debug!(error = %e, "unparseable front matter, using full body");
                ParsedDoc {
                    header: DocHeader::default(),
                    body: content.to_string(),
                }
            }
        },
        None => ParsedDoc {
            header: DocHeader::default(),
            body: content.to_string(),
        },
    }
}

/// Returns `(yaml, rest)` when the document opens with a closed `---` block.
fn split_front_matter(content: &str) -> Option<(&str, &str)> {
    let rest = content.strip_prefix(DELIMITER)?;
    let rest = rest
        .strip_prefix("\r\n")
        .or_else(|| rest.strip_prefix('\n'))?;

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == DELIMITER {
            let yaml = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return Some((yaml, body));
        }
        offset += line.len();
    }
    None
}

impl DocHeader {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Coerce a field to text.
    ///
    /// Strings are returned as-is, numbers and booleans as their text form,
    /// lists as their scalar items joined by `", "`. Mappings, empty lists and
    /// missing keys yield `None`.
    pub fn text(&self, key: &str) -> Option<String> {
        let value = self.fields.get(key)?;
        match value {
            Value::String(s) => Some(s.clone()),
            Value::Sequence(items) => {
                let parts: Vec<String> = items.iter().filter_map(scalar_text).collect();
                (!parts.is_empty()).then(|| parts.join(", "))
            }
            other => scalar_text(other),
        }
    }

    /// Tags normalized to trimmed lowercase; comma-separated strings are split.
    pub fn tags(&self) -> Vec<String> {
        let Some(value) = self.fields.get("tags") else {
            return Vec::new();
        };

        match value {
            Value::String(s) => split_tags(s),
            Value::Sequence(items) => items
                .iter()
                .flat_map(|item| match item {
                    Value::String(s) => split_tags(s),
                    other => scalar_text(other)
                        .map(|t| t.trim().to_lowercase())
                        .filter(|t| !t.is_empty())
                        .into_iter()
                        .collect(),
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn split_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_header_and_body() {
        let doc = parse_document("---\nname: Tool A\ndescription: Does things\n---\n\n# Tool A\n\nBody.\n");
        assert_eq!(doc.header.text("name").as_deref(), Some("Tool A"));
        assert_eq!(doc.header.text("description").as_deref(), Some("Does things"));
        assert_eq!(doc.body, "# Tool A\n\nBody.");
    }

    #[test]
    fn no_header_keeps_full_body() {
        let doc = parse_document("# Just markdown\n");
        assert!(doc.header.is_empty());
        assert_eq!(doc.body, "# Just markdown\n");
    }

    #[test]
    fn malformed_yaml_degrades() {
        let content = "---\nname: [unclosed\n---\nbody";
        let doc = parse_document(content);
        assert!(doc.header.is_empty());
        assert_eq!(doc.body, content);
    }

    #[test]
    fn unclosed_block_degrades() {
        let content = "---\nname: x\nno closing delimiter";
        let doc = parse_document(content);
        assert!(doc.header.is_empty());
        assert_eq!(doc.body, content);
    }

    #[test]
    fn scalar_header_degrades() {
        let doc = parse_document("---\njust a string\n---\nbody");
        assert!(doc.header.is_empty());
    }

    #[test]
    fn text_coercion_rules() {
        let doc = parse_document(
            "---\nversion: 2\nauthors: [alice, 3, {x: y}]\nmeta: {TODO: fill}\nempty: []\n---\n",
        );
        assert_eq!(doc.header.text("version").as_deref(), Some("2"));
        assert_eq!(doc.header.text("authors").as_deref(), Some("alice, 3"));
        assert_eq!(doc.header.text("meta"), None);
        assert_eq!(doc.header.text("empty"), None);
        assert_eq!(doc.header.text("missing"), None);
    }

    #[test]
    fn tags_are_split_and_lowercased() {
        let doc = parse_document("---\ntags: \"Git, CLI ,  \"\n---\n");
        assert_eq!(doc.header.tags(), vec!["git", "cli"]);

        let doc = parse_document("---\ntags:\n  - Docker, K8s\n  - 42\n---\n");
        assert_eq!(doc.header.tags(), vec!["docker", "k8s", "42"]);

        let doc = parse_document("---\ntags: {a: b}\n---\n");
        assert!(doc.header.tags().is_empty());
    }
}
