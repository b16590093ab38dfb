//! Generic JSON API feed parser.
//!
//! Handles the common envelope shapes (top-level array, or an array under
//! `hits` / `items` / `articles` / `data` / `results`) and the usual field
//! aliases for url/title/body/date. Anything it cannot map is skipped, not
//! an error; an envelope with no array at all is an error.

use anyhow::bail;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::collectors::{FeedParser, ParsedEntry};
use crate::models::{PublishedAtSource, SourceSpec};

const ARRAY_KEYS: &[&str] = &["hits", "items", "articles", "data", "results", "stories"];
const URL_KEYS: &[&str] = &["url", "link", "story_url", "article_url", "permalink"];
const TITLE_KEYS: &[&str] = &["title", "headline", "story_title", "name"];
const BODY_KEYS: &[&str] = &["body", "summary", "content", "text", "description", "story_text"];
const DATE_KEYS: &[&str] = &["published_at", "created_at", "date", "pub_date", "time", "updated_at"];

pub struct JsonApiParser;

impl FeedParser for JsonApiParser {
    fn parse(&self, source: &SourceSpec, payload: &[u8]) -> anyhow::Result<Vec<ParsedEntry>> {
        let value: Value = serde_json::from_slice(payload)?;

        let Some(array) = find_entry_array(&value) else {
            bail!("no entry array in JSON payload from {}", source.name);
        };

        let mut entries = Vec::with_capacity(array.len());
        for obj in array {
            let Some(obj) = obj.as_object() else { continue };

            let Some(url) = pick_string(obj, URL_KEYS) else { continue };
            let Some(title) = pick_string(obj, TITLE_KEYS) else { continue };
            if title.trim().is_empty() {
                continue;
            }

            let body = pick_string(obj, BODY_KEYS).unwrap_or_default();
            let (published_at, published_at_source) = match pick_date(obj) {
                Some(ts) => (Some(ts), PublishedAtSource::EntryField),
                None => (None, PublishedAtSource::NowUtc),
            };

            entries.push(ParsedEntry {
                url,
                title: title.trim().to_string(),
                body,
                published_at,
                published_at_source,
            });
        }

        Ok(entries)
    }
}

fn find_entry_array(value: &Value) -> Option<&Vec<Value>> {
    if let Some(array) = value.as_array() {
        return Some(array);
    }
    let obj = value.as_object()?;
    for key in ARRAY_KEYS {
        if let Some(array) = obj.get(*key).and_then(|v| v.as_array()) {
            return Some(array);
        }
    }
    None
}

fn pick_string(obj: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Some(s) = obj.get(*key).and_then(|v| v.as_str()) {
            if !s.trim().is_empty() {
                return Some(s.to_string());
            }
        }
    }
    None
}

fn pick_date(obj: &serde_json::Map<String, Value>) -> Option<DateTime<Utc>> {
    for key in DATE_KEYS {
        match obj.get(*key) {
            Some(Value::String(s)) => {
                if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
                    return Some(ts.with_timezone(&Utc));
                }
            }
            Some(Value::Number(n)) => {
                // Unix seconds, the HN-style convention.
                if let Some(secs) = n.as_i64() {
                    if let Some(ts) = DateTime::from_timestamp(secs, 0) {
                        return Some(ts);
                    }
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Platform;

    fn spec() -> SourceSpec {
        SourceSpec {
            name: "test-json".into(),
            platform: Platform::JsonApi,
            endpoint: "https://example.com/api".into(),
            reputation_weight: 0.5,
            enabled: true,
        }
    }

    #[test]
    fn parses_algolia_style_envelope() {
        let payload = r#"{"hits":[
            {"title":"Big launch","url":"https://example.com/a","created_at":"2026-06-30T10:00:00Z"},
            {"title":"","url":"https://example.com/b"},
            {"story_title":"Fallback title","story_url":"https://example.com/c","time":1782813600}
        ]}"#;
        let entries = JsonApiParser.parse(&spec(), payload.as_bytes()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].url, "https://example.com/a");
        assert_eq!(entries[0].published_at_source, PublishedAtSource::EntryField);
        assert_eq!(entries[1].title, "Fallback title");
    }

    #[test]
    fn parses_bare_array() {
        let payload = r#"[{"title":"t","link":"https://example.com/x","summary":"s"}]"#;
        let entries = JsonApiParser.parse(&spec(), payload.as_bytes()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].body, "s");
        assert_eq!(entries[0].published_at_source, PublishedAtSource::NowUtc);
    }

    #[test]
    fn envelope_without_array_is_an_error() {
        assert!(JsonApiParser.parse(&spec(), br#"{"status":"ok"}"#).is_err());
    }
}
