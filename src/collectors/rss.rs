//! RSS/Atom feed parser backed by feed-rs.

use anyhow::Context;
use chrono::{DateTime, Utc};

use crate::collectors::{FeedParser, ParsedEntry};
use crate::models::{PublishedAtSource, SourceSpec};

pub struct RssParser;

impl FeedParser for RssParser {
    fn parse(&self, source: &SourceSpec, payload: &[u8]) -> anyhow::Result<Vec<ParsedEntry>> {
        let feed = feed_rs::parser::parse(payload)
            .with_context(|| format!("unparseable feed payload from {}", source.name))?;

        let feed_pubdate: Option<DateTime<Utc>> = feed.published.or(feed.updated);

        let mut entries = Vec::with_capacity(feed.entries.len());
        for entry in feed.entries {
            let Some(link) = entry
                .links
                .iter()
                .find(|l| l.rel.as_deref() != Some("self"))
                .or_else(|| entry.links.first())
            else {
                continue;
            };

            let title = entry
                .title
                .as_ref()
                .map(|t| t.content.trim().to_string())
                .unwrap_or_default();
            if title.is_empty() {
                continue;
            }

            let html_body = entry
                .content
                .as_ref()
                .and_then(|c| c.body.clone())
                .or_else(|| entry.summary.as_ref().map(|s| s.content.clone()))
                .unwrap_or_default();
            let body = strip_html(&html_body);

            let (published_at, published_at_source) = match entry.published.or(entry.updated) {
                Some(ts) => (Some(ts), PublishedAtSource::EntryField),
                None => match feed_pubdate {
                    Some(ts) => (Some(ts), PublishedAtSource::FeedPubdate),
                    None => (None, PublishedAtSource::NowUtc),
                },
            };

            entries.push(ParsedEntry {
                url: link.href.clone(),
                title,
                body,
                published_at,
                published_at_source,
            });
        }

        Ok(entries)
    }
}

/// Flatten an HTML fragment to its text content.
pub fn strip_html(html: &str) -> String {
    if html.is_empty() {
        return String::new();
    }
    let fragment = scraper::Html::parse_fragment(html);
    let text: String = fragment.root_element().text().collect::<Vec<_>>().join(" ");
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
