//! HTML listing-page parser.
//!
//! For sources without a feed: scrape headline links out of a listing page.
//! Heuristic extraction only; article text arrives later via the hydrator,
//! so every entry from this parser is flagged `needs_fulltext` downstream
//! (its body is empty here).

use chrono::{DateTime, Utc};
use scraper::{Html, Selector};
use url::Url;

use crate::collectors::{FeedParser, ParsedEntry};
use crate::models::{PublishedAtSource, SourceSpec};

/// Minimum anchor text length for a link to count as a headline.
const MIN_HEADLINE_CHARS: usize = 18;
/// Cap per page so one noisy listing cannot flood the pool.
const MAX_ENTRIES_PER_PAGE: usize = 60;

pub struct HtmlListParser;

impl FeedParser for HtmlListParser {
    fn parse(&self, source: &SourceSpec, payload: &[u8]) -> anyhow::Result<Vec<ParsedEntry>> {
        let html = String::from_utf8_lossy(payload);
        let doc = Html::parse_document(&html);

        let page_date = meta_published_date(&doc);
        let base = Url::parse(&source.endpoint).ok();

        let anchor_sel = Selector::parse("a[href]").expect("static selector");
        let mut seen = std::collections::HashSet::new();
        let mut entries = Vec::new();

        for anchor in doc.select(&anchor_sel) {
            if entries.len() >= MAX_ENTRIES_PER_PAGE {
                break;
            }
            let Some(href) = anchor.value().attr("href") else { continue };
            let text: String = anchor.text().collect::<Vec<_>>().join(" ");
            let title = text.split_whitespace().collect::<Vec<_>>().join(" ");
            if title.chars().count() < MIN_HEADLINE_CHARS {
                continue;
            }

            let Some(url) = resolve_href(base.as_ref(), href) else { continue };
            if !seen.insert(url.clone()) {
                continue;
            }

            let (published_at, published_at_source) = match page_date {
                Some(ts) => (Some(ts), PublishedAtSource::HtmlMeta),
                None => (None, PublishedAtSource::NowUtc),
            };

            entries.push(ParsedEntry {
                url,
                title,
                body: String::new(),
                published_at,
                published_at_source,
            });
        }

        Ok(entries)
    }
}

/// `article:published_time` / `date` meta tags, when the page carries them.
fn meta_published_date(doc: &Html) -> Option<DateTime<Utc>> {
    let meta_sel = Selector::parse("meta[property], meta[name]").expect("static selector");
    for meta in doc.select(&meta_sel) {
        let key = meta
            .value()
            .attr("property")
            .or_else(|| meta.value().attr("name"))
            .unwrap_or_default();
        if !matches!(key, "article:published_time" | "date" | "publish-date" | "pubdate") {
            continue;
        }
        if let Some(content) = meta.value().attr("content") {
            if let Ok(ts) = DateTime::parse_from_rfc3339(content) {
                return Some(ts.with_timezone(&Utc));
            }
        }
    }
    None
}

fn resolve_href(base: Option<&Url>, href: &str) -> Option<String> {
    if href.starts_with('#') || href.starts_with("javascript:") || href.starts_with("mailto:") {
        return None;
    }
    match Url::parse(href) {
        Ok(abs) => Some(abs.to_string()),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            base.and_then(|b| b.join(href).ok()).map(|u| u.to_string())
        }
        Err(_) => None,
    }
}
