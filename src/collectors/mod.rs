//! Z0 Collection Layer
//!
//! Pulls candidate items from every configured source and normalizes them
//! into the canonical `RawItem` pool. Parsers are pluggable by platform key;
//! a failing source logs a warning and contributes nothing, it never aborts
//! the sweep.

pub mod frontier;
pub mod html_list;
pub mod json_api;
pub mod rss;
pub mod z0;

use chrono::{DateTime, Utc};

use crate::models::{PublishedAtSource, SourceSpec};

pub use z0::{collect, CollectionMeta};

/// One entry as parsed from a feed payload, before normalization.
#[derive(Debug, Clone)]
pub struct ParsedEntry {
    pub url: String,
    pub title: String,
    pub body: String,
    pub published_at: Option<DateTime<Utc>>,
    pub published_at_source: PublishedAtSource,
}

/// Platform-specific payload parser. Implementations are pure: bytes in,
/// entries out, so they stay testable without network access.
pub trait FeedParser: Send + Sync {
    fn parse(&self, source: &SourceSpec, payload: &[u8]) -> anyhow::Result<Vec<ParsedEntry>>;
}

/// Ratio of CJK characters across the string.
pub fn cjk_ratio(text: &str) -> f64 {
    let mut cjk = 0usize;
    let mut total = 0usize;
    for c in text.chars() {
        if c.is_whitespace() {
            continue;
        }
        total += 1;
        if is_cjk(c) {
            cjk += 1;
        }
    }
    if total == 0 {
        0.0
    } else {
        cjk as f64 / total as f64
    }
}

/// CJK Unified Ideographs plus the common fullwidth punctuation block.
pub fn is_cjk(c: char) -> bool {
    matches!(u32::from(c),
        0x4E00..=0x9FFF | 0x3400..=0x4DBF | 0xF900..=0xFAFF | 0x3000..=0x303F | 0xFF00..=0xFFEF)
}

/// Two-letter language guess from script composition.
pub fn guess_lang(title: &str, body: &str) -> String {
    let sample: String = title.chars().chain(body.chars().take(400)).collect();
    if cjk_ratio(&sample) >= 0.25 {
        "zh".to_string()
    } else {
        "en".to_string()
    }
}
