//! Dedupe & Filter
//!
//! Second-stage pool hygiene: near-duplicate suppression on content
//! fingerprints (canonical-URL collisions are already folded by the
//! collector's id hash) followed by the ordered filter ladder. Every drop
//! is counted by reason so sparse days can be audited.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::models::{Config, RawItem};
use crate::pipeline::normalize::content_fingerprint;

/// Topic keywords; an item must hit at least one in its canonical text to
/// survive the non-AI/topic filter.
const TOPIC_KEYWORDS: &[&str] = &[
    "ai",
    "artificial intelligence",
    "machine learning",
    "llm",
    "language model",
    "neural",
    "gpt",
    "chatbot",
    "robot",
    "autonomous",
    "semiconductor",
    "chip",
    "gpu",
    "compute",
    "cloud",
    "startup",
    "software",
    "data center",
    "datacenter",
    "open source",
    "model",
    "inference",
    "training",
    "agent",
    "人工智能",
    "大模型",
    "算力",
    "芯片",
];

/// Post-filter audit summary.
///
/// `after_filter_total` is a deprecated alias kept for older consumers; new
/// code reads `kept_total` (set after the event gate runs).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterSummary {
    pub dedup_total: usize,
    /// Deprecated alias of the pre-event-gate count; do not branch on it.
    pub after_filter_total: usize,
    pub after_filter_total_raw: usize,
    pub kept_total: usize,
    pub event_gate_pass_total: usize,
    pub top_drop_reasons: Vec<(String, usize)>,
}

/// Dup-neighborhood sizes for the scoring stage: survivor id -> number of
/// suppressed copies.
pub type DupSignals = HashMap<String, usize>;

/// Run dedup and the filter ladder over a sorted pool.
///
/// The pool is sorted `(published_at desc, id asc)` first, so the survivor
/// of each fingerprint neighborhood and the output order are total.
pub fn dedupe_and_filter(
    mut pool: Vec<RawItem>,
    config: &Config,
    now: DateTime<Utc>,
) -> (Vec<RawItem>, FilterSummary, DupSignals) {
    pool.sort_by(|a, b| {
        b.published_at
            .cmp(&a.published_at)
            .then_with(|| a.id.cmp(&b.id))
    });
    let input_total = pool.len();

    // Near-duplicate suppression: first occurrence in the total order wins.
    let mut seen_fingerprints: HashMap<String, String> = HashMap::new();
    let mut dup_signals: DupSignals = HashMap::new();
    let mut survivors = Vec::with_capacity(pool.len());
    for item in pool {
        let fp = content_fingerprint(&item.title, &item.body);
        match seen_fingerprints.get(&fp) {
            Some(survivor_id) => {
                *dup_signals.entry(survivor_id.clone()).or_default() += 1;
            }
            None => {
                seen_fingerprints.insert(fp, item.id.clone());
                survivors.push(item);
            }
        }
    }
    let dedup_total = input_total - survivors.len();

    // Filter ladder, applied in order, one reason per dropped item.
    let mut drop_counts: HashMap<&'static str, usize> = HashMap::new();
    if dedup_total > 0 {
        drop_counts.insert("duplicate_content", dedup_total);
    }

    let mut kept = Vec::with_capacity(survivors.len());
    for item in survivors {
        if let Some(reason) = drop_reason(&item, config, now) {
            *drop_counts.entry(reason).or_default() += 1;
            debug!(item = %item.id, reason, "item filtered");
            continue;
        }
        kept.push(item);
    }

    let mut top: Vec<(String, usize)> = drop_counts
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
    top.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    top.truncate(5);

    let summary = FilterSummary {
        dedup_total,
        after_filter_total: kept.len(),
        after_filter_total_raw: input_total,
        // Finalized by the orchestrator once the event gate has run.
        kept_total: kept.len(),
        event_gate_pass_total: 0,
        top_drop_reasons: top,
    };

    info!(
        input = input_total,
        dedup = dedup_total,
        kept = kept.len(),
        "dedupe and filter complete"
    );

    (kept, summary, dup_signals)
}

fn drop_reason(item: &RawItem, config: &Config, now: DateTime<Utc>) -> Option<&'static str> {
    if !config.language_allowlist.iter().any(|l| l == &item.lang) {
        return Some("lang_blocked");
    }

    if (now - item.published_at).num_hours() > config.max_age_hours {
        return Some("too_old");
    }

    // Items awaiting hydration keep their chance; the event gate culls them
    // later if no fulltext ever materializes.
    if !item.needs_fulltext && item.body.chars().count() < config.min_body_len {
        return Some("too_short");
    }

    let canonical = format!(
        "{}\n{}",
        item.title,
        item.body.chars().take(600).collect::<String>()
    )
    .to_lowercase();
    if !TOPIC_KEYWORDS.iter().any(|k| contains_topic(&canonical, k)) {
        return Some("off_topic");
    }

    None
}

/// Word-boundary match for short ASCII keywords, substring match otherwise.
/// Keeps "ai" from matching inside "maintain".
fn contains_topic(haystack: &str, keyword: &str) -> bool {
    if keyword.len() > 4 || !keyword.is_ascii() {
        return haystack.contains(keyword);
    }
    haystack
        .split(|c: char| !c.is_alphanumeric())
        .any(|w| w == keyword)
}
