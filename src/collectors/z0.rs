//! Z0 collector driver.
//!
//! Fans over the configured sources, parses each payload with the platform
//! parser, and normalizes everything into one deduplicated `RawItem` pool
//! plus the `CollectionMeta` audit block.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::collectors::frontier::{frontier_histogram, frontier_score, FrontierWeights};
use crate::collectors::html_list::HtmlListParser;
use crate::collectors::json_api::JsonApiParser;
use crate::collectors::rss::RssParser;
use crate::collectors::{guess_lang, FeedParser, ParsedEntry};
use crate::models::{Config, Platform, PublishedAtSource, RawItem, SourceSpec};
use crate::pipeline::normalize::{canonical_url, item_id};

const FETCH_TIMEOUT_SECS: u64 = 20;
const MAX_FETCH_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 250;

/// Bodies shorter than this leave the item flagged for hydration.
const FULLTEXT_SUFFICIENT_CHARS: usize = 400;

/// Audit block for one collection sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionMeta {
    pub collected_at: DateTime<Utc>,
    pub total_items: usize,
    pub frontier_ge_70: usize,
    pub frontier_ge_85: usize,
    pub frontier_ge_70_72h: usize,
    pub frontier_ge_85_72h: usize,
    pub by_platform: BTreeMap<String, usize>,
    pub frontier_histogram: Vec<usize>,
    pub published_at_source_counts: BTreeMap<String, usize>,
    pub failed_sources: Vec<String>,
}

/// Collect the Z0 pool from every enabled source.
pub async fn collect(config: &Config) -> Result<(Vec<RawItem>, CollectionMeta)> {
    let client = Client::builder()
        .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
        .user_agent("BriefBot/1.0 (Z0 collector)")
        .build()
        .context("failed to build Z0 HTTP client")?;

    let now = Utc::now();
    let weights = FrontierWeights::default();
    let mut pool: Vec<RawItem> = Vec::new();
    let mut failed_sources = Vec::new();

    // Sources are independent; fetch them concurrently and fold results in
    // configuration order so the pool order stays stable.
    let fetches = config.sources.iter().filter(|s| s.enabled).map(|source| {
        let client = client.clone();
        async move { (source, fetch_with_retry(&client, &source.endpoint).await) }
    });
    for (source, fetched) in join_all(fetches).await {
        match fetched {
            Ok(payload) => match parser_for(source.platform).parse(source, &payload) {
                Ok(entries) => {
                    let items = pool_from_entries(source, entries, now, &weights);
                    debug!(source = %source.name, items = items.len(), "source collected");
                    pool.extend(items);
                }
                Err(e) => {
                    warn!(source = %source.name, error = %e, "source payload unparseable");
                    failed_sources.push(source.name.clone());
                }
            },
            Err(e) => {
                warn!(source = %source.name, error = %e, "source fetch failed");
                failed_sources.push(source.name.clone());
            }
        }
    }

    let items = dedup_by_id(pool);
    let meta = build_meta(&items, now, failed_sources);
    info!(
        total = meta.total_items,
        frontier_ge_85_72h = meta.frontier_ge_85_72h,
        failed = meta.failed_sources.len(),
        "Z0 collection complete"
    );
    Ok((items, meta))
}

fn parser_for(platform: Platform) -> Box<dyn FeedParser> {
    match platform {
        Platform::Rss | Platform::Atom => Box::new(RssParser),
        Platform::JsonApi => Box::new(JsonApiParser),
        Platform::HtmlList => Box::new(HtmlListParser),
    }
}

/// Fetch one endpoint with exponential backoff.
async fn fetch_with_retry(client: &Client, url: &str) -> Result<Vec<u8>> {
    let mut backoff = INITIAL_BACKOFF_MS;

    for attempt in 0..MAX_FETCH_RETRIES {
        match client.get(url).send().await {
            Ok(response) if response.status().is_success() => {
                let bytes = response.bytes().await.context("failed to read payload")?;
                return Ok(bytes.to_vec());
            }
            Ok(response) => {
                warn!(url, status = %response.status(), attempt, "feed fetch rejected");
            }
            Err(e) => {
                warn!(url, error = %e, attempt, "feed fetch failed");
            }
        }
        if attempt + 1 < MAX_FETCH_RETRIES {
            sleep(Duration::from_millis(backoff)).await;
            backoff *= 2;
        }
    }

    anyhow::bail!("feed fetch exhausted retries: {url}")
}

/// Normalize parsed entries from one source into RawItems.
pub fn pool_from_entries(
    source: &SourceSpec,
    entries: Vec<ParsedEntry>,
    now: DateTime<Utc>,
    weights: &FrontierWeights,
) -> Vec<RawItem> {
    entries
        .into_iter()
        .filter_map(|entry| {
            let url = entry.url.trim().to_string();
            if url.is_empty() {
                return None;
            }
            let canonical = canonical_url(&url);
            let (published_at, published_at_source) = match entry.published_at {
                Some(ts) => (ts, entry.published_at_source),
                None => (now, PublishedAtSource::NowUtc),
            };
            let frontier = frontier_score(
                &entry.title,
                &entry.body,
                published_at,
                now,
                source.reputation_weight,
                weights,
            );
            let lang = guess_lang(&entry.title, &entry.body);
            let needs_fulltext = entry.body.chars().count() < FULLTEXT_SUFFICIENT_CHARS;

            Some(RawItem {
                id: item_id(&canonical),
                source_name: source.name.clone(),
                platform: source.platform,
                url,
                canonical_url: canonical,
                title: entry.title,
                body: entry.body,
                published_at,
                published_at_source,
                lang,
                frontier,
                needs_fulltext,
            })
        })
        .collect()
}

/// First occurrence wins; ids are canonical-URL hashes, so this also folds
/// the same story appearing in several feeds.
fn dedup_by_id(pool: Vec<RawItem>) -> Vec<RawItem> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::with_capacity(pool.len());
    for item in pool {
        if seen.insert(item.id.clone()) {
            out.push(item);
        }
    }
    out
}

/// Build the audit meta for a pool.
pub fn build_meta(
    items: &[RawItem],
    now: DateTime<Utc>,
    failed_sources: Vec<String>,
) -> CollectionMeta {
    let recent = |item: &RawItem| (now - item.published_at).num_hours() <= 72;

    let mut by_platform: BTreeMap<String, usize> = BTreeMap::new();
    let mut published_at_source_counts: BTreeMap<String, usize> = BTreeMap::new();
    for item in items {
        *by_platform.entry(item.platform.as_str().to_string()).or_default() += 1;
        *published_at_source_counts
            .entry(item.published_at_source.as_str().to_string())
            .or_default() += 1;
    }

    CollectionMeta {
        collected_at: now,
        total_items: items.len(),
        frontier_ge_70: items.iter().filter(|i| i.frontier >= 70.0).count(),
        frontier_ge_85: items.iter().filter(|i| i.frontier >= 85.0).count(),
        frontier_ge_70_72h: items
            .iter()
            .filter(|i| i.frontier >= 70.0 && recent(i))
            .count(),
        frontier_ge_85_72h: items
            .iter()
            .filter(|i| i.frontier >= 85.0 && recent(i))
            .count(),
        by_platform,
        frontier_histogram: frontier_histogram(items.iter().map(|i| i.frontier)).to_vec(),
        published_at_source_counts,
        failed_sources,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn spec(name: &str) -> SourceSpec {
        SourceSpec {
            name: name.into(),
            platform: Platform::Rss,
            endpoint: "https://example.com/feed".into(),
            reputation_weight: 0.8,
            enabled: true,
        }
    }

    fn entry(url: &str, title: &str, body: &str) -> ParsedEntry {
        ParsedEntry {
            url: url.into(),
            title: title.into(),
            body: body.into(),
            published_at: None,
            published_at_source: PublishedAtSource::NowUtc,
        }
    }

    #[test]
    fn pool_normalizes_and_flags_fulltext() {
        let now = Utc::now();
        let items = pool_from_entries(
            &spec("s"),
            vec![entry(
                "https://example.com/a?utm_source=rss",
                "Launch title",
                "short body",
            )],
            now,
            &FrontierWeights::default(),
        );
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].canonical_url, "https://example.com/a");
        assert!(items[0].needs_fulltext);
        assert!(items[0].id.starts_with("itm_"));
    }

    #[test]
    fn same_story_from_two_feeds_folds_once() {
        let now = Utc::now();
        let weights = FrontierWeights::default();
        let mut pool = pool_from_entries(
            &spec("one"),
            vec![entry("https://example.com/a", "Title here", "body")],
            now,
            &weights,
        );
        pool.extend(pool_from_entries(
            &spec("two"),
            vec![entry("https://example.com/a?utm_source=x", "Title here", "body")],
            now,
            &weights,
        ));
        let deduped = dedup_by_id(pool);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].source_name, "one", "earlier-seen wins");
    }

    #[test]
    fn meta_counts_recency_windows() {
        let now = Utc::now();
        let weights = FrontierWeights::default();
        let mut items = pool_from_entries(
            &spec("s"),
            vec![entry("https://example.com/fresh", "Launch release announce", "")],
            now,
            &weights,
        );
        let mut old = items[0].clone();
        old.id = "itm_old".into();
        old.published_at = now - Duration::hours(100);
        old.frontier = 90.0;
        items.push(old);
        items[0].frontier = 90.0;

        let meta = build_meta(&items, now, vec![]);
        assert_eq!(meta.total_items, 2);
        assert_eq!(meta.frontier_ge_85, 2);
        assert_eq!(meta.frontier_ge_85_72h, 1);
        assert_eq!(meta.frontier_histogram.iter().sum::<usize>(), 2);
        assert_eq!(meta.by_platform.get("rss"), Some(&2));
    }
}
