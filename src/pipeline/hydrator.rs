//! Fulltext Hydrator
//!
//! The only concurrent stage in the pipeline. Two orthogonal bounds apply:
//! a global worker pool (semaphore) and a per-host politeness slot that
//! serializes requests to one hostname and spaces them by a minimum delay
//! measured end-of-request to start-of-next. Cancellation is run-scoped and
//! abandons pending fetches within one network timeout.
//!
//! Every input item yields exactly one `HydrationResult`; hydration failure
//! never drops an item.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex, Semaphore};
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

use crate::models::{Config, HydrationResult, HydrationStatus, RawItem};
use crate::pipeline::extract::{extract_fulltext, ExtractOutcome};
use crate::pipeline::normalize::host_of;

/// Retries after the first attempt.
const MAX_RETRIES: u32 = 2;
const INITIAL_BACKOFF_MS: u64 = 300;
const BACKOFF_JITTER_MS: u64 = 120;

/// Domains the hydrator refuses to fetch (login walls, video hosts).
const DOMAIN_BLOCKLIST: &[&str] = &[
    "x.com",
    "twitter.com",
    "youtube.com",
    "www.youtube.com",
    "facebook.com",
    "www.facebook.com",
];

/// Hydration policy, derived from config.
#[derive(Debug, Clone)]
pub struct HydrationPolicy {
    pub workers: usize,
    pub politeness_delay: Duration,
    pub network_timeout: Duration,
}

impl HydrationPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            workers: config.hydrator_workers.max(1),
            politeness_delay: Duration::from_millis(config.hydrator_politeness_ms),
            network_timeout: Duration::from_secs(config.hydrator_timeout_secs),
        }
    }
}

/// Outcome of one network fetch, before extraction.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Ok { body: String, final_url: String },
    HttpStatus(u16),
    Timeout,
    Connection(String),
}

/// Network seam; the real implementation wraps reqwest, tests script it.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> FetchOutcome;
}

/// reqwest-backed fetcher used in production runs.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(network_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(network_timeout)
            .user_agent("BriefBot/1.0 (fulltext hydrator)")
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .context("failed to build hydrator HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> FetchOutcome {
        match self.client.get(url).send().await {
            Ok(response) => {
                let status = response.status();
                if !status.is_success() {
                    return FetchOutcome::HttpStatus(status.as_u16());
                }
                let final_url = response.url().to_string();
                match response.text().await {
                    Ok(body) => FetchOutcome::Ok { body, final_url },
                    Err(e) => FetchOutcome::Connection(e.to_string()),
                }
            }
            Err(e) if e.is_timeout() => FetchOutcome::Timeout,
            Err(e) => FetchOutcome::Connection(e.to_string()),
        }
    }
}

/// Stage summary feeding the FULLTEXT_HYDRATION gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HydrationSummary {
    pub attempted: usize,
    pub ok_count: usize,
    pub coverage_ratio: f64,
    pub by_status: std::collections::BTreeMap<String, usize>,
}

/// Per-host politeness slot. Holding the lock is what serializes a host;
/// `last_end` spaces consecutive requests.
#[derive(Default)]
struct HostSlot {
    last_end: Option<Instant>,
}

/// Hydrate every item flagged `needs_fulltext`.
///
/// Returns the item list with bodies replaced where hydration improved them
/// (same order as the input), plus one result per attempted item and the
/// stage summary.
pub async fn hydrate(
    items: Vec<RawItem>,
    policy: &HydrationPolicy,
    fetcher: Arc<dyn Fetcher>,
    cancel: watch::Receiver<bool>,
) -> (Vec<RawItem>, Vec<HydrationResult>, HydrationSummary) {
    let semaphore = Arc::new(Semaphore::new(policy.workers));
    let host_slots: Arc<Mutex<HashMap<String, Arc<Mutex<HostSlot>>>>> =
        Arc::new(Mutex::new(HashMap::new()));

    let mut handles = Vec::new();
    for (idx, item) in items.iter().enumerate() {
        if !item.needs_fulltext {
            continue;
        }
        let semaphore = semaphore.clone();
        let host_slots = host_slots.clone();
        let fetcher = fetcher.clone();
        let cancel = cancel.clone();
        let policy = policy.clone();
        let item_id = item.id.clone();
        let url = item.url.clone();

        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok()?;
            let (status, fulltext, final_url, retries) =
                hydrate_one(&url, &policy, fetcher.as_ref(), host_slots, cancel).await;
            Some((
                idx,
                HydrationResult {
                    item_id,
                    status,
                    fulltext_len: fulltext.as_deref().map(|t| t.chars().count()).unwrap_or(0),
                    final_url,
                    retries,
                },
                fulltext,
            ))
        }));
    }

    // Merge keyed by input index so output order never depends on
    // completion order.
    let mut merged: Vec<(usize, HydrationResult, Option<String>)> = Vec::new();
    for handle in handles {
        if let Ok(Some(slot)) = handle.await {
            merged.push(slot);
        }
    }
    merged.sort_by_key(|(idx, _, _)| *idx);

    let mut items = items;
    let mut results = Vec::with_capacity(merged.len());
    let mut by_status: std::collections::BTreeMap<String, usize> = Default::default();
    let mut ok_count = 0usize;

    for (idx, mut result, fulltext) in merged {
        if let (HydrationStatus::Ok, Some(text)) = (result.status, fulltext) {
            let item = &mut items[idx];
            // Replace only when hydration actually improved the body.
            if text.chars().count() > item.body.chars().count() {
                item.body = text;
                item.needs_fulltext = false;
            } else {
                result.status = HydrationStatus::ExtractLowQuality;
            }
        }
        *by_status.entry(result.status.as_str().to_string()).or_default() += 1;
        if result.status.is_ok() {
            ok_count += 1;
        }
        results.push(result);
    }

    let attempted = results.len();
    let summary = HydrationSummary {
        attempted,
        ok_count,
        coverage_ratio: if attempted == 0 {
            0.0
        } else {
            ok_count as f64 / attempted as f64
        },
        by_status,
    };

    info!(
        attempted,
        ok = ok_count,
        coverage = %format!("{:.2}", summary.coverage_ratio),
        "hydration complete"
    );

    (items, results, summary)
}

/// One item: politeness slot, fetch with retries, extraction, quality gate.
async fn hydrate_one(
    url: &str,
    policy: &HydrationPolicy,
    fetcher: &dyn Fetcher,
    host_slots: Arc<Mutex<HashMap<String, Arc<Mutex<HostSlot>>>>>,
    mut cancel: watch::Receiver<bool>,
) -> (HydrationStatus, Option<String>, String, u32) {
    let host = match host_of(url) {
        Some(h) => h,
        None => return (HydrationStatus::SkippedPolicy, None, url.to_string(), 0),
    };
    if DOMAIN_BLOCKLIST.contains(&host.as_str()) {
        debug!(url, host, "domain on blocklist, skipping");
        return (HydrationStatus::SkippedPolicy, None, url.to_string(), 0);
    }

    let slot = {
        let mut slots = host_slots.lock().await;
        slots.entry(host.clone()).or_default().clone()
    };

    let mut retries = 0u32;
    let mut backoff = INITIAL_BACKOFF_MS;

    loop {
        if *cancel.borrow() {
            return (HydrationStatus::Timeout, None, url.to_string(), retries);
        }

        // Holding the slot serializes the host; sleep off the remainder of
        // the politeness window before the request starts.
        let outcome = {
            let mut slot = slot.lock().await;
            if let Some(last_end) = slot.last_end {
                let since = last_end.elapsed();
                if since < policy.politeness_delay {
                    sleep(policy.politeness_delay - since).await;
                }
            }

            let fetch = timeout(policy.network_timeout, fetcher.fetch(url));
            let outcome = tokio::select! {
                res = fetch => match res {
                    Ok(outcome) => outcome,
                    Err(_) => FetchOutcome::Timeout,
                },
                _ = cancelled(&mut cancel) => FetchOutcome::Timeout,
            };
            slot.last_end = Some(Instant::now());
            outcome
        };

        match outcome {
            FetchOutcome::Ok { body, final_url } => {
                return match extract_fulltext(&body) {
                    ExtractOutcome::Ok(text) => {
                        (HydrationStatus::Ok, Some(text), final_url, retries)
                    }
                    ExtractOutcome::Empty => {
                        (HydrationStatus::ExtractEmpty, None, final_url, retries)
                    }
                    ExtractOutcome::LowQuality => {
                        (HydrationStatus::ExtractLowQuality, None, final_url, retries)
                    }
                };
            }
            FetchOutcome::HttpStatus(403) | FetchOutcome::HttpStatus(429) => {
                return (HydrationStatus::Blocked, None, url.to_string(), retries);
            }
            FetchOutcome::HttpStatus(status) => {
                warn!(url, status, retries, "hydration http error");
                if retries >= MAX_RETRIES {
                    return (HydrationStatus::HttpError, None, url.to_string(), retries);
                }
            }
            FetchOutcome::Timeout => {
                if *cancel.borrow() || retries >= MAX_RETRIES {
                    return (HydrationStatus::Timeout, None, url.to_string(), retries);
                }
            }
            FetchOutcome::Connection(e) => {
                warn!(url, error = %e, retries, "hydration connection error");
                if retries >= MAX_RETRIES {
                    return (HydrationStatus::ConnectionError, None, url.to_string(), retries);
                }
            }
        }

        retries += 1;
        let jitter = rand::thread_rng().gen_range(0..BACKOFF_JITTER_MS);
        sleep(Duration::from_millis(backoff + jitter)).await;
        backoff *= 2;
    }
}

/// Completes when the cancel flag flips to true. If the sender is gone the
/// flag can never flip, so this pends forever rather than firing spuriously.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
