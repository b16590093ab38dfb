//! Selection & Bucket Backfill
//!
//! Turns event-gate passers into the channel-balanced headline set. Buckets
//! are filled round-robin to their minima, short buckets backfill from the
//! relaxed pool tiers, and the day is marked sparse when the floor cannot be
//! met even after backfill. Selection follows one total order, so identical
//! inputs always produce the identical set.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::models::{Bucket, Category, Config, RawItem, RunMode, Score, SelectionOrigin};
use crate::pipeline::scoring::selection_order;

/// Release phrasing that reroutes tech-ish items into the product bucket.
const PRODUCT_SIGNALS: &[&str] = &[
    "launch",
    "launches",
    "ships",
    "shipping",
    "now available",
    "generally available",
    "release",
    "releases",
    "unveils",
    "正式发布",
    "上线",
];

/// One selection candidate: an item that cleared (or nearly cleared) the
/// event gate, with its score card.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub item: RawItem,
    pub score: Score,
    pub bucket: Bucket,
}

impl Candidate {
    pub fn new(item: RawItem, score: Score, category: Category) -> Self {
        let bucket = map_bucket(category, &item.title, &item.body);
        Self { item, score, bucket }
    }
}

/// A selected slot, before rewriting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pick {
    pub item_id: String,
    pub bucket: Bucket,
    pub origin: SelectionOrigin,
}

/// Backfill audit for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackfillMeta {
    pub triggered: bool,
    pub candidate_count: usize,
    pub selected_ids: Vec<String>,
}

/// Selection audit block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionMeta {
    pub selected_total: usize,
    pub deck_floor: usize,
    pub deck_max: usize,
    pub bucket_counts: BTreeMap<String, usize>,
    pub origin_counts: BTreeMap<String, usize>,
    pub backfill: BackfillMeta,
    pub sparse_day: bool,
}

/// Deck size bounds per mode: (floor, max).
pub fn deck_bounds(mode: RunMode) -> (usize, usize) {
    match mode {
        RunMode::Brief => (5, 10),
        RunMode::Demo => (6, 12),
        RunMode::Manual | RunMode::Daily => (6, 10),
    }
}

/// Primary-to-bucket mapping with the product-signal override.
pub fn map_bucket(category: Category, title: &str, body: &str) -> Bucket {
    let primary = match category {
        Category::ConsumerElectronics | Category::GamingEntertainment => Bucket::Product,
        Category::Technology | Category::Ai | Category::Security => Bucket::Tech,
        Category::StartupsFunding | Category::Finance | Category::PolicyRegulation => {
            Bucket::Business
        }
        Category::HealthBiomed | Category::ClimateEnergy | Category::General => Bucket::Other,
    };

    // Secondary table: a tech story shaped like a release announcement is a
    // product story for the deck.
    if primary == Bucket::Tech {
        let canonical = format!(
            "{}\n{}",
            title,
            body.chars().take(600).collect::<String>()
        )
        .to_lowercase();
        if PRODUCT_SIGNALS.iter().any(|s| canonical.contains(s)) {
            return Bucket::Product;
        }
    }
    primary
}

/// Select the headline set.
///
/// `primary` holds event-gate passers; `extra` the near-miss tier; `general`
/// the remaining filtered pool. Tiers are only consulted in that order and
/// only when a quota bucket runs dry.
pub fn select_events(
    primary: Vec<Candidate>,
    extra: Vec<Candidate>,
    general: Vec<Candidate>,
    config: &Config,
    mode: RunMode,
) -> (Vec<Pick>, SelectionMeta) {
    let (deck_floor, deck_max) = deck_bounds(mode);
    let quota = |bucket: Bucket| match bucket {
        Bucket::Product => config.exec_min_product,
        Bucket::Tech => config.exec_min_tech,
        Bucket::Business => config.exec_min_business,
        Bucket::Other => 0,
    };

    let primary_by_bucket = partition(primary);
    let extra_by_bucket = partition(extra);
    let general_by_bucket = partition(general);

    let mut picks: Vec<Pick> = Vec::new();
    let mut selected_ids: std::collections::HashSet<String> = Default::default();
    let mut backfill_ids: Vec<String> = Vec::new();
    let mut backfill_candidates = 0usize;
    let mut counted_tiers: std::collections::HashSet<(Bucket, &'static str)> = Default::default();

    // Round-robin across the quota buckets until each minimum is met or
    // every tier for that bucket is dry.
    let mut progress = true;
    while progress {
        progress = false;
        for bucket in Bucket::QUOTAED {
            let have = picks.iter().filter(|p| p.bucket == bucket).count();
            if have >= quota(bucket) || picks.len() >= deck_max {
                continue;
            }

            if let Some(candidate) = next_unselected(primary_by_bucket.get(&bucket), &selected_ids)
            {
                selected_ids.insert(candidate.item.id.clone());
                picks.push(Pick {
                    item_id: candidate.item.id.clone(),
                    bucket,
                    origin: SelectionOrigin::PrimaryPool,
                });
                progress = true;
                continue;
            }

            // Primary tier dry: backfill from extra, then general.
            let tiers: [(&BTreeMap<Bucket, Vec<Candidate>>, SelectionOrigin); 2] = [
                (&extra_by_bucket, SelectionOrigin::ExtraPool),
                (&general_by_bucket, SelectionOrigin::Backfill),
            ];
            for (tier, origin) in tiers {
                let pool = tier.get(&bucket);
                if counted_tiers.insert((bucket, origin.as_str())) {
                    backfill_candidates += pool.map(|p| p.len()).unwrap_or(0);
                }
                if let Some(candidate) = next_unselected(pool, &selected_ids) {
                    debug!(
                        bucket = bucket.as_str(),
                        origin = origin.as_str(),
                        item = %candidate.item.id,
                        "bucket backfill"
                    );
                    selected_ids.insert(candidate.item.id.clone());
                    backfill_ids.push(candidate.item.id.clone());
                    picks.push(Pick {
                        item_id: candidate.item.id.clone(),
                        bucket,
                        origin,
                    });
                    progress = true;
                    break;
                }
            }
        }
    }

    // Fill remaining capacity from the primary pool, best first, any bucket.
    let mut leftovers: Vec<Candidate> = primary_by_bucket
        .values()
        .flatten()
        .filter(|c| !selected_ids.contains(&c.item.id))
        .cloned()
        .collect();
    leftovers.sort_by(|a, b| candidate_order(a, b));
    for candidate in leftovers {
        if picks.len() >= deck_max {
            break;
        }
        selected_ids.insert(candidate.item.id.clone());
        picks.push(Pick {
            item_id: candidate.item.id.clone(),
            bucket: candidate.bucket,
            origin: SelectionOrigin::PrimaryPool,
        });
    }

    let sparse_day = picks.len() < deck_floor;

    let mut bucket_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut origin_counts: BTreeMap<String, usize> = BTreeMap::new();
    for origin in [
        SelectionOrigin::PrimaryPool,
        SelectionOrigin::ExtraPool,
        SelectionOrigin::Backfill,
    ] {
        origin_counts.insert(origin.as_str().to_string(), 0);
    }
    for pick in &picks {
        *bucket_counts.entry(pick.bucket.as_str().to_string()).or_default() += 1;
        *origin_counts.entry(pick.origin.as_str().to_string()).or_default() += 1;
    }

    let meta = SelectionMeta {
        selected_total: picks.len(),
        deck_floor,
        deck_max,
        bucket_counts,
        origin_counts,
        backfill: BackfillMeta {
            triggered: !backfill_ids.is_empty(),
            candidate_count: backfill_candidates,
            selected_ids: backfill_ids,
        },
        sparse_day,
    };

    info!(
        selected = meta.selected_total,
        sparse = meta.sparse_day,
        backfill = meta.backfill.triggered,
        "selection complete"
    );

    (picks, meta)
}

/// Score-descending order with the documented tiebreakers.
fn candidate_order(a: &Candidate, b: &Candidate) -> std::cmp::Ordering {
    b.score
        .final_score
        .partial_cmp(&a.score.final_score)
        .unwrap_or(std::cmp::Ordering::Equal)
        .then_with(|| selection_order(&a.item, &b.item))
}

fn partition(candidates: Vec<Candidate>) -> BTreeMap<Bucket, Vec<Candidate>> {
    let mut by_bucket: BTreeMap<Bucket, Vec<Candidate>> = BTreeMap::new();
    for candidate in candidates {
        by_bucket.entry(candidate.bucket).or_default().push(candidate);
    }
    for pool in by_bucket.values_mut() {
        pool.sort_by(|a, b| candidate_order(a, b));
    }
    by_bucket
}

fn next_unselected<'a>(
    pool: Option<&'a Vec<Candidate>>,
    selected: &std::collections::HashSet<String>,
) -> Option<&'a Candidate> {
    pool.and_then(|p| p.iter().find(|c| !selected.contains(&c.item.id)))
}
