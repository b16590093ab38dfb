//! Frontier scoring
//!
//! Composite 0-100 novelty/quality signal per collected item. The score is a
//! weighted combination of recency, importance keywords, source reputation,
//! and a release-signal bonus. Bonuses only fire on the canonical fields
//! (title or the first `CANONICAL_BODY_CHARS` of body), never on boilerplate
//! deeper in the page.

use chrono::{DateTime, Utc};

/// Body prefix that counts as canonical for keyword bonuses.
pub const CANONICAL_BODY_CHARS: usize = 600;

/// Named weights for the frontier score. The four components sum to 100.
#[derive(Debug, Clone, Copy)]
pub struct FrontierWeights {
    /// Max points for freshness.
    pub recency: f64,
    /// Max points for importance-keyword hits.
    pub importance: f64,
    /// Max points from source reputation.
    pub reputation: f64,
    /// Max points for business/product release signals.
    pub release_bonus: f64,
    /// Recency half-life in hours.
    pub recency_half_life_hours: f64,
}

impl Default for FrontierWeights {
    fn default() -> Self {
        Self {
            recency: 40.0,
            importance: 30.0,
            reputation: 20.0,
            release_bonus: 10.0,
            recency_half_life_hours: 18.0,
        }
    }
}

/// Importance keywords with per-hit weight. Scores saturate at the
/// `importance` budget, so stacking keywords cannot push past it.
const IMPORTANCE_KEYWORDS: &[(&str, f64)] = &[
    ("launch", 8.0),
    ("release", 8.0),
    ("announce", 7.0),
    ("breakthrough", 9.0),
    ("funding", 7.0),
    ("acquisition", 8.0),
    ("acquire", 7.0),
    ("partnership", 5.0),
    ("open source", 6.0),
    ("open-source", 6.0),
    ("benchmark", 5.0),
    ("state of the art", 7.0),
    ("regulation", 6.0),
    ("lawsuit", 6.0),
    ("ipo", 8.0),
    ("gpu", 4.0),
    ("model", 3.0),
    ("agent", 3.0),
    ("发布", 8.0),
    ("融资", 7.0),
    ("开源", 6.0),
];

/// Release-signal phrases for the bonus component.
const RELEASE_SIGNALS: &[&str] = &[
    "generally available",
    "now available",
    "public beta",
    "preview release",
    "version ",
    "v1.",
    "v2.",
    "series a",
    "series b",
    "series c",
    "正式发布",
    "公测",
];

/// Compute the frontier score for one item.
pub fn frontier_score(
    title: &str,
    body: &str,
    published_at: DateTime<Utc>,
    now: DateTime<Utc>,
    reputation_weight: f64,
    weights: &FrontierWeights,
) -> f64 {
    let canonical = canonical_text(title, body);

    let recency = recency_points(published_at, now, weights);
    let importance = importance_points(&canonical, weights);
    let reputation = reputation_weight.clamp(0.0, 1.0) * weights.reputation;
    let bonus = release_points(&canonical, weights);

    (recency + importance + reputation + bonus).clamp(0.0, 100.0)
}

/// Title plus the canonical body prefix, lowercased once for matching.
fn canonical_text(title: &str, body: &str) -> String {
    let prefix: String = body.chars().take(CANONICAL_BODY_CHARS).collect();
    format!("{title}\n{prefix}").to_lowercase()
}

fn recency_points(published_at: DateTime<Utc>, now: DateTime<Utc>, weights: &FrontierWeights) -> f64 {
    let age_hours = (now - published_at).num_minutes().max(0) as f64 / 60.0;
    let decay = 0.5_f64.powf(age_hours / weights.recency_half_life_hours);
    weights.recency * decay
}

fn importance_points(canonical: &str, weights: &FrontierWeights) -> f64 {
    let mut points = 0.0;
    for (keyword, weight) in IMPORTANCE_KEYWORDS {
        if canonical.contains(keyword) {
            points += weight;
        }
    }
    points.min(weights.importance)
}

fn release_points(canonical: &str, weights: &FrontierWeights) -> f64 {
    if RELEASE_SIGNALS.iter().any(|s| canonical.contains(s)) {
        weights.release_bonus
    } else {
        0.0
    }
}

/// Ten-bucket histogram over frontier scores (0-9, 10-19, ..., 90-100).
pub fn frontier_histogram(scores: impl Iterator<Item = f64>) -> [usize; 10] {
    let mut buckets = [0usize; 10];
    for score in scores {
        let idx = ((score / 10.0).floor() as usize).min(9);
        buckets[idx] += 1;
    }
    buckets
}
