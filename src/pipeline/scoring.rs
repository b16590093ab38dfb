//! Scoring & Event Gate
//!
//! Four scoring dimensions in [0,10] with a weighted-mean final score, a
//! dup-risk signal from the fingerprint neighborhood, and an ad flag from a
//! banned-phrase scan. The event gate is the single predicate that decides
//! which items are even eligible for selection.

use lazy_static::lazy_static;
use regex::Regex;

use crate::models::{Classification, Config, Entities, RawItem, Score};

/// Weighted-mean weights; must sum to 1.
const W_NOVELTY: f64 = 0.30;
const W_UTILITY: f64 = 0.30;
const W_HEAT: f64 = 0.20;
const W_FEASIBILITY: f64 = 0.20;

/// Fulltext floor shared with the hydrator's quality gate.
pub const FULLTEXT_FLOOR_CHARS: usize = 400;

lazy_static! {
    /// Promotional phrasing that marks an item as an ad.
    static ref AD_PATTERNS: Vec<Regex> = [
        r"(?i)\bsponsored\b",
        r"(?i)\badvertorial\b",
        r"(?i)\buse code\b",
        r"(?i)\bpromo code\b",
        r"(?i)\bdiscount\b",
        r"(?i)\bsale ends\b",
        r"(?i)\bbuy now\b",
        r"(?i)\blimited time offer\b",
        r"(?i)\bclick here\b",
        r"(?i)\bsubscribe now\b",
        r"(?i)\bcoupon\b",
        r"(?i)\baffiliate link",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static ad pattern"))
    .collect();

    static ref HAS_NUMBER: Regex = Regex::new(r"\d").expect("static pattern");
}

/// Compute the score card for one item.
///
/// `extra_copies` is the suppressed-duplicate count from the dedupe stage;
/// `fulltext_ok` reflects a successful hydration for this item.
pub fn score_item(
    item: &RawItem,
    classification: &Classification,
    entities: &Entities,
    extra_copies: usize,
    fulltext_ok: bool,
) -> Score {
    let body_chars = item.body.chars().count();
    let has_fulltext = fulltext_ok || body_chars >= FULLTEXT_FLOOR_CHARS;

    // Frontier is the coarse novelty signal; rescale 0-100 to 0-10.
    let novelty = (item.frontier / 10.0).clamp(0.0, 10.0);

    let utility = (3.0
        + classification.confidence * 4.0
        + (entities.entities.len().min(5) as f64) * 0.6)
        .clamp(0.0, 10.0);

    // Syndication breadth reads as heat; saturates quickly.
    let heat = (2.0 + 2.5 * (extra_copies.min(3) as f64) + item.frontier * 0.03).clamp(0.0, 10.0);

    let mut feasibility: f64 = 3.0;
    if has_fulltext {
        feasibility += 3.0;
    }
    if HAS_NUMBER.is_match(&item.body) || HAS_NUMBER.is_match(&item.title) {
        feasibility += 2.0;
    }
    if body_chars >= 1200 {
        feasibility += 2.0;
    }
    let feasibility = feasibility.clamp(0.0, 10.0);

    let final_score = (novelty * W_NOVELTY
        + utility * W_UTILITY
        + heat * W_HEAT
        + feasibility * W_FEASIBILITY)
        .clamp(0.0, 10.0);

    Score {
        item_id: item.id.clone(),
        novelty,
        utility,
        heat,
        feasibility,
        final_score,
        dup_risk: dup_risk(extra_copies),
        ad_flag: is_ad(item),
    }
}

/// Neighborhood size to risk: 0 copies -> 0, 1 -> 1/3, 2 -> 1/2, ...
pub fn dup_risk(extra_copies: usize) -> f64 {
    extra_copies as f64 / (extra_copies as f64 + 2.0)
}

fn is_ad(item: &RawItem) -> bool {
    let haystack = format!("{}\n{}", item.title, item.body.chars().take(1200).collect::<String>());
    AD_PATTERNS.iter().any(|p| p.is_match(&haystack))
}

/// The event-gate predicate: score floor, dup ceiling, no ads, allowed
/// language, and usable fulltext.
pub fn event_gate_passes(
    item: &RawItem,
    score: &Score,
    config: &Config,
    fulltext_ok: bool,
) -> bool {
    let has_fulltext = fulltext_ok || item.body.chars().count() >= FULLTEXT_FLOOR_CHARS;
    score.final_score >= config.min_score
        && score.dup_risk <= config.max_dup_risk
        && !score.ad_flag
        && config.language_allowlist.iter().any(|l| l == &item.lang)
        && has_fulltext
}

/// Total order for selection among gate passers: frontier desc, recency
/// desc, shorter canonical URL, id asc. Stable across runs by construction.
pub fn selection_order(a: &RawItem, b: &RawItem) -> std::cmp::Ordering {
    b.frontier
        .partial_cmp(&a.frontier)
        .unwrap_or(std::cmp::Ordering::Equal)
        .then_with(|| b.published_at.cmp(&a.published_at))
        .then_with(|| a.canonical_url.len().cmp(&b.canonical_url.len()))
        .then_with(|| a.id.cmp(&b.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, Platform, PublishedAtSource};
    use chrono::Utc;

    fn item(id: &str, body: &str) -> RawItem {
        RawItem {
            id: id.into(),
            source_name: "s".into(),
            platform: Platform::Rss,
            url: format!("https://example.com/{id}"),
            canonical_url: format!("https://example.com/{id}"),
            title: "Vendor ships version 2 of its model".into(),
            body: body.into(),
            published_at: Utc::now(),
            published_at_source: PublishedAtSource::EntryField,
            lang: "en".into(),
            frontier: 80.0,
            needs_fulltext: false,
        }
    }

    fn classification(confidence: f64) -> Classification {
        Classification {
            item_id: "itm".into(),
            category: Category::Ai,
            confidence,
        }
    }

    fn entities(n: usize) -> Entities {
        Entities {
            item_id: "itm".into(),
            entities: (0..n)
                .map(|i| crate::models::EntityMention {
                    name: format!("Entity {i}"),
                    score: 1.0,
                    type_hint: None,
                })
                .collect(),
        }
    }

    fn config() -> Config {
        Config::test_default()
    }

    fn long_body() -> String {
        "The company said revenue grew 40 percent to $1.2 billion this quarter. "
            .repeat(20)
    }

    #[test]
    fn components_and_final_stay_in_range() {
        let it = item("itm_a", &long_body());
        let s = score_item(&it, &classification(0.8), &entities(6), 2, true);
        for v in [s.novelty, s.utility, s.heat, s.feasibility, s.final_score] {
            assert!((0.0..=10.0).contains(&v), "component out of range: {v}");
        }
        assert!((0.0..=1.0).contains(&s.dup_risk));
    }

    #[test]
    fn strong_item_passes_event_gate() {
        let it = item("itm_a", &long_body());
        let s = score_item(&it, &classification(0.8), &entities(6), 1, true);
        assert!(s.final_score >= 6.0, "final {}", s.final_score);
        assert!(event_gate_passes(&it, &s, &config(), true));
    }

    #[test]
    fn ad_flag_blocks_the_gate() {
        let mut it = item("itm_ad", &long_body());
        it.title.push_str(": use code BRIEF20 for a discount");
        let s = score_item(&it, &classification(0.8), &entities(6), 0, true);
        assert!(s.ad_flag);
        assert!(!event_gate_passes(&it, &s, &config(), true));
    }

    #[test]
    fn heavy_syndication_raises_dup_risk_past_ceiling() {
        let it = item("itm_dup", &long_body());
        let s = score_item(&it, &classification(0.8), &entities(6), 3, true);
        assert!(s.dup_risk > 0.45, "dup_risk {}", s.dup_risk);
        assert!(!event_gate_passes(&it, &s, &config(), true));
    }

    #[test]
    fn missing_fulltext_blocks_the_gate() {
        let mut it = item("itm_nf", "short body 42");
        it.needs_fulltext = true;
        let s = score_item(&it, &classification(0.8), &entities(6), 0, false);
        assert!(!event_gate_passes(&it, &s, &config(), false));
        // The same item with a successful hydration is eligible.
        assert!(event_gate_passes(&it, &s, &config(), true) || s.final_score < 6.0);
    }

    #[test]
    fn selection_order_is_total_and_stable() {
        let mut a = item("itm_a", &long_body());
        let mut b = item("itm_b", &long_body());
        a.frontier = 80.0;
        b.frontier = 80.0;
        b.published_at = a.published_at;
        // Same frontier, same time, same URL length: id breaks the tie.
        assert_eq!(selection_order(&a, &b), std::cmp::Ordering::Less);
        assert_eq!(selection_order(&b, &a), std::cmp::Ordering::Greater);

        b.frontier = 90.0;
        assert_eq!(selection_order(&a, &b), std::cmp::Ordering::Greater);
    }

    #[test]
    fn ad_patterns_ignore_deep_page_noise() {
        let mut body = long_body();
        // Past the scanned prefix.
        body.push_str(&" filler".repeat(400));
        body.push_str(" sponsored footer link");
        let it = item("itm_deep", &body);
        let s = score_item(&it, &classification(0.5), &entities(2), 0, true);
        assert!(!s.ad_flag);
    }
}
