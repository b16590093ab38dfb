//! Faithful ZH rewriting tests: anchor mining, quote binding, ratio floor.

use chrono::Utc;

use crate::models::{Bucket, Platform, PublishedAtSource, RawItem};
use crate::pipeline::rewriter::{
    aggregate_meta, compose, contains_ellipsis, find_banned_phrase, mine_anchors,
    quoted_anchor_present, rewrite_is_valid, MIN_ANCHOR_CHARS, MIN_ANCHOR_WORDS,
};

const FULLTEXT: &str = "Acme Robotics said the new Atlas arm lifts 40 kilograms \
at full speed. The company claims \"production capacity will triple by March 2027\" \
across its plants. Chief executive Dana Reyes told analysts the rollout starts in \
Europe next quarter. Pricing begins at $12,500 per unit for early customers, the \
company said. Short line. Revenue from robotics grew 64 percent year over year.";

fn item(body: &str) -> RawItem {
    RawItem {
        id: "itm_rw".into(),
        source_name: "techcrunch".into(),
        platform: Platform::Rss,
        url: "https://example.com/atlas".into(),
        canonical_url: "https://example.com/atlas".into(),
        title: "Acme ships Atlas arm".into(),
        body: body.into(),
        published_at: Utc::now(),
        published_at_source: PublishedAtSource::EntryField,
        lang: "en".into(),
        frontier: 80.0,
        needs_fulltext: false,
    }
}

#[test]
fn anchors_are_verbatim_substrings_with_shape_floor() {
    let anchors = mine_anchors(FULLTEXT);
    assert!(anchors.len() >= 2, "got {} anchors", anchors.len());
    for anchor in &anchors {
        assert!(FULLTEXT.contains(&anchor.text), "not verbatim: {}", anchor.text);
        assert!(anchor.text.chars().count() >= MIN_ANCHOR_CHARS);
        assert!(anchor.text.split_whitespace().count() >= MIN_ANCHOR_WORDS);
    }
}

#[test]
fn quoted_spans_rank_high() {
    let anchors = mine_anchors(FULLTEXT);
    let quoted_rank = anchors
        .iter()
        .position(|a| a.text == "production capacity will triple by March 2027");
    assert!(quoted_rank.is_some(), "quoted span missing: {anchors:?}");
    assert!(quoted_rank.unwrap() <= 2, "quoted span ranked too low");
}

#[test]
fn q1_and_q2_bind_distinct_anchors_in_brackets() {
    let rewrite = compose(&item(FULLTEXT), Bucket::Product, Some("Acme Robotics")).unwrap();

    assert!(quoted_anchor_present(&rewrite.q1, &rewrite.anchors));
    assert!(quoted_anchor_present(&rewrite.q2, &rewrite.anchors));

    let a1 = rewrite
        .anchors
        .iter()
        .find(|a| rewrite.q1.contains(&format!("「{a}」")))
        .unwrap();
    let a2 = rewrite
        .anchors
        .iter()
        .find(|a| rewrite.q2.contains(&format!("「{a}」")))
        .unwrap();
    assert_ne!(a1, a2, "q1 and q2 reuse the same anchor");
}

#[test]
fn rewrite_reaches_ratio_and_carries_no_banned_text() {
    let rewrite = compose(&item(FULLTEXT), Bucket::Product, Some("Acme Robotics")).unwrap();
    assert!(rewrite.zh_ratio >= 0.20, "ratio {}", rewrite.zh_ratio);
    assert!(rewrite_is_valid(&rewrite, FULLTEXT));
    let all = format!("{}{}{}", rewrite.q1, rewrite.q2, rewrite.proof);
    assert!(!contains_ellipsis(&all));
    assert_eq!(find_banned_phrase(&all), None);
    assert!(rewrite.proof.contains("techcrunch"), "proof must cite the source");
}

#[test]
fn too_few_anchors_yields_none() {
    assert!(compose(&item("Tiny body."), Bucket::Tech, None).is_none());
}

#[test]
fn ellipsis_detection_covers_both_scripts() {
    assert!(contains_ellipsis("细节见后文…"));
    assert!(contains_ellipsis("details follow..."));
    assert!(!contains_ellipsis("no dots here."));
}

#[test]
fn banned_phrases_are_caught_case_insensitively() {
    assert_eq!(find_banned_phrase("请大家敬请期待下一步"), Some("敬请期待"));
    assert_eq!(find_banned_phrase("Evidence Summary: sources=3"), Some("evidence summary"));
    assert_eq!(find_banned_phrase("plain factual sentence"), None);
}

#[test]
fn invalid_when_anchor_not_in_fulltext() {
    let mut rewrite = compose(&item(FULLTEXT), Bucket::Tech, None).unwrap();
    rewrite.anchors.push("this sentence never appeared anywhere".into());
    assert!(!rewrite_is_valid(&rewrite, FULLTEXT));
}

#[test]
fn aggregate_meta_tracks_ratio_extremes_and_sample() {
    let r1 = compose(&item(FULLTEXT), Bucket::Product, Some("Acme Robotics")).unwrap();
    let r2 = compose(&item(FULLTEXT), Bucket::Business, None).unwrap();
    let meta = aggregate_meta(&[r1.clone(), r2.clone()], 3);

    assert_eq!(meta.applied_count, 2);
    assert_eq!(meta.attempted_count, 3);
    assert!((meta.quote_coverage_ratio - 1.0).abs() < 1e-9);
    assert_eq!(meta.ellipsis_hits_total, 0);
    assert!(meta.min_zh_ratio <= meta.avg_zh_ratio);
    let sample = meta.sample.unwrap();
    assert_eq!(sample.q1, r1.q1);
    assert!(sample.anchors_top3.len() <= 3);
}

#[test]
fn empty_rewrite_set_aggregates_to_zeros() {
    let meta = aggregate_meta(&[], 0);
    assert_eq!(meta.applied_count, 0);
    assert!((meta.quote_coverage_ratio - 0.0).abs() < 1e-9);
    assert!((meta.min_zh_ratio - 0.0).abs() < 1e-9);
}
