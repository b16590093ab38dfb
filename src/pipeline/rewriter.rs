//! Faithful ZH Rewriter
//!
//! Produces the Chinese narrative for each selected event: Q1/Q2 (optional
//! Q3) plus a Proof line. Every sentence binds to the English evidence
//! through a verbatim anchor wrapped in 「…」; the anchor text is a literal
//! substring of the item's fulltext, never paraphrased. Ellipsis characters
//! and hollow advisory phrasing are hard-banned from the output.
//!
//! The rule-based path is authoritative. When an LLM assist is configured
//! its draft is accepted only if it survives the same anchor/ratio/ban
//! checks; otherwise the rule-based rendition is used.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::collectors::cjk_ratio;
use crate::models::{Bucket, RawItem};

/// Anchors shorter than this many characters never qualify.
pub const MIN_ANCHOR_CHARS: usize = 20;
/// Anchors need at least this many whitespace words (Latin text).
pub const MIN_ANCHOR_WORDS: usize = 4;
/// CJK anchors qualify on ideograph count instead of word count.
const MIN_ANCHOR_CJK_CHARS: usize = 10;
/// Anchors longer than this are unwieldy on a slide.
const MAX_ANCHOR_CHARS: usize = 90;

/// Per-event average target; below this the composer skeletonizes.
pub const TARGET_ZH_RATIO: f64 = 0.35;

/// Hollow advisory / CTA phrasing that must never reach the deck.
pub const BANNED_PHRASES: &[&str] = &[
    "值得关注",
    "建议关注",
    "总体来看",
    "综上所述",
    "敬请期待",
    "未来可期",
    "拭目以待",
    "不容错过",
    "stay tuned",
    "in conclusion",
    "evidence summary",
    "worth watching",
    "click here",
    "read more",
];

lazy_static! {
    static ref QUOTED_SPAN: Regex =
        Regex::new(r#""([^"]{20,90})"|“([^”]{20,90})”"#).expect("static pattern");
    static ref HAS_DIGIT: Regex = Regex::new(r"\d").expect("static pattern");
}

/// One mined anchor with its ranking score.
#[derive(Debug, Clone, PartialEq)]
pub struct Anchor {
    pub text: String,
    pub score: f64,
}

/// The rewritten narrative for one event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZhRewrite {
    pub q1: String,
    pub q2: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub q3: Option<String>,
    pub proof: String,
    /// Ordered, strongest first; all verbatim substrings of the fulltext.
    pub anchors: Vec<String>,
    /// CJK ratio over q1 ∪ q2 ∪ proof.
    pub zh_ratio: f64,
    /// True when the dense Chinese frame was needed to reach the ratio.
    pub skeletonized: bool,
}

/// Aggregate meta for the faithful_zh_news gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaithfulZhMeta {
    pub applied_count: usize,
    pub attempted_count: usize,
    pub quote_coverage_ratio: f64,
    pub ellipsis_hits_total: usize,
    pub avg_zh_ratio: f64,
    pub min_zh_ratio: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample: Option<FaithfulZhSample>,
}

/// First rewritten event, recorded verbatim for audits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaithfulZhSample {
    pub q1: String,
    pub q2: String,
    pub proof: String,
    pub anchors_top3: Vec<String>,
    pub quote_tokens_found: usize,
}

/// True when the text contains an ellipsis in either script.
pub fn contains_ellipsis(text: &str) -> bool {
    text.contains('…') || text.contains("...")
}

/// First banned phrase found, if any.
pub fn find_banned_phrase(text: &str) -> Option<&'static str> {
    let lowered = text.to_lowercase();
    BANNED_PHRASES.iter().copied().find(|p| lowered.contains(&p.to_lowercase()))
}

/// Mine candidate anchors from fulltext, strongest first.
///
/// Candidates are clause-level spans (between punctuation) plus explicitly
/// quoted spans; every survivor is verified to appear verbatim.
pub fn mine_anchors(fulltext: &str) -> Vec<Anchor> {
    let mut candidates: Vec<Anchor> = Vec::new();

    for sentence in fulltext.split(|c: char| matches!(c, '.' | '!' | '?' | '\n' | '。' | '！' | '？')) {
        for clause in sentence.split(|c: char| matches!(c, ',' | ';' | ':' | '，' | '；' | '：' | '(' | ')')) {
            let text = clause.trim();
            if !anchor_shape_ok(text) {
                continue;
            }
            candidates.push(Anchor {
                text: text.to_string(),
                score: anchor_score(text),
            });
        }
    }

    for captures in QUOTED_SPAN.captures_iter(fulltext) {
        let span = captures
            .get(1)
            .or_else(|| captures.get(2))
            .map(|m| m.as_str().trim())
            .unwrap_or_default();
        if anchor_shape_ok(span) {
            candidates.push(Anchor {
                text: span.to_string(),
                score: anchor_score(span) + 2.0,
            });
        }
    }

    // Dedup on text, keep the best score.
    candidates.sort_by(|a, b| {
        a.text
            .cmp(&b.text)
            .then(b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal))
    });
    candidates.dedup_by(|a, b| a.text == b.text);

    candidates.retain(|a| fulltext.contains(&a.text));
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.text.cmp(&b.text))
    });
    candidates.truncate(8);
    candidates
}

fn anchor_shape_ok(text: &str) -> bool {
    let chars = text.chars().count();
    if chars < MIN_ANCHOR_CHARS || chars > MAX_ANCHOR_CHARS {
        return false;
    }
    if contains_ellipsis(text) {
        return false;
    }
    let words = text.split_whitespace().count();
    let cjk = text.chars().filter(|c| crate::collectors::is_cjk(*c)).count();
    words >= MIN_ANCHOR_WORDS || cjk >= MIN_ANCHOR_CJK_CHARS
}

fn anchor_score(text: &str) -> f64 {
    let mut score = 0.0;
    if HAS_DIGIT.is_match(text) {
        score += 3.0;
    }
    if text.contains('$') || text.contains('%') || text.contains('¥') {
        score += 1.0;
    }
    score += text
        .split_whitespace()
        .filter(|w| w.chars().next().is_some_and(|c| c.is_uppercase()))
        .count() as f64;
    // Mild preference for compact spans.
    score -= text.chars().count() as f64 / 60.0;
    score
}

/// Compose the Chinese narrative for one selected item.
///
/// Returns `None` when fewer than two qualifying anchors exist; such an
/// event cannot satisfy the two-quote bar and is dropped upstream.
pub fn compose(item: &RawItem, bucket: Bucket, actor: Option<&str>) -> Option<ZhRewrite> {
    let anchors = mine_anchors(&item.body);
    if anchors.len() < 2 {
        return None;
    }

    let actor = actor.unwrap_or(&item.source_name);
    let standard = compose_with(&anchors, item, bucket, actor, false);

    if standard.zh_ratio >= TARGET_ZH_RATIO {
        return Some(standard);
    }

    // Below target: skeletonize with shorter anchors and denser frames,
    // keep whichever rendition carries more Chinese.
    let mut short_first = anchors.clone();
    short_first.sort_by_key(|a| a.text.chars().count());
    let skeleton = compose_with(&short_first, item, bucket, actor, true);
    if skeleton.zh_ratio > standard.zh_ratio {
        Some(skeleton)
    } else {
        Some(standard)
    }
}

fn compose_with(
    anchors: &[Anchor],
    item: &RawItem,
    bucket: Bucket,
    actor: &str,
    skeleton: bool,
) -> ZhRewrite {
    let a1 = &anchors[0].text;
    let a2 = anchors
        .iter()
        .map(|a| &a.text)
        .find(|t| *t != a1)
        .expect("caller guarantees two distinct anchors");
    let a3 = anchors.iter().map(|a| &a.text).find(|t| *t != a1 && *t != a2);

    let (verb, object) = match bucket {
        Bucket::Product => ("发布", "新品"),
        Bucket::Tech => ("公开", "技术进展"),
        Bucket::Business => ("宣布", "交易与财务动向"),
        Bucket::Other => ("披露", "行业动态"),
    };

    let (q1, q2, q3) = if skeleton {
        (
            format!(
                "{actor}方面就{object}给出明确表述，原文为「{a1}」，口径与数字均以原文为准。"
            ),
            format!("报道同时载明第二处事实依据，原文为「{a2}」，两处引文相互印证。"),
            a3.map(|t| format!("另有补充记载，原文为「{t}」。")),
        )
    } else {
        (
            format!("{actor}就{object}{verb}：「{a1}」。"),
            format!("报道进一步指出：「{a2}」。"),
            a3.map(|t| format!("另据披露：「{t}」。")),
        )
    };

    let date = item.published_at.format("%Y年%m月%d日");
    let proof = format!(
        "信源：{}，发布于{date}，正文{}字，引文均摘自原文。",
        item.source_name,
        item.body.chars().count()
    );

    let combined = format!("{q1}{q2}{proof}");
    let zh_ratio = cjk_ratio(&combined);

    ZhRewrite {
        q1,
        q2,
        q3,
        proof,
        anchors: anchors.iter().map(|a| a.text.clone()).collect(),
        zh_ratio,
        skeletonized: skeleton,
    }
}

/// Validate a rewrite (rule-based or LLM-drafted) against the hard rules.
pub fn rewrite_is_valid(rewrite: &ZhRewrite, fulltext: &str) -> bool {
    let all = format!(
        "{}{}{}{}",
        rewrite.q1,
        rewrite.q2,
        rewrite.q3.as_deref().unwrap_or(""),
        rewrite.proof
    );
    if contains_ellipsis(&all) || find_banned_phrase(&all).is_some() {
        return false;
    }
    if !rewrite.anchors.iter().all(|a| fulltext.contains(a)) {
        return false;
    }
    quoted_anchor_present(&rewrite.q1, &rewrite.anchors)
        && quoted_anchor_present(&rewrite.q2, &rewrite.anchors)
}

/// True when the sentence embeds at least one anchor inside 「…」.
pub fn quoted_anchor_present(sentence: &str, anchors: &[String]) -> bool {
    anchors
        .iter()
        .any(|a| sentence.contains(&format!("「{a}」")))
}

/// Aggregate the per-event rewrites into the gate meta.
pub fn aggregate_meta(rewrites: &[ZhRewrite], attempted: usize) -> FaithfulZhMeta {
    let applied = rewrites.len();
    let covered = rewrites
        .iter()
        .filter(|r| {
            quoted_anchor_present(&r.q1, &r.anchors) && quoted_anchor_present(&r.q2, &r.anchors)
        })
        .count();
    let ellipsis_hits_total = rewrites
        .iter()
        .filter(|r| {
            contains_ellipsis(&format!(
                "{}{}{}{}",
                r.q1,
                r.q2,
                r.q3.as_deref().unwrap_or(""),
                r.proof
            ))
        })
        .count();

    let ratios: Vec<f64> = rewrites.iter().map(|r| r.zh_ratio).collect();
    let avg = if ratios.is_empty() {
        0.0
    } else {
        ratios.iter().sum::<f64>() / ratios.len() as f64
    };
    let min = ratios.iter().cloned().fold(f64::INFINITY, f64::min);

    let sample = rewrites.first().map(|r| FaithfulZhSample {
        q1: r.q1.clone(),
        q2: r.q2.clone(),
        proof: r.proof.clone(),
        anchors_top3: r.anchors.iter().take(3).cloned().collect(),
        quote_tokens_found: r.anchors.len(),
    });

    FaithfulZhMeta {
        applied_count: applied,
        attempted_count: attempted,
        quote_coverage_ratio: if applied == 0 {
            0.0
        } else {
            covered as f64 / applied as f64
        },
        ellipsis_hits_total,
        avg_zh_ratio: avg,
        min_zh_ratio: if min.is_finite() { min } else { 0.0 },
        sample,
    }
}
