//! Entity extraction
//!
//! Stopword-aware, rule-based candidate mining over title + body: Title-Case
//! runs are merged into phrases, allowlisted acronyms are kept, possessives
//! stripped, country abbreviations normalized. Candidates score
//! `title_count * 3 + body_count`; the top 8 survive with case-insensitive
//! dedup.

use std::collections::HashMap;

use crate::models::{Entities, EntityMention, RawItem};

/// Maximum entities returned per item.
pub const MAX_ENTITIES: usize = 8;

const TITLE_WEIGHT: f64 = 3.0;

/// English stopwords; Title-Case runs never start or end on one of these.
const EN_STOPWORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "also", "am", "an", "and", "any",
    "are", "as", "at", "be", "because", "been", "before", "being", "below", "between", "both",
    "but", "by", "can", "could", "did", "do", "does", "doing", "down", "during", "each", "few",
    "first", "for", "from", "further", "had", "has", "have", "having", "he", "her", "here", "hers",
    "him", "his", "how", "however", "if", "in", "inside", "into", "is", "it", "its", "just",
    "last", "latest", "like", "may", "me", "might", "more", "most", "much", "must", "my", "new",
    "no", "nor", "not", "now", "of", "off", "on", "once", "only", "or", "other", "our", "out",
    "over", "own", "per", "said", "same", "she", "should", "since", "so", "some", "such", "than",
    "that", "the", "their", "them", "then", "there", "these", "they", "this", "those", "through",
    "to", "today", "too", "under", "until", "up", "upon", "us", "very", "was", "we", "were",
    "what", "when", "where", "which", "while", "who", "whom", "why", "will", "with", "would",
    "year", "you", "your",
];

/// Common CJK function words; runs containing only these are not entities.
const ZH_FUNCTION_WORDS: &[&str] = &[
    "的", "了", "和", "是", "在", "有", "与", "为", "将", "被", "对", "从", "到", "等", "及",
    "或", "而", "也", "都", "并", "就", "其", "中", "上", "下", "这", "那", "我们", "他们",
    "一个", "没有", "可以", "表示", "称", "说",
];

/// Acronyms recognized even without Title-Case shape.
const ACRONYM_ALLOWLIST: &[&str] = &[
    "AI", "AGI", "API", "AWS", "CPU", "GPU", "TPU", "LLM", "ML", "NLP", "OCR", "SDK", "SaaS",
    "IPO", "M&A", "VC", "EU", "US", "UK", "UN", "FTC", "SEC", "FDA", "NASA", "CEO", "CTO",
    "GPT", "RAG", "GAN", "EV", "AR", "VR", "IoT", "5G", "HBM",
];

/// Country-style abbreviations folded to one surface form before any
/// splitting happens. Longest forms first so "U.S.A." never half-matches.
const COUNTRY_NORMALIZATION: &[(&str, &str)] = &[
    ("U.S.A.", "US"),
    ("U.S.", "US"),
    ("U.K.", "UK"),
    ("E.U.", "EU"),
    ("U.N.", "UN"),
];

/// Extract ranked entities for one item.
pub fn extract_entities(item: &RawItem) -> Entities {
    let title_candidates = candidates_from_text(&item.title);
    let body_candidates = candidates_from_text(&item.body);

    // Case-insensitive accumulation; the first-seen surface form is kept.
    let mut scores: HashMap<String, (String, f64, Option<String>)> = HashMap::new();
    for (surface, type_hint) in title_candidates {
        let key = surface.to_lowercase();
        let entry = scores
            .entry(key)
            .or_insert_with(|| (surface.clone(), 0.0, type_hint.clone()));
        entry.1 += TITLE_WEIGHT;
    }
    for (surface, type_hint) in body_candidates {
        let key = surface.to_lowercase();
        let entry = scores
            .entry(key)
            .or_insert_with(|| (surface.clone(), 0.0, type_hint.clone()));
        entry.1 += 1.0;
    }

    let mut ranked: Vec<EntityMention> = scores
        .into_values()
        .map(|(name, score, type_hint)| EntityMention { name, score, type_hint })
        .collect();
    ranked.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.name.cmp(&b.name))
    });
    ranked.truncate(MAX_ENTITIES);

    Entities {
        item_id: item.id.clone(),
        entities: ranked,
    }
}

/// Candidate surface forms with optional type hints, one per occurrence.
/// Splits on clause punctuation too, so names never merge across a comma.
fn candidates_from_text(text: &str) -> Vec<(String, Option<String>)> {
    let mut out = Vec::new();

    let mut text = text.to_string();
    for (from, to) in COUNTRY_NORMALIZATION {
        text = text.replace(from, to);
    }

    for clause in text.split(|c: char| {
        matches!(
            c,
            '.' | '!' | '?' | ',' | ';' | ':' | '\n' | '。' | '！' | '？' | '，' | '；' | '：'
        )
    }) {
        out.extend(en_candidates(clause));
        out.extend(zh_candidates(clause));
    }
    out
}

fn en_candidates(sentence: &str) -> Vec<(String, Option<String>)> {
    let words: Vec<&str> = sentence.split_whitespace().collect();
    let mut out = Vec::new();
    let mut i = 0;

    while i < words.len() {
        let cleaned = clean_word(words[i]);
        if cleaned.is_empty() {
            i += 1;
            continue;
        }

        if ACRONYM_ALLOWLIST.contains(&cleaned.as_str()) {
            out.push((cleaned, Some("org".to_string())));
            i += 1;
            continue;
        }

        // Title-Case run: consecutive capitalized words, skipping a leading
        // sentence-start stopword like "The".
        if is_title_case(&cleaned) && !is_stopword(&cleaned) {
            let mut phrase = vec![cleaned];
            let mut j = i + 1;
            while j < words.len() {
                let next = clean_word(words[j]);
                if next.is_empty() || !(is_title_case(&next) || ACRONYM_ALLOWLIST.contains(&next.as_str())) {
                    break;
                }
                if is_stopword(&next) {
                    break;
                }
                phrase.push(next);
                j += 1;
            }
            out.push((phrase.join(" "), None));
            i = j;
            continue;
        }

        i += 1;
    }
    out
}

/// Connector verbs that separate ZH entity segments inside one run.
const ZH_CONNECTORS: &[&str] = &["发布", "宣布", "推出", "上线", "完成", "获得", "收购"];

/// Ideographs only; the wider `collectors::is_cjk` range includes fullwidth
/// punctuation, which must not glue entity runs together.
fn is_cjk_ideograph(c: char) -> bool {
    matches!(u32::from(c), 0x4E00..=0x9FFF | 0x3400..=0x4DBF | 0xF900..=0xFAFF)
}

fn zh_candidates(sentence: &str) -> Vec<(String, Option<String>)> {
    let mut out = Vec::new();
    let mut run = String::new();

    let mut flush = |run: &mut String, out: &mut Vec<(String, Option<String>)>| {
        if !run.is_empty() {
            push_zh_segments(run, out);
        }
        run.clear();
    };

    for c in sentence.chars() {
        if is_cjk_ideograph(c) {
            let single = c.to_string();
            if ZH_FUNCTION_WORDS.contains(&single.as_str()) {
                flush(&mut run, &mut out);
            } else {
                run.push(c);
            }
        } else {
            flush(&mut run, &mut out);
        }
    }
    flush(&mut run, &mut out);
    out
}

/// Split a CJK run on connector verbs and keep 2-8 char segments.
fn push_zh_segments(run: &str, out: &mut Vec<(String, Option<String>)>) {
    let mut segments = vec![run.to_string()];
    for connector in ZH_CONNECTORS {
        segments = segments
            .iter()
            .flat_map(|s| s.split(connector).map(|p| p.to_string()))
            .collect();
    }
    for segment in segments {
        let chars = segment.chars().count();
        if (2..=8).contains(&chars) && !ZH_FUNCTION_WORDS.contains(&segment.as_str()) {
            out.push((segment, None));
        }
    }
}

/// Strip surrounding punctuation and possessives.
fn clean_word(word: &str) -> String {
    let stripped: &str = word.trim_matches(|c: char| {
        !(c.is_alphanumeric() || c == '&' || c == '-' || c == '.')
    });
    let stripped = stripped.trim_end_matches('.');
    let no_possessive = stripped
        .strip_suffix("'s")
        .or_else(|| stripped.strip_suffix("’s"))
        .unwrap_or(stripped);
    no_possessive.to_string()
}

fn is_title_case(word: &str) -> bool {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) if first.is_uppercase() => {
            word.chars().count() > 1 && chars.any(|c| c.is_lowercase())
        }
        _ => false,
    }
}

fn is_stopword(word: &str) -> bool {
    EN_STOPWORDS.contains(&word.to_lowercase().as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Platform, PublishedAtSource};
    use chrono::Utc;

    fn item(title: &str, body: &str) -> RawItem {
        RawItem {
            id: "itm_t".into(),
            source_name: "s".into(),
            platform: Platform::Rss,
            url: "https://example.com/x".into(),
            canonical_url: "https://example.com/x".into(),
            title: title.into(),
            body: body.into(),
            published_at: Utc::now(),
            published_at_source: PublishedAtSource::EntryField,
            lang: "en".into(),
            frontier: 50.0,
            needs_fulltext: false,
        }
    }

    #[test]
    fn stopword_count_is_at_least_one_hundred() {
        assert!(EN_STOPWORDS.len() >= 100, "EN stopword list shrank");
    }

    #[test]
    fn title_case_runs_merge_and_title_hits_weigh_triple() {
        let it = item(
            "Anthropic Claude beats benchmark",
            "The release of Anthropic Claude surprised analysts. Anthropic Claude is fast.",
        );
        let entities = extract_entities(&it);
        let top = &entities.entities[0];
        assert_eq!(top.name, "Anthropic Claude");
        // one title hit (3.0) + two body hits (2.0)
        assert!((top.score - 5.0).abs() < 1e-9, "score {}", top.score);
    }

    #[test]
    fn possessives_and_country_abbreviations_normalize() {
        let it = item("OpenAI's deal with U.S. regulators", "");
        let entities = extract_entities(&it);
        let names: Vec<&str> = entities.entities.iter().map(|e| e.name.as_str()).collect();
        assert!(names.contains(&"OpenAI"), "names: {names:?}");
        assert!(names.contains(&"US"), "names: {names:?}");
        assert!(!names.iter().any(|n| n.contains("'s")));
    }

    #[test]
    fn acronyms_come_from_the_allowlist() {
        let it = item("GPU shortage hits LLM training", "The XQZT token is unknown.");
        let entities = extract_entities(&it);
        let names: Vec<&str> = entities.entities.iter().map(|e| e.name.as_str()).collect();
        assert!(names.contains(&"GPU"));
        assert!(names.contains(&"LLM"));
        assert!(!names.contains(&"XQZT"), "non-allowlisted acronym kept");
    }

    #[test]
    fn case_insensitive_dedup_keeps_first_surface() {
        let it = item("Nvidia ships chips", "NVIDIA posted record numbers. Nvidia again.");
        let entities = extract_entities(&it);
        let nvidia: Vec<&EntityMention> = entities
            .entities
            .iter()
            .filter(|e| e.name.eq_ignore_ascii_case("nvidia"))
            .collect();
        assert_eq!(nvidia.len(), 1);
        assert_eq!(nvidia[0].name, "Nvidia");
    }

    #[test]
    fn at_most_eight_entities_scores_descending() {
        let body = "Alpha Corp met Beta Labs and Gamma Systems while Delta Cloud, \
                    Epsilon Networks, Zeta Robotics, Eta Semiconductors, Theta Motors \
                    and Iota Energy watched.";
        let entities = extract_entities(&item("Industry roundup", body));
        assert!(entities.entities.len() <= MAX_ENTITIES);
        for pair in entities.entities.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn zh_runs_split_on_function_words() {
        let it = item("百度发布文心大模型", "");
        let entities = extract_entities(&it);
        assert!(!entities.entities.is_empty());
        assert!(entities.entities.iter().all(|e| !e.name.contains('的')));
    }
}
