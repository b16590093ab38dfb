//! Content classification
//!
//! Keyword-voting classifier over the closed 11-label set. Votes are weighted
//! keyword hits over title + body prefix; the label is the argmax and the
//! confidence is the margin over the runner-up divided by the total vote
//! mass. Rule-based and reproducible: same text, same answer.

use crate::models::{Category, Classification, RawItem};

/// Body prefix scanned for votes; deep-page boilerplate must not vote.
const VOTE_BODY_CHARS: usize = 1200;
/// Title hits count this much more than body hits.
const TITLE_MULTIPLIER: f64 = 2.0;

/// Per-category keyword ballots.
const BALLOTS: &[(Category, &[(&str, f64)])] = &[
    (
        Category::Ai,
        &[
            ("artificial intelligence", 3.0),
            (" ai ", 2.0),
            ("machine learning", 3.0),
            ("llm", 3.0),
            ("language model", 3.0),
            ("neural network", 2.5),
            ("deep learning", 2.5),
            ("chatgpt", 2.5),
            ("gpt", 2.0),
            ("agent", 1.5),
            ("inference", 1.5),
            ("training run", 2.0),
            ("人工智能", 3.0),
            ("大模型", 3.0),
        ],
    ),
    (
        Category::StartupsFunding,
        &[
            ("funding round", 3.0),
            ("series a", 3.0),
            ("series b", 3.0),
            ("series c", 3.0),
            ("seed round", 3.0),
            ("valuation", 2.0),
            ("venture capital", 2.5),
            ("startup", 2.0),
            ("raises", 2.0),
            ("融资", 3.0),
        ],
    ),
    (
        Category::Finance,
        &[
            ("earnings", 2.5),
            ("revenue", 2.0),
            ("ipo", 2.5),
            ("stock", 2.0),
            ("shares", 1.5),
            ("quarterly", 1.5),
            ("acquisition", 2.0),
            ("merger", 2.0),
            ("market cap", 2.0),
        ],
    ),
    (
        Category::PolicyRegulation,
        &[
            ("regulation", 3.0),
            ("regulator", 2.5),
            ("antitrust", 3.0),
            ("lawsuit", 2.0),
            ("legislation", 2.5),
            ("compliance", 2.0),
            ("executive order", 3.0),
            ("ban", 1.5),
            ("ftc", 2.0),
            ("sec", 1.5),
            ("监管", 3.0),
        ],
    ),
    (
        Category::Security,
        &[
            ("security", 2.0),
            ("breach", 3.0),
            ("vulnerability", 3.0),
            ("ransomware", 3.0),
            ("malware", 3.0),
            ("hacker", 2.5),
            ("exploit", 2.5),
            ("zero-day", 3.0),
            ("phishing", 2.5),
        ],
    ),
    (
        Category::HealthBiomed,
        &[
            ("clinical", 3.0),
            ("fda", 2.5),
            ("drug", 2.5),
            ("biotech", 3.0),
            ("medical", 2.0),
            ("patient", 2.0),
            ("diagnos", 2.5),
            ("protein", 2.0),
            ("vaccine", 3.0),
        ],
    ),
    (
        Category::ClimateEnergy,
        &[
            ("climate", 3.0),
            ("carbon", 2.5),
            ("solar", 2.5),
            ("renewable", 3.0),
            ("battery", 2.0),
            ("nuclear", 2.0),
            ("grid", 2.0),
            ("emissions", 2.5),
            ("energy", 1.5),
        ],
    ),
    (
        Category::ConsumerElectronics,
        &[
            ("smartphone", 3.0),
            ("iphone", 2.5),
            ("android", 2.0),
            ("laptop", 2.5),
            ("wearable", 2.5),
            ("headset", 2.5),
            ("gadget", 2.5),
            ("tablet", 2.0),
            ("smartwatch", 2.5),
        ],
    ),
    (
        Category::GamingEntertainment,
        &[
            ("game", 2.0),
            ("gaming", 2.5),
            ("console", 2.5),
            ("streaming", 2.0),
            ("esports", 3.0),
            ("studio", 1.5),
            ("box office", 2.5),
            ("playstation", 2.5),
            ("xbox", 2.5),
        ],
    ),
    (
        Category::Technology,
        &[
            ("software", 2.0),
            ("hardware", 2.0),
            ("chip", 2.0),
            ("semiconductor", 2.5),
            ("cloud", 2.0),
            ("open source", 2.0),
            ("developer", 1.5),
            ("platform", 1.0),
            ("api", 1.5),
            ("datacenter", 2.0),
            ("data center", 2.0),
            ("芯片", 2.5),
        ],
    ),
];

/// Classify one item.
pub fn classify(item: &RawItem) -> Classification {
    let prefix: String = item.body.chars().take(VOTE_BODY_CHARS).collect();
    // Pad so the " ai " ballot can hit at string edges.
    let title = format!(" {} ", item.title.to_lowercase());
    let body = format!(" {} ", prefix.to_lowercase());

    let mut votes: Vec<(Category, f64)> = Vec::with_capacity(BALLOTS.len());
    let mut total = 0.0;
    for (category, ballot) in BALLOTS {
        let mut score = 0.0;
        for (keyword, weight) in *ballot {
            let hits =
                count_hits(&title, keyword) as f64 * TITLE_MULTIPLIER + count_hits(&body, keyword) as f64;
            score += hits * weight;
        }
        total += score;
        votes.push((*category, score));
    }

    votes.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.as_str().cmp(b.0.as_str()))
    });

    let (winner, best) = votes[0];
    if best <= 0.0 {
        return Classification {
            item_id: item.id.clone(),
            category: Category::General,
            confidence: 0.0,
        };
    }

    let runner_up = votes[1].1;
    let confidence = ((best - runner_up) / total).clamp(0.0, 1.0);

    Classification {
        item_id: item.id.clone(),
        category: winner,
        confidence,
    }
}

fn count_hits(haystack: &str, needle: &str) -> usize {
    haystack.matches(needle).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Platform, PublishedAtSource};
    use chrono::Utc;

    fn item(title: &str, body: &str) -> RawItem {
        RawItem {
            id: "itm_c".into(),
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
    fn ai_story_classifies_as_ai() {
        let c = classify(&item(
            "New language model tops benchmarks",
            "The LLM uses a novel neural network architecture for inference.",
        ));
        assert_eq!(c.category, Category::Ai);
        assert!(c.confidence > 0.0);
    }

    #[test]
    fn funding_story_beats_generic_tech() {
        let c = classify(&item(
            "Startup raises $200M funding round",
            "The series b round values the software startup at $2B, led by venture capital firms.",
        ));
        assert_eq!(c.category, Category::StartupsFunding);
    }

    #[test]
    fn no_votes_falls_back_to_general_with_zero_confidence() {
        let c = classify(&item("Weather report", "Sunny with light winds tomorrow."));
        assert_eq!(c.category, Category::General);
        assert!((c.confidence - 0.0).abs() < 1e-9);
    }

    #[test]
    fn classification_is_reproducible() {
        let it = item("Chip fab expands", "The semiconductor plant adds cloud capacity.");
        let a = classify(&it);
        let b = classify(&it);
        assert_eq!(a.category, b.category);
        assert!((a.confidence - b.confidence).abs() < 1e-12);
    }

    #[test]
    fn security_keywords_dominate_when_present() {
        let c = classify(&item(
            "Ransomware breach hits vendor",
            "The zero-day exploit let hackers deploy malware across the platform.",
        ));
        assert_eq!(c.category, Category::Security);
        assert!(c.confidence > 0.2);
    }
}
