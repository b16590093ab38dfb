//! Gate Engine
//!
//! Every run-level quality bar is a small pure function over the run state
//! that yields a typed meta block plus a verdict. Hard gates decide the
//! run's fate; soft gates downgrade to WARN-OK. Each gate's meta is one
//! tagged variant keyed by gate name, so the on-disk `*.meta.json` schema
//! is closed per gate rather than a dynamic bag.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::models::{Config, Event, RunMode};
use crate::pipeline::hydrator::HydrationSummary;
use crate::pipeline::rewriter::{
    contains_ellipsis, find_banned_phrase, FaithfulZhMeta, MIN_ANCHOR_CHARS, MIN_ANCHOR_WORDS,
};
use crate::pipeline::selection::{deck_bounds, SelectionMeta};
use crate::pipeline::snapshot::SupplyFallbackMeta;

/// Gate verdicts, in wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GateVerdict {
    #[serde(rename = "PASS")]
    Pass,
    #[serde(rename = "FAIL")]
    Fail,
    #[serde(rename = "WARN-OK")]
    WarnOk,
    #[serde(rename = "SKIP")]
    Skip,
}

impl GateVerdict {
    pub fn as_str(&self) -> &str {
        match self {
            GateVerdict::Pass => "PASS",
            GateVerdict::Fail => "FAIL",
            GateVerdict::WarnOk => "WARN-OK",
            GateVerdict::Skip => "SKIP",
        }
    }
}

/// Typed meta for every gate; the `gate` tag is the gate name on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "gate", rename_all = "snake_case")]
pub enum GateMeta {
    PoolSufficiency {
        gate_result: GateVerdict,
        final_selected_events: usize,
        strict_fulltext_ok: usize,
        required_events: usize,
        required_fulltext_ok: usize,
    },
    ShowcaseReady {
        gate_result: GateVerdict,
        deck_events: usize,
        ai_selected_events: usize,
        required_events: usize,
        demo_supplemented: bool,
    },
    ExecNewsQuality {
        gate_result: GateVerdict,
        events_checked: usize,
        failures: Vec<String>,
    },
    ExecZhNarrative {
        gate_result: GateVerdict,
        all_pass: bool,
        failures: Vec<String>,
    },
    FaithfulZhNews {
        gate_result: GateVerdict,
        effective_min: usize,
        #[serde(flatten)]
        meta: FaithfulZhMeta,
    },
    NewsroomZh {
        gate_result: GateVerdict,
        avg_zh_ratio: f64,
        min_zh_ratio: f64,
    },
    NewsAnchorGate {
        gate_result: GateVerdict,
        anchor_coverage_ratio: f64,
        anchor_missing_count: usize,
    },
    ExecDeliverable {
        gate_result: GateVerdict,
        deck_bytes: u64,
        doc_bytes: u64,
    },
    ExecTextBanScan {
        gate_result: GateVerdict,
        hits: Vec<String>,
    },
    FulltextHydrator {
        gate_result: GateVerdict,
        coverage_ratio: f64,
        ok_count: usize,
        attempted: usize,
    },
    LongformEvidence {
        gate_result: GateVerdict,
        longform_count: usize,
        deck_events: usize,
    },
    GenericPhraseAudit {
        gate_result: GateVerdict,
        hits: Vec<String>,
    },
    PptxMediaAudit {
        gate_result: GateVerdict,
        slide_count: usize,
        expected_slides: usize,
    },
    SupplyResilience {
        gate_result: GateVerdict,
        #[serde(flatten)]
        meta: SupplyFallbackMeta,
    },
}

/// One evaluated gate: name (also the meta file stem), hardness, verdict.
#[derive(Debug, Clone)]
pub struct EvaluatedGate {
    pub name: &'static str,
    pub hard: bool,
    pub verdict: GateVerdict,
    pub meta: GateMeta,
}

impl EvaluatedGate {
    pub fn meta_file_name(&self) -> String {
        format!("{}.meta.json", self.name)
    }
}

/// Everything the gates observe. Borrowed views only; gates never mutate
/// run state.
pub struct GateInputs<'a> {
    pub mode: RunMode,
    pub config: &'a Config,
    pub events: &'a [Event],
    /// item_id -> fulltext for the selected events.
    pub fulltexts: &'a HashMap<String, String>,
    pub hydration: &'a HydrationSummary,
    /// Items with hydration ok or an original body at the fulltext floor.
    pub strict_fulltext_ok: usize,
    pub faithful: &'a FaithfulZhMeta,
    pub selection: &'a SelectionMeta,
    pub supply: &'a SupplyFallbackMeta,
    pub deck_path: &'a Path,
    pub doc_path: &'a Path,
    /// Concatenated rendered text (deck + document) for the ban scan.
    pub rendered_text: &'a str,
}

/// Evaluate every gate in its fixed order.
pub fn evaluate_all(inputs: &GateInputs<'_>) -> Vec<EvaluatedGate> {
    let gates = vec![
        pool_sufficiency(inputs),
        showcase_ready(inputs),
        exec_news_quality(inputs),
        exec_zh_narrative(inputs),
        faithful_zh_news(inputs),
        newsroom_zh(inputs),
        news_anchor_gate(inputs),
        exec_deliverable(inputs),
        exec_text_ban_scan(inputs),
        fulltext_hydrator(inputs),
        longform_evidence(inputs),
        generic_phrase_audit(inputs),
        pptx_media_audit(inputs),
        supply_resilience(inputs),
    ];

    for gate in &gates {
        match gate.verdict {
            GateVerdict::Fail => warn!(gate = gate.name, "hard gate FAIL"),
            GateVerdict::WarnOk => info!(gate = gate.name, "gate WARN-OK"),
            _ => {}
        }
    }
    gates
}

/// True when no hard gate failed.
pub fn all_hard_gates_pass(gates: &[EvaluatedGate]) -> bool {
    gates
        .iter()
        .filter(|g| g.hard)
        .all(|g| g.verdict != GateVerdict::Fail)
}

fn pool_sufficiency(inputs: &GateInputs<'_>) -> EvaluatedGate {
    // Brief decks are allowed to be shorter; the BRIEF_* density gates
    // carry the strictness instead.
    let required_events = if inputs.mode == RunMode::Brief {
        deck_bounds(inputs.mode).0
    } else {
        inputs.config.exec_min_events
    };
    let required_fulltext_ok = 4;
    let selected = inputs.events.len();

    let verdict = if selected >= required_events && inputs.strict_fulltext_ok >= required_fulltext_ok
    {
        GateVerdict::Pass
    } else {
        GateVerdict::Fail
    };

    EvaluatedGate {
        name: "pool_sufficiency",
        hard: true,
        verdict,
        meta: GateMeta::PoolSufficiency {
            gate_result: verdict,
            final_selected_events: selected,
            strict_fulltext_ok: inputs.strict_fulltext_ok,
            required_events,
            required_fulltext_ok,
        },
    }
}

fn showcase_ready(inputs: &GateInputs<'_>) -> EvaluatedGate {
    let required_events = deck_bounds(inputs.mode).0;
    let deck_events = inputs.events.len();
    let ai_selected = inputs
        .events
        .iter()
        .filter(|e| e.origin != crate::models::SelectionOrigin::Backfill)
        .count();
    let demo_supplemented =
        inputs.mode == RunMode::Demo && ai_selected < required_events && deck_events >= required_events;

    let verdict = if ai_selected >= required_events || demo_supplemented {
        GateVerdict::Pass
    } else {
        GateVerdict::Fail
    };

    EvaluatedGate {
        name: "showcase_ready",
        hard: true,
        verdict,
        meta: GateMeta::ShowcaseReady {
            gate_result: verdict,
            deck_events,
            ai_selected_events: ai_selected,
            required_events,
            demo_supplemented,
        },
    }
}

/// Word floor that also admits CJK quotes.
fn quote_substantial(quote: &str) -> bool {
    let chars = quote.chars().count();
    if chars < MIN_ANCHOR_CHARS {
        return false;
    }
    let words = quote.split_whitespace().count();
    let cjk = quote.chars().filter(|c| crate::collectors::is_cjk(*c)).count();
    words >= MIN_ANCHOR_WORDS || cjk >= 10
}

fn exec_news_quality(inputs: &GateInputs<'_>) -> EvaluatedGate {
    let mut failures = Vec::new();

    for event in inputs.events {
        let fulltext = inputs.fulltexts.get(&event.item_id);
        if event.anchors.len() < 2 {
            failures.push(format!("{}: fewer than two quotes", event.item_id));
            continue;
        }
        for anchor in event.anchors.iter().take(2) {
            if !quote_substantial(anchor) {
                failures.push(format!("{}: quote below floor", event.item_id));
            }
            match fulltext {
                Some(text) if text.contains(anchor.as_str()) => {}
                _ => failures.push(format!("{}: quote not verbatim in source", event.item_id)),
            }
        }
        if !event.proof.contains(&event.source_name) {
            failures.push(format!("{}: quote source missing from proof", event.item_id));
        }
        let bound_q1 = event.anchors.iter().any(|a| event.q1.contains(&format!("「{a}」")));
        let bound_q2 = event.anchors.iter().any(|a| event.q2.contains(&format!("「{a}」")));
        if !bound_q1 || !bound_q2 {
            failures.push(format!("{}: quotes not bound to q1/q2", event.item_id));
        }
    }

    let verdict = if inputs.events.is_empty() {
        GateVerdict::Skip
    } else if failures.is_empty() {
        GateVerdict::Pass
    } else {
        GateVerdict::Fail
    };

    EvaluatedGate {
        name: "exec_news_quality",
        hard: true,
        verdict,
        meta: GateMeta::ExecNewsQuality {
            gate_result: verdict,
            events_checked: inputs.events.len(),
            failures,
        },
    }
}

/// Text between 「 and 」 in a sentence, if any.
fn quote_window(sentence: &str) -> Option<&str> {
    let start = sentence.find('「')? + '「'.len_utf8();
    let end = sentence[start..].find('」')? + start;
    Some(&sentence[start..end])
}

fn exec_zh_narrative(inputs: &GateInputs<'_>) -> EvaluatedGate {
    let mut failures = Vec::new();

    for event in inputs.events {
        for (label, sentence) in [("q1", &event.q1), ("q2", &event.q2)] {
            match quote_window(sentence) {
                Some(window) => {
                    let verbatim = event.anchors.iter().any(|a| a == window);
                    let in_source = inputs
                        .fulltexts
                        .get(&event.item_id)
                        .is_some_and(|t| t.contains(window));
                    if !verbatim || !in_source {
                        failures.push(format!("{}: {label} window not anchored", event.item_id));
                    }
                }
                None => failures.push(format!("{}: {label} has no quote window", event.item_id)),
            }
        }
    }

    let all_pass = failures.is_empty();
    let verdict = if inputs.events.is_empty() {
        GateVerdict::Skip
    } else if all_pass {
        GateVerdict::Pass
    } else {
        GateVerdict::Fail
    };

    EvaluatedGate {
        name: "exec_zh_narrative",
        hard: true,
        verdict,
        meta: GateMeta::ExecZhNarrative {
            gate_result: verdict,
            all_pass,
            failures,
        },
    }
}

fn faithful_zh_news(inputs: &GateInputs<'_>) -> EvaluatedGate {
    // Sparse days cannot demand more rewrites than there are events.
    let effective_min = if inputs.selection.sparse_day {
        inputs.events.len()
    } else {
        deck_bounds(inputs.mode).0
    };

    let meta = inputs.faithful.clone();
    let verdict = if meta.applied_count >= effective_min
        && meta.quote_coverage_ratio >= 0.90
        && meta.ellipsis_hits_total == 0
    {
        GateVerdict::Pass
    } else {
        GateVerdict::Fail
    };

    EvaluatedGate {
        name: "faithful_zh_news",
        hard: true,
        verdict,
        meta: GateMeta::FaithfulZhNews {
            gate_result: verdict,
            effective_min,
            meta,
        },
    }
}

fn newsroom_zh(inputs: &GateInputs<'_>) -> EvaluatedGate {
    let avg = inputs.faithful.avg_zh_ratio;
    let min = inputs.faithful.min_zh_ratio;
    let verdict = if inputs.events.is_empty() {
        GateVerdict::Skip
    } else if avg >= 0.35 && min >= 0.20 {
        GateVerdict::Pass
    } else {
        GateVerdict::Fail
    };

    EvaluatedGate {
        name: "newsroom_zh",
        hard: true,
        verdict,
        meta: GateMeta::NewsroomZh {
            gate_result: verdict,
            avg_zh_ratio: avg,
            min_zh_ratio: min,
        },
    }
}

fn news_anchor_gate(inputs: &GateInputs<'_>) -> EvaluatedGate {
    let total = inputs.events.len();
    let missing = inputs
        .events
        .iter()
        .filter(|e| {
            let anchored = e.anchors.first().is_some_and(|a| {
                inputs
                    .fulltexts
                    .get(&e.item_id)
                    .is_some_and(|t| t.contains(a.as_str()))
            });
            !anchored
        })
        .count();
    let coverage = if total == 0 {
        0.0
    } else {
        (total - missing) as f64 / total as f64
    };

    let verdict = if total == 0 {
        GateVerdict::Skip
    } else if coverage >= 0.90 || missing <= 1 {
        GateVerdict::Pass
    } else {
        GateVerdict::Fail
    };

    EvaluatedGate {
        name: "news_anchor_gate",
        hard: true,
        verdict,
        meta: GateMeta::NewsAnchorGate {
            gate_result: verdict,
            anchor_coverage_ratio: coverage,
            anchor_missing_count: missing,
        },
    }
}

fn exec_deliverable(inputs: &GateInputs<'_>) -> EvaluatedGate {
    let size_of = |p: &Path| std::fs::metadata(p).map(|m| m.len()).unwrap_or(0);
    let deck_bytes = size_of(inputs.deck_path);
    let doc_bytes = size_of(inputs.doc_path);

    let verdict = if deck_bytes > 0 && doc_bytes > 0 {
        GateVerdict::Pass
    } else {
        GateVerdict::Fail
    };

    EvaluatedGate {
        name: "exec_deliverable",
        hard: true,
        verdict,
        meta: GateMeta::ExecDeliverable {
            gate_result: verdict,
            deck_bytes,
            doc_bytes,
        },
    }
}

fn exec_text_ban_scan(inputs: &GateInputs<'_>) -> EvaluatedGate {
    let mut hits = Vec::new();
    if contains_ellipsis(inputs.rendered_text) {
        hits.push("ellipsis".to_string());
    }
    if let Some(phrase) = find_banned_phrase(inputs.rendered_text) {
        hits.push(phrase.to_string());
    }

    let verdict = if hits.is_empty() {
        GateVerdict::Pass
    } else {
        GateVerdict::Fail
    };

    EvaluatedGate {
        name: "exec_text_ban_scan",
        hard: true,
        verdict,
        meta: GateMeta::ExecTextBanScan {
            gate_result: verdict,
            hits,
        },
    }
}

fn fulltext_hydrator(inputs: &GateInputs<'_>) -> EvaluatedGate {
    let h = inputs.hydration;
    let verdict = if h.attempted == 0 {
        GateVerdict::Skip
    } else if h.coverage_ratio >= 0.60 || h.ok_count >= 4 {
        GateVerdict::Pass
    } else {
        GateVerdict::WarnOk
    };

    EvaluatedGate {
        name: "fulltext_hydrator",
        hard: false,
        verdict,
        meta: GateMeta::FulltextHydrator {
            gate_result: verdict,
            coverage_ratio: h.coverage_ratio,
            ok_count: h.ok_count,
            attempted: h.attempted,
        },
    }
}

fn longform_evidence(inputs: &GateInputs<'_>) -> EvaluatedGate {
    let longform = inputs
        .events
        .iter()
        .filter(|e| {
            inputs
                .fulltexts
                .get(&e.item_id)
                .is_some_and(|t| t.chars().count() >= 1200)
        })
        .count();
    let verdict = if inputs.events.is_empty() {
        GateVerdict::Skip
    } else if longform * 2 >= inputs.events.len() {
        GateVerdict::Pass
    } else {
        GateVerdict::WarnOk
    };

    EvaluatedGate {
        name: "longform_evidence",
        hard: false,
        verdict,
        meta: GateMeta::LongformEvidence {
            gate_result: verdict,
            longform_count: longform,
            deck_events: inputs.events.len(),
        },
    }
}

fn generic_phrase_audit(inputs: &GateInputs<'_>) -> EvaluatedGate {
    let mut hits = Vec::new();
    for event in inputs.events {
        for sentence in [&event.q1, &event.q2] {
            if let Some(phrase) = find_banned_phrase(sentence) {
                hits.push(format!("{}: {phrase}", event.item_id));
            }
        }
    }
    let verdict = if hits.is_empty() {
        GateVerdict::Pass
    } else {
        GateVerdict::WarnOk
    };

    EvaluatedGate {
        name: "generic_phrase_audit",
        hard: false,
        verdict,
        meta: GateMeta::GenericPhraseAudit {
            gate_result: verdict,
            hits,
        },
    }
}

fn pptx_media_audit(inputs: &GateInputs<'_>) -> EvaluatedGate {
    let slide_count = inputs.rendered_text.matches("=== SLIDE").count();
    let expected = inputs.events.len();
    let verdict = if slide_count >= expected {
        GateVerdict::Pass
    } else {
        GateVerdict::WarnOk
    };

    EvaluatedGate {
        name: "pptx_media_audit",
        hard: false,
        verdict,
        meta: GateMeta::PptxMediaAudit {
            gate_result: verdict,
            slide_count,
            expected_slides: expected,
        },
    }
}

fn supply_resilience(inputs: &GateInputs<'_>) -> EvaluatedGate {
    let verdict = if inputs.supply.fallback_used {
        GateVerdict::WarnOk
    } else {
        GateVerdict::Pass
    };

    EvaluatedGate {
        name: "supply_resilience",
        hard: false,
        verdict,
        meta: GateMeta::SupplyResilience {
            gate_result: verdict,
            meta: inputs.supply.clone(),
        },
    }
}
