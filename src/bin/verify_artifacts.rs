//! Artifact verifier.
//!
//! Reads the meta files from the last run and mirrors the gate verdicts to
//! an exit code, so an unattended checker needs no pipeline state: 0 when no
//! gate failed, 1 on any FAIL. The presence of `NOT_READY.md` alone is a
//! failure regardless of what the meta files claim.

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use serde_json::Value;

const GATE_META_FILES: &[&str] = &[
    "pool_sufficiency.meta.json",
    "showcase_ready.meta.json",
    "exec_news_quality.meta.json",
    "exec_zh_narrative.meta.json",
    "faithful_zh_news.meta.json",
    "newsroom_zh.meta.json",
    "news_anchor_gate.meta.json",
    "exec_deliverable.meta.json",
    "exec_text_ban_scan.meta.json",
    "fulltext_hydrator.meta.json",
    "longform_evidence.meta.json",
    "generic_phrase_audit.meta.json",
    "pptx_media_audit.meta.json",
    "supply_resilience.meta.json",
];

fn main() -> ExitCode {
    let out_dir = std::env::var("OUTPUT_DIR").unwrap_or_else(|_| "outputs".to_string());
    match verify(Path::new(&out_dir)) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("verify error: {e:#}");
            ExitCode::from(2)
        }
    }
}

fn verify(out_dir: &Path) -> Result<bool> {
    let mut ok = true;

    if out_dir.join("NOT_READY.md").exists() {
        println!("[FAIL] NOT_READY.md present");
        ok = false;
    }

    for name in GATE_META_FILES {
        let path = out_dir.join(name);
        if !path.exists() {
            println!("[SKIP] {name} (absent)");
            continue;
        }
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("read {}", path.display()))?;
        let meta: Value =
            serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))?;
        let verdict = meta
            .get("gate_result")
            .and_then(|v| v.as_str())
            .unwrap_or("MISSING");
        println!("[{verdict}] {name}");
        if verdict == "FAIL" || verdict == "MISSING" {
            ok = false;
        }
    }

    for name in ["executive_report.pptx", "executive_report.docx"] {
        let path = out_dir.join(name);
        let size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        if size == 0 {
            println!("[FAIL] {name} missing or empty");
            ok = false;
        } else {
            println!("[OK] {name} ({size} bytes)");
        }
    }

    let summary = out_dir.join("LAST_RUN_SUMMARY.txt");
    if summary.exists() {
        let text = std::fs::read_to_string(&summary)?;
        if let Some(line) = text.lines().find(|l| l.starts_with("status:")) {
            println!("[INFO] {line}");
        }
    } else {
        println!("[FAIL] LAST_RUN_SUMMARY.txt missing");
        ok = false;
    }

    Ok(ok)
}
