//! Run Orchestrator
//!
//! Drives the stages in order, collects gate verdicts, and turns them into
//! the single OK/FAIL outcome. Fail-closed: canonical artifacts are only
//! replaced on OK, a pre-run snapshot restores them on FAIL, and the
//! operator always ends up with either the deck or a NOT_READY report plus
//! one `LAST_RUN_SUMMARY.txt` status line. The run context travels through
//! explicitly; there are no process-wide singletons.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::json;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::collectors::{self, CollectionMeta};
use crate::models::{
    Config, Event, RawItem, RunMeta, RunMode, RunStatus, SelectionOrigin,
};
use crate::pipeline::classify::classify;
use crate::pipeline::dedupe::dedupe_and_filter;
use crate::pipeline::entities::extract_entities;
use crate::pipeline::gates::{all_hard_gates_pass, evaluate_all, GateInputs, GateVerdict};
use crate::pipeline::hydrator::{hydrate, Fetcher, HttpFetcher, HydrationPolicy};
use crate::pipeline::llm::LlmClient;
use crate::pipeline::meta_writer::MetaWriter;
use crate::pipeline::normalize::run_fingerprint;
use crate::pipeline::render::{BundleRenderer, RenderContext, RenderedBundle, Renderer};
use crate::pipeline::rewriter::{aggregate_meta, compose};
use crate::pipeline::scheduler::scheduler_meta;
use crate::pipeline::scoring::{
    event_gate_passes, score_item, selection_order, FULLTEXT_FLOOR_CHARS,
};
use crate::pipeline::selection::{select_events, Candidate};
use crate::pipeline::snapshot::{
    load_pool, persist_pool, snapshot_age_hours, CanonicalSnapshot, SupplyFallbackMeta,
    CANONICAL_FILES,
};

/// Near-miss margin below the score floor that still feeds the extra pool.
const EXTRA_POOL_MARGIN: f64 = 1.0;
/// fail_reason cap per the run-meta contract.
const FAIL_REASON_MAX_CHARS: usize = 300;

/// Where the Z0 pool comes from.
pub enum PoolSource {
    /// Fetch the configured sources.
    Live,
    /// A pre-collected pool (verifiers, tests, replays).
    Preloaded(Vec<RawItem>, CollectionMeta),
}

/// Final outcome handed to the binary.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: String,
    pub status: RunStatus,
    pub fail_reason: Option<String>,
    pub exit_code: i32,
    pub selected_events: usize,
}

/// Resolve the source revision for archive stamping.
pub fn source_head(config: &Config) -> String {
    if let Some(head) = &config.source_head {
        return head.clone();
    }
    Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .and_then(|o| String::from_utf8(o.stdout).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unversioned".to_string())
}

/// Execute one full run.
pub async fn run_pipeline(
    config: &Config,
    mode: RunMode,
    pool_source: PoolSource,
    fetcher: Option<Arc<dyn Fetcher>>,
    cancel: watch::Receiver<bool>,
) -> Result<RunOutcome> {
    let started_at = Utc::now();
    let run_id = started_at.format("%Y%m%d_%H%M%S").to_string();
    let head_at_start = source_head(config);

    let out_dir = PathBuf::from(&config.output_dir);
    let data_dir = PathBuf::from(&config.data_dir);
    let writer = MetaWriter::new(&out_dir)?;
    let pre_run = CanonicalSnapshot::take(&out_dir, &run_id)?;

    info!(run_id = %run_id, mode = mode.as_str(), head = %head_at_start, "run started");

    // ---- Z0 collection + supply fallback -------------------------------
    let (mut items, collection_meta, supply) =
        collect_with_fallback(config, pool_source, &data_dir).await?;

    let mut fail_reasons: Vec<String> = Vec::new();
    if collection_meta.total_items < config.z0_min_total_items {
        fail_reasons.push(format!(
            "z0 pool {} below minimum {}",
            collection_meta.total_items, config.z0_min_total_items
        ));
    }
    let frontier_floor = if config.z0_allow_degraded {
        config.z0_min_frontier85_72h_fallback
    } else {
        config.z0_min_frontier85_72h
    };
    if collection_meta.frontier_ge_85_72h < frontier_floor {
        fail_reasons.push(format!(
            "frontier85_72h {} below minimum {}",
            collection_meta.frontier_ge_85_72h, frontier_floor
        ));
    }

    // ---- Dedupe, filter, hydrate ---------------------------------------
    let now = Utc::now();
    let (kept, mut filter_summary, dup_signals) = dedupe_and_filter(items, config, now);
    items = kept;

    let policy = HydrationPolicy::from_config(config);
    let fetcher: Arc<dyn Fetcher> = match fetcher {
        Some(f) => f,
        None => Arc::new(HttpFetcher::new(policy.network_timeout)?),
    };
    let (hydrated, hydration_results, hydration_summary) =
        hydrate(items, &policy, fetcher, cancel.clone()).await;
    let items = hydrated;

    let hydration_ok: std::collections::HashSet<&str> = hydration_results
        .iter()
        .filter(|r| r.status.is_ok())
        .map(|r| r.item_id.as_str())
        .collect();
    let strict_fulltext_ok = items
        .iter()
        .filter(|i| {
            hydration_ok.contains(i.id.as_str())
                || i.body.chars().count() >= FULLTEXT_FLOOR_CHARS
        })
        .count();

    // ---- Derivations + scoring + tiering -------------------------------
    let mut primary = Vec::new();
    let mut extra = Vec::new();
    let mut general = Vec::new();
    let mut fulltexts: HashMap<String, String> = HashMap::new();
    let mut actors: HashMap<String, String> = HashMap::new();

    let mut sorted_items = items;
    sorted_items.sort_by(selection_order);

    for item in &sorted_items {
        let classification = classify(item);
        let entities = extract_entities(item);
        let extra_copies = dup_signals.get(&item.id).copied().unwrap_or(0);
        let fulltext_ok = hydration_ok.contains(item.id.as_str());
        let score = score_item(item, &classification, &entities, extra_copies, fulltext_ok);

        if let Some(top) = entities.entities.first() {
            actors.insert(item.id.clone(), top.name.clone());
        }

        let candidate = Candidate::new(item.clone(), score.clone(), classification.category);
        if event_gate_passes(item, &score, config, fulltext_ok) {
            fulltexts.insert(item.id.clone(), item.body.clone());
            primary.push(candidate);
        } else if !score.ad_flag
            && score.dup_risk <= config.max_dup_risk
            && score.final_score >= config.min_score - EXTRA_POOL_MARGIN
            && (fulltext_ok || item.body.chars().count() >= FULLTEXT_FLOOR_CHARS)
        {
            fulltexts.insert(item.id.clone(), item.body.clone());
            extra.push(candidate);
        } else if !score.ad_flag && item.body.chars().count() >= FULLTEXT_FLOOR_CHARS {
            fulltexts.insert(item.id.clone(), item.body.clone());
            general.push(candidate);
        }
    }

    filter_summary.event_gate_pass_total = primary.len();
    filter_summary.kept_total = primary.len();

    // ---- Selection + rewriting -----------------------------------------
    let by_id: HashMap<String, Candidate> = primary
        .iter()
        .chain(extra.iter())
        .chain(general.iter())
        .map(|c| (c.item.id.clone(), c.clone()))
        .collect();

    let (picks, mut selection_meta) =
        select_events(primary, extra, general, config, mode);

    let llm = LlmClient::from_provider(&config.llm)?;
    let mut events: Vec<Event> = Vec::new();
    let mut rewrites = Vec::new();
    let attempted = picks.len();

    for pick in &picks {
        let Some(candidate) = by_id.get(&pick.item_id) else {
            continue;
        };
        let item = &candidate.item;
        let actor = actors.get(&item.id).map(String::as_str);

        let Some(mut rewrite) = compose(item, pick.bucket, actor) else {
            warn!(item = %item.id, "no usable anchors, event dropped before freeze");
            continue;
        };
        if let Some(client) = &llm {
            if let Some(assisted) = client.assist_rewrite(item, &rewrite).await {
                rewrite = assisted;
            }
        }

        events.push(Event {
            item_id: item.id.clone(),
            bucket: pick.bucket,
            origin: pick.origin,
            title: item.title.clone(),
            canonical_url: item.canonical_url.clone(),
            source_name: item.source_name.clone(),
            category: classify(item).category,
            final_score: candidate.score.final_score,
            frontier: item.frontier,
            published_at: item.published_at,
            anchors: rewrite.anchors.clone(),
            q1: rewrite.q1.clone(),
            q2: rewrite.q2.clone(),
            q3: rewrite.q3.clone(),
            proof: rewrite.proof.clone(),
            zh_ratio: rewrite.zh_ratio,
        });
        rewrites.push(rewrite);
    }
    selection_meta.selected_total = events.len();
    selection_meta.sparse_day =
        selection_meta.sparse_day || events.len() < selection_meta.deck_floor;

    let faithful = aggregate_meta(&rewrites, attempted);

    // ---- Render to staging ---------------------------------------------
    let render_ctx = RenderContext {
        run_id: run_id.clone(),
        mode,
        staging_dir: out_dir.join("staging").join(&run_id),
    };
    let bundle = BundleRenderer.render(&events, &render_ctx)?;
    let rendered_text = format!(
        "{}{}",
        fs::read_to_string(&bundle.deck_path).unwrap_or_default(),
        fs::read_to_string(&bundle.doc_path).unwrap_or_default()
    );

    // ---- Gate evaluation ------------------------------------------------
    let gate_inputs = GateInputs {
        mode,
        config,
        events: &events,
        fulltexts: &fulltexts,
        hydration: &hydration_summary,
        strict_fulltext_ok,
        faithful: &faithful,
        selection: &selection_meta,
        supply: &supply,
        deck_path: &bundle.deck_path,
        doc_path: &bundle.doc_path,
        rendered_text: &rendered_text,
    };
    let gates = evaluate_all(&gate_inputs);

    for gate in &gates {
        writer.write_json(&gate.meta_file_name(), &gate.meta)?;
    }
    writer.write_json("filter_summary.meta.json", &filter_summary)?;
    writer.write_json("selection.meta.json", &selection_meta)?;
    writer.write_json("supply_fallback.meta.json", &supply)?;
    writer.write_json(
        "hydration_results.meta.json",
        &json!({ "results": hydration_results, "summary": hydration_summary }),
    )?;

    // ---- Verdict --------------------------------------------------------
    if !all_hard_gates_pass(&gates) {
        let failed: Vec<&str> = gates
            .iter()
            .filter(|g| g.hard && g.verdict == GateVerdict::Fail)
            .map(|g| g.name)
            .collect();
        fail_reasons.push(format!("hard gates failed: {}", failed.join(", ")));
    }

    let mut status = if fail_reasons.is_empty() {
        RunStatus::Ok
    } else {
        RunStatus::Fail
    };

    // ---- Promotion or rollback -----------------------------------------
    let mut delivery_dir: Option<PathBuf> = None;
    if status == RunStatus::Ok {
        let head_at_archive = source_head(config);
        if head_at_archive != head_at_start {
            // A commit landed mid-run; the archive stamp would lie.
            fail_reasons.push(format!(
                "archive head mismatch: started at {head_at_start}, archiving at {head_at_archive}"
            ));
            status = RunStatus::Fail;
        } else {
            promote_canonical(&bundle, &out_dir)?;
            let dir = archive_delivery(&bundle, &out_dir, &run_id, &head_at_start)?;
            delivery_dir = Some(dir);
            // A clean run retires any NOT_READY marker from earlier days.
            let marker = out_dir.join("NOT_READY.md");
            if marker.exists() {
                let _ = fs::remove_file(marker);
            }
        }
    }

    if status == RunStatus::Fail {
        pre_run.restore()?;
        emit_not_ready(&writer, &out_dir, &run_id, &fail_reasons)?;
    }

    // ---- Always-written artifacts --------------------------------------
    let fail_reason = if fail_reasons.is_empty() {
        None
    } else {
        let joined = fail_reasons.join("; ");
        Some(joined.chars().take(FAIL_REASON_MAX_CHARS).collect::<String>())
    };

    let finished_at = Utc::now();
    let ai_selected = events
        .iter()
        .filter(|e| e.origin != SelectionOrigin::Backfill)
        .count();
    let produced_files = produced_file_list(&out_dir, status, &delivery_dir);

    let event_ids: Vec<String> = events.iter().map(|e| e.item_id.clone()).collect();
    let config_snapshot = format!(
        "mode={};min_score={};quotas={}/{}/{}",
        mode.as_str(),
        config.min_score,
        config.exec_min_product,
        config.exec_min_tech,
        config.exec_min_business
    );

    let run_meta = RunMeta {
        run_id: run_id.clone(),
        mode,
        started_at,
        finished_at: Some(finished_at),
        status,
        gate_results: gates
            .iter()
            .map(|g| (g.name.to_string(), g.verdict.as_str().to_string()))
            .collect(),
        fail_reason: fail_reason.clone(),
        selected_events: events.len(),
        ai_selected_events: ai_selected,
        produced_files: produced_files.clone(),
        fingerprint: run_fingerprint(&event_ids, &config_snapshot),
    };
    writer.write_json("run.meta.json", &run_meta)?;

    let installed = std::env::var("BRIEF_TASK_INSTALLED")
        .map(|v| v == "1")
        .unwrap_or(false);
    writer.write_json(
        "scheduler.meta.json",
        &scheduler_meta(installed, finished_at, Some(status.as_str())),
    )?;

    let open_path = if status == RunStatus::Ok {
        out_dir.join("executive_report.pptx")
    } else {
        out_dir.join("NOT_READY_report.pptx")
    };
    writer.write_json(
        "desktop_button.meta.json",
        &json!({
            "run_id": run_id,
            "status": status.as_str(),
            "open_path": open_path.to_string_lossy(),
        }),
    )?;
    writer.write_json(
        "delivery_path.meta.json",
        &json!({
            "run_id": run_id,
            "delivery_dir": delivery_dir.as_ref().map(|d| d.to_string_lossy().into_owned()),
        }),
    )?;

    writer.write_text(
        "LAST_RUN_SUMMARY.txt",
        &last_run_summary(&run_meta, &produced_files),
    )?;

    match status {
        RunStatus::Ok => info!(run_id = %run_meta.run_id, events = events.len(), "run OK"),
        RunStatus::Fail => error!(
            run_id = %run_meta.run_id,
            reason = fail_reason.as_deref().unwrap_or("unknown"),
            "run FAIL"
        ),
    }

    Ok(RunOutcome {
        run_id: run_meta.run_id,
        status,
        fail_reason,
        exit_code: if status == RunStatus::Ok { 0 } else { 1 },
        selected_events: events.len(),
    })
}

/// Collect the pool, restoring the last-good snapshot on a degraded day.
async fn collect_with_fallback(
    config: &Config,
    pool_source: PoolSource,
    data_dir: &Path,
) -> Result<(Vec<RawItem>, CollectionMeta, SupplyFallbackMeta)> {
    let forced = std::env::var("Z0_FORCE_FALLBACK").map(|v| v == "1").unwrap_or(false);

    let (items, meta) = match pool_source {
        PoolSource::Preloaded(items, meta) => (items, meta),
        PoolSource::Live => collectors::collect(config).await?,
    };

    let degraded = forced || meta.total_items < config.z0_restore_below_items;
    if !degraded {
        persist_pool(data_dir, &items, &meta)?;
        let supply = SupplyFallbackMeta {
            fallback_used: false,
            reason: None,
            snapshot_age_hours: None,
            pool_total: meta.total_items,
        };
        return Ok((items, meta, supply));
    }

    let reason = if forced {
        "fallback forced by Z0_FORCE_FALLBACK".to_string()
    } else {
        format!(
            "total_items={} below restore threshold {}",
            meta.total_items, config.z0_restore_below_items
        )
    };
    let age = snapshot_age_hours(data_dir);

    match load_pool(data_dir) {
        Ok((snap_items, snap_meta)) => {
            warn!(
                reason = %reason,
                age_hours = age.unwrap_or(-1.0),
                restored = snap_items.len(),
                "supply fallback engaged"
            );
            let supply = SupplyFallbackMeta {
                fallback_used: true,
                reason: Some(reason),
                snapshot_age_hours: age,
                pool_total: snap_meta.total_items,
            };
            Ok((snap_items, snap_meta, supply))
        }
        Err(e) if forced => Err(e.context("forced fallback but no usable snapshot")),
        Err(e) => {
            // Degraded and nothing to restore: continue on the thin pool and
            // let the gates decide.
            warn!(error = %e, "degraded collection and no snapshot, continuing with thin pool");
            let supply = SupplyFallbackMeta {
                fallback_used: false,
                reason: Some(reason),
                snapshot_age_hours: None,
                pool_total: meta.total_items,
            };
            Ok((items, meta, supply))
        }
    }
}

fn promote_canonical(bundle: &RenderedBundle, out_dir: &Path) -> Result<()> {
    fs::copy(&bundle.deck_path, out_dir.join(CANONICAL_FILES[0]))
        .context("promote deck to canonical path")?;
    fs::copy(&bundle.doc_path, out_dir.join(CANONICAL_FILES[1]))
        .context("promote document to canonical path")?;
    Ok(())
}

fn archive_delivery(
    bundle: &RenderedBundle,
    out_dir: &Path,
    run_id: &str,
    head: &str,
) -> Result<PathBuf> {
    let dir = out_dir.join("deliveries").join(format!("{run_id}_{head}"));
    fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    for src in bundle.all_paths() {
        let name = src
            .file_name()
            .context("bundle path without file name")?;
        fs::copy(src, dir.join(name)).with_context(|| format!("archive {}", src.display()))?;
    }
    info!(dir = %dir.display(), "delivery archived");
    Ok(dir)
}

fn emit_not_ready(
    writer: &MetaWriter,
    out_dir: &Path,
    run_id: &str,
    reasons: &[String],
) -> Result<()> {
    let body = format!(
        "# NOT READY\n\nrun_id: {run_id}\n\n{}\n",
        reasons
            .iter()
            .map(|r| format!("- {r}"))
            .collect::<Vec<_>>()
            .join("\n")
    );
    writer.write_text("NOT_READY.md", &body)?;

    let report = format!(
        "NOT READY\nrun_id: {run_id}\nThe canonical brief was not replaced.\nReasons:\n{}\n",
        reasons.join("\n")
    );
    fs::write(out_dir.join("NOT_READY_report.pptx"), &report)?;
    fs::write(out_dir.join("NOT_READY_report.docx"), &report)?;
    Ok(())
}

fn produced_file_list(
    out_dir: &Path,
    status: RunStatus,
    delivery_dir: &Option<PathBuf>,
) -> Vec<String> {
    let mut files = Vec::new();
    match status {
        RunStatus::Ok => {
            for name in CANONICAL_FILES {
                files.push(out_dir.join(name).to_string_lossy().into_owned());
            }
            if let Some(dir) = delivery_dir {
                files.push(dir.to_string_lossy().into_owned());
            }
        }
        RunStatus::Fail => {
            files.push(out_dir.join("NOT_READY_report.pptx").to_string_lossy().into_owned());
            files.push(out_dir.join("NOT_READY.md").to_string_lossy().into_owned());
        }
    }
    files
}

fn last_run_summary(meta: &RunMeta, produced_files: &[String]) -> String {
    format!(
        "run_id: {}\nstarted_at: {}\nfinished_at: {}\nmode: {}\nstatus: {}\nselected_events: {}\nai_selected_events: {}\nproduced_files: {}\n{}",
        meta.run_id,
        meta.started_at.to_rfc3339(),
        meta.finished_at.map(|t| t.to_rfc3339()).unwrap_or_default(),
        meta.mode.as_str(),
        meta.status.as_str(),
        meta.selected_events,
        meta.ai_selected_events,
        produced_files.join(", "),
        meta.fail_reason
            .as_ref()
            .map(|r| format!("fail_reason: {r}\n"))
            .unwrap_or_default(),
    )
}
