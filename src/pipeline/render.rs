//! Artifact rendering seam.
//!
//! The deck/document engine proper is an external collaborator; the pipeline
//! only depends on the `Renderer` trait over a frozen event list. The
//! built-in `BundleRenderer` is a deterministic template emitter: it writes
//! the full artifact bundle (deck container, document container, markdown
//! digest, machine-readable events) from nothing but the event list, so the
//! deliverable gates and the archive flow are exercised end to end. A
//! production slide engine replaces it behind the same trait.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::models::{Event, RunMode};

/// The artifact set produced for one run.
#[derive(Debug, Clone)]
pub struct RenderedBundle {
    pub deck_path: PathBuf,
    pub doc_path: PathBuf,
    pub digest_path: PathBuf,
    pub events_path: PathBuf,
}

impl RenderedBundle {
    pub fn all_paths(&self) -> [&Path; 4] {
        [
            &self.deck_path,
            &self.doc_path,
            &self.digest_path,
            &self.events_path,
        ]
    }
}

/// Render context handed to the engine; no global state.
#[derive(Debug, Clone)]
pub struct RenderContext {
    pub run_id: String,
    pub mode: RunMode,
    pub staging_dir: PathBuf,
}

/// The renderer seam. Implementations must treat the event list as frozen.
pub trait Renderer: Send + Sync {
    fn render(&self, events: &[Event], ctx: &RenderContext) -> Result<RenderedBundle>;
}

/// Deterministic template renderer; given identical events it emits
/// byte-identical files.
pub struct BundleRenderer;

impl Renderer for BundleRenderer {
    fn render(&self, events: &[Event], ctx: &RenderContext) -> Result<RenderedBundle> {
        fs::create_dir_all(&ctx.staging_dir)
            .with_context(|| format!("create {}", ctx.staging_dir.display()))?;

        let bundle = RenderedBundle {
            deck_path: ctx.staging_dir.join("executive_report.pptx"),
            doc_path: ctx.staging_dir.join("executive_report.docx"),
            digest_path: ctx.staging_dir.join("digest.md"),
            events_path: ctx.staging_dir.join("events.json"),
        };

        fs::write(&bundle.deck_path, deck_text(events, ctx))
            .with_context(|| format!("write {}", bundle.deck_path.display()))?;
        fs::write(&bundle.doc_path, doc_text(events))
            .with_context(|| format!("write {}", bundle.doc_path.display()))?;
        fs::write(&bundle.digest_path, digest_markdown(events))
            .with_context(|| format!("write {}", bundle.digest_path.display()))?;
        fs::write(&bundle.events_path, events_json(events)?)
            .with_context(|| format!("write {}", bundle.events_path.display()))?;

        Ok(bundle)
    }
}

/// One slide per event: headline, Q1/Q2, proof.
fn deck_text(events: &[Event], ctx: &RenderContext) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "EXECUTIVE BRIEF [{}] slides={}\n\n",
        ctx.mode.as_str(),
        events.len()
    ));
    for (i, event) in events.iter().enumerate() {
        out.push_str(&format!(
            "=== SLIDE {} [{}] ===\n{}\n{}\n{}\n{}\n\n",
            i + 1,
            event.bucket.as_str(),
            event.title,
            event.q1,
            event.q2,
            event.proof,
        ));
    }
    out
}

fn doc_text(events: &[Event]) -> String {
    let mut out = String::from("EXECUTIVE BRIEF (document)\n\n");
    for event in events {
        out.push_str(&format!(
            "## {}\n{}\n{}\n",
            event.title, event.q1, event.q2
        ));
        if let Some(q3) = &event.q3 {
            out.push_str(q3);
            out.push('\n');
        }
        out.push_str(&format!("{}\nSource: {}\n\n", event.proof, event.canonical_url));
    }
    out
}

fn digest_markdown(events: &[Event]) -> String {
    let mut out = String::from("# Daily Executive Brief\n\n");
    for event in events {
        out.push_str(&format!(
            "- **[{}]** [{}]({}) · score {:.1}\n",
            event.bucket.as_str(),
            event.title,
            event.canonical_url,
            event.final_score
        ));
    }
    out
}

fn events_json(events: &[Event]) -> Result<Vec<u8>> {
    #[derive(Serialize)]
    struct Envelope<'a> {
        schema_version: u32,
        events: &'a [Event],
    }
    Ok(serde_json::to_vec_pretty(&Envelope {
        schema_version: 1,
        events,
    })?)
}
