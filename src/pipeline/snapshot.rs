//! Snapshots: Z0 supply fallback and canonical artifact protection.
//!
//! Two distinct safety nets share this module. The Z0 side persists the
//! last-good collection pool (`latest.jsonl` + `latest.meta.json`) and
//! restores it when a day's fetch comes back degraded. The artifact side
//! takes a per-run snapshot of the canonical deliverables before the run
//! touches anything, so a failed run can put the previous good files back.

use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::collectors::CollectionMeta;
use crate::models::RawItem;

/// Canonical deliverable file names under the output directory.
pub const CANONICAL_FILES: &[&str] = &["executive_report.pptx", "executive_report.docx"];

/// Meta for the supply_resilience gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupplyFallbackMeta {
    pub fallback_used: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_age_hours: Option<f64>,
    pub pool_total: usize,
}

fn z0_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("raw").join("z0")
}

/// Persist the pool as the new last-good snapshot.
pub fn persist_pool(data_dir: &Path, items: &[RawItem], meta: &CollectionMeta) -> Result<()> {
    let dir = z0_dir(data_dir);
    fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;

    let jsonl_tmp = dir.join("latest.jsonl.tmp");
    {
        let mut file = fs::File::create(&jsonl_tmp)
            .with_context(|| format!("create {}", jsonl_tmp.display()))?;
        for item in items {
            serde_json::to_writer(&mut file, item)?;
            file.write_all(b"\n")?;
        }
        file.sync_all()?;
    }
    fs::rename(&jsonl_tmp, dir.join("latest.jsonl"))?;

    let meta_tmp = dir.join("latest.meta.json.tmp");
    fs::write(&meta_tmp, serde_json::to_vec_pretty(meta)?)?;
    fs::rename(&meta_tmp, dir.join("latest.meta.json"))?;

    info!(items = items.len(), dir = %dir.display(), "Z0 pool persisted");
    Ok(())
}

/// Load the last-good pool; errors when no snapshot was ever stored.
pub fn load_pool(data_dir: &Path) -> Result<(Vec<RawItem>, CollectionMeta)> {
    let dir = z0_dir(data_dir);

    let meta_raw = fs::read_to_string(dir.join("latest.meta.json"))
        .with_context(|| format!("no stored Z0 snapshot under {}", dir.display()))?;
    let meta: CollectionMeta = serde_json::from_str(&meta_raw).context("unreadable Z0 meta")?;

    let file = fs::File::open(dir.join("latest.jsonl"))
        .with_context(|| format!("no stored Z0 pool under {}", dir.display()))?;
    let mut items = Vec::new();
    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let item: RawItem = serde_json::from_str(&line)
            .with_context(|| format!("corrupt Z0 pool line {}", line_no + 1))?;
        items.push(item);
    }
    Ok((items, meta))
}

/// Age of the stored snapshot in hours, if one exists.
pub fn snapshot_age_hours(data_dir: &Path) -> Option<f64> {
    let meta_raw = fs::read_to_string(z0_dir(data_dir).join("latest.meta.json")).ok()?;
    let meta: CollectionMeta = serde_json::from_str(&meta_raw).ok()?;
    Some((Utc::now() - meta.collected_at).num_minutes() as f64 / 60.0)
}

/// Pre-run snapshot of the canonical deliverables, keyed by run id so
/// concurrent verifier runs never clobber each other.
pub struct CanonicalSnapshot {
    out_dir: PathBuf,
    snapshot_dir: PathBuf,
    /// Canonical files that existed before the run started.
    preserved: Vec<String>,
}

impl CanonicalSnapshot {
    pub fn take(out_dir: &Path, run_id: &str) -> Result<Self> {
        let snapshot_dir = out_dir.join("snapshots").join(run_id);
        fs::create_dir_all(&snapshot_dir)
            .with_context(|| format!("create {}", snapshot_dir.display()))?;

        let mut preserved = Vec::new();
        for name in CANONICAL_FILES {
            let src = out_dir.join(name);
            if src.exists() {
                fs::copy(&src, snapshot_dir.join(name))
                    .with_context(|| format!("snapshot {}", src.display()))?;
                preserved.push((*name).to_string());
            }
        }

        Ok(Self {
            out_dir: out_dir.to_path_buf(),
            snapshot_dir,
            preserved,
        })
    }

    /// Put the pre-run canonical files back. Files that did not exist
    /// before the run are removed so a failed run leaves no half-promoted
    /// deliverable behind.
    pub fn restore(&self) -> Result<()> {
        for name in CANONICAL_FILES {
            let canonical = self.out_dir.join(name);
            if self.preserved.iter().any(|p| p == name) {
                fs::copy(self.snapshot_dir.join(name), &canonical)
                    .with_context(|| format!("restore {}", canonical.display()))?;
            } else if canonical.exists() {
                fs::remove_file(&canonical)
                    .with_context(|| format!("remove {}", canonical.display()))?;
            }
        }
        warn!(dir = %self.snapshot_dir.display(), "canonical artifacts restored from pre-run snapshot");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::z0::build_meta;
    use crate::models::{Platform, PublishedAtSource};

    fn item(id: &str) -> RawItem {
        RawItem {
            id: id.into(),
            source_name: "s".into(),
            platform: Platform::Rss,
            url: format!("https://example.com/{id}"),
            canonical_url: format!("https://example.com/{id}"),
            title: "t".into(),
            body: "b".into(),
            published_at: Utc::now(),
            published_at_source: PublishedAtSource::EntryField,
            lang: "en".into(),
            frontier: 50.0,
            needs_fulltext: false,
        }
    }

    #[test]
    fn pool_round_trips_through_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let items = vec![item("itm_1"), item("itm_2")];
        let meta = build_meta(&items, Utc::now(), vec![]);

        persist_pool(dir.path(), &items, &meta).unwrap();
        let (loaded, loaded_meta) = load_pool(dir.path()).unwrap();

        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].id, "itm_1");
        assert_eq!(loaded_meta.total_items, 2);
        assert!(snapshot_age_hours(dir.path()).unwrap() < 1.0);
    }

    #[test]
    fn missing_snapshot_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_pool(dir.path()).is_err());
        assert!(snapshot_age_hours(dir.path()).is_none());
    }

    #[test]
    fn restore_puts_previous_canonical_files_back() {
        let dir = tempfile::tempdir().unwrap();
        let deck = dir.path().join("executive_report.pptx");
        fs::write(&deck, b"good deck").unwrap();

        let snapshot = CanonicalSnapshot::take(dir.path(), "20260701_090000").unwrap();
        fs::write(&deck, b"degraded deck").unwrap();
        snapshot.restore().unwrap();

        assert_eq!(fs::read(&deck).unwrap(), b"good deck");
    }

    #[test]
    fn restore_removes_files_that_did_not_exist_before() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = CanonicalSnapshot::take(dir.path(), "20260701_090001").unwrap();

        let doc = dir.path().join("executive_report.docx");
        fs::write(&doc, b"half promoted").unwrap();
        snapshot.restore().unwrap();

        assert!(!doc.exists());
    }
}
