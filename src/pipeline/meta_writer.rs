//! Atomic meta writer.
//!
//! Single owner of every `*.meta.json` write. Files land via tmp + fsync +
//! rename so a crashed run never leaves a torn meta file, and each gate file
//! is write-once per run: a second write to the same name is a bug upstream
//! and fails loudly.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

pub struct MetaWriter {
    out_dir: PathBuf,
    written: Mutex<HashSet<String>>,
}

impl MetaWriter {
    pub fn new<P: AsRef<Path>>(out_dir: P) -> Result<Self> {
        let out_dir = out_dir.as_ref().to_path_buf();
        fs::create_dir_all(&out_dir)
            .with_context(|| format!("failed to create output dir {}", out_dir.display()))?;
        Ok(Self {
            out_dir,
            written: Mutex::new(HashSet::new()),
        })
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Write one meta file, exactly once per run.
    pub fn write_json<T: Serialize>(&self, file_name: &str, value: &T) -> Result<PathBuf> {
        {
            let mut written = self.written.lock();
            if !written.insert(file_name.to_string()) {
                bail!("meta file written twice in one run: {file_name}");
            }
        }
        let payload =
            serde_json::to_vec_pretty(value).with_context(|| format!("serialize {file_name}"))?;
        let path = self.atomic_write(file_name, &payload)?;
        debug!(file = file_name, "meta written");
        Ok(path)
    }

    /// Write a human-readable text artifact; overwriting is allowed (the
    /// run summary is rewritten every run by design).
    pub fn write_text(&self, file_name: &str, content: &str) -> Result<PathBuf> {
        self.atomic_write(file_name, content.as_bytes())
    }

    fn atomic_write(&self, file_name: &str, payload: &[u8]) -> Result<PathBuf> {
        let final_path = self.out_dir.join(file_name);
        let tmp_path = self.out_dir.join(format!("{file_name}.tmp"));

        {
            let mut file = File::create(&tmp_path)
                .with_context(|| format!("create {}", tmp_path.display()))?;
            file.write_all(payload)
                .with_context(|| format!("write {}", tmp_path.display()))?;
            file.sync_all()
                .with_context(|| format!("fsync {}", tmp_path.display()))?;
        }
        fs::rename(&tmp_path, &final_path)
            .with_context(|| format!("rename into {}", final_path.display()))?;
        Ok(final_path)
    }
}
