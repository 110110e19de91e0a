//! JSONL persistence for per-cycle IOB snapshots.
//!
//! Snapshots are appended one JSON object per line with an exclusive file
//! lock, so several loop processes can share one log.

use aid_traits::CycleReporter;
use chrono::NaiveDateTime;
use eyre::WrapErr;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IobSnapshot {
    pub time: NaiveDateTime,
    pub iob_u: f64,
}

/// Appends IOB snapshots to a JSONL file.
pub struct JsonlIobSink {
    path: PathBuf,
}

impl JsonlIobSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn append(&self, snap: &IobSnapshot) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.lock_exclusive()?;

        let mut writer = std::io::BufWriter::new(&file);
        let line = serde_json::to_string(snap)?;
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        drop(writer);

        file.unlock()?;
        tracing::debug!(path = %self.path.display(), at = %snap.time, "appended IOB snapshot");
        Ok(())
    }
}

impl CycleReporter for JsonlIobSink {
    fn iob_snapshot(
        &mut self,
        at: NaiveDateTime,
        iob_u: f64,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.append(&IobSnapshot { time: at, iob_u })?;
        Ok(())
    }

    fn diagnostics(&mut self, at: NaiveDateTime, values: &[(&'static str, f64)]) {
        for (name, v) in values {
            tracing::debug!(%at, name, value = v, "diagnostic");
        }
    }
}

/// Read every snapshot from a JSONL log. Unparseable lines are skipped with
/// a warning.
pub fn read_snapshots(path: &Path) -> eyre::Result<Vec<IobSnapshot>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = File::open(path).wrap_err_with(|| format!("open IOB log {}", path.display()))?;
    file.lock_shared()?;

    let reader = BufReader::new(&file);
    let mut out = Vec::new();
    for (line_num, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<IobSnapshot>(&line) {
            Ok(s) => out.push(s),
            Err(e) => tracing::warn!(line = line_num + 1, error = %e, "skipping bad IOB snapshot"),
        }
    }

    file.unlock()?;
    Ok(out)
}
