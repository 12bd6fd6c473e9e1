//! Snapshot persistence for the monitor's queues

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use webmon::QueueKind;
use webmoncache::{ImportSummary, WebMonitor};

const QUEUES: [QueueKind; 2] = [QueueKind::Domains, QueueKind::Searches];

/// Directory holding one snapshot file per queue
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Path of the snapshot file for one queue
    pub fn path(&self, kind: QueueKind) -> PathBuf {
        self.dir.join(format!("{}.snapshot", kind))
    }

    /// Write every queue's report to disk.
    ///
    /// Each file is written to a temporary name and renamed into place, so a
    /// crash mid-write leaves the previous snapshot intact.
    pub fn save(&self, monitor: &WebMonitor) -> Result<()> {
        fs::create_dir_all(&self.dir).context("Failed to create snapshot directory")?;

        for kind in QUEUES {
            let path = self.path(kind);
            let tmp = path.with_extension("snapshot.tmp");
            let report = monitor.report(kind);

            fs::write(&tmp, report.as_bytes())
                .with_context(|| format!("Failed to write snapshot: {:?}", tmp))?;
            fs::rename(&tmp, &path)
                .with_context(|| format!("Failed to move snapshot into place: {:?}", path))?;

            info!(queue = %kind, entries = monitor.len(kind), "Snapshot saved to {:?}", path);
        }

        Ok(())
    }

    /// Restore every queue that has a snapshot on disk, keeping the
    /// monitor's configured capacities. Missing files are skipped.
    pub fn load(&self, monitor: &WebMonitor) -> Result<Vec<(QueueKind, ImportSummary)>> {
        let config = monitor.config();
        let mut restored = Vec::new();

        for kind in QUEUES {
            let path = self.path(kind);
            if !path.exists() {
                continue;
            }

            let text = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read snapshot: {:?}", path))?;
            let capacity = config.capacity(kind).get() as i64;
            let summary = monitor.import(kind, &text, capacity)?;

            info!(
                queue = %kind,
                imported = summary.imported,
                skipped = summary.skipped,
                "Snapshot restored from {:?}",
                path
            );
            restored.push((kind, summary));
        }

        Ok(restored)
    }
}
