//! Versioned access to the environment manager's topology description file.
//!
//! Scaling the workstation range means rewriting the persisted description.
//! The store snapshots the original first (snapshot named by run identity),
//! writes atomically via temp-then-rename, and restores the prior snapshot
//! at the start of any later run, so a run always starts from the pristine
//! description and never layers two rewrites.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::errors::DescriptionError;

/// Marker line holding the workstation range in the description file.
const COUNT_MARKER: &str = "WORKSTATION_COUNT = ";

/// Suffix distinguishing snapshots from the live description.
const SNAPSHOT_SUFFIX: &str = ".snapshot";

/// Manages the description file and its one prior snapshot.
#[derive(Debug, Clone)]
pub struct DescriptionStore {
    path: PathBuf,
}

impl DescriptionStore {
    /// Creates a store over the given description file.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The live description file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Applies the workstation count for this run.
    ///
    /// Always restores a prior run's snapshot first. A count of 1 leaves
    /// the description in its original form; a larger count snapshots the
    /// original under this run's id and rewrites the range marker. The file
    /// is never left in a partially edited state.
    pub fn apply(&self, workstation_count: usize, run_id: Uuid) -> Result<(), DescriptionError> {
        self.restore_prior()?;

        if workstation_count <= 1 {
            return Ok(());
        }

        let original = fs::read_to_string(&self.path).map_err(|e| self.io_err(&self.path, &e))?;
        let rewritten = rewrite_content(&original, workstation_count)
            .ok_or_else(|| DescriptionError::MarkerMissing {
                path: self.path.clone(),
            })?;

        let snapshot = self.snapshot_path(run_id);
        write_atomic(&snapshot, &original).map_err(|e| self.io_err(&snapshot, &e))?;
        write_atomic(&self.path, &rewritten).map_err(|e| self.io_err(&self.path, &e))?;

        tracing::info!(
            path = %self.path.display(),
            workstation_count,
            snapshot = %snapshot.display(),
            "rewrote topology description"
        );
        Ok(())
    }

    /// Restores the snapshot left by a prior run, if one exists.
    ///
    /// Returns true when a snapshot was restored. All snapshots are removed
    /// afterwards; only one should ever exist.
    pub fn restore_prior(&self) -> Result<bool, DescriptionError> {
        let snapshots = self.find_snapshots()?;
        let Some(latest) = snapshots.last() else {
            return Ok(false);
        };

        let content = fs::read_to_string(latest).map_err(|e| self.io_err(latest, &e))?;
        write_atomic(&self.path, &content).map_err(|e| self.io_err(&self.path, &e))?;

        for snapshot in &snapshots {
            fs::remove_file(snapshot).map_err(|e| self.io_err(snapshot, &e))?;
        }

        tracing::info!(path = %self.path.display(), "restored prior topology description");
        Ok(true)
    }

    fn snapshot_path(&self, run_id: Uuid) -> PathBuf {
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.path
            .with_file_name(format!("{file_name}.{run_id}{SNAPSHOT_SUFFIX}"))
    }

    /// Snapshots sorted oldest-first by modification time.
    fn find_snapshots(&self) -> Result<Vec<PathBuf>, DescriptionError> {
        let Some(dir) = self.path.parent() else {
            return Ok(Vec::new());
        };
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let file_prefix = self
            .path
            .file_name()
            .map(|n| {
                let mut p = n.to_string_lossy().into_owned();
                p.push('.');
                p
            })
            .unwrap_or_default();

        let entries = fs::read_dir(dir).map_err(|e| self.io_err(dir, &e))?;
        let mut snapshots: Vec<(std::time::SystemTime, PathBuf)> = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| self.io_err(dir, &e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(&file_prefix) && name.ends_with(SNAPSHOT_SUFFIX) {
                let modified = entry
                    .metadata()
                    .and_then(|m| m.modified())
                    .unwrap_or(std::time::UNIX_EPOCH);
                snapshots.push((modified, entry.path()));
            }
        }
        snapshots.sort();
        Ok(snapshots.into_iter().map(|(_, p)| p).collect())
    }

    fn io_err(&self, path: &Path, err: &io::Error) -> DescriptionError {
        DescriptionError::Io {
            path: path.to_path_buf(),
            detail: err.to_string(),
        }
    }
}

/// Rewrites the workstation range marker, preserving everything else.
///
/// Returns `None` when no marker line exists.
fn rewrite_content(content: &str, workstation_count: usize) -> Option<String> {
    let mut found = false;
    let mut lines: Vec<String> = Vec::new();

    for line in content.lines() {
        if line.trim_start().starts_with(COUNT_MARKER) {
            let indent: String = line.chars().take_while(|c| c.is_whitespace()).collect();
            lines.push(format!("{indent}{COUNT_MARKER}{workstation_count}"));
            found = true;
        } else {
            lines.push(line.to_string());
        }
    }

    if !found {
        return None;
    }

    let mut rewritten = lines.join("\n");
    if content.ends_with('\n') {
        rewritten.push('\n');
    }
    Some(rewritten)
}

/// Writes via a sibling temp file and rename, so readers never observe a
/// half-written description.
fn write_atomic(path: &Path, content: &str) -> io::Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{file_name}.tmp"));
    fs::write(&tmp, content)?;
    fs::rename(&tmp, path)
}
