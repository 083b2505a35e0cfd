//! Run configuration and identity.
//!
//! Every component receives the context it needs explicitly; nothing in the
//! orchestrator depends on the process working directory or ambient
//! environment variables.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::backend::Backend;

/// Configuration for a single orchestrator run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// The lab working directory (templates, boxes, environment files).
    pub workdir: PathBuf,
    /// Pre-selected backend, if the operator chose one on the CLI.
    pub backend: Option<Backend>,
    /// Path to the image builder executable.
    pub builder_path: PathBuf,
    /// Path to the environment manager executable.
    pub manager_path: PathBuf,
    /// Download prebuilt artifacts instead of building them locally.
    pub download: bool,
    /// Number of workstation hosts to bring up.
    pub workstation_count: usize,
}

impl RunConfig {
    /// Creates a configuration rooted at the given working directory.
    #[must_use]
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
            backend: None,
            builder_path: PathBuf::from("packer"),
            manager_path: PathBuf::from("vagrant"),
            download: false,
            workstation_count: 1,
        }
    }

    /// Pre-selects a backend.
    #[must_use]
    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Sets the image builder executable path.
    #[must_use]
    pub fn with_builder_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.builder_path = path.into();
        self
    }

    /// Sets the environment manager executable path.
    #[must_use]
    pub fn with_manager_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.manager_path = path.into();
        self
    }

    /// Switches artifact acquisition to download mode.
    #[must_use]
    pub fn with_download(mut self, download: bool) -> Self {
        self.download = download;
        self
    }

    /// Sets the workstation count.
    #[must_use]
    pub fn with_workstation_count(mut self, count: usize) -> Self {
        self.workstation_count = count;
        self
    }

    /// The directory holding image builder templates.
    #[must_use]
    pub fn template_dir(&self) -> PathBuf {
        self.workdir.join("packer")
    }

    /// The canonical directory holding acquired artifacts.
    #[must_use]
    pub fn artifact_dir(&self) -> PathBuf {
        self.workdir.join("boxes")
    }

    /// The environment manager's directory.
    #[must_use]
    pub fn env_dir(&self) -> PathBuf {
        self.workdir.join("vagrant")
    }

    /// The environment manager's topology description file.
    #[must_use]
    pub fn description_path(&self) -> PathBuf {
        self.env_dir().join("Vagrantfile")
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self::new(Path::new("."))
    }
}

/// Identifies one orchestrator run.
///
/// The run id keys the topology description snapshot, so a later run can
/// tell which run produced the snapshot it is restoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunIdentity {
    /// Unique id for this run.
    pub run_id: Uuid,
    /// When the run started.
    pub started_at: DateTime<Utc>,
}

impl RunIdentity {
    /// Creates a fresh run identity.
    #[must_use]
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
        }
    }
}

impl Default for RunIdentity {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = RunConfig::new("/opt/lab");
        assert_eq!(config.builder_path, PathBuf::from("packer"));
        assert_eq!(config.workstation_count, 1);
        assert!(!config.download);
        assert!(config.backend.is_none());
    }

    #[test]
    fn test_config_builder() {
        let config = RunConfig::new("/opt/lab")
            .with_backend(Backend::Vmware)
            .with_builder_path("/usr/local/bin/packer")
            .with_download(true)
            .with_workstation_count(3);

        assert_eq!(config.backend, Some(Backend::Vmware));
        assert!(config.download);
        assert_eq!(config.workstation_count, 3);
    }

    #[test]
    fn test_derived_paths() {
        let config = RunConfig::new("/opt/lab");
        assert_eq!(config.artifact_dir(), PathBuf::from("/opt/lab/boxes"));
        assert_eq!(
            config.description_path(),
            PathBuf::from("/opt/lab/vagrant/Vagrantfile")
        );
    }

    #[test]
    fn test_run_identity_is_unique() {
        let a = RunIdentity::new();
        let b = RunIdentity::new();
        assert_ne!(a.run_id, b.run_id);
    }
}
