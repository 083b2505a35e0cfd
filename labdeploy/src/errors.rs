//! Error types for the labdeploy orchestrator.
//!
//! The taxonomy mirrors the run's gates: prerequisite, validation, and
//! artifact errors abort the whole run before host bring-up begins; a host
//! bring-up failure aborts only the remaining hosts; probe failures are
//! never errors at all and surface as warnings in the run report.

use std::path::PathBuf;
use thiserror::Error;

use crate::backend::Backend;

/// The main error type for labdeploy operations.
///
/// Every fatal variant carries a [`Remediation`] so the operator sees a
/// specific next step rather than a bare failure code.
#[derive(Debug, Error)]
pub enum DeployError {
    /// No usable virtualization backend or plugin was found.
    #[error("{0}")]
    Prerequisite(#[from] PrerequisiteMissing),

    /// A fatal preflight condition was detected.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// An artifact could not be built, downloaded, or verified.
    #[error("{0}")]
    Artifact(#[from] ArtifactError),

    /// A host failed both its bring-up attempt and its reload retry.
    #[error("{0}")]
    BringUp(#[from] HostBringUpFailure),

    /// The planned topology violated a structural invariant.
    #[error("{0}")]
    Topology(#[from] TopologyError),

    /// The environment manager's topology description could not be
    /// rewritten or restored.
    #[error("{0}")]
    Description(#[from] DescriptionError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl DeployError {
    /// Returns the remediation hint for this error, if one exists.
    #[must_use]
    pub fn remediation(&self) -> Option<Remediation> {
        match self {
            Self::Prerequisite(e) => Some(e.remediation.clone()),
            Self::Validation(e) => Some(e.remediation()),
            Self::Artifact(e) => Some(e.remediation()),
            Self::BringUp(e) => Some(e.remediation()),
            Self::Topology(_) | Self::Description(_) | Self::Io(_) | Self::Http(_) => None,
        }
    }
}

/// A specific remediation hint attached to a fatal error.
#[derive(Debug, Clone)]
pub struct Remediation {
    /// Short summary of what went wrong.
    pub summary: String,
    /// The concrete step the operator should take.
    pub fix_hint: String,
}

impl Remediation {
    /// Creates a new remediation hint.
    #[must_use]
    pub fn new(summary: impl Into<String>, fix_hint: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            fix_hint: fix_hint.into(),
        }
    }
}

impl std::fmt::Display for Remediation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.summary, self.fix_hint)
    }
}

/// Error raised when no usable virtualization backend is available.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PrerequisiteMissing {
    /// The error message.
    pub message: String,
    /// The backend that was requested, if any.
    pub backend: Option<Backend>,
    /// Remediation hint.
    pub remediation: Remediation,
}

impl PrerequisiteMissing {
    /// Neither backend is installed on this host.
    #[must_use]
    pub fn no_backend() -> Self {
        Self {
            message: "no supported virtualization backend is installed".to_string(),
            backend: None,
            remediation: Remediation::new(
                "no backend found",
                "install VirtualBox or VMware Workstation/Fusion and re-run",
            ),
        }
    }

    /// The requested backend is not in the available set.
    #[must_use]
    pub fn backend_unavailable(backend: Backend) -> Self {
        Self {
            message: format!("requested backend '{backend}' is not available"),
            backend: Some(backend),
            remediation: Remediation::new(
                format!("backend '{backend}' unavailable"),
                "install the backend and its companion plugin, or pick the other \
                 backend with --provider",
            ),
        }
    }
}

/// Fatal preflight conditions.
///
/// Non-fatal conditions (low disk space, known-old-but-working tool
/// versions) are surfaced as [`crate::report::Warning`] values instead.
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    /// A required external binary is absent at its configured path.
    #[error("required tool '{tool}' not found at {path}")]
    ToolMissing {
        /// The tool name.
        tool: String,
        /// The path that was checked.
        path: PathBuf,
    },

    /// A known-bad version of a required tool was detected.
    #[error("tool '{tool}' version {version} is known to be incompatible")]
    VersionIncompatible {
        /// The tool name.
        tool: String,
        /// The detected version.
        version: String,
    },

    /// The environment manager reports instances that are not "not created".
    #[error("existing instances detected: {}", instances.join(", "))]
    InstancesAlreadyExist {
        /// Names of the offending instances.
        instances: Vec<String>,
    },

    /// A required orchestration plugin could not be installed.
    #[error("plugin '{plugin}' is missing and automatic installation failed")]
    PluginInstallFailed {
        /// The plugin name.
        plugin: String,
    },
}

impl ValidationError {
    /// Returns the remediation hint for this condition.
    #[must_use]
    pub fn remediation(&self) -> Remediation {
        match self {
            Self::ToolMissing { tool, path } => Remediation::new(
                format!("'{tool}' missing"),
                format!(
                    "install {tool} or pass its location explicitly \
                     (checked {})",
                    path.display()
                ),
            ),
            Self::VersionIncompatible { tool, version } => Remediation::new(
                format!("bad {tool} version"),
                format!("upgrade {tool} past {version} and re-run"),
            ),
            Self::InstancesAlreadyExist { instances } => Remediation::new(
                "stale environment present",
                format!(
                    "destroy the existing instances ({}) before deploying; \
                     adopting prior state is not supported",
                    instances.join(", ")
                ),
            ),
            Self::PluginInstallFailed { plugin } => Remediation::new(
                format!("plugin '{plugin}' unavailable"),
                format!("install the plugin manually: plugin install {plugin}"),
            ),
        }
    }
}

/// Error raised when an artifact cannot be acquired or verified.
#[derive(Debug, Clone, Error)]
#[error("artifact '{name}': {reason}")]
pub struct ArtifactError {
    /// The artifact name.
    pub name: String,
    /// Why acquisition failed.
    pub reason: ArtifactErrorReason,
}

/// The reason an artifact acquisition failed.
#[derive(Debug, Clone, Error)]
pub enum ArtifactErrorReason {
    /// The image builder exited non-zero.
    #[error("image build failed with exit signal {exit_signal}")]
    BuildFailed {
        /// The builder's exit signal.
        exit_signal: i32,
    },

    /// The expected file did not appear after a successful build.
    #[error("expected file missing after build: {path}")]
    MissingAfterBuild {
        /// The path that was checked.
        path: PathBuf,
    },

    /// A downloaded or pre-existing file did not match its checksum.
    #[error("checksum mismatch (expected {expected}, got {actual})")]
    ChecksumMismatch {
        /// The expected checksum.
        expected: String,
        /// The computed checksum.
        actual: String,
    },

    /// The download itself failed.
    #[error("download failed: {detail}")]
    DownloadFailed {
        /// Transport-level detail.
        detail: String,
    },
}

impl ArtifactError {
    /// Creates a new artifact error.
    #[must_use]
    pub fn new(name: impl Into<String>, reason: ArtifactErrorReason) -> Self {
        Self {
            name: name.into(),
            reason,
        }
    }

    /// Returns the remediation hint for this error.
    #[must_use]
    pub fn remediation(&self) -> Remediation {
        match &self.reason {
            ArtifactErrorReason::BuildFailed { .. } => Remediation::new(
                format!("build of '{}' failed", self.name),
                "inspect the image builder log above; re-run once the \
                 template builds cleanly",
            ),
            ArtifactErrorReason::MissingAfterBuild { path } => Remediation::new(
                format!("'{}' not produced", self.name),
                format!(
                    "the builder exited cleanly but {} is absent; check the \
                     template's output configuration",
                    path.display()
                ),
            ),
            ArtifactErrorReason::ChecksumMismatch { .. } => Remediation::new(
                format!("'{}' corrupt", self.name),
                "delete the local copy and re-run to download it again",
            ),
            ArtifactErrorReason::DownloadFailed { .. } => Remediation::new(
                format!("'{}' unreachable", self.name),
                "check network connectivity to the artifact mirror and re-run",
            ),
        }
    }
}

/// Error raised when a host fails both bring-up attempts.
#[derive(Debug, Clone, Error)]
#[error("host '{host}' failed to come up after retry (exit signal {exit_signal})")]
pub struct HostBringUpFailure {
    /// The host name.
    pub host: String,
    /// The exit signal of the final attempt.
    pub exit_signal: i32,
}

impl HostBringUpFailure {
    /// Creates a new bring-up failure.
    #[must_use]
    pub fn new(host: impl Into<String>, exit_signal: i32) -> Self {
        Self {
            host: host.into(),
            exit_signal,
        }
    }

    /// Returns the remediation hint for this failure.
    #[must_use]
    pub fn remediation(&self) -> Remediation {
        Remediation::new(
            format!("'{}' did not come up", self.host),
            format!(
                "inspect the environment manager output for '{}', destroy \
                 the partial environment, and re-run",
                self.host
            ),
        )
    }
}

/// Error raised when a topology violates a structural invariant.
#[derive(Debug, Clone, Error)]
pub enum TopologyError {
    /// At least one workstation is required.
    #[error("workstation count must be at least 1")]
    NoWorkstations,

    /// An infrastructure role appears an unexpected number of times.
    #[error("role '{role}' must appear exactly once, found {count}")]
    RoleCardinality {
        /// The role in question.
        role: String,
        /// How many hosts carry it.
        count: usize,
    },

    /// Two hosts share a name.
    #[error("duplicate host name '{name}'")]
    DuplicateName {
        /// The duplicated name.
        name: String,
    },
}

/// Error raised while rewriting or restoring the topology description.
#[derive(Debug, Clone, Error)]
pub enum DescriptionError {
    /// The workstation-count marker line was not found.
    #[error("workstation count marker not found in {path}")]
    MarkerMissing {
        /// The description file.
        path: PathBuf,
    },

    /// Filesystem failure while snapshotting or rewriting.
    #[error("description io failure on {path}: {detail}")]
    Io {
        /// The file involved.
        path: PathBuf,
        /// Underlying detail.
        detail: String,
    },
}
