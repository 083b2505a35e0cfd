//! Virtualization backend selection and naming conventions.
//!
//! The two backends are mutually exclusive for a run. The choice fixes the
//! artifact file naming, the image builder's target filter, and the provider
//! argument handed to the environment manager.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The virtualization technology used to run lab hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Oracle VirtualBox.
    Virtualbox,
    /// VMware Workstation / Fusion.
    Vmware,
}

impl Backend {
    /// All supported backends, in detection order.
    pub const ALL: [Self; 2] = [Self::Virtualbox, Self::Vmware];

    /// The short name used in artifact files and CLI arguments.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Virtualbox => "virtualbox",
            Self::Vmware => "vmware",
        }
    }

    /// The provider argument accepted by the environment manager's `up`.
    #[must_use]
    pub const fn provider_arg(self) -> &'static str {
        match self {
            Self::Virtualbox => "virtualbox",
            Self::Vmware => "vmware_desktop",
        }
    }

    /// The target filter handed to the image builder's `build` subcommand.
    #[must_use]
    pub const fn build_target(self) -> &'static str {
        match self {
            Self::Virtualbox => "virtualbox-iso",
            Self::Vmware => "vmware-iso",
        }
    }

    /// The binary probed to decide whether this backend is installed.
    #[must_use]
    pub const fn detect_command(self) -> &'static str {
        match self {
            Self::Virtualbox => "VBoxManage",
            Self::Vmware => "vmrun",
        }
    }

    /// The orchestration plugin this backend cannot run without, if any.
    #[must_use]
    pub const fn companion_plugin(self) -> Option<&'static str> {
        match self {
            Self::Virtualbox => None,
            Self::Vmware => Some("vagrant-vmware-desktop"),
        }
    }

    /// The on-disk file name of a named artifact for this backend.
    #[must_use]
    pub fn artifact_file_name(self, artifact: &str) -> String {
        format!("{artifact}_{}.box", self.as_str())
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "virtualbox" | "vbox" => Ok(Self::Virtualbox),
            "vmware" | "vmware_desktop" => Ok(Self::Vmware),
            other => Err(format!("unknown backend '{other}'")),
        }
    }
}

/// The backend chosen for a run. Immutable for the run's duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSelection {
    /// The selected backend.
    pub backend: Backend,
}

impl ProviderSelection {
    /// Creates a new provider selection.
    #[must_use]
    pub const fn new(backend: Backend) -> Self {
        Self { backend }
    }
}
