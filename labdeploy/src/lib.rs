//! # Labdeploy
//!
//! A deployment orchestrator for a small fixed-topology detection lab:
//! one logging host, one domain controller, one log-forwarding host, and
//! a configurable number of Windows workstations.
//!
//! Labdeploy sequences a set of opaque external collaborators through a
//! strictly sequential control loop:
//!
//! - **Environment probing**: detect which virtualization backends and
//!   orchestration plugins are installed
//! - **Preflight validation**: fail fast on conflicting state, missing
//!   tools, and bad versions before any expensive work begins
//! - **Artifact acquisition**: build VM images locally or download
//!   prebuilt ones, verified by checksum
//! - **Host bring-up**: per-host start with a single reload-and-reprovision
//!   retry, aborting the remaining sequence on a second failure
//! - **Post-deployment verification**: best-effort HTTP probes against
//!   known service endpoints
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use labdeploy::prelude::*;
//!
//! let config = RunConfig::new("/opt/lab")
//!     .with_backend(Backend::Virtualbox)
//!     .with_workstation_count(3);
//!
//! let summary = Driver::new(config).run().await;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod artifacts;
pub mod backend;
pub mod bringup;
pub mod collaborators;
pub mod config;
pub mod driver;
pub mod errors;
pub mod exec;
pub mod preflight;
pub mod prober;
pub mod remote;
pub mod report;
pub mod testing;
pub mod topofile;
pub mod topology;
pub mod verifier;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::artifacts::{
        AcquisitionMode, ArtifactProvider, ArtifactRecord,
    };
    pub use crate::backend::{Backend, ProviderSelection};
    pub use crate::bringup::{BringUpEngine, BuildOutcome, BuildStatus, HostState};
    pub use crate::collaborators::{EnvManager, ImageBuilder};
    pub use crate::config::{RunConfig, RunIdentity};
    pub use crate::driver::Driver;
    pub use crate::errors::{
        ArtifactError, DeployError, HostBringUpFailure, PrerequisiteMissing,
        Remediation, TopologyError, ValidationError,
    };
    pub use crate::exec::{CommandOutput, CommandRunner, CommandSpec, ProcessRunner};
    pub use crate::report::{RunSummary, Warning};
    pub use crate::topology::{HostRole, HostSpec, Topology};
    pub use crate::verifier::{ProbeResult, ProbeSpec, Verifier};
}
