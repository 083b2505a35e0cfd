//! Run summary and warning reporting.
//!
//! Warnings are always surfaced but never change the exit status; only a
//! fatal error does that.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use crate::backend::Backend;
use crate::bringup::BuildOutcome;
use crate::verifier::ProbeResult;

/// Non-fatal conditions observed during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Warning {
    /// A filesystem has less free space than the recommended floor.
    LowDiskSpace {
        /// The filesystem checked.
        path: PathBuf,
        /// Free gigabytes observed.
        free_gb: u64,
    },
    /// A required tool is older than the tested minimum but still usable.
    OutdatedTool {
        /// The tool name.
        tool: String,
        /// The detected version.
        version: String,
    },
    /// A backend is installed but unusable without its companion plugin.
    PluginlessBackend {
        /// The affected backend.
        backend: Backend,
        /// The missing plugin.
        plugin: String,
    },
    /// A post-deployment probe did not observe its expected response.
    ProbeUnreachable {
        /// The probed endpoint.
        endpoint: String,
    },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LowDiskSpace { path, free_gb } => write!(
                f,
                "low disk space on {}: {free_gb} GB free",
                path.display()
            ),
            Self::OutdatedTool { tool, version } => {
                write!(f, "{tool} {version} is older than the tested minimum")
            }
            Self::PluginlessBackend { backend, plugin } => write!(
                f,
                "{backend} is installed but unusable without plugin '{plugin}'"
            ),
            Self::ProbeUnreachable { endpoint } => {
                write!(f, "service probe unreachable: {endpoint}")
            }
        }
    }
}

/// Aggregated outcome of one orchestrator run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// The run's unique id.
    pub run_id: Uuid,
    /// The backend used, once selected.
    pub backend: Option<Backend>,
    /// Per-host bring-up outcomes, in topology order.
    pub outcomes: Vec<BuildOutcome>,
    /// Probe results, in probe order.
    pub probes: Vec<ProbeResult>,
    /// Warnings accumulated across every component.
    pub warnings: Vec<Warning>,
    /// The fatal error message, if the run aborted.
    pub fatal: Option<String>,
    /// Remediation hint for the fatal error, if one exists.
    pub remediation: Option<String>,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub finished_at: DateTime<Utc>,
}

impl RunSummary {
    /// Creates an empty summary for a starting run.
    #[must_use]
    pub fn new(run_id: Uuid, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id,
            backend: None,
            outcomes: Vec::new(),
            probes: Vec::new(),
            warnings: Vec::new(),
            fatal: None,
            remediation: None,
            started_at,
            finished_at: started_at,
        }
    }

    /// True when no fatal condition was hit.
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        self.fatal.is_none()
    }

    /// Appends warnings from a component.
    pub fn extend_warnings(&mut self, warnings: impl IntoIterator<Item = Warning>) {
        self.warnings.extend(warnings);
    }

    /// Converts to dictionary.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("run_id".to_string(), serde_json::json!(self.run_id));
        map.insert(
            "backend".to_string(),
            serde_json::json!(self.backend.map(Backend::as_str)),
        );
        map.insert(
            "hosts_up".to_string(),
            serde_json::json!(self.outcomes.iter().filter(|o| o.is_success()).count()),
        );
        map.insert(
            "probes_reachable".to_string(),
            serde_json::json!(self.probes.iter().filter(|p| p.reachable).count()),
        );
        map.insert("warnings".to_string(), serde_json::json!(self.warnings.len()));
        map.insert("succeeded".to_string(), serde_json::json!(self.succeeded()));
        map
    }

    /// Renders the human-readable closing report.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("run {}\n", self.run_id));

        if let Some(backend) = self.backend {
            out.push_str(&format!("backend: {backend}\n"));
        }

        for outcome in &self.outcomes {
            let status = if outcome.is_success() { "up" } else { "FAILED" };
            out.push_str(&format!(
                "  {:<16} {status} (attempts: {})\n",
                outcome.host.name, outcome.attempts
            ));
        }

        for probe in &self.probes {
            let status = if probe.reachable { "reachable" } else { "unreachable" };
            out.push_str(&format!("  {:<40} {status}\n", probe.endpoint));
        }

        for warning in &self.warnings {
            out.push_str(&format!("warning: {warning}\n"));
        }

        match (&self.fatal, &self.remediation) {
            (Some(fatal), Some(hint)) => {
                out.push_str(&format!("fatal: {fatal}\n  hint: {hint}\n"));
            }
            (Some(fatal), None) => out.push_str(&format!("fatal: {fatal}\n")),
            (None, _) => out.push_str("deployment complete\n"),
        }

        out
    }
}
