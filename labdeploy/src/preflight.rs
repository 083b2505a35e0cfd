//! Preflight validator: front-loads every expensive failure before any
//! artifact or host work begins.
//!
//! Fatal conditions abort the run with a remediation hint; non-fatal
//! conditions are returned as warnings and never change the exit status.

use std::sync::Arc;

use crate::collaborators::EnvManager;
use crate::config::RunConfig;
use crate::errors::{DeployError, ValidationError};
use crate::exec::{CommandRunner, CommandSpec};
use crate::report::Warning;
use crate::topology::Topology;

/// Free-space threshold below which a warning is raised, in gigabytes.
const DISK_SPACE_FLOOR_GB: u64 = 80;

/// Orchestration plugins the run cannot proceed without.
const REQUIRED_PLUGINS: [&str; 1] = ["vagrant-reload"];

/// Environment manager versions that are known to break provisioning.
const KNOWN_BAD_VERSIONS: [&str; 2] = ["2.2.16", "2.2.17"];

/// Oldest version known to work; older ones get a warning, not an abort.
const MINIMUM_GOOD_VERSION: (u32, u32, u32) = (2, 2, 9);

/// Validates the environment before any artifact or host work.
#[derive(Debug, Clone)]
pub struct Preflight {
    runner: Arc<dyn CommandRunner>,
    manager: EnvManager,
}

impl Preflight {
    /// Creates a new preflight validator.
    #[must_use]
    pub fn new(runner: Arc<dyn CommandRunner>, manager: EnvManager) -> Self {
        Self { runner, manager }
    }

    /// Runs every check in order.
    ///
    /// Returns accumulated warnings on success; the first fatal condition
    /// aborts with a [`ValidationError`].
    pub async fn validate(
        &self,
        topology: &Topology,
        config: &RunConfig,
    ) -> Result<Vec<Warning>, DeployError> {
        let mut warnings = Vec::new();
        tracing::debug!(planned_hosts = topology.len(), "running preflight checks");

        self.check_builder_present(config).await?;
        self.check_manager_version(config, &mut warnings).await?;
        self.check_no_existing_instances().await?;
        self.check_disk_space(config, &mut warnings).await;
        self.check_plugins().await?;

        Ok(warnings)
    }

    async fn check_builder_present(&self, config: &RunConfig) -> Result<(), DeployError> {
        let spec = CommandSpec::new(&config.builder_path).arg("--version");
        match self.runner.run(&spec).await {
            Ok(output) if output.success() => Ok(()),
            _ => Err(ValidationError::ToolMissing {
                tool: "packer".to_string(),
                path: config.builder_path.clone(),
            }
            .into()),
        }
    }

    async fn check_manager_version(
        &self,
        config: &RunConfig,
        warnings: &mut Vec<Warning>,
    ) -> Result<(), DeployError> {
        let output = match self.manager.version().await {
            Ok(output) if output.success() => output,
            _ => {
                return Err(ValidationError::ToolMissing {
                    tool: "vagrant".to_string(),
                    path: config.manager_path.clone(),
                }
                .into())
            }
        };

        let Some(version) = extract_version(&output.stdout) else {
            tracing::debug!(stdout = %output.stdout, "could not parse manager version");
            return Ok(());
        };

        if KNOWN_BAD_VERSIONS.contains(&version.as_str()) {
            return Err(ValidationError::VersionIncompatible {
                tool: "vagrant".to_string(),
                version,
            }
            .into());
        }

        if let Some(parsed) = parse_version(&version) {
            if parsed < MINIMUM_GOOD_VERSION {
                tracing::warn!(%version, "manager version is older than the tested minimum");
                warnings.push(Warning::OutdatedTool {
                    tool: "vagrant".to_string(),
                    version,
                });
            }
        }

        Ok(())
    }

    async fn check_no_existing_instances(&self) -> Result<(), DeployError> {
        let output = self.manager.status().await?;
        if !output.success() {
            // No environment dir yet means no instances either.
            tracing::debug!(exit_signal = output.exit_signal, "status query failed, assuming clean");
            return Ok(());
        }

        let existing = existing_instances(&output.stdout);
        if existing.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::InstancesAlreadyExist { instances: existing }.into())
        }
    }

    async fn check_disk_space(&self, config: &RunConfig, warnings: &mut Vec<Warning>) {
        let spec = CommandSpec::new("df")
            .arg("-k")
            .arg(config.workdir.display().to_string());
        let Ok(output) = self.runner.run(&spec).await else {
            tracing::debug!("df unavailable, skipping disk space check");
            return;
        };
        if !output.success() {
            return;
        }

        if let Some(free_gb) = parse_df_available_gb(&output.stdout) {
            if free_gb < DISK_SPACE_FLOOR_GB {
                tracing::warn!(free_gb, floor_gb = DISK_SPACE_FLOOR_GB, "low disk space");
                warnings.push(Warning::LowDiskSpace {
                    path: config.workdir.clone(),
                    free_gb,
                });
            }
        }
    }

    async fn check_plugins(&self) -> Result<(), DeployError> {
        let listed = self.manager.plugin_list().await?;
        let installed: Vec<&str> = listed
            .stdout
            .lines()
            .filter_map(|line| line.split_whitespace().next())
            .collect();

        for plugin in REQUIRED_PLUGINS {
            if installed.contains(&plugin) {
                continue;
            }
            tracing::info!(plugin, "required plugin missing, attempting installation");
            let install = self.manager.plugin_install(plugin).await?;
            if !install.success() {
                return Err(ValidationError::PluginInstallFailed {
                    plugin: plugin.to_string(),
                }
                .into());
            }
        }

        Ok(())
    }
}

/// Pulls a dotted version number out of a `--version` banner.
fn extract_version(stdout: &str) -> Option<String> {
    stdout
        .split_whitespace()
        .find(|token| token.chars().next().is_some_and(|c| c.is_ascii_digit()))
        .map(|token| token.trim_end_matches(|c: char| !c.is_ascii_digit()).to_string())
}

fn parse_version(version: &str) -> Option<(u32, u32, u32)> {
    let mut parts = version.split('.').map(str::parse::<u32>);
    Some((
        parts.next()?.ok()?,
        parts.next()?.ok()?,
        parts.next().and_then(Result::ok).unwrap_or(0),
    ))
}

/// Finds every instance the status output reports in any state other than
/// "not created".
///
/// Deliberately not limited to the planned topology: a stale instance left
/// over from a run with a different workstation count is just as fatal,
/// since the engine does not support adopting pre-existing state.
fn existing_instances(stdout: &str) -> Vec<String> {
    let mut existing = Vec::new();
    for line in stdout.lines() {
        let Some((name, state)) = parse_status_line(line) else {
            continue;
        };
        if state != "not created" {
            existing.push(name.to_string());
        }
    }
    existing
}

/// Splits an instance status line into `(name, state)`.
///
/// Instance lines are shaped `<name> <state> (<provider>)`; the header and
/// trailing help prose do not end in a parenthesized provider and are
/// ignored.
fn parse_status_line(line: &str) -> Option<(&str, String)> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let (&provider, rest) = tokens.split_last()?;
    if !(provider.starts_with('(') && provider.ends_with(')')) {
        return None;
    }
    let (&name, state) = rest.split_first()?;
    if state.is_empty() {
        return None;
    }
    Some((name, state.join(" ")))
}

/// Parses the "Available" column (KiB) of `df -k` output into gigabytes.
fn parse_df_available_gb(stdout: &str) -> Option<u64> {
    let line = stdout.lines().nth(1)?;
    let available_kb: u64 = line.split_whitespace().nth(3)?.parse().ok()?;
    Some(available_kb / (1024 * 1024))
}
