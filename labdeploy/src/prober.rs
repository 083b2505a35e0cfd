//! Environment prober: detects installed virtualization backends and
//! orchestration plugins, then settles the provider selection for the run.

use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::backend::{Backend, ProviderSelection};
use crate::collaborators::EnvManager;
use crate::errors::{DeployError, PrerequisiteMissing};
use crate::exec::{CommandRunner, CommandSpec};
use crate::report::Warning;

/// Asks the operator which backend to use when none was pre-selected.
///
/// A seam so tests never block on stdin. Returning `Ok(None)` means the
/// input was not a valid choice and the prober should ask again.
#[async_trait]
pub trait BackendPrompt: Send + Sync + Debug {
    /// Prompts for one choice from the available set.
    async fn choose(&self, available: &[Backend]) -> std::io::Result<Option<Backend>>;
}

/// [`BackendPrompt`] reading from standard input.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinPrompt;

#[async_trait]
impl BackendPrompt for StdinPrompt {
    async fn choose(&self, available: &[Backend]) -> std::io::Result<Option<Backend>> {
        let options: Vec<&str> = available.iter().map(|b| b.as_str()).collect();
        println!("Which backend would you like to use? [{}]", options.join("/"));

        let mut line = String::new();
        let mut reader = BufReader::new(tokio::io::stdin());
        reader.read_line(&mut line).await?;
        Ok(line.trim().parse::<Backend>().ok())
    }
}

/// Detects which backends are usable and settles the selection.
#[derive(Debug, Clone)]
pub struct Prober {
    runner: Arc<dyn CommandRunner>,
    manager: EnvManager,
}

impl Prober {
    /// Creates a new prober.
    #[must_use]
    pub fn new(runner: Arc<dyn CommandRunner>, manager: EnvManager) -> Self {
        Self { runner, manager }
    }

    /// Probes installed backends and returns the selection for this run.
    ///
    /// A pre-selected backend is validated against the available set; with
    /// no pre-selection the prompt loops until a valid choice is made.
    pub async fn probe(
        &self,
        preselected: Option<Backend>,
        prompt: &dyn BackendPrompt,
    ) -> Result<(ProviderSelection, Vec<Warning>), DeployError> {
        let mut warnings = Vec::new();
        let mut available = Vec::new();

        let installed_plugins = self.installed_plugins().await;

        for backend in Backend::ALL {
            if !self.backend_installed(backend).await {
                tracing::debug!(%backend, "backend not installed");
                continue;
            }
            if let Some(plugin) = backend.companion_plugin() {
                if !installed_plugins.iter().any(|p| p == plugin) {
                    tracing::warn!(%backend, plugin, "backend present but companion plugin missing");
                    warnings.push(Warning::PluginlessBackend {
                        backend,
                        plugin: plugin.to_string(),
                    });
                    continue;
                }
            }
            available.push(backend);
        }

        if available.is_empty() {
            return Err(PrerequisiteMissing::no_backend().into());
        }

        if let Some(backend) = preselected {
            if !available.contains(&backend) {
                return Err(PrerequisiteMissing::backend_unavailable(backend).into());
            }
            tracing::info!(%backend, "using pre-selected backend");
            return Ok((ProviderSelection::new(backend), warnings));
        }

        loop {
            if let Some(choice) = prompt.choose(&available).await? {
                if available.contains(&choice) {
                    tracing::info!(backend = %choice, "backend selected interactively");
                    return Ok((ProviderSelection::new(choice), warnings));
                }
                tracing::warn!(backend = %choice, "selected backend is not available");
            }
        }
    }

    async fn backend_installed(&self, backend: Backend) -> bool {
        let spec = CommandSpec::new(backend.detect_command()).arg("--version");
        match self.runner.run(&spec).await {
            Ok(output) => output.success(),
            Err(_) => false,
        }
    }

    async fn installed_plugins(&self) -> Vec<String> {
        match self.manager.plugin_list().await {
            Ok(output) if output.success() => output
                .stdout
                .lines()
                .filter_map(|line| line.split_whitespace().next())
                .map(ToString::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::CommandOutput;
    use crate::testing::{ScriptedPrompt, ScriptedRunner};

    fn prober_with(runner: Arc<ScriptedRunner>) -> Prober {
        let manager = EnvManager::new(runner.clone(), "vagrant", "/lab/vagrant");
        Prober::new(runner, manager)
    }

    #[tokio::test]
    async fn test_no_backend_installed_is_fatal() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.fail_to_start("VBoxManage");
        runner.fail_to_start("vmrun");

        let prober = prober_with(runner);
        let result = prober.probe(Some(Backend::Virtualbox), &ScriptedPrompt::empty()).await;
        assert!(matches!(
            result,
            Err(DeployError::Prerequisite(PrerequisiteMissing { backend: None, .. }))
        ));
    }

    #[tokio::test]
    async fn test_preselected_backend_validated() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.fail_to_start("vmrun");
        runner.respond("vagrant plugin list", CommandOutput::ok_with_stdout("vagrant-reload (1.0.0)\n"));

        let prober = prober_with(runner);
        let (selection, warnings) = prober
            .probe(Some(Backend::Virtualbox), &ScriptedPrompt::empty())
            .await
            .expect("virtualbox is available");
        assert_eq!(selection.backend, Backend::Virtualbox);
        assert!(warnings.is_empty());
    }

    #[tokio::test]
    async fn test_preselected_unavailable_backend_is_fatal() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.fail_to_start("vmrun");

        let prober = prober_with(runner);
        let result = prober.probe(Some(Backend::Vmware), &ScriptedPrompt::empty()).await;
        assert!(matches!(
            result,
            Err(DeployError::Prerequisite(PrerequisiteMissing {
                backend: Some(Backend::Vmware),
                ..
            }))
        ));
    }

    #[tokio::test]
    async fn test_backend_without_companion_plugin_excluded_with_warning() {
        let runner = Arc::new(ScriptedRunner::new());
        // Both detect commands succeed, but the plugin list lacks the
        // vmware companion plugin.
        runner.respond("vagrant plugin list", CommandOutput::ok_with_stdout("vagrant-reload (1.0.0)\n"));

        let prober = prober_with(runner);
        let result = prober.probe(Some(Backend::Vmware), &ScriptedPrompt::empty()).await;
        assert!(result.is_err());

        let (selection, warnings) = prober
            .probe(Some(Backend::Virtualbox), &ScriptedPrompt::empty())
            .await
            .expect("virtualbox needs no plugin");
        assert_eq!(selection.backend, Backend::Virtualbox);
        assert!(warnings
            .iter()
            .any(|w| matches!(w, Warning::PluginlessBackend { backend: Backend::Vmware, .. })));
    }

    #[tokio::test]
    async fn test_interactive_selection_loops_until_valid() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.fail_to_start("vmrun");

        let prober = prober_with(runner);
        // First answer invalid (None), second answer unavailable, third valid.
        let prompt = ScriptedPrompt::with_answers(vec![
            None,
            Some(Backend::Vmware),
            Some(Backend::Virtualbox),
        ]);

        let (selection, _) = prober.probe(None, &prompt).await.expect("eventually valid");
        assert_eq!(selection.backend, Backend::Virtualbox);
        assert_eq!(prompt.asked(), 3);
    }
}
