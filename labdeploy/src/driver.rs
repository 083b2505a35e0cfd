//! Top-level run driver.
//!
//! Sequences the components strictly: probe, preflight, artifacts, topology
//! description, host bring-up, verification. The first fatal result
//! short-circuits the remaining steps; already-started hosts are left
//! running and no cleanup is attempted.

use chrono::Utc;
use std::sync::Arc;

use crate::artifacts::{
    AcquisitionMode, ArtifactFetcher, ArtifactProvider, ArtifactRecord, HttpFetcher,
};
use crate::bringup::BringUpEngine;
use crate::collaborators::{EnvManager, ImageBuilder};
use crate::config::{RunConfig, RunIdentity};
use crate::errors::DeployError;
use crate::exec::{CommandRunner, ProcessRunner};
use crate::preflight::Preflight;
use crate::prober::{BackendPrompt, Prober, StdinPrompt};
use crate::report::{RunSummary, Warning};
use crate::topofile::DescriptionStore;
use crate::topology::{self, HostRole, Topology};
use crate::verifier::{default_probes, InsecureHttpTransport, ProbeTransport, Verifier};

/// Orchestrates one full deployment run.
#[derive(Debug, Clone)]
pub struct Driver {
    config: RunConfig,
    runner: Arc<dyn CommandRunner>,
    fetcher: Arc<dyn ArtifactFetcher>,
    prompt: Arc<dyn BackendPrompt>,
    transport: Arc<dyn ProbeTransport>,
}

impl Driver {
    /// Creates a driver over the real external collaborators.
    #[must_use]
    pub fn new(config: RunConfig) -> Self {
        Self::with_collaborators(
            config,
            Arc::new(ProcessRunner::new()),
            Arc::new(HttpFetcher::new()),
            Arc::new(StdinPrompt),
            Arc::new(InsecureHttpTransport::new()),
        )
    }

    /// Creates a driver with injected collaborators.
    #[must_use]
    pub fn with_collaborators(
        config: RunConfig,
        runner: Arc<dyn CommandRunner>,
        fetcher: Arc<dyn ArtifactFetcher>,
        prompt: Arc<dyn BackendPrompt>,
        transport: Arc<dyn ProbeTransport>,
    ) -> Self {
        Self {
            config,
            runner,
            fetcher,
            prompt,
            transport,
        }
    }

    /// Runs the whole deployment, never panicking on fatal conditions.
    ///
    /// The returned summary carries the fatal error and its remediation
    /// hint when the run aborted; warnings never affect the outcome.
    pub async fn run(&self) -> RunSummary {
        let identity = RunIdentity::new();
        let mut summary = RunSummary::new(identity.run_id, identity.started_at);

        tracing::info!(run_id = %identity.run_id, "starting deployment run");
        if let Err(err) = self.execute(&identity, &mut summary).await {
            summary.remediation = err.remediation().map(|r| r.to_string());
            summary.fatal = Some(err.to_string());
            tracing::error!(error = %err, "deployment run aborted");
        }
        summary.finished_at = Utc::now();
        summary
    }

    async fn execute(
        &self,
        identity: &RunIdentity,
        summary: &mut RunSummary,
    ) -> Result<(), DeployError> {
        let manager = EnvManager::new(
            self.runner.clone(),
            &self.config.manager_path,
            self.config.env_dir(),
        );

        // Settle the backend for the run.
        let prober = Prober::new(self.runner.clone(), manager.clone());
        let (selection, warnings) = prober
            .probe(self.config.backend, self.prompt.as_ref())
            .await?;
        summary.backend = Some(selection.backend);
        summary.extend_warnings(warnings);

        let topology = topology::plan(self.config.workstation_count)?;

        // Front-load every fatal condition before artifact or host work.
        let preflight = Preflight::new(self.runner.clone(), manager.clone());
        let warnings = preflight.validate(&topology, &self.config).await?;
        summary.extend_warnings(warnings);

        // Acquire and verify images.
        let mode = if self.config.download {
            AcquisitionMode::Download
        } else {
            AcquisitionMode::Build
        };
        let builder = ImageBuilder::new(
            self.runner.clone(),
            &self.config.builder_path,
            self.config.template_dir(),
        );
        let provider = ArtifactProvider::new(
            mode,
            selection.backend,
            builder,
            self.fetcher.clone(),
            self.config.artifact_dir(),
        );
        let mut records = ArtifactRecord::for_backend(selection.backend);
        provider.ensure(&mut records).await?;

        // Reconcile the persisted topology description with the plan.
        let store = DescriptionStore::new(self.config.description_path());
        store.apply(self.config.workstation_count, identity.run_id)?;

        // The core loop.
        let engine = BringUpEngine::new(manager, selection.backend);
        let run = engine.run(&topology).await;
        summary.outcomes = run.outcomes.clone();
        if let Some(failure) = run.failure() {
            return Err(failure.into());
        }

        self.verify(&topology, summary).await;
        Ok(())
    }

    async fn verify(&self, topology: &Topology, summary: &mut RunSummary) {
        let Some(logger) = topology
            .host_with_role(HostRole::Logger)
            .and_then(|h| h.static_address)
        else {
            return;
        };

        let verifier = Verifier::new(self.transport.clone());
        let results = verifier.verify(&default_probes(logger)).await;
        for result in &results {
            if !result.reachable {
                summary.warnings.push(Warning::ProbeUnreachable {
                    endpoint: result.endpoint.clone(),
                });
            }
        }
        summary.probes = results;
    }
}
