//! Host bring-up engine: the core control loop.
//!
//! Hosts are processed strictly in topology order, one at a time. Each host
//! gets at most two attempts: a plain `up`, then one reload-with-reprovision
//! retry. A second failure is terminal for the whole sequence, since
//! downstream hosts depend on the ones before them (workstations cannot
//! join a domain whose controller never came up).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::backend::Backend;
use crate::collaborators::EnvManager;
use crate::errors::HostBringUpFailure;
use crate::exec::CommandOutput;
use crate::topology::{HostSpec, Topology};

/// Per-host bring-up state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostState {
    /// Not yet attempted.
    Pending,
    /// First attempt failed; retry pending or in flight.
    FailedOnce,
    /// The host is up.
    Up,
    /// Both attempts failed; terminal.
    Failed,
}

/// Final status of a host's bring-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    /// The host came up (possibly on the retry).
    Success,
    /// Both attempts failed.
    Failed,
}

/// Terminal record of one host's bring-up. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildOutcome {
    /// The host this outcome describes.
    pub host: HostSpec,
    /// How many attempts were made (1 or 2, never more).
    pub attempts: u8,
    /// Whether the host came up.
    pub status: BuildStatus,
    /// Exit signal of the last attempt.
    pub exit_signal: i32,
    /// When the first attempt started.
    pub started_at: DateTime<Utc>,
    /// When the final attempt resolved.
    pub ended_at: DateTime<Utc>,
}

impl BuildOutcome {
    /// Returns true when the host came up.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.status, BuildStatus::Success)
    }

    /// The terminal state of the per-host state machine.
    #[must_use]
    pub const fn final_state(&self) -> HostState {
        match (self.status, self.attempts) {
            (BuildStatus::Success, _) => HostState::Up,
            (BuildStatus::Failed, _) => HostState::Failed,
        }
    }

    /// Duration of the whole bring-up, in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> f64 {
        (self.ended_at - self.started_at).num_milliseconds() as f64
    }

    /// Converts to dictionary.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("host".to_string(), serde_json::json!(self.host.name));
        map.insert("role".to_string(), serde_json::json!(self.host.role.to_string()));
        map.insert("attempts".to_string(), serde_json::json!(self.attempts));
        map.insert(
            "status".to_string(),
            serde_json::json!(match self.status {
                BuildStatus::Success => "success",
                BuildStatus::Failed => "failed",
            }),
        );
        map.insert("exit_signal".to_string(), serde_json::json!(self.exit_signal));
        map.insert("duration_ms".to_string(), serde_json::json!(self.duration_ms()));
        map
    }
}

/// Result of a full bring-up sequence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BringUpRun {
    /// One outcome per attempted host, in topology order.
    pub outcomes: Vec<BuildOutcome>,
}

impl BringUpRun {
    /// The terminal failure, if the sequence was aborted.
    #[must_use]
    pub fn failure(&self) -> Option<HostBringUpFailure> {
        self.outcomes
            .iter()
            .find(|o| !o.is_success())
            .map(|o| HostBringUpFailure::new(o.host.name.clone(), o.exit_signal))
    }

    /// True when every attempted host came up.
    #[must_use]
    pub fn all_up(&self) -> bool {
        self.outcomes.iter().all(BuildOutcome::is_success)
    }
}

/// Brings up hosts sequentially with a single retry-via-reload fallback.
#[derive(Debug, Clone)]
pub struct BringUpEngine {
    manager: EnvManager,
    backend: Backend,
}

impl BringUpEngine {
    /// Creates a new bring-up engine.
    #[must_use]
    pub const fn new(manager: EnvManager, backend: Backend) -> Self {
        Self { manager, backend }
    }

    /// Brings up every host in topology order.
    ///
    /// Stops at the first terminal failure; hosts after it are never
    /// attempted. Already-succeeded hosts are left running.
    pub async fn run(&self, topology: &Topology) -> BringUpRun {
        let mut run = BringUpRun::default();

        for host in topology.hosts() {
            let outcome = self.bring_up(host).await;
            let failed = !outcome.is_success();
            run.outcomes.push(outcome);
            if failed {
                tracing::error!(
                    host = %host.name,
                    "terminal bring-up failure, aborting remaining hosts"
                );
                break;
            }
        }

        run
    }

    /// Brings up one host, applying the retry state machine.
    ///
    /// A spawn failure (environment manager binary gone mid-run) is folded
    /// into a failed attempt with exit signal -1 rather than a separate
    /// error path.
    pub async fn bring_up(&self, host: &HostSpec) -> BuildOutcome {
        let started_at = Utc::now();

        tracing::info!(host = %host.name, role = %host.role, "bringing up host");
        let first = self.attempt_up(host).await;
        if first.success() {
            tracing::info!(host = %host.name, "host is up");
            return BuildOutcome {
                host: host.clone(),
                attempts: 1,
                status: BuildStatus::Success,
                exit_signal: first.exit_signal,
                started_at,
                ended_at: Utc::now(),
            };
        }

        // Pending -> FailedOnce: one reload-with-reprovision retry remains.
        tracing::warn!(
            host = %host.name,
            exit_signal = first.exit_signal,
            state = ?HostState::FailedOnce,
            "bring-up failed, retrying with reload and reprovision"
        );

        let second = self.attempt_reload(host).await;
        let status = if second.success() {
            tracing::info!(host = %host.name, "host recovered on retry");
            BuildStatus::Success
        } else {
            BuildStatus::Failed
        };

        BuildOutcome {
            host: host.clone(),
            attempts: 2,
            status,
            exit_signal: second.exit_signal,
            started_at,
            ended_at: Utc::now(),
        }
    }

    async fn attempt_up(&self, host: &HostSpec) -> CommandOutput {
        match self.manager.up(&host.name, self.backend).await {
            Ok(output) => output,
            Err(e) => {
                tracing::error!(host = %host.name, error = %e, "failed to start environment manager");
                CommandOutput::failed(-1)
            }
        }
    }

    async fn attempt_reload(&self, host: &HostSpec) -> CommandOutput {
        match self.manager.reload_provision(&host.name).await {
            Ok(output) => output,
            Err(e) => {
                tracing::error!(host = %host.name, error = %e, "failed to start environment manager");
                CommandOutput::failed(-1)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedRunner;
    use crate::topology::plan;
    use std::sync::Arc;

    fn engine_with(runner: Arc<ScriptedRunner>) -> BringUpEngine {
        let manager = EnvManager::new(runner, "vagrant", "/lab/vagrant");
        BringUpEngine::new(manager, Backend::Virtualbox)
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let runner = Arc::new(ScriptedRunner::new());
        let engine = engine_with(runner.clone());
        let host = HostSpec::new("logger", crate::topology::HostRole::Logger);

        let outcome = engine.bring_up(&host).await;
        assert!(outcome.is_success());
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.exit_signal, 0);
        assert_eq!(runner.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_retry_recovers_failed_host() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond("vagrant up dc", CommandOutput::failed(1));
        let engine = engine_with(runner.clone());
        let host = HostSpec::new("dc", crate::topology::HostRole::DomainController);

        let outcome = engine.bring_up(&host).await;
        assert!(outcome.is_success());
        assert_eq!(outcome.attempts, 2);
        assert_eq!(
            runner.calls(),
            vec![
                "vagrant up dc --provider virtualbox".to_string(),
                "vagrant reload dc --provision".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_second_failure_is_terminal() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond("vagrant up wef", CommandOutput::failed(1));
        runner.respond("vagrant reload wef", CommandOutput::failed(2));
        let engine = engine_with(runner);
        let host = HostSpec::new("wef", crate::topology::HostRole::Forwarder);

        let outcome = engine.bring_up(&host).await;
        assert!(!outcome.is_success());
        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.exit_signal, 2);
    }

    #[tokio::test]
    async fn test_attempts_never_exceed_two() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond("vagrant up logger", CommandOutput::failed(1));
        runner.respond("vagrant reload logger", CommandOutput::failed(1));
        let engine = engine_with(runner.clone());
        let host = HostSpec::new("logger", crate::topology::HostRole::Logger);

        let outcome = engine.bring_up(&host).await;
        assert!(outcome.attempts == 1 || outcome.attempts == 2);
        assert_eq!(runner.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_run_visits_hosts_in_topology_order() {
        let runner = Arc::new(ScriptedRunner::new());
        let engine = engine_with(runner.clone());
        let topology = plan(2).expect("plan");

        let run = engine.run(&topology).await;
        assert!(run.all_up());
        assert!(run.failure().is_none());

        let up_calls: Vec<String> = runner
            .calls()
            .into_iter()
            .filter(|c| c.contains(" up "))
            .collect();
        assert_eq!(
            up_calls,
            vec![
                "vagrant up logger --provider virtualbox",
                "vagrant up dc --provider virtualbox",
                "vagrant up wef --provider virtualbox",
                "vagrant up workstation-0 --provider virtualbox",
                "vagrant up workstation-1 --provider virtualbox",
            ]
        );
    }

    #[tokio::test]
    async fn test_failure_aborts_remaining_hosts() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond("vagrant up dc", CommandOutput::failed(1));
        runner.respond("vagrant reload dc", CommandOutput::failed(1));
        let engine = engine_with(runner.clone());
        let topology = plan(3).expect("plan");

        let run = engine.run(&topology).await;
        assert_eq!(run.outcomes.len(), 2); // logger + dc, nothing after
        assert!(run.failure().is_some());
        assert_eq!(run.failure().map(|f| f.host), Some("dc".to_string()));

        // No wef or workstation invocation ever happened.
        assert!(runner.calls().iter().all(|c| !c.contains("wef")));
        assert!(runner.calls().iter().all(|c| !c.contains("workstation")));
    }

    #[tokio::test]
    async fn test_final_state_mapping() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond("vagrant up dc", CommandOutput::failed(1));
        let engine = engine_with(runner);
        let host = HostSpec::new("dc", crate::topology::HostRole::DomainController);

        let outcome = engine.bring_up(&host).await;
        assert_eq!(outcome.final_state(), HostState::Up);
    }

    #[tokio::test]
    async fn test_spawn_failure_folds_into_failed_attempt() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.fail_to_start("vagrant");
        let engine = engine_with(runner);
        let host = HostSpec::new("logger", crate::topology::HostRole::Logger);

        let outcome = engine.bring_up(&host).await;
        assert!(!outcome.is_success());
        assert_eq!(outcome.exit_signal, -1);
    }
}
