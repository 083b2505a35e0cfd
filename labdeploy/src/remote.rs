//! Remote execution into guests: an ordered command list over a transport,
//! aborting on the first non-zero remote exit.
//!
//! In-guest provisioning (domain join, agent installs) lives behind this
//! boundary; the orchestrator only guarantees the sequencing contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::path::PathBuf;
use thiserror::Error;

use crate::collaborators::EnvManager;

/// How the channel reaches the guest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Transport {
    /// Secure-shell channel for Linux-class hosts, key-based auth.
    SecureShell {
        /// Remote user.
        user: String,
        /// Private key path.
        key_path: PathBuf,
    },
    /// Remote-management channel for Windows-class hosts, password auth.
    /// Certificate validation is disabled on this transport; lab guests
    /// present self-signed certificates.
    WinRm {
        /// Remote user.
        user: String,
        /// Remote password.
        password: String,
    },
}

/// An ordered provisioning plan for one guest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemotePlan {
    /// The guest host name.
    pub host: String,
    /// The transport to use.
    pub transport: Transport,
    /// Commands, executed strictly in order.
    pub commands: Vec<String>,
}

impl RemotePlan {
    /// Creates a plan with no commands.
    #[must_use]
    pub fn new(host: impl Into<String>, transport: Transport) -> Self {
        Self {
            host: host.into(),
            transport,
            commands: Vec::new(),
        }
    }

    /// Appends a command.
    #[must_use]
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.commands.push(command.into());
        self
    }
}

/// Error raised when a remote command exits non-zero or the channel fails.
#[derive(Debug, Clone, Error)]
#[error("remote command on '{host}' failed (exit signal {exit_signal}): {command}")]
pub struct RemoteError {
    /// The guest host name.
    pub host: String,
    /// The command that failed.
    pub command: String,
    /// The remote exit signal.
    pub exit_signal: i32,
}

/// Executes remote plans against guests.
#[async_trait]
pub trait RemoteChannel: Send + Sync + Debug {
    /// Runs the plan's commands in order, aborting on the first non-zero
    /// remote exit.
    async fn execute(&self, plan: &RemotePlan) -> Result<(), RemoteError>;
}

/// [`RemoteChannel`] that tunnels commands through the environment
/// manager's own remote subcommands.
#[derive(Debug, Clone)]
pub struct ManagerChannel {
    manager: EnvManager,
}

impl ManagerChannel {
    /// Creates a channel over the given environment manager.
    #[must_use]
    pub const fn new(manager: EnvManager) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl RemoteChannel for ManagerChannel {
    async fn execute(&self, plan: &RemotePlan) -> Result<(), RemoteError> {
        for command in &plan.commands {
            let result = match plan.transport {
                Transport::SecureShell { .. } => {
                    self.manager.ssh_exec(&plan.host, command).await
                }
                Transport::WinRm { .. } => self.manager.winrm_exec(&plan.host, command).await,
            };

            let output = result.map_err(|e| {
                tracing::error!(host = %plan.host, error = %e, "remote channel failed to start");
                RemoteError {
                    host: plan.host.clone(),
                    command: command.clone(),
                    exit_signal: -1,
                }
            })?;

            if !output.success() {
                return Err(RemoteError {
                    host: plan.host.clone(),
                    command: command.clone(),
                    exit_signal: output.exit_signal,
                });
            }
            tracing::debug!(host = %plan.host, command = %command, "remote command ok");
        }
        Ok(())
    }
}
