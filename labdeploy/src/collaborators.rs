//! Thin typed wrappers over the two external tools the orchestrator drives:
//! the image builder and the environment manager.
//!
//! Both are opaque collaborators; the orchestrator only cares about their
//! exit signals and, for `status` and `plugin list`, their stdout.

use std::path::PathBuf;
use std::sync::Arc;

use crate::backend::Backend;
use crate::exec::{CommandOutput, CommandRunner, CommandSpec};

/// The external image builder (`packer`-style).
#[derive(Debug, Clone)]
pub struct ImageBuilder {
    runner: Arc<dyn CommandRunner>,
    executable: PathBuf,
    template_dir: PathBuf,
}

impl ImageBuilder {
    /// Creates a new image builder wrapper.
    #[must_use]
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        executable: impl Into<PathBuf>,
        template_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            runner,
            executable: executable.into(),
            template_dir: template_dir.into(),
        }
    }

    /// The directory the builder writes finished artifacts into.
    #[must_use]
    pub fn output_dir(&self) -> PathBuf {
        self.template_dir.join("output")
    }

    /// Builds one named template for the given backend.
    pub async fn build(
        &self,
        template: &str,
        backend: Backend,
    ) -> std::io::Result<CommandOutput> {
        let spec = CommandSpec::new(&self.executable)
            .arg("build")
            .arg(format!("-only={}", backend.build_target()))
            .arg(format!("{template}.json"))
            .current_dir(&self.template_dir);
        self.runner.run(&spec).await
    }
}

/// The external environment manager (`vagrant`-style).
#[derive(Debug, Clone)]
pub struct EnvManager {
    runner: Arc<dyn CommandRunner>,
    executable: PathBuf,
    env_dir: PathBuf,
}

impl EnvManager {
    /// Creates a new environment manager wrapper.
    #[must_use]
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        executable: impl Into<PathBuf>,
        env_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            runner,
            executable: executable.into(),
            env_dir: env_dir.into(),
        }
    }

    fn spec(&self) -> CommandSpec {
        CommandSpec::new(&self.executable).current_dir(&self.env_dir)
    }

    /// Reports the tool's version string.
    pub async fn version(&self) -> std::io::Result<CommandOutput> {
        self.runner.run(&self.spec().arg("--version")).await
    }

    /// Queries instance states.
    pub async fn status(&self) -> std::io::Result<CommandOutput> {
        self.runner.run(&self.spec().arg("status")).await
    }

    /// Starts one host with the selected backend.
    pub async fn up(&self, host: &str, backend: Backend) -> std::io::Result<CommandOutput> {
        let spec = self
            .spec()
            .arg("up")
            .arg(host)
            .arg("--provider")
            .arg(backend.provider_arg());
        self.runner.run(&spec).await
    }

    /// Reloads one host with a full reprovision cycle.
    pub async fn reload_provision(&self, host: &str) -> std::io::Result<CommandOutput> {
        let spec = self.spec().arg("reload").arg(host).arg("--provision");
        self.runner.run(&spec).await
    }

    /// Lists installed orchestration plugins.
    pub async fn plugin_list(&self) -> std::io::Result<CommandOutput> {
        self.runner.run(&self.spec().arg("plugin").arg("list")).await
    }

    /// Installs one orchestration plugin.
    pub async fn plugin_install(&self, name: &str) -> std::io::Result<CommandOutput> {
        let spec = self.spec().arg("plugin").arg("install").arg(name);
        self.runner.run(&spec).await
    }

    /// Runs one shell command on a Linux-class guest over the secure-shell
    /// channel.
    pub async fn ssh_exec(&self, host: &str, command: &str) -> std::io::Result<CommandOutput> {
        let spec = self.spec().arg("ssh").arg(host).arg("-c").arg(command);
        self.runner.run(&spec).await
    }

    /// Runs one command on a Windows-class guest over the remote-management
    /// channel.
    pub async fn winrm_exec(&self, host: &str, command: &str) -> std::io::Result<CommandOutput> {
        let spec = self.spec().arg("winrm").arg(host).arg("-c").arg(command);
        self.runner.run(&spec).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedRunner;

    #[tokio::test]
    async fn test_builder_invocation_shape() {
        let runner = Arc::new(ScriptedRunner::new());
        let builder = ImageBuilder::new(runner.clone(), "packer", "/lab/packer");

        builder
            .build("windows_10", Backend::Virtualbox)
            .await
            .expect("scripted runner never fails to start");

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0],
            "packer build -only=virtualbox-iso windows_10.json"
        );
    }

    #[tokio::test]
    async fn test_manager_up_invocation_shape() {
        let runner = Arc::new(ScriptedRunner::new());
        let manager = EnvManager::new(runner.clone(), "vagrant", "/lab/vagrant");

        manager
            .up("dc", Backend::Vmware)
            .await
            .expect("scripted runner never fails to start");

        assert_eq!(
            runner.calls(),
            vec!["vagrant up dc --provider vmware_desktop".to_string()]
        );
    }

    #[tokio::test]
    async fn test_manager_reload_invocation_shape() {
        let runner = Arc::new(ScriptedRunner::new());
        let manager = EnvManager::new(runner.clone(), "vagrant", "/lab/vagrant");

        manager
            .reload_provision("workstation-0")
            .await
            .expect("scripted runner never fails to start");

        assert_eq!(
            runner.calls(),
            vec!["vagrant reload workstation-0 --provision".to_string()]
        );
    }

    #[tokio::test]
    async fn test_manager_plugin_subcommands() {
        let runner = Arc::new(ScriptedRunner::new());
        let manager = EnvManager::new(runner.clone(), "vagrant", "/lab/vagrant");

        manager.plugin_list().await.expect("list");
        manager.plugin_install("vagrant-reload").await.expect("install");

        assert_eq!(
            runner.calls(),
            vec![
                "vagrant plugin list".to_string(),
                "vagrant plugin install vagrant-reload".to_string(),
            ]
        );
    }
}
