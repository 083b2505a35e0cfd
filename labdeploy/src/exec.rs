//! External command execution seam.
//!
//! Every shell-out in the orchestrator goes through [`CommandRunner`], so
//! the control flow can be exercised in tests with scripted outputs instead
//! of real binaries.

use async_trait::async_trait;
use std::fmt::Debug;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

/// A fully specified external command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// The program to execute.
    pub program: PathBuf,
    /// Arguments, in order.
    pub args: Vec<String>,
    /// Working directory, if one is required.
    pub cwd: Option<PathBuf>,
}

impl CommandSpec {
    /// Creates a new command spec.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    /// Appends an argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets the working directory.
    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Renders the invocation as a single display line.
    #[must_use]
    pub fn display_line(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Captured result of a completed external command.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// The process exit signal (0 = success).
    pub exit_signal: i32,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// A successful empty output.
    #[must_use]
    pub fn ok() -> Self {
        Self::default()
    }

    /// A successful output with the given stdout.
    #[must_use]
    pub fn ok_with_stdout(stdout: impl Into<String>) -> Self {
        Self {
            exit_signal: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// A failed output with the given exit signal.
    #[must_use]
    pub fn failed(exit_signal: i32) -> Self {
        Self {
            exit_signal,
            ..Self::default()
        }
    }

    /// Returns true when the command exited zero.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.exit_signal == 0
    }
}

/// Trait for executing external commands.
///
/// Implementations block (await) until the child exits; the orchestrator
/// never proceeds past an invocation that has not returned.
#[async_trait]
pub trait CommandRunner: Send + Sync + Debug {
    /// Runs the command to completion, capturing its output.
    ///
    /// An `Err` means the command could not be started at all (binary
    /// missing, permission denied); a started command that exits non-zero
    /// is an `Ok` with a non-zero `exit_signal`.
    async fn run(&self, spec: &CommandSpec) -> std::io::Result<CommandOutput>;
}

/// [`CommandRunner`] backed by real child processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

impl ProcessRunner {
    /// Creates a new process runner.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, spec: &CommandSpec) -> std::io::Result<CommandOutput> {
        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(ref cwd) = spec.cwd {
            command.current_dir(cwd);
        }

        tracing::debug!(command = %spec.display_line(), "invoking external command");
        let output = command.output().await?;
        let result = CommandOutput {
            exit_signal: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        tracing::debug!(
            command = %spec.display_line(),
            exit_signal = result.exit_signal,
            "external command finished"
        );
        Ok(result)
    }
}
