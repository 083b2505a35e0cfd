//! Mock collaborators for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::Path;

use crate::artifacts::ArtifactFetcher;
use crate::backend::Backend;
use crate::exec::{CommandOutput, CommandRunner, CommandSpec};
use crate::prober::BackendPrompt;
use crate::verifier::{ProbeResponse, ProbeTransport};

/// A [`CommandRunner`] that records every invocation and answers from
/// scripted responses.
///
/// Responses are keyed by substring match against the rendered command
/// line, consumed in order; unmatched commands succeed with empty output.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    calls: Mutex<Vec<CommandSpec>>,
    responses: Mutex<Vec<(String, VecDeque<CommandOutput>)>>,
    start_failures: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    /// Creates a runner where every command succeeds by default.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a response for command lines containing `pattern`.
    pub fn respond(&self, pattern: impl Into<String>, output: CommandOutput) {
        let pattern = pattern.into();
        let mut responses = self.responses.lock();
        if let Some((_, queue)) = responses.iter_mut().find(|(p, _)| *p == pattern) {
            queue.push_back(output);
        } else {
            responses.push((pattern, VecDeque::from([output])));
        }
    }

    /// Makes commands containing `pattern` fail to start, as if the binary
    /// were missing.
    pub fn fail_to_start(&self, pattern: impl Into<String>) {
        self.start_failures.lock().push(pattern.into());
    }

    /// The recorded invocations, rendered as command lines.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().iter().map(CommandSpec::display_line).collect()
    }

    /// The recorded invocations as full specs.
    #[must_use]
    pub fn specs(&self) -> Vec<CommandSpec> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, spec: &CommandSpec) -> std::io::Result<CommandOutput> {
        let line = spec.display_line();

        if self
            .start_failures
            .lock()
            .iter()
            .any(|pattern| line.contains(pattern.as_str()))
        {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("scripted start failure: {line}"),
            ));
        }

        self.calls.lock().push(spec.clone());

        let mut responses = self.responses.lock();
        for (pattern, queue) in responses.iter_mut() {
            if line.contains(pattern.as_str()) {
                if let Some(output) = queue.pop_front() {
                    return Ok(output);
                }
            }
        }
        Ok(CommandOutput::ok())
    }
}

/// A [`BackendPrompt`] answering from a scripted sequence.
///
/// An exhausted prompt errors instead of looping forever.
#[derive(Debug, Default)]
pub struct ScriptedPrompt {
    answers: Mutex<VecDeque<Option<Backend>>>,
    asked: Mutex<usize>,
}

impl ScriptedPrompt {
    /// A prompt that must never be consulted.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// A prompt answering the given sequence, `None` meaning invalid input.
    #[must_use]
    pub fn with_answers(answers: Vec<Option<Backend>>) -> Self {
        Self {
            answers: Mutex::new(answers.into()),
            asked: Mutex::new(0),
        }
    }

    /// How many times the prompt was consulted.
    #[must_use]
    pub fn asked(&self) -> usize {
        *self.asked.lock()
    }
}

#[async_trait]
impl BackendPrompt for ScriptedPrompt {
    async fn choose(&self, _available: &[Backend]) -> std::io::Result<Option<Backend>> {
        *self.asked.lock() += 1;
        self.answers
            .lock()
            .pop_front()
            .ok_or_else(|| std::io::Error::other("scripted prompt exhausted"))
    }
}

/// An [`ArtifactFetcher`] serving configured bytes and recording URLs.
#[derive(Debug, Default)]
pub struct MockFetcher {
    served: Mutex<Vec<(String, Vec<u8>)>>,
    fetched: Mutex<Vec<String>>,
}

impl MockFetcher {
    /// Creates a fetcher with nothing to serve.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves `bytes` for any URL ending with `name`.
    pub fn serve(&self, name: impl Into<String>, bytes: Vec<u8>) {
        self.served.lock().push((name.into(), bytes));
    }

    /// The URLs fetched so far, in order.
    #[must_use]
    pub fn fetched_urls(&self) -> Vec<String> {
        self.fetched.lock().clone()
    }
}

#[async_trait]
impl ArtifactFetcher for MockFetcher {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<(), String> {
        self.fetched.lock().push(url.to_string());

        let served = self.served.lock();
        let Some((_, bytes)) = served.iter().find(|(name, _)| url.ends_with(name.as_str()))
        else {
            return Err(format!("404 for {url}"));
        };
        std::fs::write(dest, bytes).map_err(|e| e.to_string())
    }
}

/// A [`ProbeTransport`] answering from per-URL scripted responses.
#[derive(Debug, Default)]
pub struct MockProbeTransport {
    responses: Mutex<Vec<(String, Result<ProbeResponse, String>)>>,
}

impl MockProbeTransport {
    /// Creates a transport with no responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the response for an exact URL.
    pub fn respond(&self, url: impl Into<String>, response: Result<ProbeResponse, String>) {
        self.responses.lock().push((url.into(), response));
    }
}

#[async_trait]
impl ProbeTransport for MockProbeTransport {
    async fn get(&self, url: &str) -> Result<ProbeResponse, String> {
        self.responses
            .lock()
            .iter()
            .find(|(u, _)| u == url)
            .map_or_else(
                || Err(format!("no response configured for {url}")),
                |(_, r)| r.clone(),
            )
    }
}
