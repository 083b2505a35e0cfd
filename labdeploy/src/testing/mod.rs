//! Test support: mock collaborators for exercising the orchestrator
//! without real binaries, networks, or hypervisors.

mod mocks;

pub use mocks::{MockFetcher, MockProbeTransport, ScriptedPrompt, ScriptedRunner};
