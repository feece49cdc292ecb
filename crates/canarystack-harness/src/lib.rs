//! Scenario harness for canarystack.
//!
//! This crate provides:
//! - Script parsing: one stack command per line, with `expect` assertions
//! - Script running: a fresh stack per run, one structured log line per step
//! - Structured logging: JSONL entries, log validation, artifact index

#![forbid(unsafe_code)]

pub mod runner;
pub mod script;
pub mod structured_log;

use thiserror::Error;

pub use runner::{FailurePolicy, RunReport, ScriptRunner, StepRecord};
pub use script::{Command, Corruption, Script, ScriptError, Step};
pub use structured_log::{ArtifactIndex, LogEmitter, LogEntry, LogLevel, Outcome};

/// Built-in scenario used by `canarystack-harness demo`.
pub const DEMO_SCRIPT: &str = "\
# push/pop round trip
create 0
push 1
push 2
push 3
pop expect 3
pop expect 2
pop expect 1
pop
expect POP_FROM_EMPTY
# lifecycle misuse is reported, not fatal
destroy
push 4
expect USE_AFTER_DESTROY
destroy
expect DOUBLE_DESTROY
";

/// Errors surfaced by the harness.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("script: {0}")]
    Script(#[from] ScriptError),
    #[error("config: {0}")]
    Config(#[from] canarystack_core::ConfigError),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}
