//! Script execution engine.

use std::sync::Arc;

use canarystack_core::{DiagnosticSink, ErrorSet, MetricsSnapshot, Stack, StackConfig};
use serde::Serialize;

use crate::script::{Command, Corruption, Script, Step};
use crate::structured_log::{LogEmitter, LogEntry, LogLevel, Outcome};

/// What to do when a step fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Log the failure and keep going.
    #[default]
    Continue,
    /// Stop at the first failure.
    Abort,
}

/// Result of one executed step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    pub line: usize,
    pub command: String,
    pub errors: ErrorSet,
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Summary of a whole run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub protection: &'static str,
    pub policy: FailurePolicy,
    pub steps: Vec<StepRecord>,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub aborted: bool,
    pub metrics: MetricsSnapshot,
}

impl RunReport {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

/// Executes scripts against a fresh stack, logging every step.
pub struct ScriptRunner {
    config: StackConfig,
    policy: FailurePolicy,
    sink: Option<Arc<dyn DiagnosticSink>>,
}

impl ScriptRunner {
    #[must_use]
    pub fn new(config: StackConfig) -> Self {
        Self {
            config,
            policy: FailurePolicy::Continue,
            sink: None,
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Diagnostic sink attached to the stack under test.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Run `script`, writing one log line per step to `emitter`.
    pub fn run(
        &self,
        script: &Script,
        emitter: &mut LogEmitter,
    ) -> Result<RunReport, crate::HarnessError> {
        let mut stack = Stack::with_config(self.config)?;
        if let Some(sink) = &self.sink {
            stack = stack.with_sink(Arc::clone(sink));
        }
        let protection = self.config.protection.label();
        let run_id = emitter.run_id().to_string();

        emitter.emit_entry(
            LogEntry::new("", LogLevel::Info, "run_start")
                .with_protection(protection)
                .with_details(serde_json::json!({
                    "steps": script.len(),
                    "policy": self.policy,
                    "config": self.config,
                })),
        )?;

        let mut records: Vec<StepRecord> = Vec::with_capacity(script.len());
        let mut last_errors = ErrorSet::EMPTY;
        let mut aborted = false;

        for (i, step) in script.steps.iter().enumerate() {
            let checked_next = matches!(
                script.steps.get(i + 1),
                Some(Step {
                    command: Command::Expect(_),
                    ..
                })
            );
            let record = execute(&mut stack, step, last_errors, checked_next);
            if step.command.is_operation() {
                last_errors = record.errors;
            }

            let level = match record.outcome {
                Outcome::Fail => LogLevel::Error,
                Outcome::Skip => LogLevel::Warn,
                Outcome::Pass if record.errors.is_empty() => LogLevel::Info,
                Outcome::Pass => LogLevel::Debug,
            };
            let mut entry = LogEntry::new("", level, "step")
                .with_protection(protection)
                .with_step(record.line, &record.command)
                .with_errors(record.errors)
                .with_shape(stack.size(), stack.capacity())
                .with_outcome(record.outcome);
            if let Some(message) = &record.message {
                entry = entry.with_message(message);
            }
            emitter.emit_entry(entry)?;

            let failed = record.outcome == Outcome::Fail;
            records.push(record);
            if failed && self.policy == FailurePolicy::Abort {
                aborted = true;
                break;
            }
        }

        let count = |o: Outcome| records.iter().filter(|r| r.outcome == o).count();
        let report = RunReport {
            run_id,
            protection,
            policy: self.policy,
            passed: count(Outcome::Pass),
            failed: count(Outcome::Fail),
            skipped: count(Outcome::Skip),
            aborted,
            metrics: stack.metrics().snapshot(),
            steps: records,
        };

        let level = if report.is_success() {
            LogLevel::Info
        } else {
            LogLevel::Error
        };
        emitter.emit_entry(
            LogEntry::new("", level, "run_end")
                .with_protection(protection)
                .with_outcome(if report.is_success() {
                    Outcome::Pass
                } else {
                    Outcome::Fail
                })
                .with_details(serde_json::json!({
                    "passed": report.passed,
                    "failed": report.failed,
                    "skipped": report.skipped,
                    "aborted": report.aborted,
                    "metrics": report.metrics,
                })),
        )?;
        emitter.flush()?;
        Ok(report)
    }
}

/// Run one step. `previous` is the last operation's flags; `checked_next`
/// says whether an `expect` line follows, in which case non-empty flags are
/// left for it to judge.
fn execute(stack: &mut Stack, step: &Step, previous: ErrorSet, checked_next: bool) -> StepRecord {
    let mut message = None;
    let (errors, outcome) = match &step.command {
        Command::Create(preset) => judge(stack.create(*preset), checked_next),
        Command::Push(value) => judge(stack.push(*value), checked_next),
        Command::Pop { expect } => {
            let mut out = 0;
            let errors = stack.pop(Some(&mut out));
            match expect {
                Some(want) if errors.is_empty() && out != *want => {
                    message = Some(format!("popped {out}, expected {want}"));
                    (errors, Outcome::Fail)
                }
                _ => {
                    if errors.is_empty() {
                        message = Some(format!("popped {out}"));
                    }
                    judge(errors, checked_next)
                }
            }
        }
        Command::Destroy => judge(stack.destroy(), checked_next),
        Command::Verify => judge(stack.verify(), checked_next),
        Command::Dump(text) => {
            let written = stack.dump(text.as_deref().unwrap_or("dump requested by script"));
            if written {
                (ErrorSet::EMPTY, Outcome::Pass)
            } else {
                message = Some("no diagnostic sink or diagnostics disabled".to_string());
                (ErrorSet::EMPTY, Outcome::Skip)
            }
        }
        Command::Corrupt(corruption) => {
            if apply(stack, *corruption) {
                (ErrorSet::EMPTY, Outcome::Pass)
            } else {
                message = Some("target not present under this protection level".to_string());
                (ErrorSet::EMPTY, Outcome::Skip)
            }
        }
        Command::Expect(want) => {
            if previous == *want {
                (previous, Outcome::Pass)
            } else {
                message = Some(format!("expected {want}, got {previous}"));
                (previous, Outcome::Fail)
            }
        }
    };
    StepRecord {
        line: step.line,
        command: step.command.to_string(),
        errors,
        outcome,
        message,
    }
}

fn judge(errors: ErrorSet, checked_next: bool) -> (ErrorSet, Outcome) {
    let outcome = if errors.is_empty() || checked_next {
        Outcome::Pass
    } else {
        Outcome::Fail
    };
    (errors, outcome)
}

fn apply(stack: &mut Stack, corruption: Corruption) -> bool {
    let mut tamper = stack.tamper();
    match corruption {
        Corruption::StructGuard => {
            tamper.struct_guard_begin(0);
            true
        }
        Corruption::BufferGuard => tamper.buffer_guard_back(0),
        Corruption::BufferByte(index) => tamper.flip_buffer_byte(index, 0xFF),
        Corruption::Size(size) => {
            tamper.set_size(size);
            true
        }
        Corruption::Capacity(capacity) => {
            tamper.set_capacity(capacity);
            true
        }
    }
}
