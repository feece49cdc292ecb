//! CLI entrypoint for the canarystack scenario harness.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use canarystack_core::{LogWriter, ProtectionLevel, StackConfig, TextDumpSink, protection_level};
use canarystack_harness::structured_log::validate_log_file;
use canarystack_harness::{
    ArtifactIndex, DEMO_SCRIPT, FailurePolicy, LogEmitter, RunReport, Script, ScriptRunner,
};
use clap::{Parser, Subcommand};

/// Scenario tooling for canarystack.
#[derive(Debug, Parser)]
#[command(name = "canarystack-harness")]
#[command(about = "Run stack scenario scripts and validate their logs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Execute a scenario script against a fresh stack.
    Run {
        /// Script path (one command per line).
        #[arg(long)]
        script: PathBuf,
        /// Protection level (`full`, `guards`, `hashes`, `off`). Defaults to
        /// `CANARYSTACK_PROTECTION`, then `full`.
        #[arg(long)]
        protection: Option<String>,
        /// Smallest non-zero capacity.
        #[arg(long, default_value_t = StackConfig::DEFAULT_MIN_CAPACITY)]
        min_capacity: usize,
        /// Growth and shrink factor.
        #[arg(long, default_value_t = StackConfig::DEFAULT_GROWTH_MULTIPLIER)]
        multiplier: usize,
        /// Largest single allocation in bytes.
        #[arg(long)]
        allocation_limit: Option<usize>,
        /// Structured JSONL log path (if omitted, prints to stdout).
        #[arg(long)]
        log: Option<PathBuf>,
        /// Text dump path for per-operation diagnostics.
        #[arg(long)]
        dump: Option<PathBuf>,
        /// Stop at the first failing step.
        #[arg(long)]
        fail_fast: bool,
        /// Write an artifact index (JSON) covering the log and dump files.
        #[arg(long)]
        artifact_index: Option<PathBuf>,
    },
    /// Run the built-in push/pop scenario and print its log.
    Demo {
        #[arg(long)]
        protection: Option<String>,
    },
    /// Validate a structured JSONL log file.
    ValidateLog {
        #[arg(long)]
        log: PathBuf,
    },
}

fn resolve_protection(flag: Option<&str>) -> ProtectionLevel {
    flag.map_or_else(protection_level, ProtectionLevel::from_str_loose)
}

fn run_id_for(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("script")
        .to_string()
}

fn finish(report: &RunReport) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!(
        "{}: {} passed, {} failed, {} skipped{}",
        report.run_id,
        report.passed,
        report.failed,
        report.skipped,
        if report.aborted { " (aborted)" } else { "" }
    );
    if report.is_success() {
        Ok(())
    } else {
        Err(format!("{} step(s) failed", report.failed).into())
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            script,
            protection,
            min_capacity,
            multiplier,
            allocation_limit,
            log,
            dump,
            fail_fast,
            artifact_index,
        } => {
            let parsed = Script::from_file(&script)?;
            let config = StackConfig::new(resolve_protection(protection.as_deref()))
                .with_min_capacity(min_capacity)
                .with_growth_multiplier(multiplier)
                .with_allocation_limit(allocation_limit);
            config.validate()?;

            let run_id = run_id_for(&script);
            let mut emitter = match &log {
                Some(path) => LogEmitter::to_file(path, &run_id)?,
                None => LogEmitter::to_stdout(&run_id),
            };

            let policy = if fail_fast {
                FailurePolicy::Abort
            } else {
                FailurePolicy::Continue
            };
            let mut runner = ScriptRunner::new(config).with_policy(policy);
            let dump_sink = dump
                .as_ref()
                .map(|path| Arc::new(TextDumpSink::new(LogWriter::file(path))));
            if let Some(sink) = &dump_sink {
                runner = runner.with_sink(sink.clone());
            }

            let report = runner.run(&parsed, &mut emitter)?;
            drop(emitter);
            if let Some(sink) = &dump_sink {
                sink.shutdown();
            }

            if log.is_some() {
                println!("{}", serde_json::to_string_pretty(&report)?);
            }

            if let Some(index_path) = artifact_index {
                let mut index = ArtifactIndex::new(&run_id);
                index.add_file(&script, "script")?;
                if let Some(path) = &log {
                    index.add_file(path, "log")?;
                }
                if let Some(path) = &dump
                    && path.exists()
                {
                    index.add_file(path, "dump")?;
                }
                index.write(&index_path)?;
                eprintln!("Wrote artifact index to {}", index_path.display());
            }

            finish(&report)?;
        }
        Command::Demo { protection } => {
            let script = Script::parse(DEMO_SCRIPT)?;
            let config = StackConfig::new(resolve_protection(protection.as_deref()));
            let mut emitter = LogEmitter::to_stdout("demo");
            let report = ScriptRunner::new(config).run(&script, &mut emitter)?;
            finish(&report)?;
        }
        Command::ValidateLog { log } => {
            let (lines, errors) = validate_log_file(&log)?;
            for err in &errors {
                eprintln!("{err}");
            }
            eprintln!("{}: {lines} line(s), {} error(s)", log.display(), errors.len());
            if !errors.is_empty() {
                return Err(format!("{} validation error(s)", errors.len()).into());
            }
        }
    }

    Ok(())
}
