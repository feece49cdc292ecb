//! Structured logging contract for canarystack scenario runs.
//!
//! Provides:
//! - [`LogEntry`]: canonical JSONL log record with required + optional fields.
//! - [`ArtifactIndex`]: links logs to produced files with SHA-256 integrity.
//! - [`LogEmitter`]: writes JSONL lines to a file, stdout, or a buffer.
//! - [`validate_log_line`]: validates a single JSONL line against the schema.
//! - [`validate_log_file`]: validates an entire JSONL file.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use canarystack_core::ErrorSet;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::Digest;

// ---------------------------------------------------------------------------
// Log entry
// ---------------------------------------------------------------------------

/// Severity level for log entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Step outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Pass,
    Fail,
    Skip,
}

/// Canonical structured log entry.
///
/// Required fields: `timestamp`, `trace_id`, `level`, `event`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    // Required
    pub timestamp: String,
    pub trace_id: String,
    pub level: LogLevel,
    pub event: String,

    // Optional
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    /// Protection label (`full`, `guards`, `hashes`, `none`, `custom`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protection: Option<String>,
    /// 1-based script line that produced the entry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    /// Script command as written.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Flag names returned by the operation; empty means clean.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_bits: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capacity: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_refs: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl LogEntry {
    /// Create a new log entry with required fields only.
    #[must_use]
    pub fn new(trace_id: impl Into<String>, level: LogLevel, event: impl Into<String>) -> Self {
        Self {
            timestamp: now_utc(),
            trace_id: trace_id.into(),
            level,
            event: event.into(),
            run_id: None,
            protection: None,
            line: None,
            command: None,
            errors: None,
            error_bits: None,
            size: None,
            capacity: None,
            outcome: None,
            message: None,
            artifact_refs: None,
            details: None,
        }
    }

    #[must_use]
    pub fn with_run(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    #[must_use]
    pub fn with_protection(mut self, label: impl Into<String>) -> Self {
        self.protection = Some(label.into());
        self
    }

    /// Set the script line and command text.
    #[must_use]
    pub fn with_step(mut self, line: usize, command: impl Into<String>) -> Self {
        self.line = Some(line);
        self.command = Some(command.into());
        self
    }

    /// Record an operation result.
    #[must_use]
    pub fn with_errors(mut self, errors: ErrorSet) -> Self {
        self.errors = Some(errors.names().into_iter().map(str::to_string).collect());
        self.error_bits = Some(errors.bits());
        self
    }

    /// Record the stack shape after the step.
    #[must_use]
    pub fn with_shape(mut self, size: usize, capacity: usize) -> Self {
        self.size = Some(size);
        self.capacity = Some(capacity);
        self
    }

    #[must_use]
    pub fn with_outcome(mut self, outcome: Outcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    #[must_use]
    pub fn with_artifacts(mut self, refs: Vec<String>) -> Self {
        self.artifact_refs = Some(refs);
        self
    }

    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Serialize to a single JSONL line (no trailing newline).
    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// ---------------------------------------------------------------------------
// Artifact index
// ---------------------------------------------------------------------------

/// A single artifact entry in the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactEntry {
    pub path: String,
    pub kind: String,
    pub sha256: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Artifact index linking a run's log to the files it produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactIndex {
    pub index_version: u32,
    pub run_id: String,
    pub generated_utc: String,
    pub artifacts: Vec<ArtifactEntry>,
}

impl ArtifactIndex {
    #[must_use]
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            index_version: 1,
            run_id: run_id.into(),
            generated_utc: now_utc(),
            artifacts: Vec::new(),
        }
    }

    /// Add an artifact entry with a known digest.
    pub fn add(
        &mut self,
        path: impl Into<String>,
        kind: impl Into<String>,
        sha256: impl Into<String>,
    ) -> &mut Self {
        self.artifacts.push(ArtifactEntry {
            path: path.into(),
            kind: kind.into(),
            sha256: sha256.into(),
            size_bytes: None,
            description: None,
        });
        self
    }

    /// Hash `path` and add it with its size.
    pub fn add_file(&mut self, path: &Path, kind: impl Into<String>) -> std::io::Result<&mut Self> {
        let data = std::fs::read(path)?;
        self.artifacts.push(ArtifactEntry {
            path: path.display().to_string(),
            kind: kind.into(),
            sha256: sha256_hex(&data),
            size_bytes: Some(data.len() as u64),
            description: None,
        });
        Ok(self)
    }

    /// Re-hash every entry and return the paths whose digest no longer matches
    /// (or that cannot be read).
    #[must_use]
    pub fn stale_entries(&self) -> Vec<String> {
        self.artifacts
            .iter()
            .filter(|a| {
                std::fs::read(&a.path)
                    .map(|data| !sha256_hex(&data).eq_ignore_ascii_case(&a.sha256))
                    .unwrap_or(true)
            })
            .map(|a| a.path.clone())
            .collect()
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn write(&self, path: &Path) -> std::io::Result<()> {
        let json = self.to_json().map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }
}

// ---------------------------------------------------------------------------
// Log emitter
// ---------------------------------------------------------------------------

/// Writes structured JSONL log entries to a file, stdout, or a buffer.
pub struct LogEmitter {
    writer: Box<dyn Write>,
    seq: u64,
    run_id: String,
}

impl LogEmitter {
    /// Create an emitter that writes to a file.
    pub fn to_file(path: &Path, run_id: &str) -> std::io::Result<Self> {
        let file = std::fs::File::create(path)?;
        Ok(Self::to_writer(
            Box::new(std::io::BufWriter::new(file)),
            run_id,
        ))
    }

    #[must_use]
    pub fn to_stdout(run_id: &str) -> Self {
        Self::to_writer(Box::new(std::io::stdout()), run_id)
    }

    /// Create an emitter that writes to a shared buffer (for testing).
    #[must_use]
    pub fn to_buffer(run_id: &str) -> (Self, LogBuffer) {
        let buffer = LogBuffer::default();
        (Self::to_writer(Box::new(buffer.clone()), run_id), buffer)
    }

    #[must_use]
    pub fn to_writer(writer: Box<dyn Write>, run_id: &str) -> Self {
        Self {
            writer,
            seq: 0,
            run_id: run_id.to_string(),
        }
    }

    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Generate the next trace ID.
    fn next_trace_id(&mut self) -> String {
        self.seq += 1;
        format!("{}::{:03}", self.run_id, self.seq)
    }

    /// Emit a log entry with auto-generated trace_id and run_id.
    pub fn emit(&mut self, level: LogLevel, event: &str) -> std::io::Result<LogEntry> {
        let trace_id = self.next_trace_id();
        let entry = LogEntry::new(trace_id, level, event).with_run(&self.run_id);
        let line = entry.to_jsonl().map_err(std::io::Error::other)?;
        writeln!(self.writer, "{line}")?;
        Ok(entry)
    }

    /// Emit a fully-populated log entry.
    pub fn emit_entry(&mut self, mut entry: LogEntry) -> std::io::Result<()> {
        if entry.trace_id.is_empty() {
            entry.trace_id = self.next_trace_id();
        }
        if entry.run_id.is_none() {
            entry.run_id = Some(self.run_id.clone());
        }
        let line = entry.to_jsonl().map_err(std::io::Error::other)?;
        writeln!(self.writer, "{line}")
    }

    /// Flush the underlying writer.
    pub fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

/// In-memory JSONL sink readable while an emitter holds it.
#[derive(Debug, Clone, Default)]
pub struct LogBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl LogBuffer {
    #[must_use]
    pub fn contents(&self) -> String {
        let bytes = self.bytes.lock();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    /// Parsed entries written so far.
    #[must_use]
    pub fn entries(&self) -> Vec<LogEntry> {
        self.contents()
            .lines()
            .filter_map(|l| serde_json::from_str(l).ok())
            .collect()
    }
}

impl Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut bytes = self.bytes.lock();
        bytes.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validation error for a log line.
#[derive(Debug)]
pub struct LogValidationError {
    pub line_number: usize,
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for LogValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "line {}: field '{}': {}",
            self.line_number, self.field, self.message
        )
    }
}

/// Validate a single JSONL line against the schema.
pub fn validate_log_line(
    line: &str,
    line_number: usize,
) -> Result<LogEntry, Vec<LogValidationError>> {
    let mut errors = Vec::new();
    let mut push = |field: &str, message: String| {
        errors.push(LogValidationError {
            line_number,
            field: field.to_string(),
            message,
        });
    };

    let value: serde_json::Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            push("<json>", format!("invalid JSON: {e}"));
            return Err(errors);
        }
    };

    let Some(obj) = value.as_object() else {
        push("<root>", "expected JSON object".to_string());
        return Err(errors);
    };

    // Required fields
    for field in ["timestamp", "trace_id", "level", "event"] {
        if !obj.contains_key(field) {
            push(field, "required field missing".to_string());
        }
    }

    if let Some(level) = obj.get("level").and_then(|v| v.as_str())
        && !["trace", "debug", "info", "warn", "error"].contains(&level)
    {
        push("level", format!("invalid level: '{level}'"));
    }

    if let Some(outcome) = obj.get("outcome").and_then(|v| v.as_str())
        && !["pass", "fail", "skip"].contains(&outcome)
    {
        push("outcome", format!("invalid outcome: '{outcome}'"));
    }

    if let Some(protection) = obj.get("protection").and_then(|v| v.as_str())
        && !["full", "guards", "hashes", "none", "custom"].contains(&protection)
    {
        push("protection", format!("invalid protection: '{protection}'"));
    }

    // Flag names must be known and agree with the bits.
    if let Some(names) = obj.get("errors") {
        let parsed = names.as_array().and_then(|arr| {
            arr.iter().try_fold(ErrorSet::EMPTY, |set, name| {
                let name = name.as_str()?;
                ErrorSet::parse(name).map(|flag| set | flag)
            })
        });
        match parsed {
            None => push("errors", "expected an array of known flag names".to_string()),
            Some(set) => {
                if let Some(bits) = obj.get("error_bits").and_then(serde_json::Value::as_u64)
                    && bits != u64::from(set.bits())
                {
                    push(
                        "error_bits",
                        format!("bits {bits:#x} disagree with names ({set})"),
                    );
                }
            }
        }
    }

    if let Some(trace_id) = obj.get("trace_id").and_then(|v| v.as_str())
        && !trace_id.contains("::")
    {
        push(
            "trace_id",
            format!("trace_id should follow <run_id>::<seq> format, got: '{trace_id}'"),
        );
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    serde_json::from_value::<LogEntry>(value).map_err(|e| {
        vec![LogValidationError {
            line_number,
            field: "<deserialization>".to_string(),
            message: format!("failed to deserialize: {e}"),
        }]
    })
}

/// Validate an entire JSONL file.
///
/// Returns the total line count and any validation errors found.
pub fn validate_log_file(path: &Path) -> Result<(usize, Vec<LogValidationError>), std::io::Error> {
    let content = std::fs::read_to_string(path)?;
    let mut all_errors = Vec::new();
    let mut line_count = 0;

    for (i, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        line_count += 1;
        if let Err(errs) = validate_log_line(line, i + 1) {
            all_errors.extend(errs);
        }
    }

    Ok((line_count, all_errors))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Lowercase hex SHA-256 of `data`.
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    use std::fmt::Write as _;
    let digest = sha2::Sha256::digest(data);
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        let _ = write!(&mut out, "{b:02x}");
    }
    out
}

fn now_utc() -> String {
    let duration = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    let secs = duration.as_secs();
    let millis = duration.subsec_millis();
    // Approximate calendar fields; ordering and uniqueness are what matter.
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:03}Z",
        1970 + secs / 31_557_600,
        (secs % 31_557_600) / 2_629_800 + 1,
        (secs % 2_629_800) / 86400 + 1,
        (secs % 86400) / 3600,
        (secs % 3600) / 60,
        secs % 60,
        millis,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_entry_serializes_required_fields() {
        let entry = LogEntry::new("run-1::001", LogLevel::Info, "run_start");
        let json = entry.to_jsonl().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(parsed["timestamp"].is_string());
        assert_eq!(parsed["trace_id"], "run-1::001");
        assert_eq!(parsed["level"], "info");
        assert_eq!(parsed["event"], "run_start");
        assert!(parsed.get("errors").is_none());
    }

    #[test]
    fn errors_serialize_as_names_and_bits() {
        let entry = LogEntry::new("r::1", LogLevel::Warn, "step")
            .with_errors(ErrorSet::POP_FROM_EMPTY | ErrorSet::INVALID_BUFFER);
        let parsed: serde_json::Value = serde_json::from_str(&entry.to_jsonl().unwrap()).unwrap();
        assert_eq!(
            parsed["errors"],
            serde_json::json!(["INVALID_BUFFER", "POP_FROM_EMPTY"])
        );
        assert_eq!(parsed["error_bits"], (1 << 1) | (1 << 11));
    }

    #[test]
    fn emitter_assigns_sequential_trace_ids() {
        let (mut emitter, buffer) = LogEmitter::to_buffer("demo");
        emitter.emit(LogLevel::Info, "run_start").unwrap();
        emitter
            .emit_entry(LogEntry::new("", LogLevel::Info, "step"))
            .unwrap();
        let entries = buffer.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].trace_id, "demo::001");
        assert_eq!(entries[1].trace_id, "demo::002");
        assert_eq!(entries[1].run_id.as_deref(), Some("demo"));
    }

    #[test]
    fn emitted_lines_validate() {
        let (mut emitter, buffer) = LogEmitter::to_buffer("v");
        emitter
            .emit_entry(
                LogEntry::new("", LogLevel::Info, "step")
                    .with_step(3, "push 1")
                    .with_errors(ErrorSet::EMPTY)
                    .with_protection("full")
                    .with_outcome(Outcome::Pass),
            )
            .unwrap();
        for (i, line) in buffer.contents().lines().enumerate() {
            assert!(validate_log_line(line, i + 1).is_ok(), "{line}");
        }
    }

    #[test]
    fn validation_rejects_bad_lines() {
        assert!(validate_log_line("not json", 1).is_err());
        assert!(validate_log_line("[1]", 1).is_err());

        let errs = validate_log_line(r#"{"timestamp":"t","trace_id":"x","level":"info"}"#, 4)
            .unwrap_err();
        let fields: Vec<&str> = errs.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"event"));
        assert!(fields.contains(&"trace_id"));
        assert_eq!(errs[0].line_number, 4);

        let bad_flag = r#"{"timestamp":"t","trace_id":"a::1","level":"info","event":"e","errors":["NOPE"]}"#;
        assert!(validate_log_line(bad_flag, 1).is_err());

        let mismatch = r#"{"timestamp":"t","trace_id":"a::1","level":"info","event":"e","errors":["DOUBLE_DESTROY"],"error_bits":1}"#;
        let errs = validate_log_line(mismatch, 1).unwrap_err();
        assert_eq!(errs[0].field, "error_bits");
    }

    #[test]
    fn sha256_matches_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn artifact_index_round_trips_and_detects_staleness() {
        let path = std::env::temp_dir().join(format!(
            "canarystack-artifact-{}.txt",
            std::process::id()
        ));
        std::fs::write(&path, b"abc").unwrap();

        let mut index = ArtifactIndex::new("run-7");
        index.add_file(&path, "dump").unwrap();
        assert_eq!(index.artifacts[0].size_bytes, Some(3));
        assert!(index.stale_entries().is_empty());

        let parsed: ArtifactIndex = serde_json::from_str(&index.to_json().unwrap()).unwrap();
        assert_eq!(parsed.artifacts, index.artifacts);

        std::fs::write(&path, b"abd").unwrap();
        assert_eq!(index.stale_entries().len(), 1);
        let _ = std::fs::remove_file(&path);
    }
}
