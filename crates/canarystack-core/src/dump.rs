//! Concrete diagnostic sinks: human-readable text dumps and JSONL events.
//!
//! Both write through a [`LogWriter`], which owns the destination. A file
//! destination is opened lazily on the first record (truncating it), kept
//! open for appends, and closed by [`LogWriter::shutdown`] or on drop. A
//! file that cannot be opened falls back to stderr.

use std::fmt::Write as _;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use crate::diagnostics::{CallSite, DiagnosticReport, DiagnosticSink, StackSnapshot};
use canarystack_guard::ErrorSet;

/// In-memory destination that can be read back while a sink still holds it.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, lossily decoded.
    #[must_use]
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.bytes.lock()).into_owned()
    }

    fn append(&self, text: &str) {
        self.bytes.lock().extend_from_slice(text.as_bytes());
    }
}

/// Where a [`LogWriter`] sends its output.
#[derive(Debug, Clone)]
pub enum LogTarget {
    Stderr,
    File(PathBuf),
    Buffer(SharedBuffer),
}

#[derive(Debug, Default)]
struct FileState {
    handle: Option<BufWriter<File>>,
    opened_once: bool,
    unusable: bool,
}

/// Serialized writer shared by the sinks.
#[derive(Debug)]
pub struct LogWriter {
    target: LogTarget,
    file: Mutex<FileState>,
}

impl LogWriter {
    #[must_use]
    pub fn new(target: LogTarget) -> Self {
        Self {
            target,
            file: Mutex::new(FileState::default()),
        }
    }

    #[must_use]
    pub fn stderr() -> Self {
        Self::new(LogTarget::Stderr)
    }

    /// Lazily opened file destination.
    #[must_use]
    pub fn file(path: impl AsRef<Path>) -> Self {
        Self::new(LogTarget::File(path.as_ref().to_path_buf()))
    }

    /// In-memory destination plus a handle to read it back.
    #[must_use]
    pub fn buffer() -> (Self, SharedBuffer) {
        let shared = SharedBuffer::new();
        (Self::new(LogTarget::Buffer(shared.clone())), shared)
    }

    #[must_use]
    pub fn target(&self) -> &LogTarget {
        &self.target
    }

    /// Write one block of text. Write failures are dropped; diagnostics
    /// never change what the caller sees.
    pub fn write_block(&self, text: &str) {
        match &self.target {
            LogTarget::Stderr => {
                let _ = std::io::stderr().lock().write_all(text.as_bytes());
            }
            LogTarget::Buffer(shared) => shared.append(text),
            LogTarget::File(path) => {
                let mut state = self.file.lock();
                if state.handle.is_none() && !state.unusable {
                    match open_log_file(path, state.opened_once) {
                        Ok(file) => state.handle = Some(BufWriter::new(file)),
                        Err(err) => {
                            state.unusable = true;
                            eprintln!("can't open log file {}: {err}", path.display());
                        }
                    }
                    state.opened_once = true;
                }
                match state.handle.as_mut() {
                    Some(handle) => {
                        let _ = handle.write_all(text.as_bytes());
                    }
                    None => {
                        let _ = std::io::stderr().lock().write_all(text.as_bytes());
                    }
                }
            }
        }
    }

    /// Flush and close a file destination. A later write reopens it for
    /// appending.
    pub fn shutdown(&self) {
        let mut state = self.file.lock();
        if let Some(mut handle) = state.handle.take() {
            let _ = handle.flush();
        }
    }
}

impl Drop for LogWriter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn open_log_file(path: &Path, append: bool) -> std::io::Result<File> {
    if append {
        OpenOptions::new().create(true).append(true).open(path)
    } else {
        File::create(path)
    }
}

// ---------------------------------------------------------------------------
// Text dump
// ---------------------------------------------------------------------------

/// Sink producing the multi-line human-readable dump.
#[derive(Debug)]
pub struct TextDumpSink {
    writer: LogWriter,
    only_errors: bool,
}

impl TextDumpSink {
    #[must_use]
    pub fn new(writer: LogWriter) -> Self {
        Self {
            writer,
            only_errors: false,
        }
    }

    /// Skip reports whose error set is empty, unless they carry a message.
    #[must_use]
    pub fn only_errors(mut self, only_errors: bool) -> Self {
        self.only_errors = only_errors;
        self
    }

    #[must_use]
    pub fn writer(&self) -> &LogWriter {
        &self.writer
    }

    pub fn shutdown(&self) {
        self.writer.shutdown();
    }
}

impl DiagnosticSink for TextDumpSink {
    fn record(&self, report: &DiagnosticReport<'_>) {
        if self.only_errors && report.errors.is_empty() && report.message.is_none() {
            return;
        }
        self.writer.write_block(&render(report));
    }
}

/// Render one report in the text dump layout.
#[must_use]
pub fn render(report: &DiagnosticReport<'_>) -> String {
    let mut out = String::from("\n");
    if let Some(message) = report.message {
        let _ = writeln!(out, "{message}");
    }
    render_errors(&mut out, report.errors);
    render_body(&mut out, report.site, report.snapshot, report.errors);
    out
}

fn render_errors(out: &mut String, errors: ErrorSet) {
    if errors.is_empty() {
        return;
    }
    out.push_str("ERROR\n");
    for err in errors.errors() {
        let _ = writeln!(out, "  {err}");
    }
}

fn render_body(out: &mut String, site: &CallSite, snap: &StackSnapshot, errors: ErrorSet) {
    let _ = write!(out, "Stack [{:?}, {}] ", snap.state, snap.protection.label());
    if errors.is_empty() {
        out.push('\n');
    } else {
        let _ = writeln!(out, "ERROR (code {:#06x})", errors.bits());
    }
    let _ = writeln!(
        out,
        "   called from: {} at {} ({}:{})",
        site.operation, site.file, site.line, site.column
    );
    match &snap.origin {
        Some(origin) => {
            let _ = writeln!(
                out,
                "   initialized: {} at {} ({}:{})\n",
                origin.operation, origin.file, origin.line, origin.column
            );
        }
        None => out.push_str("   initialized: UNKNOWN\n\n"),
    }

    let buffer = if snap.buffer_allocated {
        "allocated"
    } else {
        "absent"
    };
    let _ = writeln!(out, "   buffer[{buffer}]");
    let _ = writeln!(out, "   size     = {}", snap.size);
    let _ = writeln!(out, "   capacity = {}", snap.capacity);
    let _ = writeln!(out, "   preset   = {}\n", snap.preset_capacity);

    out.push_str("   Guards:\n");
    let _ = writeln!(out, "     stack  begin = {:#018x}", snap.begin_guard);
    let _ = writeln!(out, "     stack  end   = {:#018x}", snap.end_guard);
    if let (Some(front), Some(back)) = (snap.buffer_front_guard, snap.buffer_back_guard) {
        let _ = writeln!(out, "     buffer begin = {front:#018x}");
        let _ = writeln!(out, "     buffer end   = {back:#018x}");
    }
    let _ = writeln!(out, "     stack  hash  = {:#018x}", snap.struct_hash);
    let _ = writeln!(out, "     buffer hash  = {:#018x}\n", snap.buffer_hash);

    if snap.buffer_allocated {
        out.push_str("   {\n");
        for slot in &snap.slots {
            let marker = if slot.live { "   #" } else { "    " };
            let _ = write!(out, "{marker}{:>7}: {}", slot.index, slot.value);
            if slot.poisoned {
                out.push_str(" (poison)");
            }
            out.push('\n');
        }
        out.push_str("   }\n");
    }
}

// ---------------------------------------------------------------------------
// JSONL
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct DiagnosticEvent<'a> {
    event: &'static str,
    operation: &'static str,
    errors: ErrorSet,
    error_bits: u32,
    call_site: &'a CallSite,
    snapshot: &'a StackSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
}

/// Sink writing one JSON object per report.
#[derive(Debug)]
pub struct JsonlSink {
    writer: LogWriter,
    only_errors: bool,
}

impl JsonlSink {
    pub const EVENT: &'static str = "stack_diagnostic";

    #[must_use]
    pub fn new(writer: LogWriter) -> Self {
        Self {
            writer,
            only_errors: false,
        }
    }

    #[must_use]
    pub fn only_errors(mut self, only_errors: bool) -> Self {
        self.only_errors = only_errors;
        self
    }

    #[must_use]
    pub fn writer(&self) -> &LogWriter {
        &self.writer
    }

    pub fn shutdown(&self) {
        self.writer.shutdown();
    }
}

impl DiagnosticSink for JsonlSink {
    fn record(&self, report: &DiagnosticReport<'_>) {
        if self.only_errors && report.errors.is_empty() && report.message.is_none() {
            return;
        }
        let event = DiagnosticEvent {
            event: Self::EVENT,
            operation: report.site.operation,
            errors: report.errors,
            error_bits: report.errors.bits(),
            call_site: report.site,
            snapshot: report.snapshot,
            message: report.message,
        };
        if let Ok(mut line) = serde_json::to_string(&event) {
            line.push('\n');
            self.writer.write_block(&line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StackConfig;
    use crate::stack::Stack;

    fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("canarystack-{}-{name}", std::process::id()))
    }

    #[test]
    fn text_dump_lists_live_slots() {
        let (writer, shared) = LogWriter::buffer();
        let sink = Arc::new(TextDumpSink::new(writer));
        let mut stack = Stack::new().with_sink(sink);
        stack.create(0);
        stack.push(10);
        stack.push(20);

        let text = shared.contents();
        assert!(text.contains("called from: push at"));
        assert!(text.contains("initialized: create at"));
        assert!(text.contains("   #      0: 10"));
        assert!(text.contains("   #      1: 20"));
        assert!(text.contains("     buffer begin = 0xbac1cab1ded1bed1"));
        assert!(text.contains("(poison)"));
    }

    #[test]
    fn text_dump_lists_error_messages() {
        let (writer, shared) = LogWriter::buffer();
        let sink = Arc::new(TextDumpSink::new(writer).only_errors(true));
        let mut stack = Stack::new().with_sink(sink);
        stack.create(0);
        stack.push(1);
        assert!(shared.contents().is_empty());

        let _ = stack.pop_value();
        let _ = stack.pop_value();
        let text = shared.contents();
        assert!(text.contains("ERROR\n  trying to pop from an empty stack"));
        assert!(text.contains("ERROR (code 0x0800)"));
    }

    #[test]
    fn jsonl_records_parse() {
        let (writer, shared) = LogWriter::buffer();
        let sink = Arc::new(JsonlSink::new(writer));
        let mut stack = Stack::new().with_sink(sink);
        stack.create(4);
        stack.tamper().struct_guard_begin(0);
        stack.push(1);

        let lines: Vec<serde_json::Value> = shared
            .contents()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["event"], "stack_diagnostic");
        assert_eq!(lines[0]["operation"], "create");
        assert_eq!(lines[0]["snapshot"]["capacity"], 8);
        assert_eq!(lines[1]["errors"][0], "CORRUPT_STRUCT_GUARD");
        assert_eq!(lines[1]["error_bits"], ErrorSet::CORRUPT_STRUCT_GUARD.bits());
    }

    #[test]
    fn file_target_truncates_then_appends() {
        let path = scratch_path("truncate.log");
        std::fs::write(&path, "stale contents\n").unwrap();

        let writer = LogWriter::file(&path);
        writer.write_block("first\n");
        writer.shutdown();
        writer.write_block("second\n");
        writer.shutdown();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "first\nsecond\n");
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn unopenable_file_falls_back() {
        let path = scratch_path("missing-dir").join("nested").join("x.log");
        let writer = LogWriter::file(&path);
        writer.write_block("to stderr\n");
        assert!(!path.exists());
    }

    #[test]
    fn file_sink_flushes_on_shutdown() {
        let path = scratch_path("sink.jsonl");
        let sink = Arc::new(JsonlSink::new(LogWriter::file(&path)));
        let mut stack = Stack::with_config(StackConfig::default())
            .unwrap()
            .with_sink(sink.clone());
        stack.create(0);
        stack.destroy();
        sink.shutdown();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 2);
        let _ = std::fs::remove_file(&path);
    }
}
