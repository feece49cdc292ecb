//! Diagnostic reports and the sink interface.
//!
//! The engine hands a [`DiagnosticReport`] to its sink after every operation
//! when `ProtectionLevel::diagnostics` is on and a sink is attached. Sinks
//! never influence engine behavior: they receive borrowed data and return
//! nothing.

use std::panic::Location;

use canarystack_guard::canary::is_poisoned;
use canarystack_guard::{ELEM_SIZE, Elem, ErrorSet, ProtectionLevel};
use parking_lot::Mutex;
use serde::Serialize;

use crate::stack::HandleState;

/// Where an operation was invoked from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CallSite {
    pub operation: &'static str,
    pub file: &'static str,
    pub line: u32,
    pub column: u32,
}

impl CallSite {
    /// Capture the caller's location.
    #[track_caller]
    #[must_use]
    pub fn here(operation: &'static str) -> Self {
        let location = Location::caller();
        Self {
            operation,
            file: location.file(),
            line: location.line(),
            column: location.column(),
        }
    }
}

impl std::fmt::Display for CallSite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} at {}:{}:{}",
            self.operation, self.file, self.line, self.column
        )
    }
}

/// One element slot as seen by a dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SlotSnapshot {
    pub index: usize,
    pub value: Elem,
    pub live: bool,
    pub poisoned: bool,
}

/// Address-free copy of everything a dump shows about a stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StackSnapshot {
    pub state: HandleState,
    pub protection: ProtectionLevel,
    pub size: usize,
    pub capacity: usize,
    pub preset_capacity: usize,
    pub begin_guard: u64,
    pub end_guard: u64,
    pub struct_hash: u64,
    pub buffer_hash: u64,
    pub buffer_allocated: bool,
    pub buffer_front_guard: Option<u64>,
    pub buffer_back_guard: Option<u64>,
    pub origin: Option<CallSite>,
    pub slots: Vec<SlotSnapshot>,
}

impl StackSnapshot {
    pub(crate) fn slots_from(element_bytes: &[u8], size: usize) -> Vec<SlotSnapshot> {
        element_bytes
            .chunks_exact(ELEM_SIZE)
            .enumerate()
            .map(|(index, raw)| {
                let mut word = [0u8; ELEM_SIZE];
                word.copy_from_slice(raw);
                SlotSnapshot {
                    index,
                    value: Elem::from_ne_bytes(word),
                    live: index < size,
                    poisoned: is_poisoned(raw),
                }
            })
            .collect()
    }

    /// Values of the live slots, bottom to top.
    #[must_use]
    pub fn live_values(&self) -> Vec<Elem> {
        self.slots
            .iter()
            .filter(|s| s.live)
            .map(|s| s.value)
            .collect()
    }
}

/// Everything a sink receives for one operation.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct DiagnosticReport<'a> {
    pub site: &'a CallSite,
    pub errors: ErrorSet,
    pub snapshot: &'a StackSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'a str>,
}

impl DiagnosticReport<'_> {
    /// Owned copy, for sinks that keep reports around.
    #[must_use]
    pub fn to_owned_report(&self) -> OwnedReport {
        OwnedReport {
            site: *self.site,
            errors: self.errors,
            snapshot: self.snapshot.clone(),
            message: self.message.map(str::to_string),
        }
    }
}

/// Owned form of [`DiagnosticReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OwnedReport {
    pub site: CallSite,
    pub errors: ErrorSet,
    pub snapshot: StackSnapshot,
    pub message: Option<String>,
}

/// Receiver of diagnostic reports.
pub trait DiagnosticSink: Send + Sync {
    fn record(&self, report: &DiagnosticReport<'_>);
}

/// Sink that keeps every report in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    reports: Mutex<Vec<OwnedReport>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every report recorded so far.
    #[must_use]
    pub fn reports(&self) -> Vec<OwnedReport> {
        self.reports.lock().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.reports.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reports.lock().is_empty()
    }

    /// Operations recorded, in order.
    #[must_use]
    pub fn operations(&self) -> Vec<&'static str> {
        self.reports.lock().iter().map(|r| r.site.operation).collect()
    }

    pub fn clear(&self) {
        self.reports.lock().clear();
    }
}

impl DiagnosticSink for MemorySink {
    fn record(&self, report: &DiagnosticReport<'_>) {
        self.reports.lock().push(report.to_owned_report());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canarystack_guard::canary::ELEM_POISON;

    #[test]
    fn call_site_points_at_caller() {
        let site = CallSite::here("push");
        assert_eq!(site.operation, "push");
        assert!(site.file.ends_with("diagnostics.rs"));
        assert_eq!(site.line, line!() - 3);
    }

    #[test]
    fn slots_mark_live_and_poisoned() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&5i32.to_ne_bytes());
        bytes.extend_from_slice(&ELEM_POISON.to_ne_bytes());
        let slots = StackSnapshot::slots_from(&bytes, 1);
        assert_eq!(slots.len(), 2);
        assert!(slots[0].live && !slots[0].poisoned);
        assert_eq!(slots[0].value, 5);
        assert!(!slots[1].live && slots[1].poisoned);
    }
}
