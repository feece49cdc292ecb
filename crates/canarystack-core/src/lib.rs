//! canarystack core: a growable LIFO stack that verifies itself.
//!
//! Every mutating operation passes through the verifier before and after it
//! touches state. Depending on the configured [`ProtectionLevel`], the
//! verifier checks:
//! - **Lifecycle** (`HandleState`): use before create, use after destroy
//! - **Structure**: size against capacity, buffer against bookkeeping
//! - **Guards**: canary words around the struct and the element buffer
//! - **Hashes**: structural hash over bookkeeping, content hash over elements
//!
//! # Architecture
//!
//! - **Configuration** (`config`): capacity policy, allocation limit, protection
//! - **Guarded buffer** (`buffer`): one allocation laid out `[guard][elements][guard]`
//! - **Engine** (`stack`): create, push, pop, destroy, growth and shrink
//! - **Verifier** (`verify`): pure read-only integrity check
//! - **Diagnostics** (`diagnostics`, `dump`): sinks that receive per-operation reports

#![deny(unsafe_code)]

pub mod buffer;
pub mod config;
pub mod diagnostics;
pub mod dump;
pub mod stack;
pub mod verify;

pub use canarystack_guard::{
    Blake3Hasher, ELEM_SIZE, Elem, ErrorSet, Fnv1, MetricsSnapshot, ProtectionLevel, StackError,
    StackHasher, StackMetrics, protection_level,
};
pub use config::{ConfigError, StackConfig};
pub use diagnostics::{CallSite, DiagnosticReport, DiagnosticSink, MemorySink, StackSnapshot};
pub use dump::{JsonlSink, LogTarget, LogWriter, SharedBuffer, TextDumpSink};
pub use stack::{HandleState, Stack, Tamper};
pub use verify::verify;
