//! The stack engine.
//!
//! A [`Stack`] starts `Uninitialized`, becomes `Live` through
//! [`Stack::create`], and ends `Destroyed` through [`Stack::destroy`]. The
//! handle itself outlives destruction so later misuse is detected and
//! reported instead of touching freed memory.
//!
//! Every mutating operation runs the verifier first and fails fast on any
//! flag, then mutates, refreshes hashes, and returns the verifier's verdict
//! on the new state.

use std::fmt;
use std::sync::Arc;

use canarystack_guard::canary::{CANARY, GUARD_SIZE, SIZE_POISON};
use canarystack_guard::{Elem, ErrorSet, Fnv1, ProtectionLevel, StackHasher, StackMetrics};
use serde::Serialize;

use crate::buffer::{AllocError, GuardedBuffer};
use crate::config::{ConfigError, StackConfig};
use crate::diagnostics::{CallSite, DiagnosticReport, DiagnosticSink, StackSnapshot};
use crate::verify;

/// Lifecycle state of a stack handle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum HandleState {
    /// Constructed but not yet created.
    #[default]
    Uninitialized,
    /// Created and usable.
    Live,
    /// Destroyed; every further operation is rejected.
    Destroyed,
}

impl HandleState {
    const fn tag(self) -> u8 {
        match self {
            Self::Uninitialized => 0,
            Self::Live => 1,
            Self::Destroyed => 2,
        }
    }
}

/// Growable LIFO stack of [`Elem`] with optional integrity protection.
pub struct Stack<H: StackHasher = Fnv1> {
    pub(crate) begin_guard: u64,
    pub(crate) struct_hash: u64,
    pub(crate) state: HandleState,
    pub(crate) buffer: GuardedBuffer,
    pub(crate) preset_capacity: usize,
    pub(crate) size: usize,
    pub(crate) capacity: usize,
    pub(crate) origin: Option<CallSite>,
    pub(crate) buffer_hash: u64,
    pub(crate) end_guard: u64,
    pub(crate) config: StackConfig,
    pub(crate) hasher: H,
    sink: Option<Arc<dyn DiagnosticSink>>,
    metrics: StackMetrics,
}

impl Stack<Fnv1> {
    /// An uninitialized stack with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::build(StackConfig::default(), Fnv1)
    }

    /// An uninitialized stack with `config`.
    pub fn with_config(config: StackConfig) -> Result<Self, ConfigError> {
        Self::with_hasher(config, Fnv1)
    }
}

impl Default for Stack<Fnv1> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: StackHasher> Stack<H> {
    /// An uninitialized stack with `config` hashing through `hasher`.
    pub fn with_hasher(config: StackConfig, hasher: H) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(config, hasher))
    }

    fn build(config: StackConfig, hasher: H) -> Self {
        Self {
            begin_guard: 0,
            struct_hash: 0,
            state: HandleState::Uninitialized,
            buffer: GuardedBuffer::empty(),
            preset_capacity: 0,
            size: 0,
            capacity: 0,
            origin: None,
            buffer_hash: 0,
            end_guard: 0,
            config,
            hasher,
            sink: None,
            metrics: StackMetrics::new(),
        }
    }

    /// Attach a diagnostic sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    // -----------------------------------------------------------------------
    // Operations
    // -----------------------------------------------------------------------

    /// Initialize the handle, pre-sizing the buffer when `preset_size > 0`.
    #[track_caller]
    pub fn create(&mut self, preset_size: usize) -> ErrorSet {
        let site = CallSite::here("create");
        let result = self.create_inner(preset_size, site);
        self.report(&site, result, None);
        result
    }

    /// Push `value` on top, growing the buffer when full.
    #[track_caller]
    pub fn push(&mut self, value: Elem) -> ErrorSet {
        let site = CallSite::here("push");
        let result = self.push_inner(value);
        self.report(&site, result, None);
        result
    }

    /// Pop the top element into `out`, shrinking the buffer when sparse.
    ///
    /// `out == None` reports `NULL_ARGUMENT`. An empty stack reports
    /// `POP_FROM_EMPTY` and changes nothing.
    #[track_caller]
    pub fn pop(&mut self, out: Option<&mut Elem>) -> ErrorSet {
        let site = CallSite::here("pop");
        let result = self.pop_inner(out);
        self.report(&site, result, None);
        result
    }

    /// Pop the top element, returning it or the flags that prevented it.
    #[track_caller]
    pub fn pop_value(&mut self) -> Result<Elem, ErrorSet> {
        let mut value = 0;
        self.pop(Some(&mut value)).into_result().map(|()| value)
    }

    /// Release the buffer and poison every field. The handle stays around
    /// so later calls report `USE_AFTER_DESTROY` / `DOUBLE_DESTROY`.
    #[track_caller]
    pub fn destroy(&mut self) -> ErrorSet {
        let site = CallSite::here("destroy");
        if self.state == HandleState::Destroyed {
            let result = ErrorSet::DOUBLE_DESTROY;
            self.report(&site, result, None);
            return result;
        }

        // Teardown always proceeds; pre-existing damage is only reported.
        let found = self.verify_counted();
        self.report(&site, found, Some("state before destroy"));

        self.size = SIZE_POISON as usize;
        self.capacity = SIZE_POISON as usize;
        self.preset_capacity = SIZE_POISON as usize;
        self.struct_hash = SIZE_POISON;
        self.buffer_hash = SIZE_POISON;
        self.begin_guard = SIZE_POISON;
        self.end_guard = SIZE_POISON;
        self.origin = None;
        self.buffer.release();
        self.state = HandleState::Destroyed;
        StackMetrics::inc(&self.metrics.destroys);
        ErrorSet::EMPTY
    }

    /// Run the verifier on the current state.
    #[must_use]
    pub fn verify(&self) -> ErrorSet {
        verify::verify(Some(self))
    }

    /// Send an explicit dump of the current state to the sink.
    ///
    /// Returns `false` when diagnostics are off or no sink is attached.
    #[track_caller]
    pub fn dump(&self, message: &str) -> bool {
        let site = CallSite::here("dump");
        let errors = self.verify();
        self.report(&site, errors, Some(message))
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn preset_capacity(&self) -> usize {
        self.preset_capacity
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    #[must_use]
    pub fn state(&self) -> HandleState {
        self.state
    }

    #[must_use]
    pub fn config(&self) -> &StackConfig {
        &self.config
    }

    #[must_use]
    pub fn protection(&self) -> ProtectionLevel {
        self.config.protection
    }

    /// Where the stack was created from.
    #[must_use]
    pub fn origin(&self) -> Option<&CallSite> {
        self.origin.as_ref()
    }

    #[must_use]
    pub fn metrics(&self) -> &StackMetrics {
        &self.metrics
    }

    /// Top element without removing it.
    #[must_use]
    pub fn peek(&self) -> Option<Elem> {
        if self.state != HandleState::Live {
            return None;
        }
        self.size.checked_sub(1).and_then(|top| self.buffer.get(top))
    }

    /// Live elements, bottom to top.
    #[must_use]
    pub fn live(&self) -> Vec<Elem> {
        (0..self.size.min(self.buffer.capacity()))
            .filter_map(|i| self.buffer.get(i))
            .collect()
    }

    /// Copy of everything a dump shows.
    #[must_use]
    pub fn snapshot(&self) -> StackSnapshot {
        StackSnapshot {
            state: self.state,
            protection: self.config.protection,
            size: self.size,
            capacity: self.capacity,
            preset_capacity: self.preset_capacity,
            begin_guard: self.begin_guard,
            end_guard: self.end_guard,
            struct_hash: self.struct_hash,
            buffer_hash: self.buffer_hash,
            buffer_allocated: self.buffer.is_allocated(),
            buffer_front_guard: self.buffer.front_guard().map(|g| g.value),
            buffer_back_guard: self.buffer.back_guard().map(|g| g.value),
            origin: self.origin,
            slots: StackSnapshot::slots_from(self.buffer.element_bytes(), self.size),
        }
    }

    /// Raw write access that bypasses hash refresh, for corruption drills.
    pub fn tamper(&mut self) -> Tamper<'_, H> {
        Tamper { stack: self }
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn create_inner(&mut self, preset_size: usize, site: CallSite) -> ErrorSet {
        match self.state {
            HandleState::Destroyed => return ErrorSet::USE_AFTER_DESTROY,
            HandleState::Live => return ErrorSet::DOUBLE_INITIALIZE,
            HandleState::Uninitialized => {}
        }
        if self.buffer.is_allocated() || self.struct_hash != 0 {
            return ErrorSet::DOUBLE_INITIALIZE;
        }

        if preset_size > 0 {
            let preset = self.config.initial_capacity(preset_size);
            if self.resize(preset).is_err() {
                return ErrorSet::ALLOCATION_FAILURE;
            }
            self.preset_capacity = preset;
        }

        self.origin = Some(site);
        self.state = HandleState::Live;
        self.set_struct_guards();
        self.refresh_hashes();
        StackMetrics::inc(&self.metrics.creates);
        self.verify_counted()
    }

    fn push_inner(&mut self, value: Elem) -> ErrorSet {
        let found = self.verify_counted();
        if !found.is_empty() {
            return found;
        }

        if self.size == self.capacity {
            let target = self.capacity.saturating_mul(self.config.growth_multiplier);
            if self.resize(target).is_err() {
                return ErrorSet::ALLOCATION_FAILURE;
            }
        }

        if !self.buffer.set(self.size, value) {
            return ErrorSet::INVALID_BUFFER;
        }
        self.size += 1;
        StackMetrics::inc(&self.metrics.pushes);

        self.refresh_hashes();
        self.verify_counted()
    }

    fn pop_inner(&mut self, out: Option<&mut Elem>) -> ErrorSet {
        let found = self.verify_counted();
        if !found.is_empty() {
            return found;
        }
        let Some(out) = out else {
            return ErrorSet::NULL_ARGUMENT;
        };
        let Some(top) = self.size.checked_sub(1) else {
            StackMetrics::inc(&self.metrics.pop_from_empty);
            return ErrorSet::POP_FROM_EMPTY;
        };
        let Some(value) = self.buffer.get(top) else {
            return ErrorSet::INVALID_BUFFER;
        };

        *out = value;
        self.size = top;
        if self.config.protection.any_enabled() {
            self.buffer.poison_slot(top);
        }
        StackMetrics::inc(&self.metrics.pops);

        let mut result = ErrorSet::EMPTY;
        if self.config.should_shrink(self.size, self.capacity)
            && self
                .resize(self.capacity / self.config.growth_multiplier)
                .is_err()
        {
            // The element is already out; keep the old allocation.
            result |= ErrorSet::ALLOCATION_FAILURE;
        }

        self.refresh_hashes();
        result | self.verify_counted()
    }

    /// Reallocate to `requested` elements, clamped to the minimum and the
    /// preset floor. On failure nothing changes.
    fn resize(&mut self, requested: usize) -> Result<(), AllocError> {
        let target = self
            .config
            .clamp_capacity(requested, self.preset_capacity);
        if target == self.capacity {
            return Ok(());
        }

        let guard_width = if self.config.protection.guards {
            GUARD_SIZE
        } else {
            0
        };
        let resized = self
            .buffer
            .reallocate(target, guard_width, self.config.allocation_limit)
            .inspect_err(|_| StackMetrics::inc(&self.metrics.allocation_failures))?;

        let counter = if target > self.capacity {
            &self.metrics.grows
        } else {
            &self.metrics.shrinks
        };
        StackMetrics::inc(counter);

        let mut previous = std::mem::replace(&mut self.buffer, resized);
        previous.release();
        self.capacity = self.buffer.capacity();
        Ok(())
    }

    fn set_struct_guards(&mut self) {
        if self.config.protection.guards {
            self.begin_guard = CANARY;
            self.end_guard = CANARY;
        }
    }

    fn refresh_hashes(&mut self) {
        let protection = self.config.protection;
        if protection.buffer_hash {
            self.buffer_hash = self.compute_buffer_hash();
        }
        if protection.struct_hash {
            self.struct_hash = self.compute_struct_hash();
        }
    }

    /// Hash over the element region, or 0 without a buffer.
    pub(crate) fn compute_buffer_hash(&self) -> u64 {
        if self.buffer.is_allocated() {
            self.hasher.hash(self.buffer.element_bytes())
        } else {
            0
        }
    }

    /// Hash over every bookkeeping field except the guards and the
    /// structural hash itself.
    pub(crate) fn compute_struct_hash(&self) -> u64 {
        let mut fields = Vec::with_capacity(72);
        fields.push(self.state.tag());
        fields.extend_from_slice(&(self.size as u64).to_le_bytes());
        fields.extend_from_slice(&(self.capacity as u64).to_le_bytes());
        fields.extend_from_slice(&(self.preset_capacity as u64).to_le_bytes());
        fields.extend_from_slice(&self.buffer_hash.to_le_bytes());
        fields.push(u8::from(self.buffer.is_allocated()));
        fields.extend_from_slice(&(self.buffer.allocated_bytes() as u64).to_le_bytes());
        if let Some(origin) = &self.origin {
            fields.extend_from_slice(origin.file.as_bytes());
            fields.extend_from_slice(&origin.line.to_le_bytes());
            fields.extend_from_slice(&origin.column.to_le_bytes());
        }
        self.hasher.hash(&fields)
    }

    fn verify_counted(&self) -> ErrorSet {
        let found = self.verify();
        StackMetrics::inc(&self.metrics.verifications);
        if !found.is_empty() {
            StackMetrics::inc(&self.metrics.verification_failures);
        }
        found
    }

    fn report(&self, site: &CallSite, errors: ErrorSet, message: Option<&str>) -> bool {
        if !self.config.protection.diagnostics {
            return false;
        }
        let Some(sink) = &self.sink else {
            return false;
        };
        let snapshot = self.snapshot();
        sink.record(&DiagnosticReport {
            site,
            errors,
            snapshot: &snapshot,
            message,
        });
        true
    }
}

impl<H: StackHasher> fmt::Debug for Stack<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stack")
            .field("state", &self.state)
            .field("size", &self.size)
            .field("capacity", &self.capacity)
            .field("preset_capacity", &self.preset_capacity)
            .field("protection", &self.config.protection)
            .field("has_sink", &self.sink.is_some())
            .finish_non_exhaustive()
    }
}

/// Raw mutation handle returned by [`Stack::tamper`].
///
/// Writes go straight to the stored fields or buffer bytes without
/// refreshing hashes, the way a stray write from elsewhere would.
pub struct Tamper<'a, H: StackHasher> {
    stack: &'a mut Stack<H>,
}

impl<H: StackHasher> Tamper<'_, H> {
    pub fn struct_guard_begin(&mut self, value: u64) {
        self.stack.begin_guard = value;
    }

    pub fn struct_guard_end(&mut self, value: u64) {
        self.stack.end_guard = value;
    }

    /// Overwrite the buffer's front guard. `false` without buffer guards.
    pub fn buffer_guard_front(&mut self, value: u64) -> bool {
        self.stack.buffer.write_front_guard(value)
    }

    /// Overwrite the buffer's back guard. `false` without buffer guards.
    pub fn buffer_guard_back(&mut self, value: u64) -> bool {
        self.stack.buffer.write_back_guard(value)
    }

    /// XOR one byte of the element region with `mask`.
    pub fn flip_buffer_byte(&mut self, byte_index: usize, mask: u8) -> bool {
        match self.stack.buffer.element_bytes_mut().get_mut(byte_index) {
            Some(byte) => {
                *byte ^= mask;
                true
            }
            None => false,
        }
    }

    /// Overwrite element slot `index` in place.
    pub fn write_slot(&mut self, index: usize, value: Elem) -> bool {
        self.stack.buffer.set(index, value)
    }

    pub fn set_size(&mut self, size: usize) {
        self.stack.size = size;
    }

    pub fn set_capacity(&mut self, capacity: usize) {
        self.stack.capacity = capacity;
    }

    pub fn set_struct_hash(&mut self, hash: u64) {
        self.stack.struct_hash = hash;
    }

    pub fn set_buffer_hash(&mut self, hash: u64) {
        self.stack.buffer_hash = hash;
    }
}
