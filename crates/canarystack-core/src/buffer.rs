//! Guarded element buffer.
//!
//! One owned allocation laid out as:
//!
//! ```text
//! [front guard | element 0 | element 1 | ... | element cap-1 | back guard]
//! ```
//!
//! The guards are `GUARD_SIZE` bytes wide when guards are enabled and absent
//! (zero width) otherwise. All access is index based; out-of-range requests
//! return `None`/`false` rather than panicking.

use std::ops::Range;

use canarystack_guard::canary::{CANARY, GUARD_SIZE, Guard, poison_fill};
use canarystack_guard::{ELEM_SIZE, Elem};
use thiserror::Error;

/// Why a reallocation was refused. The previous buffer is left untouched.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    #[error("capacity {capacity} overflows the addressable byte range")]
    Overflow { capacity: usize },
    #[error("allocation of {requested} bytes exceeds the limit of {limit} bytes")]
    LimitExceeded { requested: usize, limit: usize },
    #[error("allocator refused {requested} bytes")]
    OutOfMemory { requested: usize },
}

/// Owned `[guard][elements][guard]` allocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GuardedBuffer {
    bytes: Vec<u8>,
    guard_width: usize,
}

impl GuardedBuffer {
    /// A buffer with no allocation.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            bytes: Vec::new(),
            guard_width: 0,
        }
    }

    /// Bytes needed for `capacity` elements plus two guards of `guard_width`.
    #[must_use]
    pub fn byte_len(capacity: usize, guard_width: usize) -> Option<usize> {
        capacity
            .checked_mul(ELEM_SIZE)?
            .checked_add(guard_width.checked_mul(2)?)
    }

    /// Allocate a fresh poison-filled buffer with intact guards.
    pub fn allocate(
        capacity: usize,
        guard_width: usize,
        limit: Option<usize>,
    ) -> Result<Self, AllocError> {
        Self::empty().reallocate(capacity, guard_width, limit)
    }

    /// Build a buffer of `new_capacity` elements carrying over as many of
    /// this buffer's elements as fit. Newly exposed slots are poisoned and
    /// both guards are reset.
    pub fn reallocate(
        &self,
        new_capacity: usize,
        guard_width: usize,
        limit: Option<usize>,
    ) -> Result<Self, AllocError> {
        let total = Self::byte_len(new_capacity, guard_width).ok_or(AllocError::Overflow {
            capacity: new_capacity,
        })?;
        if let Some(limit) = limit
            && total > limit
        {
            return Err(AllocError::LimitExceeded {
                requested: total,
                limit,
            });
        }

        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(total)
            .map_err(|_| AllocError::OutOfMemory { requested: total })?;

        let keep = self.element_bytes().len().min(new_capacity * ELEM_SIZE);
        bytes.resize(guard_width, 0);
        bytes.extend_from_slice(&self.element_bytes()[..keep]);
        let poison_from = bytes.len();
        bytes.resize(total, 0);
        poison_fill(&mut bytes[poison_from..]);

        let mut buffer = Self { bytes, guard_width };
        buffer.reset_guards();
        Ok(buffer)
    }

    #[must_use]
    pub fn is_allocated(&self) -> bool {
        !self.bytes.is_empty()
    }

    /// Number of element slots the allocation holds.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.bytes.len().saturating_sub(2 * self.guard_width) / ELEM_SIZE
    }

    #[must_use]
    pub fn guard_width(&self) -> usize {
        self.guard_width
    }

    /// Total allocation size in bytes, guards included.
    #[must_use]
    pub fn allocated_bytes(&self) -> usize {
        self.bytes.len()
    }

    fn element_range(&self) -> Range<usize> {
        let start = self.guard_width.min(self.bytes.len());
        start..start + self.capacity() * ELEM_SIZE
    }

    fn slot_range(&self, index: usize) -> Option<Range<usize>> {
        if index >= self.capacity() {
            return None;
        }
        let start = self.guard_width + index * ELEM_SIZE;
        Some(start..start + ELEM_SIZE)
    }

    /// The element region (every slot, live or not).
    #[must_use]
    pub fn element_bytes(&self) -> &[u8] {
        &self.bytes[self.element_range()]
    }

    /// Mutable element region, for corruption injection.
    pub(crate) fn element_bytes_mut(&mut self) -> &mut [u8] {
        let range = self.element_range();
        &mut self.bytes[range]
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<Elem> {
        let range = self.slot_range(index)?;
        let raw: [u8; ELEM_SIZE] = self.bytes[range].try_into().ok()?;
        Some(Elem::from_ne_bytes(raw))
    }

    /// Write `value` at `index`. Returns `false` if out of range.
    pub fn set(&mut self, index: usize, value: Elem) -> bool {
        let Some(range) = self.slot_range(index) else {
            return false;
        };
        self.bytes[range].copy_from_slice(&value.to_ne_bytes());
        true
    }

    /// Overwrite slot `index` with poison bytes.
    pub fn poison_slot(&mut self, index: usize) -> bool {
        let Some(range) = self.slot_range(index) else {
            return false;
        };
        poison_fill(&mut self.bytes[range]);
        true
    }

    fn front_range(&self) -> Option<Range<usize>> {
        (self.guard_width == GUARD_SIZE && self.is_allocated()).then_some(0..GUARD_SIZE)
    }

    fn back_range(&self) -> Option<Range<usize>> {
        (self.guard_width == GUARD_SIZE && self.is_allocated()).then(|| {
            let end = self.bytes.len();
            end - GUARD_SIZE..end
        })
    }

    /// Front guard word, if this buffer carries guards.
    #[must_use]
    pub fn front_guard(&self) -> Option<Guard> {
        Guard::read(&self.bytes[self.front_range()?])
    }

    /// Back guard word, if this buffer carries guards.
    #[must_use]
    pub fn back_guard(&self) -> Option<Guard> {
        Guard::read(&self.bytes[self.back_range()?])
    }

    /// True if both guards equal the canary (vacuously true without guards).
    #[must_use]
    pub fn guards_intact(&self) -> bool {
        let front = self.front_guard().is_none_or(|g| g.is_intact());
        let back = self.back_guard().is_none_or(|g| g.is_intact());
        front && back
    }

    /// Write the canary into both guards.
    pub fn reset_guards(&mut self) {
        let canary = CANARY.to_ne_bytes();
        if let Some(range) = self.front_range() {
            self.bytes[range].copy_from_slice(&canary);
        }
        if let Some(range) = self.back_range() {
            self.bytes[range].copy_from_slice(&canary);
        }
    }

    pub(crate) fn write_front_guard(&mut self, value: u64) -> bool {
        let Some(range) = self.front_range() else {
            return false;
        };
        self.bytes[range].copy_from_slice(&value.to_ne_bytes());
        true
    }

    pub(crate) fn write_back_guard(&mut self, value: u64) -> bool {
        let Some(range) = self.back_range() else {
            return false;
        };
        self.bytes[range].copy_from_slice(&value.to_ne_bytes());
        true
    }

    /// Poison the whole allocation and give it back.
    pub fn release(&mut self) {
        poison_fill(&mut self.bytes);
        self.bytes = Vec::new();
        self.guard_width = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canarystack_guard::canary::{ELEM_POISON, is_poisoned};

    #[test]
    fn allocate_poisons_elements_and_sets_guards() {
        let buf = GuardedBuffer::allocate(8, GUARD_SIZE, None).unwrap();
        assert!(buf.is_allocated());
        assert_eq!(buf.capacity(), 8);
        assert_eq!(buf.allocated_bytes(), 8 * ELEM_SIZE + 2 * GUARD_SIZE);
        assert!(is_poisoned(buf.element_bytes()));
        assert!(buf.front_guard().unwrap().is_intact());
        assert!(buf.back_guard().unwrap().is_intact());
        assert_eq!(buf.get(0), Some(ELEM_POISON));
    }

    #[test]
    fn unguarded_buffer_has_no_guards() {
        let buf = GuardedBuffer::allocate(4, 0, None).unwrap();
        assert_eq!(buf.allocated_bytes(), 4 * ELEM_SIZE);
        assert!(buf.front_guard().is_none());
        assert!(buf.back_guard().is_none());
        assert!(buf.guards_intact());
    }

    #[test]
    fn set_get_and_bounds() {
        let mut buf = GuardedBuffer::allocate(2, GUARD_SIZE, None).unwrap();
        assert!(buf.set(0, 41));
        assert!(buf.set(1, -7));
        assert!(!buf.set(2, 0));
        assert_eq!(buf.get(0), Some(41));
        assert_eq!(buf.get(1), Some(-7));
        assert_eq!(buf.get(2), None);
        assert!(buf.guards_intact());
    }

    #[test]
    fn grow_keeps_elements_and_poisons_tail() {
        let mut buf = GuardedBuffer::allocate(2, GUARD_SIZE, None).unwrap();
        buf.set(0, 1);
        buf.set(1, 2);
        let grown = buf.reallocate(4, GUARD_SIZE, None).unwrap();
        assert_eq!(grown.capacity(), 4);
        assert_eq!(grown.get(0), Some(1));
        assert_eq!(grown.get(1), Some(2));
        assert_eq!(grown.get(2), Some(ELEM_POISON));
        assert_eq!(grown.get(3), Some(ELEM_POISON));
        assert!(grown.guards_intact());
    }

    #[test]
    fn shrink_truncates_and_resets_back_guard() {
        let mut buf = GuardedBuffer::allocate(4, GUARD_SIZE, None).unwrap();
        for i in 0..4 {
            buf.set(i, i as Elem * 10);
        }
        let shrunk = buf.reallocate(2, GUARD_SIZE, None).unwrap();
        assert_eq!(shrunk.capacity(), 2);
        assert_eq!(shrunk.get(1), Some(10));
        assert_eq!(shrunk.get(2), None);
        assert!(shrunk.back_guard().unwrap().is_intact());
    }

    #[test]
    fn limit_refuses_allocation_and_leaves_source_alone() {
        let mut buf = GuardedBuffer::allocate(2, GUARD_SIZE, None).unwrap();
        buf.set(0, 9);
        let before = buf.clone();
        let err = buf.reallocate(1024, GUARD_SIZE, Some(64)).unwrap_err();
        assert!(matches!(err, AllocError::LimitExceeded { limit: 64, .. }));
        assert_eq!(buf, before);
    }

    #[test]
    fn overflow_is_reported() {
        let err = GuardedBuffer::allocate(usize::MAX, GUARD_SIZE, None).unwrap_err();
        assert_eq!(err, AllocError::Overflow { capacity: usize::MAX });
    }

    #[test]
    fn guard_corruption_is_visible() {
        let mut buf = GuardedBuffer::allocate(2, GUARD_SIZE, None).unwrap();
        assert!(buf.write_back_guard(0));
        assert!(!buf.guards_intact());
        buf.reset_guards();
        assert!(buf.guards_intact());
    }

    #[test]
    fn release_drops_allocation() {
        let mut buf = GuardedBuffer::allocate(8, GUARD_SIZE, None).unwrap();
        buf.release();
        assert!(!buf.is_allocated());
        assert_eq!(buf.capacity(), 0);
        assert!(buf.element_bytes().is_empty());
    }
}
