//! Composable error flags returned by every stack operation.
//!
//! Operations never panic on bad state. They return an [`ErrorSet`]: zero
//! or more independent problems found by the verifier or by the operation
//! itself. An empty set means success.

use std::fmt;

use serde::{Serialize, Serializer};
use thiserror::Error;

/// A single problem an operation can report.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StackError {
    #[error("allocation has failed")]
    AllocationFailure,
    #[error("buffer is invalid")]
    InvalidBuffer,
    #[error("bad stack hash (stack is corrupted)")]
    CorruptStructHash,
    #[error("bad buffer hash (buffer is corrupted)")]
    CorruptBufferHash,
    #[error("bad stack canary (stack is corrupted)")]
    CorruptStructGuard,
    #[error("bad buffer canary (buffer is corrupted)")]
    CorruptBufferGuard,
    #[error("trying to initialize an already initialized stack")]
    DoubleInitialize,
    #[error("trying to destroy an already destroyed stack")]
    DoubleDestroy,
    #[error("stack is destroyed")]
    UseAfterDestroy,
    #[error("size is greater than capacity")]
    SizeExceedsCapacity,
    #[error("trying to pop from an empty stack")]
    PopFromEmpty,
    #[error("null stack reference was passed")]
    NullReference,
    #[error("null output argument was passed")]
    NullArgument,
    #[error("stack is used before initialization")]
    UseBeforeInitialize,
}

impl StackError {
    /// Every error, in flag-bit order.
    pub const ALL: [Self; 14] = [
        Self::AllocationFailure,
        Self::InvalidBuffer,
        Self::CorruptStructHash,
        Self::CorruptBufferHash,
        Self::CorruptStructGuard,
        Self::CorruptBufferGuard,
        Self::DoubleInitialize,
        Self::DoubleDestroy,
        Self::UseAfterDestroy,
        Self::SizeExceedsCapacity,
        Self::PopFromEmpty,
        Self::NullReference,
        Self::NullArgument,
        Self::UseBeforeInitialize,
    ];

    /// The flag this error occupies in an [`ErrorSet`].
    #[must_use]
    pub const fn flag(self) -> ErrorSet {
        match self {
            Self::AllocationFailure => ErrorSet::ALLOCATION_FAILURE,
            Self::InvalidBuffer => ErrorSet::INVALID_BUFFER,
            Self::CorruptStructHash => ErrorSet::CORRUPT_STRUCT_HASH,
            Self::CorruptBufferHash => ErrorSet::CORRUPT_BUFFER_HASH,
            Self::CorruptStructGuard => ErrorSet::CORRUPT_STRUCT_GUARD,
            Self::CorruptBufferGuard => ErrorSet::CORRUPT_BUFFER_GUARD,
            Self::DoubleInitialize => ErrorSet::DOUBLE_INITIALIZE,
            Self::DoubleDestroy => ErrorSet::DOUBLE_DESTROY,
            Self::UseAfterDestroy => ErrorSet::USE_AFTER_DESTROY,
            Self::SizeExceedsCapacity => ErrorSet::SIZE_EXCEEDS_CAPACITY,
            Self::PopFromEmpty => ErrorSet::POP_FROM_EMPTY,
            Self::NullReference => ErrorSet::NULL_REFERENCE,
            Self::NullArgument => ErrorSet::NULL_ARGUMENT,
            Self::UseBeforeInitialize => ErrorSet::USE_BEFORE_INITIALIZE,
        }
    }

    /// Stable machine-readable name (used in logs and scripts).
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::AllocationFailure => "ALLOCATION_FAILURE",
            Self::InvalidBuffer => "INVALID_BUFFER",
            Self::CorruptStructHash => "CORRUPT_STRUCT_HASH",
            Self::CorruptBufferHash => "CORRUPT_BUFFER_HASH",
            Self::CorruptStructGuard => "CORRUPT_STRUCT_GUARD",
            Self::CorruptBufferGuard => "CORRUPT_BUFFER_GUARD",
            Self::DoubleInitialize => "DOUBLE_INITIALIZE",
            Self::DoubleDestroy => "DOUBLE_DESTROY",
            Self::UseAfterDestroy => "USE_AFTER_DESTROY",
            Self::SizeExceedsCapacity => "SIZE_EXCEEDS_CAPACITY",
            Self::PopFromEmpty => "POP_FROM_EMPTY",
            Self::NullReference => "NULL_REFERENCE",
            Self::NullArgument => "NULL_ARGUMENT",
            Self::UseBeforeInitialize => "USE_BEFORE_INITIALIZE",
        }
    }

    /// Parse a name produced by [`StackError::name`] (case-insensitive,
    /// `-` accepted for `_`).
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let normalized = name.trim().to_ascii_uppercase().replace('-', "_");
        Self::ALL.into_iter().find(|e| e.name() == normalized)
    }

    /// True for data-corruption errors (guards and hashes).
    #[must_use]
    pub const fn is_corruption(self) -> bool {
        matches!(
            self,
            Self::CorruptStructHash
                | Self::CorruptBufferHash
                | Self::CorruptStructGuard
                | Self::CorruptBufferGuard
        )
    }
}

/// Bit set of [`StackError`] flags.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ErrorSet(u32);

impl ErrorSet {
    pub const EMPTY: Self = Self(0);
    pub const ALLOCATION_FAILURE: Self = Self(1 << 0);
    pub const INVALID_BUFFER: Self = Self(1 << 1);
    pub const CORRUPT_STRUCT_HASH: Self = Self(1 << 2);
    pub const CORRUPT_BUFFER_HASH: Self = Self(1 << 3);
    pub const CORRUPT_STRUCT_GUARD: Self = Self(1 << 4);
    pub const CORRUPT_BUFFER_GUARD: Self = Self(1 << 5);
    pub const DOUBLE_INITIALIZE: Self = Self(1 << 6);
    pub const DOUBLE_DESTROY: Self = Self(1 << 7);
    pub const USE_AFTER_DESTROY: Self = Self(1 << 8);
    pub const SIZE_EXCEEDS_CAPACITY: Self = Self(1 << 9);
    // bit 10 is unused
    pub const POP_FROM_EMPTY: Self = Self(1 << 11);
    pub const NULL_REFERENCE: Self = Self(1 << 12);
    pub const NULL_ARGUMENT: Self = Self(1 << 13);
    pub const USE_BEFORE_INITIALIZE: Self = Self(1 << 14);

    const ALL_BITS: u32 = 0b111_1011_1111_1111;

    /// Raw bit representation (stable across releases).
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Build a set from raw bits, dropping unknown bits.
    #[must_use]
    pub const fn from_bits_truncate(bits: u32) -> Self {
        Self(bits & Self::ALL_BITS)
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True if every flag in `other` is set in `self`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// True if any flag in `other` is set in `self`.
    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// Number of flags set.
    #[must_use]
    pub const fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Iterate the individual errors, in flag-bit order.
    pub fn errors(self) -> impl Iterator<Item = StackError> {
        StackError::ALL
            .into_iter()
            .filter(move |e| self.contains(e.flag()))
    }

    /// Names of the set flags, in flag-bit order.
    #[must_use]
    pub fn names(self) -> Vec<&'static str> {
        self.errors().map(StackError::name).collect()
    }

    /// True if any guard or hash flag is set.
    #[must_use]
    pub fn has_corruption(self) -> bool {
        self.errors().any(StackError::is_corruption)
    }

    /// `Ok(())` for an empty set, otherwise `Err(self)`.
    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }

    /// Parse `ok` or a `|`/`,`-separated list of flag names.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.eq_ignore_ascii_case("ok") || text.eq_ignore_ascii_case("empty") {
            return Some(Self::EMPTY);
        }
        let mut set = Self::EMPTY;
        for part in text.split(['|', ',']) {
            set.insert(StackError::from_name(part)?.flag());
        }
        Some(set)
    }
}

impl From<StackError> for ErrorSet {
    fn from(err: StackError) -> Self {
        err.flag()
    }
}

impl std::ops::BitOr for ErrorSet {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl std::ops::BitOrAssign for ErrorSet {
    fn bitor_assign(&mut self, rhs: Self) {
        self.insert(rhs);
    }
}

impl std::ops::BitAnd for ErrorSet {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl fmt::Debug for ErrorSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ErrorSet({:#06x}: {})", self.0, self)
    }
}

impl fmt::Display for ErrorSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("OK");
        }
        f.write_str(&self.names().join("|"))
    }
}

impl std::error::Error for ErrorSet {}

impl Serialize for ErrorSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.errors().map(StackError::name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_are_distinct_bits() {
        let mut seen = 0u32;
        for err in StackError::ALL {
            let bits = err.flag().bits();
            assert_eq!(bits.count_ones(), 1, "{err:?}");
            assert_eq!(seen & bits, 0, "{err:?} overlaps");
            seen |= bits;
        }
        assert_eq!(seen, ErrorSet::ALL_BITS);
    }

    #[test]
    fn union_and_iteration() {
        let set = ErrorSet::CORRUPT_BUFFER_HASH | ErrorSet::CORRUPT_STRUCT_GUARD;
        assert_eq!(set.len(), 2);
        assert!(set.contains(ErrorSet::CORRUPT_BUFFER_HASH));
        assert!(!set.contains(ErrorSet::POP_FROM_EMPTY));
        let errors: Vec<_> = set.errors().collect();
        assert_eq!(
            errors,
            vec![StackError::CorruptBufferHash, StackError::CorruptStructGuard]
        );
        assert!(set.has_corruption());
    }

    #[test]
    fn empty_set_is_ok() {
        assert!(ErrorSet::EMPTY.is_empty());
        assert!(ErrorSet::default().into_result().is_ok());
        assert_eq!(ErrorSet::EMPTY.to_string(), "OK");
        assert_eq!(
            ErrorSet::POP_FROM_EMPTY.into_result(),
            Err(ErrorSet::POP_FROM_EMPTY)
        );
    }

    #[test]
    fn display_joins_names() {
        let set = ErrorSet::SIZE_EXCEEDS_CAPACITY | ErrorSet::USE_AFTER_DESTROY;
        assert_eq!(set.to_string(), "USE_AFTER_DESTROY|SIZE_EXCEEDS_CAPACITY");
    }

    #[test]
    fn parse_accepts_names_and_ok() {
        assert_eq!(ErrorSet::parse("ok"), Some(ErrorSet::EMPTY));
        assert_eq!(
            ErrorSet::parse("pop-from-empty"),
            Some(ErrorSet::POP_FROM_EMPTY)
        );
        assert_eq!(
            ErrorSet::parse("CORRUPT_BUFFER_HASH|corrupt_buffer_guard"),
            Some(ErrorSet::CORRUPT_BUFFER_HASH | ErrorSet::CORRUPT_BUFFER_GUARD)
        );
        assert_eq!(ErrorSet::parse("NOT_A_FLAG"), None);
    }

    #[test]
    fn from_bits_truncate_drops_unknown_bits() {
        let set = ErrorSet::from_bits_truncate(1 << 10 | 1 << 11 | 1 << 31);
        assert_eq!(set, ErrorSet::POP_FROM_EMPTY);
    }

    #[test]
    fn serializes_as_name_list() {
        let set = ErrorSet::NULL_ARGUMENT | ErrorSet::ALLOCATION_FAILURE;
        let json = serde_json::to_value(set).unwrap();
        assert_eq!(json, serde_json::json!(["ALLOCATION_FAILURE", "NULL_ARGUMENT"]));
    }

    #[test]
    fn error_messages_are_human_readable() {
        assert_eq!(
            StackError::PopFromEmpty.to_string(),
            "trying to pop from an empty stack"
        );
        assert!(StackError::CorruptBufferGuard.is_corruption());
        assert!(!StackError::DoubleDestroy.is_corruption());
    }
}
