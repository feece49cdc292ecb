//! Guard words and poison patterns.
//!
//! Every protected stack carries:
//! - Two 8-byte guard words bracketing the logical struct
//! - Two 8-byte guard words bracketing the element region of its buffer
//! - Poison bytes in every slot that is not live (popped, freshly grown)
//!
//! A guard that no longer equals [`CANARY`] means something wrote past the
//! bounds of a neighbouring object. Poisoned slots make stale reads stand out
//! in dumps.

use crate::Elem;

/// Sentinel stored in every intact guard word.
pub const CANARY: u64 = 0xBAC1_CAB1_DED1_BED1;

/// Size of a guard word in bytes.
pub const GUARD_SIZE: usize = std::mem::size_of::<u64>();

/// Fill byte for slots that hold no live element.
pub const BYTE_POISON: u8 = 0xBD;

/// Pattern written over size, capacity, hashes and guards on destroy.
pub const SIZE_POISON: u64 = 0x1BAD_BADB_ADBA_DBAD;

/// An element whose bytes are all [`BYTE_POISON`].
pub const ELEM_POISON: Elem = Elem::from_ne_bytes([BYTE_POISON; crate::ELEM_SIZE]);

/// Guard word view with byte-level (de)serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Guard {
    pub value: u64,
}

impl Guard {
    /// An intact guard.
    #[must_use]
    pub const fn intact() -> Self {
        Self { value: CANARY }
    }

    /// A guard overwritten by destroy.
    #[must_use]
    pub const fn poisoned() -> Self {
        Self { value: SIZE_POISON }
    }

    #[must_use]
    pub const fn is_intact(&self) -> bool {
        self.value == CANARY
    }

    #[must_use]
    pub fn to_bytes(&self) -> [u8; GUARD_SIZE] {
        self.value.to_ne_bytes()
    }

    #[must_use]
    pub fn from_bytes(bytes: &[u8; GUARD_SIZE]) -> Self {
        Self {
            value: u64::from_ne_bytes(*bytes),
        }
    }

    /// Read a guard from the first [`GUARD_SIZE`] bytes of `bytes`.
    ///
    /// Returns `None` when the slice is too short.
    #[must_use]
    pub fn read(bytes: &[u8]) -> Option<Self> {
        let head: &[u8; GUARD_SIZE] = bytes.get(..GUARD_SIZE)?.try_into().ok()?;
        Some(Self::from_bytes(head))
    }
}

/// Overwrite every byte of `bytes` with [`BYTE_POISON`].
pub fn poison_fill(bytes: &mut [u8]) {
    bytes.fill(BYTE_POISON);
}

/// True if every byte of `bytes` is [`BYTE_POISON`].
#[must_use]
pub fn is_poisoned(bytes: &[u8]) -> bool {
    bytes.iter().all(|&b| b == BYTE_POISON)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_roundtrip() {
        let guard = Guard::intact();
        let bytes = guard.to_bytes();
        assert_eq!(Guard::from_bytes(&bytes), guard);
        assert!(guard.is_intact());
    }

    #[test]
    fn flipped_byte_breaks_guard() {
        let mut bytes = Guard::intact().to_bytes();
        bytes[5] ^= 0x01;
        assert!(!Guard::from_bytes(&bytes).is_intact());
    }

    #[test]
    fn read_rejects_short_slices() {
        assert!(Guard::read(&[0u8; 4]).is_none());
        let mut long = Guard::intact().to_bytes().to_vec();
        long.extend_from_slice(&[1, 2, 3]);
        assert!(Guard::read(&long).unwrap().is_intact());
    }

    #[test]
    fn poisoned_guard_is_not_intact() {
        assert!(!Guard::poisoned().is_intact());
    }

    #[test]
    fn poison_fill_marks_every_byte() {
        let mut buf = [0u8; 12];
        poison_fill(&mut buf[4..]);
        assert!(!is_poisoned(&buf));
        assert!(is_poisoned(&buf[4..]));
        assert_eq!(
            Elem::from_ne_bytes(buf[4..8].try_into().unwrap()),
            ELEM_POISON
        );
    }
}
