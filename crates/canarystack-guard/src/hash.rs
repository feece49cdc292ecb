//! Byte hashers used for structural and content hashing.
//!
//! The engine only needs determinism: the same bytes must always produce the
//! same 64-bit value. Collision resistance is not a goal.

/// Injectable hash function consulted by the stack engine.
pub trait StackHasher {
    /// Hash `bytes` to a 64-bit value.
    fn hash(&self, bytes: &[u8]) -> u64;
}

impl<F> StackHasher for F
where
    F: Fn(&[u8]) -> u64,
{
    fn hash(&self, bytes: &[u8]) -> u64 {
        self(bytes)
    }
}

/// 64-bit FNV-1 (multiply, then xor).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Fnv1;

impl Fnv1 {
    pub const OFFSET_BASIS: u64 = 0xCBF2_9CE4_8422_2325;
    pub const PRIME: u64 = 0x0000_0100_0000_01B3;
}

impl StackHasher for Fnv1 {
    fn hash(&self, bytes: &[u8]) -> u64 {
        if bytes.is_empty() {
            return 0;
        }
        bytes.iter().fold(Self::OFFSET_BASIS, |h, &b| {
            h.wrapping_mul(Self::PRIME) ^ u64::from(b)
        })
    }
}

/// BLAKE3 truncated to its first eight bytes (little-endian).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Blake3Hasher;

impl StackHasher for Blake3Hasher {
    fn hash(&self, bytes: &[u8]) -> u64 {
        let digest = blake3::hash(bytes);
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest.as_bytes()[..8]);
        u64::from_le_bytes(head)
    }
}
