//! Read-only integrity check.
//!
//! Lifecycle and structural checks always run because they gate safe
//! indexing into the buffer. Guard and hash checks follow the stack's
//! [`ProtectionLevel`](canarystack_guard::ProtectionLevel).

use canarystack_guard::canary::CANARY;
use canarystack_guard::{ErrorSet, StackHasher};

use crate::stack::{HandleState, Stack};

/// Check `stack` and return every problem found. Empty means valid.
///
/// Never mutates and never panics; calling it twice in a row yields the
/// same result.
#[must_use]
pub fn verify<H: StackHasher>(stack: Option<&Stack<H>>) -> ErrorSet {
    let Some(stack) = stack else {
        return ErrorSet::NULL_REFERENCE;
    };

    let mut found = ErrorSet::EMPTY;
    match stack.state {
        HandleState::Uninitialized => return ErrorSet::USE_BEFORE_INITIALIZE,
        HandleState::Live | HandleState::Destroyed => {}
    }

    if stack.size > stack.capacity {
        found |= ErrorSet::SIZE_EXCEEDS_CAPACITY;
    }
    if stack.state == HandleState::Destroyed {
        return found | ErrorSet::USE_AFTER_DESTROY;
    }

    let buffer = &stack.buffer;
    let buffer_mismatch = if buffer.is_allocated() {
        buffer.capacity() != stack.capacity
    } else {
        stack.size != 0 || stack.capacity != 0
    };
    if buffer_mismatch {
        return found | ErrorSet::INVALID_BUFFER;
    }

    let protection = stack.config.protection;
    if protection.guards {
        if stack.begin_guard != CANARY || stack.end_guard != CANARY {
            found |= ErrorSet::CORRUPT_STRUCT_GUARD;
        }
        if !buffer.guards_intact() {
            found |= ErrorSet::CORRUPT_BUFFER_GUARD;
        }
    }

    if protection.struct_hash && stack.struct_hash != stack.compute_struct_hash() {
        found |= ErrorSet::CORRUPT_STRUCT_HASH;
    }

    if protection.buffer_hash
        && buffer.is_allocated()
        && stack.buffer_hash != stack.compute_buffer_hash()
    {
        found |= ErrorSet::CORRUPT_BUFFER_HASH;
    }

    found
}
