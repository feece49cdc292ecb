//! Shared fixtures for the canarystack benchmarks.

use canarystack_core::{ProtectionLevel, Stack, StackConfig};

/// Every protection level paired with its benchmark label.
#[must_use]
pub fn levels() -> [(&'static str, ProtectionLevel); 4] {
    [
        ("full", ProtectionLevel::full()),
        ("guards", ProtectionLevel::guards_only()),
        ("hashes", ProtectionLevel::hashes_only()),
        ("none", ProtectionLevel::none()),
    ]
}

/// A live stack holding `0..len`, built without diagnostics so the
/// measurements cover only the checks themselves.
#[must_use]
pub fn filled_stack(level: ProtectionLevel, len: usize) -> Stack {
    let config = StackConfig::new(level.with_diagnostics(false));
    let mut stack = Stack::with_config(config).unwrap_or_default();
    let _ = stack.create(0);
    for value in 0..len {
        let _ = stack.push(i32::try_from(value).unwrap_or(i32::MAX));
    }
    stack
}
