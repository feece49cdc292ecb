//! Stack configuration: capacity policy, allocation limit, protection level.

use canarystack_guard::{ProtectionLevel, protection_level};
use serde::Serialize;
use thiserror::Error;

/// Rejected configuration values.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("minimum capacity must be at least 1, got {0}")]
    MinCapacityTooSmall(usize),
    #[error("growth multiplier must be at least 2, got {0}")]
    MultiplierTooSmall(usize),
}

/// Immutable per-stack configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StackConfig {
    /// Smallest non-zero capacity. Default: 8.
    pub min_capacity: usize,
    /// Factor applied on growth and shrink. Default: 2.
    pub growth_multiplier: usize,
    /// Integrity layers maintained by the stack.
    pub protection: ProtectionLevel,
    /// Largest single allocation in bytes (guards included). `None` means
    /// only the system allocator can refuse.
    pub allocation_limit: Option<usize>,
}

impl StackConfig {
    pub const DEFAULT_MIN_CAPACITY: usize = 8;
    pub const DEFAULT_GROWTH_MULTIPLIER: usize = 2;

    /// Default capacity policy with the given protection level.
    #[must_use]
    pub const fn new(protection: ProtectionLevel) -> Self {
        Self {
            min_capacity: Self::DEFAULT_MIN_CAPACITY,
            growth_multiplier: Self::DEFAULT_GROWTH_MULTIPLIER,
            protection,
            allocation_limit: None,
        }
    }

    /// Default capacity policy with the process-wide protection level
    /// (`CANARYSTACK_PROTECTION`).
    #[must_use]
    pub fn from_env() -> Self {
        Self::new(protection_level())
    }

    #[must_use]
    pub const fn with_min_capacity(mut self, min_capacity: usize) -> Self {
        self.min_capacity = min_capacity;
        self
    }

    #[must_use]
    pub const fn with_growth_multiplier(mut self, growth_multiplier: usize) -> Self {
        self.growth_multiplier = growth_multiplier;
        self
    }

    #[must_use]
    pub const fn with_protection(mut self, protection: ProtectionLevel) -> Self {
        self.protection = protection;
        self
    }

    #[must_use]
    pub const fn with_allocation_limit(mut self, limit: Option<usize>) -> Self {
        self.allocation_limit = limit;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_capacity == 0 {
            return Err(ConfigError::MinCapacityTooSmall(self.min_capacity));
        }
        if self.growth_multiplier < 2 {
            return Err(ConfigError::MultiplierTooSmall(self.growth_multiplier));
        }
        Ok(())
    }

    /// Round `requested` up to `min_capacity * growth_multiplier^k`.
    ///
    /// Requests below the minimum return the minimum. Saturates at
    /// `usize::MAX` instead of overflowing; such a capacity will then fail to
    /// allocate.
    #[must_use]
    pub fn initial_capacity(&self, requested: usize) -> usize {
        if requested < self.min_capacity {
            return self.min_capacity;
        }
        let mut capacity = self.min_capacity;
        while capacity < requested {
            capacity = capacity.saturating_mul(self.growth_multiplier);
        }
        capacity
    }

    /// Raise `requested` to the minimum capacity and to `floor`.
    #[must_use]
    pub fn clamp_capacity(&self, requested: usize, floor: usize) -> usize {
        requested.max(self.min_capacity).max(floor)
    }

    /// True once usage has dropped to at most `1 / multiplier^2` of capacity.
    #[must_use]
    pub fn should_shrink(&self, size: usize, capacity: usize) -> bool {
        let m = self.growth_multiplier;
        size.saturating_mul(m).saturating_mul(m) <= capacity
    }
}

impl Default for StackConfig {
    fn default() -> Self {
        Self::new(ProtectionLevel::default())
    }
}
