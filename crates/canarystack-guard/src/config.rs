//! Protection level configuration.
//!
//! The protection level is a single value composed into each stack:
//! - `guards`: canary words around the struct and around the buffer
//! - `struct_hash`: hash over the stack's own bookkeeping fields
//! - `buffer_hash`: hash over the element region of the buffer
//! - `diagnostics`: report every operation to an attached diagnostic sink
//!
//! A process-wide default can be set via the `CANARYSTACK_PROTECTION`
//! environment variable (`full`, `guards`, `hashes`, `off`).

use std::sync::OnceLock;

use serde::Serialize;

/// Which integrity layers a stack maintains and checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ProtectionLevel {
    pub guards: bool,
    pub struct_hash: bool,
    pub buffer_hash: bool,
    pub diagnostics: bool,
}

impl ProtectionLevel {
    /// Every layer on.
    #[must_use]
    pub const fn full() -> Self {
        Self {
            guards: true,
            struct_hash: true,
            buffer_hash: true,
            diagnostics: true,
        }
    }

    /// No layer on. Lifecycle checks and `POP_FROM_EMPTY` still apply.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            guards: false,
            struct_hash: false,
            buffer_hash: false,
            diagnostics: false,
        }
    }

    #[must_use]
    pub const fn guards_only() -> Self {
        Self {
            guards: true,
            ..Self::none()
        }
    }

    #[must_use]
    pub const fn hashes_only() -> Self {
        Self {
            struct_hash: true,
            buffer_hash: true,
            ..Self::none()
        }
    }

    #[must_use]
    pub const fn with_diagnostics(self, diagnostics: bool) -> Self {
        Self {
            diagnostics,
            ..self
        }
    }

    /// Parse from string (case-insensitive). Unknown values fall back to
    /// [`ProtectionLevel::full`].
    #[must_use]
    pub fn from_str_loose(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" | "none" | "release" | "disabled" => Self::none(),
            "guards" | "guard" | "canary" | "canaries" => Self::guards_only(),
            "hash" | "hashes" | "hashing" => Self::hashes_only(),
            _ => Self::full(),
        }
    }

    /// True if any integrity layer (guards or hashes) is active.
    #[must_use]
    pub const fn any_enabled(self) -> bool {
        self.guards || self.struct_hash || self.buffer_hash
    }

    /// Short label for logs and benchmark ids.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match (self.guards, self.struct_hash, self.buffer_hash) {
            (true, true, true) => "full",
            (false, false, false) => "none",
            (true, false, false) => "guards",
            (false, true, true) => "hashes",
            _ => "custom",
        }
    }
}

impl Default for ProtectionLevel {
    fn default() -> Self {
        Self::full()
    }
}

static GLOBAL_LEVEL: OnceLock<ProtectionLevel> = OnceLock::new();

/// Get the configured protection level (reads env var on first call, caches thereafter).
#[must_use]
pub fn protection_level() -> ProtectionLevel {
    *GLOBAL_LEVEL.get_or_init(|| {
        std::env::var("CANARYSTACK_PROTECTION")
            .map(|v| ProtectionLevel::from_str_loose(&v))
            .unwrap_or_default()
    })
}
