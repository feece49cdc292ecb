//! Protection primitives for the canarystack self-verifying stack.
//!
//! This crate holds everything the stack engine consults but does not own:
//!
//! - **Protection level** (`config`): which integrity layers are active
//! - **Canaries and poison** (`canary`): sentinel constants and byte fills
//! - **Hashers** (`hash`): the injectable byte-hash collaborator
//! - **Error flags** (`error`): the composable `ErrorSet` every operation returns
//! - **Metrics** (`metrics`): relaxed atomic counters for observability

#![deny(unsafe_code)]

pub mod canary;
pub mod config;
pub mod error;
pub mod hash;
pub mod metrics;

pub use config::{ProtectionLevel, protection_level};
pub use error::{ErrorSet, StackError};
pub use hash::{Blake3Hasher, Fnv1, StackHasher};
pub use metrics::{MetricsSnapshot, StackMetrics};

/// The fixed value type stored by the stack.
pub type Elem = i32;

/// Size of one element in bytes.
pub const ELEM_SIZE: usize = std::mem::size_of::<Elem>();
