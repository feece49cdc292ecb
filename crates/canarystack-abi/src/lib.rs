// Every extern "C" export takes raw pointers from C callers and checks them for
// null itself, so per-function safety docs would be redundant boilerplate.
#![allow(clippy::missing_safety_doc)]
//! # canarystack-abi
//!
//! `extern "C"` boundary over the canarystack engine. C callers hold an
//! opaque `CanaryStack*`; every call returns the raw [`ErrorSet`] bits
//! (`0` = success).
//!
//! ```text
//! C caller -> ABI entry (this crate) -> null checks -> Stack engine -> bits
//! ```
//!
//! The protection level of handles created here comes from
//! `CANARYSTACK_PROTECTION` (`full`, `guards`, `hashes`, `off`).
//!
//! [`ErrorSet`]: canarystack_core::ErrorSet

pub mod stack_abi;

pub use stack_abi::CanaryStack;
