//! Response caching and request coalescing.
//!
//! This module provides the shared machinery under the fetch controller:
//! - Deterministic request signatures (method + URL + params + body)
//! - A time-bounded in-memory response cache with per-entry TTLs
//! - An in-flight registry that deduplicates concurrent executions of the
//!   same logical request

mod inflight;
mod signature;
mod store;

pub use inflight::{ExecutionResult, InFlightRegistry, SharedExecution};
pub use signature::{signature_for, RequestSignature};
pub use store::ResponseCache;
