//! Generic idempotency-key protocol.
//!
//! Any mutating operation can opt in. A caller-supplied key is bound to the
//! fingerprint of the first request that used it; a matching retry replays
//! the stored response without re-running the operation, and a different
//! request under the same key is rejected as a conflict.

mod fingerprint;
mod gate;

pub use fingerprint::RequestFingerprint;
pub use gate::{GateDecision, GateResponse, IdempotencyGate, RecordOutcome};
