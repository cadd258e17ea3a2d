//! Shared types used across the ArbiterLock workspace: resource and agent
//! identifiers, the lock id newtype, and the engine-level error enum.

mod error;
mod ids;

pub use error::EngineError;
pub use ids::{AgentId, LockId, ResourceId, ResourceKey};

/// Default lease TTL when a caller does not specify one (seconds).
pub const DEFAULT_TTL_SECS: u64 = 300;

/// Bounded TTL applied to `agent_lock:T:R:A` while an agent is queued rather
/// than holding the lock, so a forgotten waiter does not linger forever.
pub const DEFAULT_QUEUED_AGENT_LOCK_TTL_SECS: u64 = 3600;

/// TTL of a cancel tombstone (`cancel:T:R:A`).
pub const DEFAULT_CANCEL_TTL_SECS: u64 = 60;

/// Retry budget for the release handoff loop (skipping cancelled waiters).
pub const DEFAULT_HANDOFF_RETRY_BUDGET: u32 = 10;

/// Current Unix timestamp in milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
