//! The atomic store seam: everything the lock engine needs from a backend
//! that can do conditional writes, TTL expiry and server-side scripting.
//!
//! [`AtomicStore`] has two implementations. [`redis::RedisStore`] is the
//! production backend; [`memory::InMemoryStore`] simulates the same
//! primitives behind a coarse per-process mutex, serving as both the
//! dependency-free reference implementation and the backend used in tests.

pub mod keys;
pub mod memory;
pub mod redis;

use arbiterlock_common::{AgentId, EngineError, LockId, ResourceId};
use async_trait::async_trait;
use futures::stream::BoxStream;

pub type StoreResult<T> = Result<T, EngineError>;

/// Arguments for an acquire attempt. `lock_id` is minted by the engine
/// before the call so the store never has to invent identifiers on the
/// acquire path (only on handoff, where a successor's id may not yet exist).
#[derive(Debug, Clone)]
pub struct AcquireArgs {
    pub resource: ResourceId,
    pub agent_id: AgentId,
    pub lock_id: LockId,
    pub priority: i64,
    pub ttl_secs: u64,
    pub queued_agent_lock_ttl_secs: u64,
    pub reentrant: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireOutcome {
    Acquired { lock_id: LockId, ttl_secs: u64 },
    Queued { position: u64 },
    AlreadyOwned { lock_id: LockId, ttl_secs: u64 },
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct ReleaseArgs {
    pub lock_id: LockId,
    pub agent_id: Option<AgentId>,
    pub idempotent: bool,
    pub ttl_secs: u64,
    pub handoff_retry_budget: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Released { next: Option<(AgentId, LockId)> },
}

#[derive(Debug, Clone)]
pub struct ExtendArgs {
    pub lock_id: LockId,
    pub agent_id: Option<AgentId>,
    pub additional_ttl_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendOutcome {
    pub new_ttl_secs: u64,
}

#[derive(Debug, Clone)]
pub struct CancelArgs {
    pub resource: ResourceId,
    pub agent_id: AgentId,
    pub cancel_ttl_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelDetail {
    RemovedFromQueue,
    FlagSet,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockMetaView {
    pub lock_id: LockId,
    pub agent_id: AgentId,
    pub resource: ResourceId,
    pub acquired_at_millis: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantEvent {
    pub agent_id: AgentId,
    pub lock_id: LockId,
}

pub type GrantStream = BoxStream<'static, GrantEvent>;

/// The narrow surface the lock engine drives; everything above the
/// key/script layer (minting lock ids, translating store outcomes into
/// engine-level results) lives in `arbiterlock-engine`.
#[async_trait]
pub trait AtomicStore: Send + Sync {
    async fn acquire(&self, args: AcquireArgs) -> StoreResult<AcquireOutcome>;

    async fn release(&self, args: ReleaseArgs) -> StoreResult<ReleaseOutcome>;

    async fn extend(&self, args: ExtendArgs) -> StoreResult<ExtendOutcome>;

    async fn cancel(&self, args: CancelArgs) -> StoreResult<CancelDetail>;

    async fn status(&self, lock_id: LockId) -> StoreResult<Option<LockMetaView>>;

    /// Administrative global reset: unconditionally clears every lock,
    /// queue, agent->lock mapping and cancel tombstone in the store.
    /// Returns the number of locks cleared.
    async fn cleanup(&self) -> StoreResult<u64>;

    /// Subscribes to grant notifications for a single resource's lock.
    async fn subscribe(&self, resource: &ResourceId) -> StoreResult<GrantStream>;

    async fn queue_position(&self, resource: &ResourceId, agent_id: &str) -> StoreResult<Option<u64>>;

    /// Resources with a non-empty wait queue but no current holder —
    /// the scavenger's worklist.
    async fn holderless_queued_resources(&self) -> StoreResult<Vec<ResourceId>>;

    /// Promotes the head of `resource`'s queue when no one holds the lock.
    /// Used only by the scavenger; release performs the equivalent handoff
    /// inline as part of releasing its own hold.
    async fn promote_queue_head(
        &self,
        resource: &ResourceId,
        ttl_secs: u64,
        handoff_retry_budget: u32,
    ) -> StoreResult<ReleaseOutcome>;
}
