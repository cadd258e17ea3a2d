//! Lock arbitration engine.
//!
//! [`LockEngine`] is the thin layer between the HTTP façade / client SDK and
//! an [`AtomicStore`]: it mints lock ids, fills in TTL defaults from
//! [`EngineConfig`], and translates store-level outcomes into the
//! caller-facing result enums from spec §4.1. It holds nothing mutable of
//! its own — construct it once per process behind an `Arc` and share it
//! across every request handler.

mod scavenger;

pub use scavenger::{spawn as spawn_scavenger, ScavengerHandle};

use std::sync::Arc;

use arbiterlock_common::{
    AgentId, EngineError, LockId, ResourceId, DEFAULT_CANCEL_TTL_SECS,
    DEFAULT_HANDOFF_RETRY_BUDGET, DEFAULT_QUEUED_AGENT_LOCK_TTL_SECS, DEFAULT_TTL_SECS,
};
use arbiterlock_store::{
    AcquireArgs, AcquireOutcome, AtomicStore, CancelArgs, CancelDetail, ExtendArgs, GrantStream,
    LockMetaView, ReleaseArgs, ReleaseOutcome,
};
use tracing::{info, instrument};

pub type EngineResult<T> = Result<T, EngineError>;

/// Knobs the spec leaves as "seconds" / "a small retry budget" / "disabled
/// by default" — gathered here so the server binary can source them from
/// one typed config layer instead of scattering magic numbers.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub default_ttl_secs: u64,
    pub queued_agent_lock_ttl_secs: u64,
    pub cancel_ttl_secs: u64,
    pub handoff_retry_budget: u32,
    pub scavenger_enabled: bool,
    pub scavenger_interval_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: DEFAULT_TTL_SECS,
            queued_agent_lock_ttl_secs: DEFAULT_QUEUED_AGENT_LOCK_TTL_SECS,
            cancel_ttl_secs: DEFAULT_CANCEL_TTL_SECS,
            handoff_retry_budget: DEFAULT_HANDOFF_RETRY_BUDGET,
            scavenger_enabled: false,
            scavenger_interval_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireResult {
    Acquired { lock_id: LockId, ttl_secs: u64 },
    /// `position` is one-based, per spec §4.1.1 ("ranks are zero-based
    /// internally and surfaced as one-based positions").
    Queued { lock_id: LockId, position: u64 },
    AlreadyOwned { lock_id: LockId, ttl_secs: u64 },
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseResult {
    pub next: Option<(AgentId, LockId)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtendResult {
    pub new_ttl_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancelResult {
    pub detail: CancelDetail,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusResult {
    Active(LockMetaView),
    Expired,
}

/// The lock arbitration engine. Cheap to construct, holds only a store
/// handle and config; safe to share via `Arc` across every request
/// handler (spec §5, "Global engine state").
pub struct LockEngine {
    store: Arc<dyn AtomicStore>,
    config: EngineConfig,
}

impl LockEngine {
    pub fn new(store: Arc<dyn AtomicStore>, config: EngineConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn AtomicStore> {
        &self.store
    }

    #[instrument(skip(self), fields(resource_type = %resource.resource_type, resource_id = %resource.resource_id, agent_id = %agent_id))]
    pub async fn acquire(
        &self,
        resource: ResourceId,
        agent_id: AgentId,
        priority: i64,
        ttl_secs: Option<u64>,
        reentrant: bool,
    ) -> EngineResult<AcquireResult> {
        let lock_id = LockId::new();
        let ttl_secs = ttl_secs.unwrap_or(self.config.default_ttl_secs);

        let outcome = self
            .store
            .acquire(AcquireArgs {
                resource,
                agent_id,
                lock_id,
                priority,
                ttl_secs,
                queued_agent_lock_ttl_secs: self.config.queued_agent_lock_ttl_secs,
                reentrant,
            })
            .await?;

        Ok(match outcome {
            AcquireOutcome::Acquired { lock_id, ttl_secs } => {
                AcquireResult::Acquired { lock_id, ttl_secs }
            }
            AcquireOutcome::Queued { position } => AcquireResult::Queued {
                lock_id,
                position: position + 1,
            },
            AcquireOutcome::AlreadyOwned { lock_id, ttl_secs } => {
                AcquireResult::AlreadyOwned { lock_id, ttl_secs }
            }
            AcquireOutcome::Cancelled => AcquireResult::Cancelled,
        })
    }

    #[instrument(skip(self), fields(%lock_id))]
    pub async fn release(
        &self,
        lock_id: LockId,
        agent_id: Option<AgentId>,
        idempotent: bool,
    ) -> EngineResult<ReleaseResult> {
        let ReleaseOutcome::Released { next } = self
            .store
            .release(ReleaseArgs {
                lock_id,
                agent_id,
                idempotent,
                ttl_secs: self.config.default_ttl_secs,
                handoff_retry_budget: self.config.handoff_retry_budget,
            })
            .await?;

        if let Some((next_agent, next_lock_id)) = &next {
            info!(next_agent = %next_agent, next_lock_id = %next_lock_id, "granted lock via handoff");
        }

        Ok(ReleaseResult { next })
    }

    #[instrument(skip(self), fields(%lock_id))]
    pub async fn extend(
        &self,
        lock_id: LockId,
        agent_id: Option<AgentId>,
        additional_ttl_secs: u64,
    ) -> EngineResult<ExtendResult> {
        let outcome = self
            .store
            .extend(ExtendArgs {
                lock_id,
                agent_id,
                additional_ttl_secs,
            })
            .await?;

        Ok(ExtendResult {
            new_ttl_secs: outcome.new_ttl_secs,
        })
    }

    #[instrument(skip(self), fields(resource_type = %resource.resource_type, resource_id = %resource.resource_id, agent_id = %agent_id))]
    pub async fn cancel(&self, resource: ResourceId, agent_id: AgentId) -> EngineResult<CancelResult> {
        let detail = self
            .store
            .cancel(CancelArgs {
                resource,
                agent_id,
                cancel_ttl_secs: self.config.cancel_ttl_secs,
            })
            .await?;

        Ok(CancelResult { detail })
    }

    /// Non-atomic two-read status check (spec §4.1.5); callers needing a
    /// stronger guarantee should extend-with-verify or re-acquire instead.
    pub async fn status(&self, lock_id: LockId) -> EngineResult<StatusResult> {
        Ok(match self.store.status(lock_id).await? {
            Some(view) => StatusResult::Active(view),
            None => StatusResult::Expired,
        })
    }

    pub async fn cleanup(&self) -> EngineResult<u64> {
        self.store.cleanup().await
    }

    pub async fn subscribe(&self, resource: &ResourceId) -> EngineResult<GrantStream> {
        self.store.subscribe(resource).await
    }

    pub async fn queue_position(
        &self,
        resource: &ResourceId,
        agent_id: &str,
    ) -> EngineResult<Option<u64>> {
        self.store.queue_position(resource, agent_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbiterlock_store::memory::InMemoryStore;

    fn engine() -> LockEngine {
        LockEngine::new(Arc::new(InMemoryStore::new()), EngineConfig::default())
    }

    fn resource() -> ResourceId {
        ResourceId::new("customer", "123")
    }

    #[tokio::test]
    async fn scenario_1_acquire_check_release_check() {
        let engine = engine();

        let acquired = engine
            .acquire(resource(), "A".into(), 5, Some(300), false)
            .await
            .unwrap();
        let AcquireResult::Acquired { lock_id, ttl_secs } = acquired else {
            panic!("expected acquired, got {acquired:?}");
        };
        assert_eq!(ttl_secs, 300);

        match engine.status(lock_id).await.unwrap() {
            StatusResult::Active(view) => assert_eq!(view.agent_id, "A"),
            StatusResult::Expired => panic!("expected active"),
        }

        let released = engine.release(lock_id, None, false).await.unwrap();
        assert_eq!(released.next, None);

        assert_eq!(engine.status(lock_id).await.unwrap(), StatusResult::Expired);
    }

    #[tokio::test]
    async fn scenario_2_priority_ordering_on_handoff() {
        let engine = engine();

        let AcquireResult::Acquired { lock_id: a_lock, .. } = engine
            .acquire(resource(), "A".into(), 5, None, false)
            .await
            .unwrap()
        else {
            panic!("A should acquire immediately");
        };

        let AcquireResult::Queued { position: b_pos, .. } = engine
            .acquire(resource(), "B".into(), 3, None, false)
            .await
            .unwrap()
        else {
            panic!("B should queue");
        };
        assert_eq!(b_pos, 1);

        let AcquireResult::Queued { position: c_pos, .. } = engine
            .acquire(resource(), "C".into(), 10, None, false)
            .await
            .unwrap()
        else {
            panic!("C should queue");
        };
        assert_eq!(c_pos, 1, "C outranks B and should take the queue head");

        let released = engine.release(a_lock, Some("A".into()), false).await.unwrap();
        assert_eq!(released.next.as_ref().map(|(agent, _)| agent.as_str()), Some("C"));

        let b_position = engine.queue_position(&resource(), "B").await.unwrap();
        assert_eq!(b_position, Some(0), "B is now at the head of the remaining queue");
    }

    #[tokio::test]
    async fn scenario_4_cancel_then_release_grants_no_one() {
        let engine = engine();

        let AcquireResult::Acquired { lock_id: a_lock, .. } = engine
            .acquire(resource(), "A".into(), 0, None, false)
            .await
            .unwrap()
        else {
            panic!("A should acquire immediately");
        };
        engine
            .acquire(resource(), "B".into(), 0, None, false)
            .await
            .unwrap();

        let cancel = engine.cancel(resource(), "B".into()).await.unwrap();
        assert_eq!(cancel.detail, CancelDetail::RemovedFromQueue);

        let released = engine.release(a_lock, Some("A".into()), false).await.unwrap();
        assert_eq!(released.next, None);
    }

    #[tokio::test]
    async fn scenario_6_reentrant_acquire_keeps_lock_id() {
        let engine = engine();

        let AcquireResult::Acquired { lock_id: first, .. } = engine
            .acquire(resource(), "A".into(), 0, None, true)
            .await
            .unwrap()
        else {
            panic!("expected acquired");
        };

        let second = engine
            .acquire(resource(), "A".into(), 0, None, true)
            .await
            .unwrap();
        match second {
            AcquireResult::AlreadyOwned { lock_id, .. } => assert_eq!(lock_id, first),
            other => panic!("expected already_owned, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_reentrant_second_acquire_by_owner_errors() {
        let engine = engine();

        engine
            .acquire(resource(), "A".into(), 0, None, false)
            .await
            .unwrap();

        let err = engine
            .acquire(resource(), "A".into(), 0, None, false)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "already_owned_not_reentrant");
    }

    #[tokio::test]
    async fn idempotent_release_of_missing_lock_succeeds_twice() {
        let engine = engine();
        let lock_id = LockId::new();

        let first = engine.release(lock_id, None, true).await.unwrap();
        assert_eq!(first.next, None);
        let second = engine.release(lock_id, None, true).await.unwrap();
        assert_eq!(second.next, None);
    }

    #[tokio::test]
    async fn independent_resources_never_block_each_other() {
        let engine = engine();

        let a = engine
            .acquire(ResourceId::new("customer", "1"), "A".into(), 0, None, false)
            .await
            .unwrap();
        let b = engine
            .acquire(ResourceId::new("customer", "2"), "B".into(), 0, None, false)
            .await
            .unwrap();

        assert!(matches!(a, AcquireResult::Acquired { .. }));
        assert!(matches!(b, AcquireResult::Acquired { .. }));
    }
}
