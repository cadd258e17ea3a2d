//! Optional background promotion of holder-less queues (spec §4.1.8).
//!
//! Disabled by default. When enabled, runs on a fixed interval and drives
//! the exact same atomic handoff primitive `release` uses internally
//! (`AtomicStore::promote_queue_head`), so a scavenger promotion and a
//! concurrent acquire/release for the same resource still linearize at the
//! store — this is not a special-cased grant path, just a different
//! trigger for the one release already has.

use std::sync::Arc;
use std::time::Duration;

use arbiterlock_store::ReleaseOutcome;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::LockEngine;

/// Owns the spawned scavenger task; dropping it (or calling [`Self::stop`])
/// aborts the loop.
pub struct ScavengerHandle {
    task: JoinHandle<()>,
}

impl ScavengerHandle {
    pub fn stop(self) {
        self.task.abort();
    }
}

impl Drop for ScavengerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Spawns the scavenger loop. No-op (but still returns a handle) if the
/// engine's config has `scavenger_enabled = false` — callers can spawn
/// unconditionally and let config decide.
pub fn spawn(engine: Arc<LockEngine>) -> Option<ScavengerHandle> {
    let config = engine.config().clone();
    if !config.scavenger_enabled {
        info!("scavenger disabled, not spawning");
        return None;
    }

    let interval = Duration::from_secs(config.scavenger_interval_secs.max(1));
    info!(interval_secs = interval.as_secs(), "starting lock scavenger");

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if let Err(err) = sweep_once(&engine).await {
                warn!(%err, "scavenger sweep failed");
            }
        }
    });

    Some(ScavengerHandle { task })
}

async fn sweep_once(engine: &LockEngine) -> Result<(), arbiterlock_common::EngineError> {
    let config = engine.config();
    let candidates = engine.store().holderless_queued_resources().await?;
    if candidates.is_empty() {
        return Ok(());
    }

    debug!(count = candidates.len(), "scavenger found holder-less queued resources");

    for resource in candidates {
        let outcome = engine
            .store()
            .promote_queue_head(&resource, config.default_ttl_secs, config.handoff_retry_budget)
            .await?;

        if let ReleaseOutcome::Released {
            next: Some((agent_id, lock_id)),
        } = outcome
        {
            info!(
                resource_type = %resource.resource_type,
                resource_id = %resource.resource_id,
                %agent_id,
                %lock_id,
                "scavenger promoted queue head"
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbiterlock_common::ResourceId;
    use arbiterlock_store::memory::InMemoryStore;

    use crate::{AcquireResult, EngineConfig, LockEngine, StatusResult};

    fn resource() -> ResourceId {
        ResourceId::new("customer", "scavenger")
    }

    /// Mirrors `release_hands_off_to_the_next_waiter` in
    /// `arbiterlock-store`'s memory store tests, but drives the promotion
    /// through the scavenger's sweep instead of an explicit release — the
    /// holder's lease lapses without ever calling `release`.
    #[tokio::test]
    async fn sweep_promotes_queue_head_after_holder_ttl_lapses() {
        let engine = LockEngine::new(Arc::new(InMemoryStore::new()), EngineConfig::default());

        let AcquireResult::Acquired { .. } = engine
            .acquire(resource(), "holder".into(), 0, Some(0), false)
            .await
            .unwrap()
        else {
            panic!("holder should acquire immediately");
        };

        let AcquireResult::Queued {
            lock_id: waiter_lock,
            ..
        } = engine
            .acquire(resource(), "waiter".into(), 0, None, false)
            .await
            .unwrap()
        else {
            panic!("waiter should queue behind the holder");
        };

        // ttl_secs: 0 on the holder's acquire means its lease has already
        // lapsed; no release is ever issued, only the sweep.
        sweep_once(&engine).await.unwrap();

        match engine.status(waiter_lock).await.unwrap() {
            StatusResult::Active(view) => assert_eq!(view.agent_id, "waiter"),
            StatusResult::Expired => panic!("expected the sweep to promote the waiter"),
        }
    }

    #[tokio::test]
    async fn sweep_is_a_no_op_when_no_resource_is_holder_less() {
        let engine = LockEngine::new(Arc::new(InMemoryStore::new()), EngineConfig::default());

        engine
            .acquire(resource(), "holder".into(), 0, None, false)
            .await
            .unwrap();
        engine
            .acquire(resource(), "waiter".into(), 0, None, false)
            .await
            .unwrap();

        sweep_once(&engine).await.unwrap();

        let position = engine.queue_position(&resource(), "waiter").await.unwrap();
        assert_eq!(position, Some(0), "waiter is untouched while the holder is live");
    }
}
