//! Single-process [`AtomicStore`] implementation behind one coarse mutex.
//!
//! Every operation locks the whole store for its duration, trading away the
//! fine-grained concurrency Redis gets from its single-threaded scripting
//! model for a much simpler implementation that is exact about the same
//! invariants (ownership, TTL expiry, queue ordering, cancel tombstones).
//! This is the backend used by the engine's own test suite and the
//! dependency-free mode the design notes call for when no Redis is
//! available.

use std::collections::HashMap;

use arbiterlock_common::{now_millis, AgentId, EngineError, LockId, ResourceId, ResourceKey};
use async_trait::async_trait;
use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::{
    AcquireArgs, AcquireOutcome, AtomicStore, CancelArgs, CancelDetail, ExtendArgs, ExtendOutcome,
    GrantEvent, GrantStream, LockMetaView, ReleaseArgs, ReleaseOutcome, StoreResult,
};

const GRANT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
struct HeldLock {
    agent_id: AgentId,
    expires_at_millis: i64,
}

#[derive(Debug, Clone)]
struct MetaRecord {
    agent_id: AgentId,
    resource: ResourceId,
    acquired_at_millis: i64,
}

#[derive(Debug, Clone)]
struct QueuedAgentLock {
    lock_id: LockId,
    expires_at_millis: i64,
}

#[derive(Default)]
struct Inner {
    held: HashMap<ResourceKey, HeldLock>,
    meta: HashMap<LockId, MetaRecord>,
    queues: HashMap<ResourceKey, Vec<(i64, AgentId)>>,
    agent_locks: HashMap<(ResourceKey, AgentId), QueuedAgentLock>,
    cancel_flags: HashMap<(ResourceKey, AgentId), i64>,
}

impl Inner {
    fn is_expired(expires_at_millis: i64, now: i64) -> bool {
        expires_at_millis <= now
    }

    fn take_cancel_flag(&mut self, resource_key: &ResourceKey, agent_id: &AgentId, now: i64) -> bool {
        match self.cancel_flags.remove(&(resource_key.clone(), agent_id.clone())) {
            Some(expires_at) if !Self::is_expired(expires_at, now) => true,
            _ => false,
        }
    }

    fn queue_pop_min(&mut self, resource_key: &ResourceKey) -> Option<(i64, AgentId)> {
        let queue = self.queues.get_mut(resource_key)?;
        if queue.is_empty() {
            return None;
        }
        let min_index = queue
            .iter()
            .enumerate()
            .min_by_key(|(_, (score, agent))| (*score, agent.clone()))
            .map(|(idx, _)| idx)?;
        Some(queue.remove(min_index))
    }

    fn queue_rank(&self, resource_key: &ResourceKey, agent_id: &AgentId) -> Option<u64> {
        let queue = self.queues.get(resource_key)?;
        let mut sorted: Vec<&(i64, AgentId)> = queue.iter().collect();
        sorted.sort_by_key(|(score, agent)| (*score, agent.clone()));
        sorted
            .iter()
            .position(|(_, agent)| agent == agent_id)
            .map(|idx| idx as u64)
    }

    fn queue_contains(&self, resource_key: &ResourceKey, agent_id: &AgentId) -> bool {
        self.queues
            .get(resource_key)
            .map(|q| q.iter().any(|(_, a)| a == agent_id))
            .unwrap_or(false)
    }

    fn mint_handoff(
        &mut self,
        resource: &ResourceId,
        lock_key: &ResourceKey,
        ttl_secs: u64,
        handoff_retry_budget: u32,
    ) -> Option<(AgentId, LockId)> {
        let queue_key = lock_key.clone();
        let mut candidate = None;

        for _ in 0..handoff_retry_budget.max(1) {
            let Some((_, agent)) = self.queue_pop_min(&queue_key) else {
                break;
            };
            if self.take_cancel_flag(&queue_key, &agent, now_millis()) {
                self.agent_locks.remove(&(queue_key.clone(), agent.clone()));
                continue;
            }
            candidate = Some(agent);
            break;
        }

        let next_agent = candidate?;
        let now = now_millis();
        let ttl_millis = ttl_secs as i64 * 1000;

        let next_lock_id = self
            .agent_locks
            .remove(&(queue_key.clone(), next_agent.clone()))
            .map(|q| q.lock_id)
            .unwrap_or_else(LockId::new);

        self.held.insert(
            lock_key.clone(),
            HeldLock {
                agent_id: next_agent.clone(),
                expires_at_millis: now + ttl_millis,
            },
        );
        self.meta.insert(
            next_lock_id,
            MetaRecord {
                agent_id: next_agent.clone(),
                resource: resource.clone(),
                acquired_at_millis: now,
            },
        );

        Some((next_agent, next_lock_id))
    }
}

/// In-memory [`AtomicStore`]. Cheap to construct, safe to share via `Arc`.
pub struct InMemoryStore {
    inner: Mutex<Inner>,
    channels: DashMap<ResourceKey, broadcast::Sender<GrantEvent>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            channels: DashMap::new(),
        }
    }

    fn channel_for(&self, resource_key: &ResourceKey) -> broadcast::Sender<GrantEvent> {
        self.channels
            .entry(resource_key.clone())
            .or_insert_with(|| broadcast::channel(GRANT_CHANNEL_CAPACITY).0)
            .clone()
    }

    fn publish_grant(&self, resource_key: &ResourceKey, agent_id: &AgentId, lock_id: LockId) {
        let sender = self.channel_for(resource_key);
        let _ = sender.send(GrantEvent {
            agent_id: agent_id.clone(),
            lock_id,
        });
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AtomicStore for InMemoryStore {
    async fn acquire(&self, args: AcquireArgs) -> StoreResult<AcquireOutcome> {
        let lock_key = args.resource.key();
        let now = now_millis();
        let mut inner = self.inner.lock();

        if inner.take_cancel_flag(&lock_key, &args.agent_id, now) {
            return Ok(AcquireOutcome::Cancelled);
        }

        if let Some(held) = inner.held.get(&lock_key).cloned() {
            if !Inner::is_expired(held.expires_at_millis, now) && held.agent_id == args.agent_id {
                if !args.reentrant {
                    return Err(EngineError::AlreadyOwnedNotReentrant);
                }

                let existing_lock_id = inner
                    .meta
                    .iter()
                    .find(|(_, m)| m.agent_id == args.agent_id && m.resource == args.resource)
                    .map(|(id, _)| *id)
                    .unwrap_or(args.lock_id);

                let ttl_millis = args.ttl_secs as i64 * 1000;
                if let Some(held) = inner.held.get_mut(&lock_key) {
                    held.expires_at_millis = now + ttl_millis;
                }
                return Ok(AcquireOutcome::AlreadyOwned {
                    lock_id: existing_lock_id,
                    ttl_secs: args.ttl_secs,
                });
            }
        }

        let free = inner
            .held
            .get(&lock_key)
            .map(|h| Inner::is_expired(h.expires_at_millis, now))
            .unwrap_or(true);

        if free {
            let ttl_millis = args.ttl_secs as i64 * 1000;
            inner.held.insert(
                lock_key.clone(),
                HeldLock {
                    agent_id: args.agent_id.clone(),
                    expires_at_millis: now + ttl_millis,
                },
            );
            inner.meta.insert(
                args.lock_id,
                MetaRecord {
                    agent_id: args.agent_id.clone(),
                    resource: args.resource.clone(),
                    acquired_at_millis: now,
                },
            );
            return Ok(AcquireOutcome::Acquired {
                lock_id: args.lock_id,
                ttl_secs: args.ttl_secs,
            });
        }

        if inner.queue_contains(&lock_key, &args.agent_id) {
            let queued_expires = now + args.queued_agent_lock_ttl_secs as i64 * 1000;
            inner.agent_locks.insert(
                (lock_key.clone(), args.agent_id.clone()),
                QueuedAgentLock {
                    lock_id: args.lock_id,
                    expires_at_millis: queued_expires,
                },
            );
            let position = inner.queue_rank(&lock_key, &args.agent_id).unwrap_or(0);
            return Ok(AcquireOutcome::Queued { position });
        }

        let score = -args.priority;
        inner
            .queues
            .entry(lock_key.clone())
            .or_default()
            .push((score, args.agent_id.clone()));
        let queued_expires = now + args.queued_agent_lock_ttl_secs as i64 * 1000;
        inner.agent_locks.insert(
            (lock_key.clone(), args.agent_id.clone()),
            QueuedAgentLock {
                lock_id: args.lock_id,
                expires_at_millis: queued_expires,
            },
        );
        let position = inner.queue_rank(&lock_key, &args.agent_id).unwrap_or(0);
        Ok(AcquireOutcome::Queued { position })
    }

    async fn release(&self, args: ReleaseArgs) -> StoreResult<ReleaseOutcome> {
        let now = now_millis();
        let (lock_key, next) = {
            let mut inner = self.inner.lock();

            let Some(meta) = inner.meta.get(&args.lock_id).cloned() else {
                return if args.idempotent {
                    Ok(ReleaseOutcome::Released { next: None })
                } else {
                    Err(EngineError::NotFound)
                };
            };

            if let Some(expected) = &args.agent_id {
                if expected != &meta.agent_id {
                    return Err(EngineError::NotOwner);
                }
            }

            let lock_key = meta.resource.key();
            let held = inner.held.get(&lock_key).cloned();

            let Some(held) = held else {
                inner.meta.remove(&args.lock_id);
                inner
                    .agent_locks
                    .remove(&(lock_key.clone(), meta.agent_id.clone()));
                return if args.idempotent {
                    Ok(ReleaseOutcome::Released { next: None })
                } else {
                    Err(EngineError::Expired)
                };
            };

            if Inner::is_expired(held.expires_at_millis, now) {
                inner.held.remove(&lock_key);
                inner.meta.remove(&args.lock_id);
                inner
                    .agent_locks
                    .remove(&(lock_key.clone(), meta.agent_id.clone()));
                return if args.idempotent {
                    Ok(ReleaseOutcome::Released { next: None })
                } else {
                    Err(EngineError::Expired)
                };
            }

            if held.agent_id != meta.agent_id {
                return Err(EngineError::OwnershipChanged);
            }

            inner.meta.remove(&args.lock_id);
            inner
                .agent_locks
                .remove(&(lock_key.clone(), meta.agent_id.clone()));
            inner.held.remove(&lock_key);

            let next = inner.mint_handoff(
                &meta.resource,
                &lock_key,
                args.ttl_secs,
                args.handoff_retry_budget,
            );

            (lock_key, next)
        };

        if let Some((agent_id, lock_id)) = &next {
            self.publish_grant(&lock_key, agent_id, *lock_id);
        }

        Ok(ReleaseOutcome::Released { next })
    }

    async fn extend(&self, args: ExtendArgs) -> StoreResult<ExtendOutcome> {
        let now = now_millis();
        let mut inner = self.inner.lock();

        let Some(meta) = inner.meta.get(&args.lock_id).cloned() else {
            return Err(EngineError::NotFound);
        };

        if let Some(expected) = &args.agent_id {
            if expected != &meta.agent_id {
                return Err(EngineError::NotOwner);
            }
        }

        let lock_key = meta.resource.key();
        let Some(held) = inner.held.get_mut(&lock_key) else {
            return Err(EngineError::Expired);
        };

        if Inner::is_expired(held.expires_at_millis, now) {
            return Err(EngineError::Expired);
        }

        if held.agent_id != meta.agent_id {
            return Err(EngineError::OwnershipChanged);
        }

        let ttl_millis = args.additional_ttl_secs as i64 * 1000;
        held.expires_at_millis = now + ttl_millis;

        Ok(ExtendOutcome {
            new_ttl_secs: args.additional_ttl_secs,
        })
    }

    async fn cancel(&self, args: CancelArgs) -> StoreResult<CancelDetail> {
        let lock_key = args.resource.key();
        let mut inner = self.inner.lock();

        if let Some(queue) = inner.queues.get_mut(&lock_key) {
            if let Some(idx) = queue.iter().position(|(_, a)| a == &args.agent_id) {
                queue.remove(idx);
                inner
                    .agent_locks
                    .remove(&(lock_key.clone(), args.agent_id.clone()));
                return Ok(CancelDetail::RemovedFromQueue);
            }
        }

        let expires_at = now_millis() + args.cancel_ttl_secs as i64 * 1000;
        inner
            .cancel_flags
            .insert((lock_key, args.agent_id.clone()), expires_at);
        Ok(CancelDetail::FlagSet)
    }

    async fn status(&self, lock_id: LockId) -> StoreResult<Option<LockMetaView>> {
        let inner = self.inner.lock();
        Ok(inner.meta.get(&lock_id).map(|m| LockMetaView {
            lock_id,
            agent_id: m.agent_id.clone(),
            resource: m.resource.clone(),
            acquired_at_millis: m.acquired_at_millis,
        }))
    }

    /// Administrative global reset (spec §4.1.6): unconditionally clears
    /// every lock, queue, agent->lock mapping and cancel tombstone in the
    /// store, regardless of whether a given lock has actually expired.
    /// Returns the number of locks (meta records) cleared.
    async fn cleanup(&self) -> StoreResult<u64> {
        let mut inner = self.inner.lock();

        let cleared = inner.meta.len() as u64;
        for (_, meta) in inner.meta.drain() {
            let lock_key = meta.resource.key();
            inner.held.remove(&lock_key);
            inner.queues.remove(&lock_key);
        }

        inner.agent_locks.clear();
        inner.cancel_flags.clear();

        Ok(cleared)
    }

    async fn subscribe(&self, resource: &ResourceId) -> StoreResult<GrantStream> {
        let receiver = self.channel_for(&resource.key()).subscribe();
        let stream = stream::unfold(receiver, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(event) => return Some((event, rx)),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });
        Ok(Box::pin(stream))
    }

    async fn queue_position(&self, resource: &ResourceId, agent_id: &str) -> StoreResult<Option<u64>> {
        let inner = self.inner.lock();
        Ok(inner.queue_rank(&resource.key(), &agent_id.to_string()))
    }

    async fn holderless_queued_resources(&self) -> StoreResult<Vec<ResourceId>> {
        let now = now_millis();
        let inner = self.inner.lock();
        let mut found = Vec::new();

        for (resource_key, queue) in inner.queues.iter() {
            if queue.is_empty() {
                continue;
            }
            let holder_present = inner
                .held
                .get(resource_key)
                .map(|h| !Inner::is_expired(h.expires_at_millis, now))
                .unwrap_or(false);
            if holder_present {
                continue;
            }
            if let Some((resource_type, resource_id)) = resource_key.split_once(':') {
                found.push(ResourceId::new(resource_type, resource_id));
            }
        }

        Ok(found)
    }

    async fn promote_queue_head(
        &self,
        resource: &ResourceId,
        ttl_secs: u64,
        handoff_retry_budget: u32,
    ) -> StoreResult<ReleaseOutcome> {
        let now = now_millis();
        let lock_key = resource.key();
        let next = {
            let mut inner = self.inner.lock();

            let holder_present = inner
                .held
                .get(&lock_key)
                .map(|h| !Inner::is_expired(h.expires_at_millis, now))
                .unwrap_or(false);
            if holder_present {
                return Ok(ReleaseOutcome::Released { next: None });
            }

            inner.held.remove(&lock_key);
            inner.mint_handoff(resource, &lock_key, ttl_secs, handoff_retry_budget)
        };

        if let Some((agent_id, lock_id)) = &next {
            self.publish_grant(&lock_key, agent_id, *lock_id);
        }

        Ok(ReleaseOutcome::Released { next })
    }
}
