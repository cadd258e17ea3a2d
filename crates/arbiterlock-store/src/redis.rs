use std::str::FromStr;

use arbiterlock_common::{EngineError, LockId, ResourceId};
use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};
use tracing::{debug, warn};

use crate::{
    keys, AcquireArgs, AcquireOutcome, AtomicStore, CancelArgs, CancelDetail, ExtendArgs,
    ExtendOutcome, GrantEvent, GrantStream, LockMetaView, ReleaseArgs, ReleaseOutcome, StoreResult,
};

const ACQUIRE_SCRIPT: &str = include_str!("scripts/acquire.lua");
const RELEASE_SCRIPT: &str = include_str!("scripts/release.lua");
const EXTEND_SCRIPT: &str = include_str!("scripts/extend.lua");
const CANCEL_SCRIPT: &str = include_str!("scripts/cancel.lua");
const CLEANUP_SCRIPT: &str = include_str!("scripts/cleanup.lua");
const PROMOTE_SCRIPT: &str = include_str!("scripts/promote.lua");

const CLEANUP_SCAN_COUNT: u32 = 200;

/// Redis-backed implementation of [`AtomicStore`]. Commands go through a
/// pooled, auto-reconnecting [`ConnectionManager`]; pub/sub uses a separate
/// connection per subscription since a multiplexed command connection
/// cannot also run `SUBSCRIBE`.
pub struct RedisStore {
    client: Client,
    conn: ConnectionManager,
    acquire_script: Script,
    release_script: Script,
    extend_script: Script,
    cancel_script: Script,
    cleanup_script: Script,
    promote_script: Script,
}

impl RedisStore {
    pub async fn connect(redis_url: &str) -> Result<Self, redis::RedisError> {
        let client = Client::open(redis_url)?;
        let conn = ConnectionManager::new(client.clone()).await?;

        Ok(Self {
            client,
            conn,
            acquire_script: Script::new(ACQUIRE_SCRIPT),
            release_script: Script::new(RELEASE_SCRIPT),
            extend_script: Script::new(EXTEND_SCRIPT),
            cancel_script: Script::new(CANCEL_SCRIPT),
            cleanup_script: Script::new(CLEANUP_SCRIPT),
            promote_script: Script::new(PROMOTE_SCRIPT),
        })
    }

    fn internal_err(context: &'static str, err: redis::RedisError) -> EngineError {
        warn!(context, %err, "atomic store command failed");
        EngineError::Internal(format!("{context}: {err}"))
    }
}

#[async_trait]
impl AtomicStore for RedisStore {
    async fn acquire(&self, args: AcquireArgs) -> StoreResult<AcquireOutcome> {
        let mut conn = self.conn.clone();
        let lock_key = keys::lock_key(&args.resource);
        let meta_key = keys::meta_key(args.lock_id);
        let queue_key = keys::queue_key(&args.resource);
        let agent_lock_key = keys::agent_lock_key(&args.resource, &args.agent_id);
        let cancel_key = keys::cancel_key(&args.resource, &args.agent_id);

        let reply: Vec<redis::Value> = self
            .acquire_script
            .key(&lock_key)
            .key(&meta_key)
            .key(&queue_key)
            .key(&agent_lock_key)
            .key(&cancel_key)
            .arg(&args.agent_id)
            .arg(args.ttl_secs)
            .arg(args.lock_id.to_string())
            .arg(arbiterlock_common::now_millis())
            .arg(&args.resource.resource_type)
            .arg(&args.resource.resource_id)
            .arg(-args.priority)
            .arg(if args.reentrant { "1" } else { "0" })
            .arg(args.queued_agent_lock_ttl_secs)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| Self::internal_err("acquire", e))?;

        decode_acquire_reply(reply, args.lock_id)
    }

    async fn release(&self, args: ReleaseArgs) -> StoreResult<ReleaseOutcome> {
        let mut conn = self.conn.clone();
        let meta_key = keys::meta_key(args.lock_id);
        let agent_id = args.agent_id.clone().unwrap_or_default();

        let reply: (i64, String, String) = self
            .release_script
            .key(&meta_key)
            .arg(&agent_id)
            .arg(args.ttl_secs)
            .arg(if args.idempotent { "1" } else { "0" })
            .arg(args.handoff_retry_budget)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| Self::internal_err("release", e))?;

        decode_release_reply(reply)
    }

    async fn extend(&self, args: ExtendArgs) -> StoreResult<ExtendOutcome> {
        let mut conn = self.conn.clone();
        let meta_key = keys::meta_key(args.lock_id);
        let agent_id = args.agent_id.clone().unwrap_or_default();

        let (status, new_ttl): (i64, u64) = self
            .extend_script
            .key(&meta_key)
            .arg(&agent_id)
            .arg(args.additional_ttl_secs)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| Self::internal_err("extend", e))?;

        decode_extend_reply(status, new_ttl)
    }

    async fn cancel(&self, args: CancelArgs) -> StoreResult<CancelDetail> {
        let mut conn = self.conn.clone();
        let queue_key = keys::queue_key(&args.resource);
        let cancel_key = keys::cancel_key(&args.resource, &args.agent_id);
        let agent_lock_key = keys::agent_lock_key(&args.resource, &args.agent_id);

        let (status,): (i64,) = self
            .cancel_script
            .key(&queue_key)
            .key(&cancel_key)
            .key(&agent_lock_key)
            .arg(&args.agent_id)
            .arg(args.cancel_ttl_secs)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| Self::internal_err("cancel", e))?;

        match status {
            1 => Ok(CancelDetail::RemovedFromQueue),
            2 => Ok(CancelDetail::FlagSet),
            other => Err(EngineError::Internal(format!(
                "unexpected cancel script status {other}"
            ))),
        }
    }

    async fn status(&self, lock_id: LockId) -> StoreResult<Option<LockMetaView>> {
        let mut conn = self.conn.clone();
        let meta_key = keys::meta_key(lock_id);

        let fields: std::collections::HashMap<String, String> = conn
            .hgetall(&meta_key)
            .await
            .map_err(|e| Self::internal_err("status", e))?;

        if fields.is_empty() {
            return Ok(None);
        }

        let agent_id = fields.get("agent_id").cloned().unwrap_or_default();
        let lock_key = fields.get("lock_key").cloned().unwrap_or_default();
        let resource_type = fields.get("resource_type").cloned().unwrap_or_default();
        let resource_id = fields.get("resource_id").cloned().unwrap_or_default();
        let acquired_at_millis = fields
            .get("acquired_at")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);

        // meta:L can outlive the lease it describes by a beat (independent
        // TTLs, lazily expired); re-read the lock key itself so status never
        // reports a lease as active after it has actually lapsed.
        let current_holder: Option<String> = conn
            .get(&lock_key)
            .await
            .map_err(|e| Self::internal_err("status/reread", e))?;

        if current_holder.as_deref() != Some(agent_id.as_str()) {
            return Ok(None);
        }

        Ok(Some(LockMetaView {
            lock_id,
            agent_id,
            resource: ResourceId::new(resource_type, resource_id),
            acquired_at_millis,
        }))
    }

    async fn cleanup(&self) -> StoreResult<u64> {
        let mut conn = self.conn.clone();
        let reaped: i64 = self
            .cleanup_script
            .arg(CLEANUP_SCAN_COUNT)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| Self::internal_err("cleanup", e))?;
        Ok(reaped.max(0) as u64)
    }

    async fn subscribe(&self, resource: &ResourceId) -> StoreResult<GrantStream> {
        let channel = keys::grant_channel(resource);
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| Self::internal_err("subscribe/connect", e))?;

        pubsub
            .subscribe(&channel)
            .await
            .map_err(|e| Self::internal_err("subscribe", e))?;

        debug!(%channel, "subscribed to grant channel");

        let stream = pubsub.into_on_message().filter_map(|msg| async move {
            let payload: String = msg.get_payload().ok()?;
            let (agent_id, lock_id) = payload.split_once(':')?;
            let lock_id = LockId::from_str(lock_id).ok()?;
            Some(GrantEvent {
                agent_id: agent_id.to_string(),
                lock_id,
            })
        });

        Ok(Box::pin(stream))
    }

    async fn queue_position(&self, resource: &ResourceId, agent_id: &str) -> StoreResult<Option<u64>> {
        let mut conn = self.conn.clone();
        let queue_key = keys::queue_key(resource);
        let rank: Option<u64> = conn
            .zrank(&queue_key, agent_id)
            .await
            .map_err(|e| Self::internal_err("queue_position", e))?;
        Ok(rank)
    }

    async fn holderless_queued_resources(&self) -> StoreResult<Vec<ResourceId>> {
        let mut conn = self.conn.clone();
        let mut cursor = 0u64;
        let mut found = Vec::new();

        loop {
            let (next_cursor, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg("queue:*")
                .arg("COUNT")
                .arg(CLEANUP_SCAN_COUNT)
                .query_async(&mut conn)
                .await
                .map_err(|e| Self::internal_err("holderless_queued_resources/scan", e))?;

            for queue_key in batch {
                let Some(resource_part) = queue_key.strip_prefix("queue:") else {
                    continue;
                };
                let Some((resource_type, resource_id)) = resource_part.split_once(':') else {
                    continue;
                };
                let resource = ResourceId::new(resource_type, resource_id);

                let card: u64 = conn
                    .zcard(&queue_key)
                    .await
                    .map_err(|e| Self::internal_err("holderless_queued_resources/zcard", e))?;
                if card == 0 {
                    continue;
                }

                let holder_exists: bool = conn
                    .exists(keys::lock_key(&resource))
                    .await
                    .map_err(|e| Self::internal_err("holderless_queued_resources/exists", e))?;
                if !holder_exists {
                    found.push(resource);
                }
            }

            if next_cursor == 0 {
                break;
            }
            cursor = next_cursor;
        }

        Ok(found)
    }

    async fn promote_queue_head(
        &self,
        resource: &ResourceId,
        ttl_secs: u64,
        handoff_retry_budget: u32,
    ) -> StoreResult<ReleaseOutcome> {
        let mut conn = self.conn.clone();
        let lock_key = keys::lock_key(resource);
        let queue_key = keys::queue_key(resource);

        let reply: (i64, String, String) = self
            .promote_script
            .key(&lock_key)
            .key(&queue_key)
            .arg(&resource.resource_type)
            .arg(&resource.resource_id)
            .arg(ttl_secs)
            .arg(handoff_retry_budget)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| Self::internal_err("promote_queue_head", e))?;

        decode_release_reply(reply)
    }
}

fn decode_acquire_reply(reply: Vec<redis::Value>, lock_id: LockId) -> StoreResult<AcquireOutcome> {
    let status = reply_int(reply.first());

    match status {
        -1 => Ok(AcquireOutcome::Cancelled),
        -2 => Err(EngineError::AlreadyOwnedNotReentrant),
        1 => {
            let ttl_secs = reply_int(reply.get(1)) as u64;
            Ok(AcquireOutcome::Acquired { lock_id, ttl_secs })
        }
        2 => {
            let ttl_secs = reply_int(reply.get(1)) as u64;
            let existing_lock_id = reply_str(reply.get(2))
                .parse()
                .map_err(|_| EngineError::Internal("malformed existing lock id".into()))?;
            Ok(AcquireOutcome::AlreadyOwned {
                lock_id: existing_lock_id,
                ttl_secs,
            })
        }
        0 => {
            let position = reply_int(reply.get(1)) as u64;
            Ok(AcquireOutcome::Queued { position })
        }
        other => Err(EngineError::Internal(format!(
            "unexpected acquire script status {other}"
        ))),
    }
}

fn decode_release_reply(reply: (i64, String, String)) -> StoreResult<ReleaseOutcome> {
    let (status, next_agent, next_lock_id) = reply;
    match status {
        -1 => Err(EngineError::NotFound),
        -2 => Err(EngineError::NotOwner),
        -3 => Err(EngineError::Expired),
        -4 => Err(EngineError::OwnershipChanged),
        0 => Ok(ReleaseOutcome::Released { next: None }),
        1 => {
            let lock_id = next_lock_id
                .parse()
                .map_err(|_| EngineError::Internal("malformed handoff lock id".into()))?;
            Ok(ReleaseOutcome::Released {
                next: Some((next_agent, lock_id)),
            })
        }
        other => Err(EngineError::Internal(format!(
            "unexpected release script status {other}"
        ))),
    }
}

fn decode_extend_reply(status: i64, new_ttl: u64) -> StoreResult<ExtendOutcome> {
    match status {
        -1 => Err(EngineError::NotFound),
        -2 => Err(EngineError::NotOwner),
        -3 => Err(EngineError::Expired),
        -4 => Err(EngineError::OwnershipChanged),
        1 => Ok(ExtendOutcome {
            new_ttl_secs: new_ttl,
        }),
        other => Err(EngineError::Internal(format!(
            "unexpected extend script status {other}"
        ))),
    }
}

fn reply_int(value: Option<&redis::Value>) -> i64 {
    match value {
        Some(redis::Value::Int(i)) => *i,
        _ => 0,
    }
}

fn reply_str(value: Option<&redis::Value>) -> String {
    match value {
        Some(redis::Value::BulkString(bytes)) => String::from_utf8_lossy(bytes).into_owned(),
        Some(redis::Value::SimpleString(s)) => s.clone(),
        _ => String::new(),
    }
}
