//! Client SDK for ArbiterLock (spec §4.4).
//!
//! Wraps the HTTP façade for the mutating calls and, for the wait-for-grant
//! protocol, subscribes directly to the notification channel on the atomic
//! store (the façade has no HTTP endpoint for pub/sub — NC is a
//! store-native channel, not a façade concern). A caller that only needs
//! acquire/release/extend/cancel/status never has to touch
//! `arbiterlock-store` directly; `acquire_and_wait` is the one method that
//! does.

mod error;
mod http;

pub use error::{ClientError, ClientResult};
pub use http::ClientConfig;

use std::sync::Arc;
use std::time::Duration;

use arbiterlock_api::{
    AcquireResponse, CancelResponse, CleanupResponse, ExtendResponse, HealthResponse,
    ReleaseResponse, StatusResponse,
};
use arbiterlock_common::{AgentId, LockId, ResourceId};
use arbiterlock_store::AtomicStore;
use futures::StreamExt;
use http::Transport;
use tracing::{info, warn};

/// Outcome of [`ArbiterLockClient::acquire_and_wait`]: either the lock was
/// granted immediately, was already held by us, or was granted later via
/// the wait protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    Acquired { lock_id: LockId, ttl_secs: u64 },
    AlreadyOwned { lock_id: LockId, ttl_secs: u64 },
    Granted { lock_id: LockId },
}

pub struct ArbiterLockClient {
    transport: Transport,
    store: Arc<dyn AtomicStore>,
}

impl ArbiterLockClient {
    pub fn new(config: ClientConfig, store: Arc<dyn AtomicStore>) -> Result<Self, ClientError> {
        Ok(Self {
            transport: Transport::new(&config)?,
            store,
        })
    }

    pub async fn acquire(
        &self,
        resource: ResourceId,
        agent_id: AgentId,
        priority: i64,
        ttl: Option<u64>,
        reentrant: bool,
    ) -> ClientResult<AcquireResponse> {
        let body = serde_json::json!({
            "resource_type": resource.resource_type,
            "resource_id": resource.resource_id,
            "agent_id": agent_id,
            "priority": priority,
            "ttl": ttl,
            "reentrant": reentrant,
        });
        self.transport.post("/v1/locks/acquire", &body).await
    }

    pub async fn release(
        &self,
        lock_id: LockId,
        agent_id: Option<AgentId>,
        idempotent: bool,
    ) -> ClientResult<ReleaseResponse> {
        let body = serde_json::json!({
            "lock_id": lock_id,
            "agent_id": agent_id,
            "idempotent": idempotent,
        });
        self.transport.post("/v1/locks/release", &body).await
    }

    pub async fn extend(
        &self,
        lock_id: LockId,
        additional_ttl: u64,
        agent_id: Option<AgentId>,
    ) -> ClientResult<ExtendResponse> {
        let body = serde_json::json!({
            "lock_id": lock_id,
            "additional_ttl": additional_ttl,
            "agent_id": agent_id,
        });
        self.transport.post("/v1/locks/extend", &body).await
    }

    pub async fn cancel(&self, resource: ResourceId, agent_id: AgentId) -> ClientResult<CancelResponse> {
        let body = serde_json::json!({
            "resource_type": resource.resource_type,
            "resource_id": resource.resource_id,
            "agent_id": agent_id,
        });
        self.transport.post("/v1/locks/cancel", &body).await
    }

    pub async fn status(&self, lock_id: LockId) -> ClientResult<StatusResponse> {
        self.transport
            .get(&format!("/v1/locks/{lock_id}/status"))
            .await
    }

    pub async fn cleanup(&self) -> ClientResult<CleanupResponse> {
        self.transport
            .post("/v1/locks/cleanup", &serde_json::json!({}))
            .await
    }

    pub async fn health(&self) -> ClientResult<HealthResponse> {
        self.transport.get("/health").await
    }

    /// The waiter protocol (spec §4.4): acquire; if queued, subscribe to
    /// the resource's grant channel and race a grant for our own agent id
    /// against `wait_timeout`. On timeout (or the channel closing without
    /// ever granting us the lock), issues cancel and returns
    /// [`ClientError::Timeout`].
    pub async fn acquire_and_wait(
        &self,
        resource: ResourceId,
        agent_id: AgentId,
        priority: i64,
        ttl: Option<u64>,
        wait_timeout: Duration,
    ) -> ClientResult<WaitOutcome> {
        match self
            .acquire(resource.clone(), agent_id.clone(), priority, ttl, false)
            .await?
        {
            AcquireResponse::Acquired { lock_id, ttl_secs } => {
                Ok(WaitOutcome::Acquired { lock_id, ttl_secs })
            }
            AcquireResponse::AlreadyOwned { lock_id, ttl_secs } => {
                Ok(WaitOutcome::AlreadyOwned { lock_id, ttl_secs })
            }
            AcquireResponse::Cancelled => Err(ClientError::Engine(
                arbiterlock_common::EngineError::Internal(
                    "acquire consumed a stale cancel tombstone; retry explicitly".to_string(),
                ),
            )),
            AcquireResponse::Queued { .. } => {
                self.wait_for_grant(resource, agent_id, wait_timeout).await
            }
        }
    }

    async fn wait_for_grant(
        &self,
        resource: ResourceId,
        agent_id: AgentId,
        wait_timeout: Duration,
    ) -> ClientResult<WaitOutcome> {
        let stream = self
            .store
            .subscribe(&resource)
            .await
            .map_err(ClientError::Engine)?;

        let grant = tokio::time::timeout(wait_timeout, find_our_grant(stream, &agent_id)).await;

        match grant {
            Ok(Some(event)) => {
                info!(%agent_id, lock_id = %event.lock_id, "grant received");
                Ok(WaitOutcome::Granted {
                    lock_id: event.lock_id,
                })
            }
            Ok(None) | Err(_) => {
                warn!(%agent_id, "wait for grant timed out or channel closed, cancelling");
                if let Err(err) = self.cancel(resource, agent_id).await {
                    warn!(%err, "cancel after timeout also failed");
                }
                Err(ClientError::Timeout)
            }
        }
    }
}

async fn find_our_grant(
    mut stream: arbiterlock_store::GrantStream,
    agent_id: &str,
) -> Option<arbiterlock_store::GrantEvent> {
    while let Some(event) = stream.next().await {
        if event.agent_id == agent_id {
            return Some(event);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbiterlock_store::memory::InMemoryStore;

    #[tokio::test]
    async fn wait_for_grant_resolves_on_a_matching_event() {
        let store: Arc<dyn AtomicStore> = Arc::new(InMemoryStore::new());
        let resource = ResourceId::new("customer", "1");

        // Occupy the resource so a follow-up acquire queues instead of granting.
        let holder_lock_id = LockId::new();
        store
            .acquire(arbiterlock_store::AcquireArgs {
                resource: resource.clone(),
                agent_id: "holder".into(),
                lock_id: holder_lock_id,
                priority: 0,
                ttl_secs: 30,
                queued_agent_lock_ttl_secs: 3600,
                reentrant: false,
            })
            .await
            .unwrap();

        let client = ArbiterLockClient {
            transport: Transport::new(&ClientConfig::default()).unwrap(),
            store: store.clone(),
        };

        let waiter_store = store.clone();
        let wait_resource = resource.clone();
        let waiter = tokio::spawn(async move {
            waiter_store
                .acquire(arbiterlock_store::AcquireArgs {
                    resource: wait_resource,
                    agent_id: "waiter".into(),
                    lock_id: LockId::new(),
                    priority: 0,
                    ttl_secs: 30,
                    queued_agent_lock_ttl_secs: 3600,
                    reentrant: false,
                })
                .await
                .unwrap()
        });
        waiter.await.unwrap();

        let releaser_store = store.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let _ = releaser_store
                .release(arbiterlock_store::ReleaseArgs {
                    lock_id: holder_lock_id,
                    agent_id: Some("holder".into()),
                    idempotent: true,
                    ttl_secs: 30,
                    handoff_retry_budget: 10,
                })
                .await;
        });

        let outcome = client
            .wait_for_grant(resource, "waiter".into(), Duration::from_secs(2))
            .await
            .unwrap();

        assert!(matches!(outcome, WaitOutcome::Granted { .. }));
    }
}
