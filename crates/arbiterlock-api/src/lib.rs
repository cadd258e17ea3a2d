//! Wire types for the ArbiterLock HTTP façade (spec §4.3, §6).
//!
//! One request/response pair per mutating engine operation, plus the
//! status and health shapes. Field names match the spec's JSON bodies
//! exactly (snake_case) so neither the server nor the client needs a
//! translation layer beyond these structs. Shared between
//! `arbiterlock-server` (which serializes these) and `arbiterlock-client`
//! (which deserializes them), so a wire format drift between the two is a
//! compile error, not a runtime surprise.

use arbiterlock_common::{AgentId, LockId, ResourceId};
use arbiterlock_engine::{AcquireResult, CancelResult, ExtendResult, ReleaseResult, StatusResult};
use arbiterlock_store::CancelDetail;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------
// POST /v1/locks/acquire
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct AcquireRequest {
    pub resource_type: String,
    pub resource_id: String,
    pub agent_id: AgentId,
    #[serde(default)]
    pub priority: i64,
    pub ttl: Option<u64>,
    #[serde(default)]
    pub reentrant: bool,
}

impl AcquireRequest {
    pub fn resource(&self) -> ResourceId {
        ResourceId::new(self.resource_type.clone(), self.resource_id.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AcquireResponse {
    Acquired { lock_id: LockId, ttl_secs: u64 },
    Queued { lock_id: LockId, position: u64 },
    AlreadyOwned { lock_id: LockId, ttl_secs: u64 },
    Cancelled,
}

impl From<AcquireResult> for AcquireResponse {
    fn from(result: AcquireResult) -> Self {
        match result {
            AcquireResult::Acquired { lock_id, ttl_secs } => {
                AcquireResponse::Acquired { lock_id, ttl_secs }
            }
            AcquireResult::Queued { lock_id, position } => {
                AcquireResponse::Queued { lock_id, position }
            }
            AcquireResult::AlreadyOwned { lock_id, ttl_secs } => {
                AcquireResponse::AlreadyOwned { lock_id, ttl_secs }
            }
            AcquireResult::Cancelled => AcquireResponse::Cancelled,
        }
    }
}

// ---------------------------------------------------------------------
// POST /v1/locks/release
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseRequest {
    pub lock_id: LockId,
    pub agent_id: Option<AgentId>,
    #[serde(default)]
    pub idempotent: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReleaseResponse {
    Released {
        next_agent: Option<AgentId>,
        next_lock_id: Option<LockId>,
    },
}

impl From<ReleaseResult> for ReleaseResponse {
    fn from(result: ReleaseResult) -> Self {
        let (next_agent, next_lock_id) = match result.next {
            Some((agent, lock_id)) => (Some(agent), Some(lock_id)),
            None => (None, None),
        };
        ReleaseResponse::Released {
            next_agent,
            next_lock_id,
        }
    }
}

// ---------------------------------------------------------------------
// POST /v1/locks/extend
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ExtendRequest {
    pub lock_id: LockId,
    pub additional_ttl: u64,
    pub agent_id: Option<AgentId>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExtendResponse {
    Extended { new_ttl_secs: u64 },
}

impl From<ExtendResult> for ExtendResponse {
    fn from(result: ExtendResult) -> Self {
        ExtendResponse::Extended {
            new_ttl_secs: result.new_ttl_secs,
        }
    }
}

// ---------------------------------------------------------------------
// POST /v1/locks/cancel
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct CancelRequest {
    pub resource_type: String,
    pub resource_id: String,
    pub agent_id: AgentId,
}

impl CancelRequest {
    pub fn resource(&self) -> ResourceId {
        ResourceId::new(self.resource_type.clone(), self.resource_id.clone())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CancelResponse {
    Cancelled { detail: CancelDetailWire },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CancelDetailWire {
    RemovedFromQueue,
    FlagSet,
}

impl From<CancelDetail> for CancelDetailWire {
    fn from(detail: CancelDetail) -> Self {
        match detail {
            CancelDetail::RemovedFromQueue => CancelDetailWire::RemovedFromQueue,
            CancelDetail::FlagSet => CancelDetailWire::FlagSet,
        }
    }
}

impl From<CancelResult> for CancelResponse {
    fn from(result: CancelResult) -> Self {
        CancelResponse::Cancelled {
            detail: result.detail.into(),
        }
    }
}

// ---------------------------------------------------------------------
// GET /v1/locks/{lock_id}/status
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StatusResponse {
    Active {
        lock_id: LockId,
        agent_id: AgentId,
        resource_type: String,
        resource_id: String,
        acquired_at_millis: i64,
    },
    Expired,
}

impl From<StatusResult> for StatusResponse {
    fn from(result: StatusResult) -> Self {
        match result {
            StatusResult::Active(view) => StatusResponse::Active {
                lock_id: view.lock_id,
                agent_id: view.agent_id,
                resource_type: view.resource.resource_type,
                resource_id: view.resource.resource_id,
                acquired_at_millis: view.acquired_at_millis,
            },
            StatusResult::Expired => StatusResponse::Expired,
        }
    }
}

// ---------------------------------------------------------------------
// POST /v1/locks/cleanup
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CleanupResponse {
    pub cleared: u64,
}

// ---------------------------------------------------------------------
// GET /health
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthResponse {
    pub status: &'static str,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self { status: "healthy" }
    }
}

// ---------------------------------------------------------------------
// Error envelope (spec §4.3: transport 200, structured body)
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    pub status: ErrorStatus,
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorStatus {
    Error,
}

impl ErrorResponse {
    pub fn from_engine_error(err: &arbiterlock_common::EngineError) -> Self {
        Self {
            status: ErrorStatus::Error,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_response_serializes_with_a_status_tag() {
        let response = AcquireResponse::Acquired {
            lock_id: LockId::new(),
            ttl_secs: 300,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "acquired");
        assert_eq!(json["ttl_secs"], 300);
    }

    #[test]
    fn release_response_carries_optional_handoff_fields() {
        let response = ReleaseResponse::Released {
            next_agent: Some("B".into()),
            next_lock_id: Some(LockId::new()),
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "released");
        assert!(json["next_agent"].is_string());
    }

    #[test]
    fn error_response_uses_the_engine_error_code_as_the_machine_tag() {
        let err = arbiterlock_common::EngineError::NotOwner;
        let response = ErrorResponse::from_engine_error(&err);
        assert_eq!(response.code, "not_owner");
        assert_eq!(response.status, ErrorStatus::Error);
    }
}
