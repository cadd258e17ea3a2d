use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Logical client identity; opaque to the engine beyond string comparison
/// and lexicographic tie-breaking in the wait queue.
pub type AgentId = String;

/// A `(resource_type, resource_id)` pair naming the thing being protected.
/// Opaque to the engine; only used to derive store key prefixes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceId {
    pub resource_type: String,
    pub resource_id: String,
}

impl ResourceId {
    pub fn new(resource_type: impl Into<String>, resource_id: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource_type, self.resource_id)
    }
}

/// `T:R` key fragment shared by every entity keyed off a resource
/// (`lock:T:R`, `queue:T:R`, `agent_lock:T:R:A`, `cancel:T:R:A`).
pub type ResourceKey = String;

impl ResourceId {
    pub fn key(&self) -> ResourceKey {
        format!("{}:{}", self.resource_type, self.resource_id)
    }
}

/// Opaque 128-bit capability minted by the engine at acquire time. The sole
/// credential required to release or extend a lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LockId(Uuid);

impl LockId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for LockId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for LockId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_ids_are_unique_and_round_trip_through_display() {
        let a = LockId::new();
        let b = LockId::new();
        assert_ne!(a, b);

        let text = a.to_string();
        let parsed: LockId = text.parse().unwrap();
        assert_eq!(a, parsed);
    }

    #[test]
    fn resource_key_joins_type_and_id() {
        let r = ResourceId::new("customer", "123");
        assert_eq!(r.key(), "customer:123");
        assert_eq!(r.to_string(), "customer:123");
    }
}
