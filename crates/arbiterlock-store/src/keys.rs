//! Store key builders. Centralized here so the Lua scripts (which derive
//! most of these internally from a meta hash) and the Rust callers agree on
//! exactly one naming scheme.

use arbiterlock_common::{AgentId, LockId, ResourceId};

pub fn lock_key(resource: &ResourceId) -> String {
    format!("lock:{}", resource.key())
}

pub fn meta_key(lock_id: LockId) -> String {
    format!("meta:{}", lock_id)
}

pub fn queue_key(resource: &ResourceId) -> String {
    format!("queue:{}", resource.key())
}

pub fn agent_lock_key(resource: &ResourceId, agent_id: &AgentId) -> String {
    format!("agent_lock:{}:{}", resource.key(), agent_id)
}

pub fn cancel_key(resource: &ResourceId, agent_id: &AgentId) -> String {
    format!("cancel:{}:{}", resource.key(), agent_id)
}

pub fn grant_channel(resource: &ResourceId) -> String {
    format!("lock_granted:{}", lock_key(resource))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_follow_the_wire_naming_scheme() {
        let r = ResourceId::new("customer", "42");
        let agent: AgentId = "svc-a".into();

        assert_eq!(lock_key(&r), "lock:customer:42");
        assert_eq!(queue_key(&r), "queue:customer:42");
        assert_eq!(agent_lock_key(&r, &agent), "agent_lock:customer:42:svc-a");
        assert_eq!(cancel_key(&r, &agent), "cancel:customer:42:svc-a");
        assert_eq!(grant_channel(&r), "lock_granted:lock:customer:42");
    }
}
