/// Error kinds surfaced by the lock engine (spec §7).
///
/// Business-level outcomes (`not_found`, `expired`, `not_owner`, ...) are
/// modeled as variants here rather than as plain strings so callers can
/// `match` on them; `Internal` is the only variant that carries a free-form
/// diagnostic, reserved for store-unreachable / script failures.
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("lock not found")]
    NotFound,
    #[error("lock expired before the operation completed")]
    Expired,
    #[error("caller is not the lock owner")]
    NotOwner,
    #[error("agent already owns this lock and reentrant acquisition was not requested")]
    AlreadyOwnedNotReentrant,
    #[error("lock ownership changed during the operation")]
    OwnershipChanged,
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Stable machine-readable tag used in JSON error bodies and logs.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::NotFound => "not_found",
            EngineError::Expired => "expired",
            EngineError::NotOwner => "not_owner",
            EngineError::AlreadyOwnedNotReentrant => "already_owned_not_reentrant",
            EngineError::OwnershipChanged => "ownership_changed",
            EngineError::Internal(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(EngineError::NotFound.code(), "not_found");
        assert_eq!(EngineError::Expired.code(), "expired");
        assert_eq!(EngineError::NotOwner.code(), "not_owner");
        assert_eq!(
            EngineError::AlreadyOwnedNotReentrant.code(),
            "already_owned_not_reentrant"
        );
        assert_eq!(EngineError::OwnershipChanged.code(), "ownership_changed");
        assert_eq!(EngineError::Internal("boom".into()).code(), "internal");
    }
}
