use arbiterlock_common::EngineError;

/// Errors surfaced by the client SDK. Transport failures and engine-level
/// results are kept distinct per spec §7 ("the SDK raises timeout
/// explicitly; all other non-success results are returned to the caller
/// verbatim").
#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed façade response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("timed out waiting for a grant, cancel was issued")]
    Timeout,
}

pub type ClientResult<T> = Result<T, ClientError>;

/// Maps the façade's `{status: "error", code, message}` body back onto the
/// engine's typed error enum so callers can `match` on it the same way a
/// caller hitting the engine in-process would.
pub fn engine_error_from_code(code: &str, message: String) -> EngineError {
    match code {
        "not_found" => EngineError::NotFound,
        "expired" => EngineError::Expired,
        "not_owner" => EngineError::NotOwner,
        "already_owned_not_reentrant" => EngineError::AlreadyOwnedNotReentrant,
        "ownership_changed" => EngineError::OwnershipChanged,
        _ => EngineError::Internal(message),
    }
}
