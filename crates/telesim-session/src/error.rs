//! Error types for the session layer.

use telesim_protocol::SessionId;

/// Errors raised by the registry and the naming policy.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// A session name was rejected by the [`NamePolicy`](crate::NamePolicy).
    #[error("validation failed: {0}")]
    Validation(String),

    /// The session has no registry entry, i.e. it is not generating.
    #[error("session {0} is not registered for generation")]
    NotRegistered(SessionId),

    /// The per-session counter reached `u32::MAX`.
    #[error("packet counter exhausted for session {0}")]
    CounterExhausted(SessionId),
}
