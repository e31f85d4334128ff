//! Unified error type for the Telesim engine.

use telesim_hub::HubError;
use telesim_protocol::{ProtocolError, SessionId};
use telesim_session::SessionError;
use telesim_store::StorageError;
use telesim_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// `#[from]` on each wrapped variant lets `?` convert layer errors
/// automatically.
#[derive(Debug, thiserror::Error)]
pub enum TelesimError {
    /// Missing or invalid caller input.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The operation referenced a session storage does not know.
    #[error("session {0} not found")]
    NotFound(SessionId),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Hub(#[from] HubError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl TelesimError {
    /// HTTP-style status code reported to clients in `Response::Error`.
    pub fn code(&self) -> u16 {
        match self {
            Self::Validation(_) | Self::Session(SessionError::Validation(_)) => 400,
            Self::Protocol(_) => 400,
            Self::NotFound(_) | Self::Storage(StorageError::SessionNotFound(_)) => 404,
            Self::Storage(StorageError::Unavailable(_)) => 503,
            _ => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_storage_error() {
        let err: TelesimError = StorageError::Unavailable("down".into()).into();
        assert!(matches!(err, TelesimError::Storage(_)));
        assert!(err.to_string().contains("down"));
        assert_eq!(err.code(), 503);
    }

    #[test]
    fn test_from_transport_error() {
        let err: TelesimError = TransportError::Closed(telesim_transport::ConnectionId::new(1)).into();
        assert!(matches!(err, TelesimError::Transport(_)));
        assert_eq!(err.code(), 500);
    }

    #[test]
    fn test_validation_codes() {
        assert_eq!(TelesimError::Validation("no id".into()).code(), 400);
        let err: TelesimError = SessionError::Validation("too long".into()).into();
        assert_eq!(err.code(), 400);
        let err: TelesimError = ProtocolError::InvalidMessage("bad".into()).into();
        assert_eq!(err.code(), 400);
    }

    #[test]
    fn test_not_found_codes() {
        assert_eq!(TelesimError::NotFound(SessionId(3)).code(), 404);
        let err: TelesimError = StorageError::SessionNotFound(SessionId(3)).into();
        assert_eq!(err.code(), 404);
    }

    #[test]
    fn test_other_failures_are_500() {
        let err: TelesimError = HubError::Unavailable.into();
        assert_eq!(err.code(), 500);
        let err: TelesimError = SessionError::CounterExhausted(SessionId(1)).into();
        assert_eq!(err.code(), 500);
    }
}
