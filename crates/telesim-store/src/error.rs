use telesim_protocol::SessionId;

/// Errors returned by a [`Storage`](crate::Storage) implementation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StorageError {
    /// The backend could not be reached. Callers may retry later.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// A write referenced a session that does not exist.
    #[error("session {0} not found in storage")]
    SessionNotFound(SessionId),

    /// Any other backend failure.
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    /// `true` for failures worth retrying after a pause.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}
