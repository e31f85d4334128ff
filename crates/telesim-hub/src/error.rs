//! Error types for the hub.

/// Errors returned by [`BroadcastHub`](crate::BroadcastHub) calls.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    /// The hub task has shut down; its command channel is closed.
    #[error("broadcast hub is unavailable")]
    Unavailable,
}
