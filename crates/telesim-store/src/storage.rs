//! The persistence contract the engine consumes.

use std::future::Future;

use chrono::{DateTime, Utc};
use telesim_protocol::{Packet, SessionId, SessionRecord};

use crate::StorageError;

/// Data for a session row that has not been inserted yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSession {
    pub name: String,
    pub start_time: DateTime<Utc>,
}

/// Persistence for sessions and packets.
///
/// Implementations supply their own timeout and retry policy. Every
/// method returns a `Send` future so the engine can call it from spawned
/// tasks.
pub trait Storage: Send + Sync + 'static {
    /// Cheap connectivity check, done before drawing a packet counter.
    fn ping(&self) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// Inserts a session with no end time and returns its new id.
    fn insert_session(
        &self,
        session: NewSession,
    ) -> impl Future<Output = Result<SessionId, StorageError>> + Send;

    /// Sets the end time of an existing session.
    fn set_session_end_time(
        &self,
        id: SessionId,
        end_time: DateTime<Utc>,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    fn find_session(
        &self,
        id: SessionId,
    ) -> impl Future<Output = Result<Option<SessionRecord>, StorageError>> + Send;

    /// All sessions, newest start time first.
    fn list_sessions(&self) -> impl Future<Output = Result<Vec<SessionRecord>, StorageError>> + Send;

    /// Persists a packet and returns it with its assigned id.
    ///
    /// Fails with [`StorageError::SessionNotFound`] if the owning session
    /// does not exist.
    fn append_packet(&self, packet: Packet)
    -> impl Future<Output = Result<Packet, StorageError>> + Send;

    /// A session's packets, oldest timestamp first. Empty for an unknown
    /// session.
    fn list_packets(
        &self,
        session_id: SessionId,
    ) -> impl Future<Output = Result<Vec<Packet>, StorageError>> + Send;

    /// Highest persisted counter for a session, if it has any packets.
    ///
    /// The default scans [`list_packets`](Self::list_packets); backends
    /// with an index should override it.
    fn last_counter(
        &self,
        session_id: SessionId,
    ) -> impl Future<Output = Result<Option<u32>, StorageError>> + Send {
        async move {
            let packets = self.list_packets(session_id).await?;
            Ok(packets.iter().map(|p| p.counter).max())
        }
    }
}
