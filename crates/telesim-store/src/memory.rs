//! In-memory [`Storage`] implementation.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use telesim_protocol::{Packet, PacketId, SessionId, SessionRecord};

use crate::{NewSession, Storage, StorageError};

#[derive(Debug, Default)]
struct Tables {
    sessions: BTreeMap<SessionId, SessionRecord>,
    packets: BTreeMap<SessionId, Vec<Packet>>,
    last_session_id: u64,
    last_packet_id: u64,
}

#[derive(Debug)]
struct Shared {
    tables: Mutex<Tables>,
    available: AtomicBool,
}

/// Process-local store. Cloning shares the same tables.
///
/// [`set_available(false)`](Self::set_available) makes every call fail
/// with [`StorageError::Unavailable`], which is how tests simulate an
/// outage.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                tables: Mutex::new(Tables::default()),
                available: AtomicBool::new(true),
            }),
        }
    }

    pub fn set_available(&self, available: bool) {
        let was = self.shared.available.swap(available, Ordering::AcqRel);
        if was != available {
            tracing::info!(available, "memory store availability changed");
        }
    }

    pub fn is_available(&self) -> bool {
        self.shared.available.load(Ordering::Acquire)
    }

    /// Deletes a session and, with it, all of its packets.
    ///
    /// Administrative only; the engine never deletes sessions. Returns
    /// whether the session existed.
    pub fn delete_session(&self, id: SessionId) -> Result<bool, StorageError> {
        self.check_available()?;
        let mut tables = self.shared.tables.lock();
        let existed = tables.sessions.remove(&id).is_some();
        let dropped = tables.packets.remove(&id).map_or(0, |p| p.len());
        if existed {
            tracing::info!(session_id = %id, dropped_packets = dropped, "session deleted");
        }
        Ok(existed)
    }

    /// Total packets across all sessions.
    pub fn packet_count(&self) -> usize {
        self.shared.tables.lock().packets.values().map(Vec::len).sum()
    }

    fn check_available(&self) -> Result<(), StorageError> {
        if self.is_available() {
            Ok(())
        } else {
            Err(StorageError::Unavailable("memory store is offline".into()))
        }
    }
}

impl Storage for MemoryStore {
    async fn ping(&self) -> Result<(), StorageError> {
        self.check_available()
    }

    async fn insert_session(&self, session: NewSession) -> Result<SessionId, StorageError> {
        self.check_available()?;
        let mut tables = self.shared.tables.lock();
        tables.last_session_id += 1;
        let id = SessionId(tables.last_session_id);
        tables.sessions.insert(
            id,
            SessionRecord {
                id,
                name: session.name,
                start_time: session.start_time,
                end_time: None,
            },
        );
        Ok(id)
    }

    async fn set_session_end_time(
        &self,
        id: SessionId,
        end_time: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        self.check_available()?;
        let mut tables = self.shared.tables.lock();
        let record = tables
            .sessions
            .get_mut(&id)
            .ok_or(StorageError::SessionNotFound(id))?;
        record.end_time = Some(end_time);
        Ok(())
    }

    async fn find_session(&self, id: SessionId) -> Result<Option<SessionRecord>, StorageError> {
        self.check_available()?;
        Ok(self.shared.tables.lock().sessions.get(&id).cloned())
    }

    async fn list_sessions(&self) -> Result<Vec<SessionRecord>, StorageError> {
        self.check_available()?;
        let mut sessions: Vec<SessionRecord> =
            self.shared.tables.lock().sessions.values().cloned().collect();
        sessions.sort_by(|a, b| b.start_time.cmp(&a.start_time).then(b.id.cmp(&a.id)));
        Ok(sessions)
    }

    async fn append_packet(&self, packet: Packet) -> Result<Packet, StorageError> {
        self.check_available()?;
        let mut tables = self.shared.tables.lock();
        if !tables.sessions.contains_key(&packet.session_id) {
            return Err(StorageError::SessionNotFound(packet.session_id));
        }
        tables.last_packet_id += 1;
        let stored = packet.with_id(PacketId(tables.last_packet_id));
        tables
            .packets
            .entry(stored.session_id)
            .or_default()
            .push(stored.clone());
        Ok(stored)
    }

    async fn list_packets(&self, session_id: SessionId) -> Result<Vec<Packet>, StorageError> {
        self.check_available()?;
        let mut packets = self
            .shared
            .tables
            .lock()
            .packets
            .get(&session_id)
            .cloned()
            .unwrap_or_default();
        packets.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp).then(a.id.cmp(&b.id)));
        Ok(packets)
    }

    async fn last_counter(&self, session_id: SessionId) -> Result<Option<u32>, StorageError> {
        self.check_available()?;
        Ok(self
            .shared
            .tables
            .lock()
            .packets
            .get(&session_id)
            .and_then(|p| p.iter().map(|p| p.counter).max()))
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    async fn insert(store: &MemoryStore, name: &str, secs: i64) -> SessionId {
        store
            .insert_session(NewSession {
                name: name.into(),
                start_time: at(secs),
            })
            .await
            .unwrap()
    }

    // =====================================================================
    // Sessions
    // =====================================================================

    #[tokio::test]
    async fn test_insert_assigns_increasing_ids() {
        let store = MemoryStore::new();
        let a = insert(&store, "a", 10).await;
        let b = insert(&store, "b", 20).await;
        assert!(b > a);

        let rec = store.find_session(a).await.unwrap().unwrap();
        assert_eq!(rec.name, "a");
        assert_eq!(rec.start_time, at(10));
        assert!(rec.end_time.is_none());
    }

    #[tokio::test]
    async fn test_list_sessions_newest_first() {
        let store = MemoryStore::new();
        insert(&store, "old", 10).await;
        insert(&store, "new", 30).await;
        insert(&store, "mid", 20).await;

        let names: Vec<_> = store
            .list_sessions()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, ["new", "mid", "old"]);
    }

    #[tokio::test]
    async fn test_set_end_time_unknown_session() {
        let store = MemoryStore::new();
        let err = store
            .set_session_end_time(SessionId(9), at(1))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::SessionNotFound(SessionId(9))));
    }

    #[tokio::test]
    async fn test_find_unknown_session_is_none() {
        let store = MemoryStore::new();
        assert!(store.find_session(SessionId(1)).await.unwrap().is_none());
    }

    // =====================================================================
    // Packets
    // =====================================================================

    #[tokio::test]
    async fn test_append_assigns_id_and_lists_by_timestamp() {
        let store = MemoryStore::new();
        let id = insert(&store, "s", 0).await;

        let late = store
            .append_packet(Packet::frame(id, 0, 0.1, 200.0))
            .await
            .unwrap();
        let early = store
            .append_packet(Packet::frame(id, 1, 0.2, 100.0))
            .await
            .unwrap();
        assert!(late.id.is_some());
        assert_ne!(late.id, early.id);

        let listed = store.list_packets(id).await.unwrap();
        let stamps: Vec<_> = listed.iter().map(|p| p.timestamp).collect();
        assert_eq!(stamps, [100.0, 200.0]);
        assert_eq!(store.last_counter(id).await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_append_for_unknown_session_fails() {
        let store = MemoryStore::new();
        let err = store
            .append_packet(Packet::frame(SessionId(4), 0, 0.0, 0.0))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::SessionNotFound(_)));
        assert_eq!(store.packet_count(), 0);
    }

    #[tokio::test]
    async fn test_list_packets_unknown_session_is_empty() {
        let store = MemoryStore::new();
        assert!(store.list_packets(SessionId(3)).await.unwrap().is_empty());
        assert_eq!(store.last_counter(SessionId(3)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete_session_cascades() {
        let store = MemoryStore::new();
        let keep = insert(&store, "keep", 0).await;
        let gone = insert(&store, "gone", 1).await;
        store.append_packet(Packet::frame(keep, 0, 0.0, 1.0)).await.unwrap();
        store.append_packet(Packet::frame(gone, 0, 0.0, 1.0)).await.unwrap();

        assert!(store.delete_session(gone).unwrap());
        assert!(!store.delete_session(gone).unwrap());
        assert!(store.find_session(gone).await.unwrap().is_none());
        assert!(store.list_packets(gone).await.unwrap().is_empty());
        assert_eq!(store.packet_count(), 1);
    }

    // =====================================================================
    // Availability
    // =====================================================================

    #[tokio::test]
    async fn test_offline_store_rejects_everything() {
        let store = MemoryStore::new();
        let id = insert(&store, "s", 0).await;
        store.set_available(false);

        assert!(store.ping().await.unwrap_err().is_transient());
        assert!(store.find_session(id).await.is_err());
        assert!(
            store
                .append_packet(Packet::frame(id, 0, 0.0, 0.0))
                .await
                .is_err()
        );

        store.set_available(true);
        assert!(store.ping().await.is_ok());
    }

    #[tokio::test]
    async fn test_clones_share_tables() {
        let store = MemoryStore::new();
        let other = store.clone();
        let id = insert(&store, "s", 0).await;
        assert!(other.find_session(id).await.unwrap().is_some());
    }
}
