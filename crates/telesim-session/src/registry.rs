//! The session registry: which sessions are generating, and their counters.
//!
//! # Concurrency
//!
//! The map sits behind a `parking_lot::RwLock`, but each entry's state is
//! atomic and reference-counted. Structural changes (start/stop) take the
//! write lock for a single insert or remove. Everything the scheduler
//! does per tick (snapshot, counter draws) runs under the read lock, so
//! counter draws for different sessions never wait on each other and
//! draws for the same session serialize on the entry's atomic.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use parking_lot::RwLock;
use telesim_protocol::SessionId;

use crate::SessionError;

/// Registry entry for one generating session. Not persisted.
#[derive(Debug)]
struct GeneratorState {
    running: AtomicBool,
    next_counter: AtomicU32,
}

impl GeneratorState {
    fn starting_at(counter: u32) -> Self {
        Self {
            running: AtomicBool::new(true),
            next_counter: AtomicU32::new(counter),
        }
    }
}

/// Live entries plus the counters stopped sessions will resume from.
#[derive(Debug, Default)]
struct Entries {
    live: HashMap<SessionId, Arc<GeneratorState>>,
    /// Next unissued counter of each stopped session. A packet drawn just
    /// before `stop` may still be on its way to storage, so a restart
    /// must not trust the persisted packets alone.
    resume_at: HashMap<SessionId, u32>,
}

/// Concurrency-safe map from session id to generator state.
///
/// Live entries exist only while a session is generating: [`set_running`]
/// creates one, [`stop`] removes it and remembers where its counter got
/// to, so a restarted session never reissues a counter value.
///
/// [`set_running`]: SessionRegistry::set_running
/// [`stop`]: SessionRegistry::stop
#[derive(Debug, Default)]
pub struct SessionRegistry {
    entries: RwLock<Entries>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `session_id` as running, creating its entry if absent.
    ///
    /// A brand-new session counts from 0; a stopped one resumes where it
    /// left off. Idempotent. Returns `true` if the call changed anything.
    pub fn set_running(&self, session_id: SessionId) -> bool {
        self.set_running_from(session_id, 0)
    }

    /// Like [`set_running`](Self::set_running), but a new entry's counter
    /// starts at no less than `next_counter`. An existing entry keeps its
    /// counter.
    pub fn set_running_from(&self, session_id: SessionId, next_counter: u32) -> bool {
        let mut entries = self.entries.write();
        if let Some(state) = entries.live.get(&session_id) {
            let was_running = state.running.swap(true, Ordering::AcqRel);
            return !was_running;
        }
        let next_counter = entries
            .resume_at
            .remove(&session_id)
            .map_or(next_counter, |retained| retained.max(next_counter));
        entries
            .live
            .insert(session_id, Arc::new(GeneratorState::starting_at(next_counter)));
        tracing::debug!(%session_id, next_counter, "session registered for generation");
        true
    }

    /// Removes the live entry for `session_id`, keeping its counter for a
    /// later restart.
    ///
    /// Returns whether an entry existed. Unknown ids are a no-op.
    pub fn stop(&self, session_id: SessionId) -> bool {
        let mut entries = self.entries.write();
        let Some(state) = entries.live.remove(&session_id) else {
            return false;
        };
        state.running.store(false, Ordering::Release);
        let next = state.next_counter.load(Ordering::Acquire);
        entries.resume_at.insert(session_id, next);
        tracing::debug!(%session_id, resume_at = next, "session removed from registry");
        true
    }

    /// Drops every trace of `session_id`, live entry and retained counter
    /// alike. Returns whether the session was generating.
    pub fn forget(&self, session_id: SessionId) -> bool {
        let mut entries = self.entries.write();
        entries.resume_at.remove(&session_id);
        match entries.live.remove(&session_id) {
            Some(state) => {
                state.running.store(false, Ordering::Release);
                true
            }
            None => false,
        }
    }

    /// Counter a stopped session would resume from, if it ever generated.
    pub fn retained_counter(&self, session_id: SessionId) -> Option<u32> {
        self.entries.read().resume_at.get(&session_id).copied()
    }

    /// Ids currently marked running, in ascending order.
    ///
    /// Taken under the read lock: any `set_running` or `stop` that returned
    /// before this call is reflected, and none is half-applied.
    pub fn snapshot_running(&self) -> BTreeSet<SessionId> {
        self.entries
            .read()
            .live
            .iter()
            .filter(|(_, state)| state.running.load(Ordering::Acquire))
            .map(|(id, _)| *id)
            .collect()
    }

    /// Returns the session's next counter value and advances it.
    ///
    /// # Errors
    /// - [`SessionError::NotRegistered`] if the session is not generating.
    /// - [`SessionError::CounterExhausted`] once the counter would wrap.
    pub fn next_counter(&self, session_id: SessionId) -> Result<u32, SessionError> {
        let entries = self.entries.read();
        let state = entries
            .live
            .get(&session_id)
            .ok_or(SessionError::NotRegistered(session_id))?;
        state
            .next_counter
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_add(1))
            .map_err(|_| SessionError::CounterExhausted(session_id))
    }

    /// The value the next [`next_counter`](Self::next_counter) call would
    /// return, without advancing it.
    pub fn peek_counter(&self, session_id: SessionId) -> Option<u32> {
        self.entries
            .read()
            .live
            .get(&session_id)
            .map(|state| state.next_counter.load(Ordering::Acquire))
    }

    pub fn is_running(&self, session_id: SessionId) -> bool {
        self.entries
            .read()
            .live
            .get(&session_id)
            .is_some_and(|state| state.running.load(Ordering::Acquire))
    }

    /// All registered ids, running or not.
    pub fn ids(&self) -> Vec<SessionId> {
        self.entries.read().live.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().live.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sid(n: u64) -> SessionId {
        SessionId(n)
    }

    // =====================================================================
    // set_running() / stop()
    // =====================================================================

    #[test]
    fn test_set_running_inserts_with_counter_zero() {
        let reg = SessionRegistry::new();
        assert!(reg.set_running(sid(1)));
        assert!(reg.is_running(sid(1)));
        assert_eq!(reg.peek_counter(sid(1)), Some(0));
    }

    #[test]
    fn test_set_running_is_idempotent() {
        let reg = SessionRegistry::new();
        reg.set_running(sid(1));
        reg.next_counter(sid(1)).unwrap();

        assert!(!reg.set_running(sid(1)), "second call changes nothing");
        assert_eq!(reg.peek_counter(sid(1)), Some(1), "counter untouched");
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_set_running_from_seeds_counter() {
        let reg = SessionRegistry::new();
        reg.set_running_from(sid(3), 17);
        assert_eq!(reg.next_counter(sid(3)).unwrap(), 17);
        assert_eq!(reg.next_counter(sid(3)).unwrap(), 18);
    }

    #[test]
    fn test_stop_removes_entry() {
        let reg = SessionRegistry::new();
        reg.set_running(sid(1));
        assert!(reg.stop(sid(1)));
        assert!(!reg.is_running(sid(1)));
        assert!(reg.is_empty());
    }

    #[test]
    fn test_stop_unknown_is_noop() {
        let reg = SessionRegistry::new();
        reg.set_running(sid(1));
        assert!(!reg.stop(sid(99)));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_restart_after_stop_resumes_counter() {
        let reg = SessionRegistry::new();
        reg.set_running(sid(1));
        reg.next_counter(sid(1)).unwrap();
        reg.next_counter(sid(1)).unwrap();
        reg.stop(sid(1));
        assert_eq!(reg.retained_counter(sid(1)), Some(2));

        reg.set_running(sid(1));
        assert_eq!(reg.peek_counter(sid(1)), Some(2));
        assert_eq!(reg.retained_counter(sid(1)), None);
    }

    #[test]
    fn test_restart_takes_the_larger_seed() {
        let reg = SessionRegistry::new();
        reg.set_running(sid(1));
        reg.next_counter(sid(1)).unwrap();
        reg.stop(sid(1));

        // Storage knows about more packets than this registry issued.
        reg.set_running_from(sid(1), 9);
        assert_eq!(reg.peek_counter(sid(1)), Some(9));

        reg.stop(sid(1));
        // Storage lags behind the counters already issued.
        reg.set_running_from(sid(1), 3);
        assert_eq!(reg.peek_counter(sid(1)), Some(9));
    }

    #[test]
    fn test_forget_drops_retained_counter() {
        let reg = SessionRegistry::new();
        reg.set_running_from(sid(1), 5);
        assert!(reg.forget(sid(1)));
        assert!(!reg.is_running(sid(1)));
        assert_eq!(reg.retained_counter(sid(1)), None);

        reg.set_running(sid(1));
        assert_eq!(reg.peek_counter(sid(1)), Some(0));
        assert!(!reg.forget(sid(7)));
    }

    // =====================================================================
    // next_counter()
    // =====================================================================

    #[test]
    fn test_counters_are_per_session() {
        let reg = SessionRegistry::new();
        reg.set_running(sid(1));
        reg.set_running(sid(2));

        assert_eq!(reg.next_counter(sid(1)).unwrap(), 0);
        assert_eq!(reg.next_counter(sid(1)).unwrap(), 1);
        assert_eq!(reg.next_counter(sid(2)).unwrap(), 0);
        assert_eq!(reg.next_counter(sid(1)).unwrap(), 2);
    }

    #[test]
    fn test_next_counter_unregistered() {
        let reg = SessionRegistry::new();
        assert!(matches!(
            reg.next_counter(sid(5)),
            Err(SessionError::NotRegistered(id)) if id == sid(5)
        ));
    }

    #[test]
    fn test_next_counter_exhaustion_does_not_wrap() {
        let reg = SessionRegistry::new();
        reg.set_running_from(sid(1), u32::MAX - 1);
        assert_eq!(reg.next_counter(sid(1)).unwrap(), u32::MAX - 1);
        assert!(matches!(
            reg.next_counter(sid(1)),
            Err(SessionError::CounterExhausted(_))
        ));
        assert_eq!(reg.peek_counter(sid(1)), Some(u32::MAX));
    }

    // =====================================================================
    // snapshot_running()
    // =====================================================================

    #[test]
    fn test_snapshot_reflects_completed_calls() {
        let reg = SessionRegistry::new();
        reg.set_running(sid(1));
        reg.set_running(sid(2));
        reg.set_running(sid(3));
        reg.stop(sid(2));

        let snap = reg.snapshot_running();
        assert_eq!(snap.into_iter().collect::<Vec<_>>(), vec![sid(1), sid(3)]);
    }

    #[test]
    fn test_snapshot_empty_registry() {
        let reg = SessionRegistry::new();
        assert!(reg.snapshot_running().is_empty());
    }
}
