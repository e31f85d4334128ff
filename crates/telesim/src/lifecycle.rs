//! Session lifecycle: create, start, stop, end, and the read queries.
//!
//! ```text
//!  create_session ──→ [Created] ──start_generation──→ [Running]
//!                         │                              │  ↑
//!                    end_session                stop_generation / end_session
//!                         │                              │  │
//!                         ▼                              ▼  │
//!                     [Stopped] ←────────────────── [Stopped]
//!                                                      └─start_generation (restart)
//! ```
//!
//! State is derived, not stored: a session is `Running` while it has a
//! registry entry, `Stopped` once its end time is set, `Created` otherwise.
//!
//! Stopping is forgiving: an unknown or idle session is a logged no-op
//! returning `false`. Starting is strict: the session must exist.

use telesim_protocol::{
    EngineStatus, Packet, SessionId, SessionRecord, SessionState, SessionView, TelemetryEvent,
};
use telesim_store::{NewSession, Storage};

use crate::{Engine, TelesimError};

impl<S: Storage> Engine<S> {
    /// Persists a new session in the `Created` state.
    ///
    /// Absent or blank names get the configured default name.
    ///
    /// # Errors
    /// - [`TelesimError::Session`] (validation) if the name is too long.
    /// - [`TelesimError::Storage`] if the insert fails.
    pub async fn create_session(&self, name: Option<&str>) -> Result<SessionId, TelesimError> {
        let name = self.config().names.apply(name)?;
        let start_time = self.generator().clock().now();
        let session_id = self
            .storage()
            .insert_session(NewSession { name, start_time })
            .await?;
        tracing::info!(%session_id, %start_time, "session created");
        Ok(session_id)
    }

    /// Registers the session for generation.
    ///
    /// Idempotent on a running session. A stopped session restarts with
    /// its counter continuing after the last one it was ever issued,
    /// whether or not that packet reached storage. Returns `true` if the
    /// session was not already running.
    ///
    /// # Errors
    /// [`TelesimError::NotFound`] if storage has no such session.
    pub async fn start_generation(&self, session_id: SessionId) -> Result<bool, TelesimError> {
        let record = self.require_session(session_id).await?;
        let state = self.state_of(&record);

        if state.is_generating() {
            tracing::debug!(%session_id, "generation already running");
            return Ok(false);
        }
        if !state.can_transition_to(SessionState::Running) {
            return Err(TelesimError::Validation(format!(
                "session {session_id} cannot start from {state}"
            )));
        }

        let persisted_next = match self.storage().last_counter(session_id).await? {
            Some(last) => last.saturating_add(1),
            None => 0,
        };
        let changed = self.registry().set_running_from(session_id, persisted_next);
        if changed {
            tracing::info!(
                %session_id,
                from = %state,
                next_counter = ?self.registry().peek_counter(session_id),
                "generation started"
            );
        }
        Ok(changed)
    }

    /// Stops generation for the session.
    ///
    /// Returns `false` (with a warning) if the session was not generating.
    /// Otherwise writes the end time, unless one is already set, and
    /// publishes `GenerationStopped` to the session's group.
    ///
    /// # Errors
    /// [`TelesimError::Storage`] if the end time could not be written. The
    /// session is out of the registry and the event is published anyway.
    pub async fn stop_generation(&self, session_id: SessionId) -> Result<bool, TelesimError> {
        if !self.registry().stop(session_id) {
            tracing::warn!(%session_id, "stop requested for a session that is not generating");
            return Ok(false);
        }

        let finalized = self.finalize(session_id).await;
        if let Err(e) = &finalized {
            tracing::error!(%session_id, error = %e, "failed to write session end time");
        }

        match self
            .hub()
            .publish(TelemetryEvent::GenerationStopped { session_id })
            .await
        {
            Ok(delivered) => {
                tracing::info!(%session_id, delivered, "generation stopped");
            }
            Err(e) => {
                tracing::warn!(%session_id, error = %e, "could not publish stop notification");
            }
        }

        finalized.map(|_| true)
    }

    /// Stops generation if running, and finalizes the session's end time.
    ///
    /// A session that was created but never started is finalized here.
    /// Unknown ids are a logged no-op. Returns whether anything changed.
    pub async fn end_session(&self, session_id: SessionId) -> Result<bool, TelesimError> {
        if self.registry().is_running(session_id) {
            return self.stop_generation(session_id).await;
        }

        match self.storage().find_session(session_id).await? {
            None => {
                tracing::warn!(%session_id, "end requested for an unknown session");
                Ok(false)
            }
            Some(record) if !self.state_of(&record).can_transition_to(SessionState::Stopped) => {
                tracing::debug!(%session_id, "session already ended");
                Ok(false)
            }
            Some(_) => {
                let changed = self.finalize(session_id).await?;
                tracing::info!(%session_id, "session ended");
                Ok(changed)
            }
        }
    }

    /// Derived lifecycle state of a session.
    pub async fn session_state(&self, session_id: SessionId) -> Result<SessionState, TelesimError> {
        let record = self.require_session(session_id).await?;
        Ok(self.state_of(&record))
    }

    /// Every persisted session, newest first, with its derived state.
    pub async fn list_sessions(&self) -> Result<Vec<SessionView>, TelesimError> {
        let records = self.storage().list_sessions().await?;
        Ok(records
            .into_iter()
            .map(|record| SessionView {
                state: self.state_of(&record),
                record,
            })
            .collect())
    }

    /// A session's packets, oldest first.
    ///
    /// # Errors
    /// [`TelesimError::NotFound`] for an unknown session.
    pub async fn list_packets(&self, session_id: SessionId) -> Result<Vec<Packet>, TelesimError> {
        self.require_session(session_id).await?;
        Ok(self.storage().list_packets(session_id).await?)
    }

    /// Health snapshot for the status query.
    pub async fn status(&self) -> Result<EngineStatus, TelesimError> {
        Ok(EngineStatus {
            running_sessions: self.registry().len(),
            ticks: self.ticks(),
            subscribers: self.hub().subscriber_count().await?,
            uptime_secs: self.inner.started.elapsed().as_secs(),
        })
    }

    async fn require_session(&self, session_id: SessionId) -> Result<SessionRecord, TelesimError> {
        self.storage()
            .find_session(session_id)
            .await?
            .ok_or(TelesimError::NotFound(session_id))
    }

    fn state_of(&self, record: &SessionRecord) -> SessionState {
        SessionState::derive(self.registry().is_running(record.id), record.is_finalized())
    }

    /// Writes the end time unless one is already set. Returns whether it
    /// wrote.
    async fn finalize(&self, session_id: SessionId) -> Result<bool, TelesimError> {
        let record = self.require_session(session_id).await?;
        if record.is_finalized() {
            return Ok(false);
        }
        let end_time = self.generator().clock().now().max(record.start_time);
        self.storage().set_session_end_time(session_id, end_time).await?;
        tracing::debug!(%session_id, %end_time, "session end time written");
        Ok(true)
    }
}
