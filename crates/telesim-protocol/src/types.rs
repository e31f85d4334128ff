//! Identity and record types shared by every Telesim layer.
//!
//! These are the structures that end up in storage and on the wire:
//! session and packet identifiers, the persisted session record, and the
//! derived lifecycle state reported to clients.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Identifier of a telemetry session.
///
/// Assigned by storage, monotonically increasing, never reused. Serializes
/// as a plain number so subscribers can use it directly as a group key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S-{}", self.0)
    }
}

/// Identifier of a persisted packet. Assigned by storage on append.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PacketId(pub u64);

impl fmt::Display for PacketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "K-{}", self.0)
    }
}

/// Identifier of a subscriber connected to the broadcast hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriberId(pub u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Session record
// ---------------------------------------------------------------------------

/// A persisted session row.
///
/// `start_time` is fixed at creation. `end_time` stays `None` until the
/// first stop or end and is never rewritten afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: SessionId,
    pub name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

impl SessionRecord {
    /// Returns `true` once an end timestamp has been written.
    pub fn is_finalized(&self) -> bool {
        self.end_time.is_some()
    }
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Lifecycle state of a session.
///
/// ```text
///            start            stop / end
/// Created ─────────→ Running ────────────→ Stopped
///                       ↑                     │
///                       └──────(start)────────┘
/// ```
///
/// - **Created**: the session row exists, nothing is generating.
/// - **Running**: the session is registered for generation; every tick
///   produces one packet for it.
/// - **Stopped**: generation was stopped and the end timestamp is set.
///   A session that will never be restarted ("ended") is also `Stopped`.
///
/// The state is never stored. It is derived from whether the registry
/// holds the session and whether the record carries an end timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Created,
    Running,
    Stopped,
}

impl SessionState {
    /// Derives the state from registry membership and the persisted end
    /// timestamp. Registry membership wins: a restarted session is
    /// `Running` even though its original end timestamp is kept.
    pub fn derive(registered: bool, finalized: bool) -> Self {
        match (registered, finalized) {
            (true, _) => Self::Running,
            (false, true) => Self::Stopped,
            (false, false) => Self::Created,
        }
    }

    /// Returns `true` if the scheduler generates packets in this state.
    pub fn is_generating(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// Returns `true` if moving to `target` is a valid transition.
    ///
    /// `Running → Running` is allowed because start is idempotent.
    pub fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Created, Self::Running)
                | (Self::Created, Self::Stopped)
                | (Self::Running, Self::Running)
                | (Self::Running, Self::Stopped)
                | (Self::Stopped, Self::Running)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "Created"),
            Self::Running => write!(f, "Running"),
            Self::Stopped => write!(f, "Stopped"),
        }
    }
}

/// A session record together with its derived state, as listed to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    #[serde(flatten)]
    pub record: SessionRecord,
    pub state: SessionState,
}

/// Health snapshot of a running engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
    /// Sessions currently registered for generation.
    pub running_sessions: usize,
    /// Ticks completed since the scheduler started.
    pub ticks: u64,
    /// Subscribers currently connected to the hub.
    pub subscribers: usize,
    pub uptime_secs: u64,
}
