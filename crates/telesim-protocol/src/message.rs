//! Wire envelopes exchanged between the server and its clients.
//!
//! Every frame is an [`Envelope`]. Its [`Payload`] is one of:
//!
//! - [`Request`]: client → server, a lifecycle or query operation
//! - [`Response`]: server → client, the reply to exactly one request
//! - [`TelemetryEvent`]: server → client, pushed through a session group
//!
//! ```text
//! { "seq": 4, "timestamp": 8012,
//!   "payload": { "kind": "Event",
//!                "data": { "type": "NewPacket", "packet": { ... } } } }
//! ```

use serde::{Deserialize, Serialize};

use crate::{EngineStatus, Packet, SessionId, SessionView};

/// Operations a client can ask the server to perform.
///
/// Session ids are optional on the wire so that a request missing one
/// can be answered with a validation error instead of a decode failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    /// Persist a new session. Absent or blank names get the default name.
    CreateSession {
        #[serde(default)]
        name: Option<String>,
    },
    /// Stop generation (if running) and finalize the session.
    EndSession {
        #[serde(default)]
        session_id: Option<SessionId>,
    },
    StartGeneration {
        #[serde(default)]
        session_id: Option<SessionId>,
    },
    StopGeneration {
        #[serde(default)]
        session_id: Option<SessionId>,
    },
    ListSessions,
    ListPackets {
        #[serde(default)]
        session_id: Option<SessionId>,
    },
    /// Health/status query.
    Status,
    /// Subscribe this connection to a session's group.
    JoinSession {
        #[serde(default)]
        session_id: Option<SessionId>,
    },
    /// Unsubscribe this connection from a session's group.
    LeaveSession {
        #[serde(default)]
        session_id: Option<SessionId>,
    },
    /// The client is closing the connection.
    Disconnect { reason: String },
}

/// Replies to a [`Request`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    SessionCreated { session_id: SessionId },
    GenerationStarted { session_id: SessionId },
    /// `changed` is `false` when the session was not generating.
    GenerationStopped { session_id: SessionId, changed: bool },
    SessionEnded { session_id: SessionId, changed: bool },
    Sessions { sessions: Vec<SessionView> },
    Packets { session_id: SessionId, packets: Vec<Packet> },
    Status { status: EngineStatus, message: String },
    /// Acknowledges a join or leave. The matching [`TelemetryEvent`]
    /// arrives on the event stream as well.
    Subscribed { session_id: SessionId, joined: bool },
    /// `code` follows HTTP conventions: 400 validation, 404 unknown
    /// session, 503 storage unavailable, 500 anything else.
    Error { code: u16, message: String },
}

/// Events published to a session's group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TelemetryEvent {
    NewPacket { packet: Packet },
    GenerationStopped { session_id: SessionId },
    SessionJoined { session_id: SessionId },
    SessionLeft { session_id: SessionId },
}

impl TelemetryEvent {
    /// Event name as seen by subscribers.
    pub fn name(&self) -> &'static str {
        match self {
            Self::NewPacket { .. } => "NewPacket",
            Self::GenerationStopped { .. } => "GenerationStopped",
            Self::SessionJoined { .. } => "SessionJoined",
            Self::SessionLeft { .. } => "SessionLeft",
        }
    }

    /// The session this event belongs to.
    pub fn session_id(&self) -> SessionId {
        match self {
            Self::NewPacket { packet } => packet.session_id,
            Self::GenerationStopped { session_id }
            | Self::SessionJoined { session_id }
            | Self::SessionLeft { session_id } => *session_id,
        }
    }
}

/// Content of an [`Envelope`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data")]
pub enum Payload {
    Request(Request),
    Response(Response),
    Event(TelemetryEvent),
}

/// Top-level frame on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Per-connection sequence number assigned by the sender.
    pub seq: u64,
    /// Milliseconds since the sender's connection started.
    pub timestamp: u64,
    pub payload: Payload,
}
