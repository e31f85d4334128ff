//! The telemetry packet: one framed sample for one session.

use serde::{Deserialize, Serialize};

use crate::checksum::checksum;
use crate::{PacketId, SessionId};

/// Constant framing marker carried by every packet.
pub const SYNC_MARKER: u32 = 0x1234_5678;

/// One framed telemetry sample.
///
/// Built by the generator with `id: None`; storage assigns the id on
/// append. Immutable after that. JSON field names follow the subscriber
/// clients (`packetCounter`, `syncMarker`, `crc16`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Packet {
    pub id: Option<PacketId>,
    pub session_id: SessionId,
    /// Per-session sequence number, starting at 0.
    #[serde(rename = "packetCounter")]
    pub counter: u32,
    /// Sample value in `[-1, 1]`.
    pub payload: f64,
    /// Unix seconds at generation time.
    pub timestamp: f64,
    pub sync_marker: u32,
    pub crc16: u16,
}

impl Packet {
    /// Frames a new, not yet persisted packet.
    pub fn frame(session_id: SessionId, counter: u32, payload: f64, timestamp: f64) -> Self {
        Self {
            id: None,
            session_id,
            counter,
            payload,
            timestamp,
            sync_marker: SYNC_MARKER,
            crc16: checksum(payload, counter, timestamp),
        }
    }

    /// Returns a copy carrying the storage-assigned id.
    pub fn with_id(mut self, id: PacketId) -> Self {
        self.id = Some(id);
        self
    }

    /// Recomputes the checksum and checks the sync marker.
    pub fn verify(&self) -> bool {
        self.sync_marker == SYNC_MARKER
            && self.crc16 == checksum(self.payload, self.counter, self.timestamp)
    }
}
