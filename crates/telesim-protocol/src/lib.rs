//! Packet framing and wire protocol for Telesim.
//!
//! - **Checksum** ([`checksum`]): the 16-bit CRC that frames each packet.
//! - **Records** ([`Packet`], [`SessionRecord`], [`SessionState`]): what
//!   storage holds and clients receive.
//! - **Messages** ([`Envelope`], [`Request`], [`Response`],
//!   [`TelemetryEvent`]): what travels on a subscriber connection.
//! - **Codec** ([`Codec`], [`JsonCodec`]): bytes ↔ messages.
//!
//! This crate knows nothing about connections, timers, or storage.

pub mod checksum;
mod codec;
mod error;
mod message;
mod packet;
mod types;

pub use checksum::checksum;
pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use message::{Envelope, Payload, Request, Response, TelemetryEvent};
pub use packet::{Packet, SYNC_MARKER};
pub use types::{
    EngineStatus, PacketId, SessionId, SessionRecord, SessionState, SessionView, SubscriberId,
};
