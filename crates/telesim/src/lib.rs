//! # Telesim
//!
//! Session-scoped telemetry simulation engine.
//!
//! Telesim periodically synthesizes packets for any number of independent
//! sessions, frames each one with a CRC-16 checksum, persists it through a
//! [`Storage`](telesim_store::Storage) implementation, and fans it out to
//! the subscribers joined to that session's group.
//!
//! ## Layers
//!
//! | Crate | Provides |
//! |---|---|
//! | `telesim-protocol` | checksum, packet and session records, wire messages |
//! | `telesim-session` | concurrent registry of generating sessions |
//! | `telesim-tick` | fixed-interval tick timer |
//! | `telesim-hub` | per-session broadcast groups |
//! | `telesim-store` | storage contract, in-memory store |
//! | `telesim-transport` | WebSocket subscriber connections |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use telesim::prelude::*;
//!
//! # async fn run() -> Result<(), TelesimError> {
//! let engine = Engine::builder(MemoryStore::new()).build();
//! let cancel = CancellationToken::new();
//! let scheduler = engine.spawn_scheduler(cancel.clone());
//!
//! let id = engine.create_session(Some("bench")).await?;
//! engine.start_generation(id).await?;
//! // ... packets arrive every 2 seconds ...
//! cancel.cancel();
//! let _ = scheduler.await;
//! # Ok(())
//! # }
//! ```

mod config;
mod engine;
mod error;
pub mod generator;
mod handler;
pub mod lifecycle;
pub mod scheduler;
mod server;

pub use config::EngineConfig;
pub use engine::{Engine, EngineBuilder};
pub use error::TelesimError;
pub use generator::{Clock, PacketGenerator, PhaseSource};
pub use scheduler::{Scheduler, TickReport};
pub use server::{TelesimServer, TelesimServerBuilder};

pub use telesim_hub as hub;
pub use telesim_protocol as protocol;
pub use telesim_session as session;
pub use telesim_store as store;
pub use telesim_tick as tick;
pub use telesim_transport as transport;

/// The types most applications need.
pub mod prelude {
    pub use crate::generator::{FixedPhase, ManualClock, RandomPhase, SystemClock};
    pub use crate::{
        Clock, Engine, EngineConfig, PhaseSource, Scheduler, TelesimError, TelesimServer,
        TelesimServerBuilder, TickReport,
    };
    pub use telesim_hub::BroadcastHub;
    pub use telesim_protocol::{
        EngineStatus, Packet, SessionId, SessionRecord, SessionState, SessionView,
        SubscriberId, TelemetryEvent, checksum,
    };
    pub use telesim_store::{MemoryStore, Storage, StorageError};
    pub use tokio_util::sync::CancellationToken;
}
