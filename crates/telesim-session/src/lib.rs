//! Session generation registry for Telesim.
//!
//! Tracks which sessions are currently generating packets and hands out
//! each session's packet counter. The registry is shared between the
//! request handlers (start/stop) and the scheduler (snapshot + counter
//! draws), so every operation takes `&self`.
//!
//! # How it fits in the stack
//!
//! ```text
//! Engine (above)   ← lifecycle calls start/stop, scheduler snapshots
//!     ↕
//! Session Layer (this crate)  ← running flags, counters, name policy
//!     ↕
//! Protocol Layer (below)  ← SessionId
//! ```

mod error;
mod naming;
mod registry;

pub use error::SessionError;
pub use naming::{DEFAULT_SESSION_NAME, MAX_NAME_LEN, NamePolicy};
pub use registry::SessionRegistry;
