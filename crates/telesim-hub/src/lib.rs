//! Broadcast hub for Telesim.
//!
//! Subscribers join the group of each session they want to follow. The
//! engine publishes packet and lifecycle events to a session's group and
//! the hub forwards them to every subscriber currently joined to it.
//!
//! The hub runs as a single Tokio task (actor model). [`BroadcastHub`] is
//! the cheap, cloneable handle that sends it commands.
//!
//! # Delivery
//!
//! Best effort. Events for one session reach each subscriber in publish
//! order. A subscriber whose receiver has been dropped is removed from
//! every group the next time the hub tries to deliver to it.

mod error;
mod hub;

pub use error::HubError;
pub use hub::{BroadcastHub, DEFAULT_CHANNEL_SIZE, SubscriberSender};
