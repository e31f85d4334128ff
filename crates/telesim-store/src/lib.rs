//! Storage contract for Telesim, plus an in-memory implementation.
//!
//! The engine never talks to a database directly. It depends on the
//! [`Storage`] trait, which a deployment implements over whatever
//! persistence it has. [`MemoryStore`] is the implementation used by the
//! demo server and the tests.

mod error;
mod memory;
mod storage;

pub use error::StorageError;
pub use memory::MemoryStore;
pub use storage::{NewSession, Storage};
