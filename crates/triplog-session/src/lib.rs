//! # Triplog Session
//!
//! Runs a [`triplog_core::TripDetector`] per tracked device on a Tokio task
//! and ships its commits to a persistence gateway.

pub mod session;
pub mod store;

pub use session::{Session, SessionError, SessionHandle, SessionMonitor, SessionStats};
pub use store::{CsvStore, MemoryStore};
