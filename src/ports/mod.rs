//! Port traits. API boundaries for the hexagon.
//!
//! Outbound: called by the application into infrastructure.

pub mod outbound;

pub use outbound::{EventStore, MessageSender};
