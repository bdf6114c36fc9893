//! Media relay
//!
//! Republishes every track a client sends to the other client in the room
//! and pumps RTP packets between them unmodified.

pub mod forwarder;
pub mod relay;

pub use forwarder::{forward_packets, ForwardEnd, ForwardStats};
pub use relay::{relayed_id, MediaRelay};
