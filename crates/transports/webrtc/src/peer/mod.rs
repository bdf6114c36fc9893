//! WebRTC peer connection capability
//!
//! Trait seam between the relay and the WebRTC stack, plus the webrtc-rs
//! implementation used in production.

pub mod capability;
pub mod connection;

pub use capability::{
    event_queue, CodecCapability, ConnectionState, IceServer, LocalTrack,
    PeerConnectionCapability, PeerConnectionFactory, PeerEvent, PeerEventSink, PeerEventStream,
    RemoteTrack, SenderInfo, SignalingState, TrackKind,
};
pub use connection::{RtcPeerConnection, RtcPeerConnectionFactory};
