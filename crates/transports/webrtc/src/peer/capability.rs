//! Peer connection capability
//!
//! The relay drives WebRTC through these traits only. Callbacks raised by the
//! underlying connection are delivered as [`PeerEvent`]s on a per-session
//! queue, so the negotiation controller and the media relay consume them in
//! order on one worker.

use crate::signaling::{IceCandidateInit, SessionDescription};
use crate::Result;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Sender half of a session's event queue
pub type PeerEventSink = mpsc::UnboundedSender<PeerEvent>;

/// Receiver half of a session's event queue
pub type PeerEventStream = mpsc::UnboundedReceiver<PeerEvent>;

/// Create an event queue for one peer connection
pub fn event_queue() -> (PeerEventSink, PeerEventStream) {
    mpsc::unbounded_channel()
}

/// STUN/TURN server handed to a new peer connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IceServer {
    pub urls: Vec<String>,
    pub username: String,
    pub credential: String,
}

/// Offer/answer state of a peer connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalingState {
    Unspecified,
    /// No negotiation in flight
    Stable,
    HaveLocalOffer,
    HaveRemoteOffer,
    HaveLocalPranswer,
    HaveRemotePranswer,
    Closed,
}

/// Transport state of a peer connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unspecified,
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl ConnectionState {
    /// Whether the connection can no longer carry media
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Failed | ConnectionState::Closed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Unspecified => "unspecified",
            ConnectionState::New => "new",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Failed => "failed",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Media kind of a track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackKind::Audio => f.write_str("audio"),
            TrackKind::Video => f.write_str("video"),
        }
    }
}

/// Codec parameters copied from an inbound track to its relayed copies
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CodecCapability {
    pub mime_type: String,
    pub clock_rate: u32,
    pub channels: u16,
    pub sdp_fmtp_line: String,
}

/// Outbound sender attached to a peer connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderInfo {
    /// Id of the track currently bound to the sender, if any
    pub track_id: Option<String>,
}

/// Media track received from a client
#[async_trait]
pub trait RemoteTrack: Send + Sync {
    fn id(&self) -> String;

    fn stream_id(&self) -> String;

    fn kind(&self) -> TrackKind;

    fn codec(&self) -> CodecCapability;

    /// Read one RTP packet into `buf`, returning its length
    async fn read(&self, buf: &mut [u8]) -> Result<usize>;
}

/// Media track published toward a client
#[async_trait]
pub trait LocalTrack: Send + Sync {
    fn id(&self) -> String;

    fn stream_id(&self) -> String;

    /// Write one RTP packet unmodified
    async fn write(&self, packet: &[u8]) -> Result<usize>;
}

/// Events raised by a peer connection
pub enum PeerEvent {
    /// Tracks or transceivers changed and a new offer is due
    NegotiationNeeded,

    /// Locally gathered candidate; `None` marks the end of gathering
    IceCandidate(Option<IceCandidateInit>),

    /// Transport state changed
    ConnectionStateChanged(ConnectionState),

    /// Client started sending a media track
    Track(Arc<dyn RemoteTrack>),
}

impl fmt::Debug for PeerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerEvent::NegotiationNeeded => f.write_str("NegotiationNeeded"),
            PeerEvent::IceCandidate(c) => f.debug_tuple("IceCandidate").field(c).finish(),
            PeerEvent::ConnectionStateChanged(s) => {
                f.debug_tuple("ConnectionStateChanged").field(s).finish()
            }
            PeerEvent::Track(track) => f
                .debug_struct("Track")
                .field("id", &track.id())
                .field("stream_id", &track.stream_id())
                .field("kind", &track.kind())
                .finish(),
        }
    }
}

/// Operations the relay needs from a peer connection
#[async_trait]
pub trait PeerConnectionCapability: Send + Sync {
    async fn create_offer(&self) -> Result<SessionDescription>;

    async fn create_answer(&self) -> Result<SessionDescription>;

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()>;

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()>;

    async fn add_ice_candidate(&self, candidate: IceCandidateInit) -> Result<()>;

    /// Create an outbound track with the given codec and ids and attach it
    ///
    /// Attaching a track raises [`PeerEvent::NegotiationNeeded`].
    async fn add_track(
        &self,
        codec: &CodecCapability,
        track_id: &str,
        stream_id: &str,
    ) -> Result<Arc<dyn LocalTrack>>;

    async fn list_senders(&self) -> Vec<SenderInfo>;

    fn signaling_state(&self) -> SignalingState;

    async fn close(&self) -> Result<()>;
}

/// Constructs peer connections for newly admitted sessions
#[async_trait]
pub trait PeerConnectionFactory: Send + Sync {
    /// Create a peer connection that reports its events on `events`
    async fn create(
        &self,
        ice_servers: &[IceServer],
        events: PeerEventSink,
    ) -> Result<Arc<dyn PeerConnectionCapability>>;
}
