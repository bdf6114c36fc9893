//! webrtc-rs implementation of the peer connection capability

use super::capability::{
    CodecCapability, ConnectionState, IceServer, LocalTrack, PeerConnectionCapability,
    PeerConnectionFactory, PeerEvent, PeerEventSink, RemoteTrack, SenderInfo, SignalingState,
    TrackKind,
};
use crate::signaling::{IceCandidateInit, SdpType, SessionDescription};
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::signaling_state::RTCSignalingState;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::track::track_local::track_local_static_rtp::TrackLocalStaticRTP;
use webrtc::track::track_local::{TrackLocal, TrackLocalWriter};
use webrtc::track::track_remote::TrackRemote;
use webrtc::util::Marshal;

/// Creates [`RtcPeerConnection`]s with the default codecs and interceptors
#[derive(Debug, Clone, Copy, Default)]
pub struct RtcPeerConnectionFactory;

#[async_trait]
impl PeerConnectionFactory for RtcPeerConnectionFactory {
    async fn create(
        &self,
        ice_servers: &[IceServer],
        events: PeerEventSink,
    ) -> Result<Arc<dyn PeerConnectionCapability>> {
        let connection = RtcPeerConnection::new(ice_servers, events).await?;
        Ok(Arc::new(connection))
    }
}

/// WebRTC peer connection wrapper
///
/// Wraps a `webrtc::RTCPeerConnection` and forwards its callbacks onto the
/// owning session's event queue.
pub struct RtcPeerConnection {
    peer_connection: Arc<RTCPeerConnection>,
}

impl RtcPeerConnection {
    /// Create a new peer connection
    ///
    /// # Arguments
    ///
    /// * `ice_servers` - STUN/TURN servers used for candidate gathering
    /// * `events` - Queue receiving negotiation, candidate, state and track events
    #[instrument(skip_all, fields(ice_servers = ice_servers.len()))]
    pub async fn new(ice_servers: &[IceServer], events: PeerEventSink) -> Result<Self> {
        // Register default codecs (Opus for audio, VP8/VP9/H.264 for video)
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| Error::PeerConnectionError(format!("Failed to register codecs: {}", e)))?;

        let registry = register_default_interceptors(Registry::new(), &mut media_engine)
            .map_err(|e| {
                Error::PeerConnectionError(format!("Failed to register interceptors: {}", e))
            })?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: ice_servers
                .iter()
                .map(|server| RTCIceServer {
                    urls: server.urls.clone(),
                    username: server.username.clone(),
                    credential: server.credential.clone(),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        };

        let peer_connection = Arc::new(api.new_peer_connection(rtc_config).await.map_err(|e| {
            Error::PeerConnectionError(format!("Failed to create peer connection: {}", e))
        })?);

        install_handlers(&peer_connection, events);

        info!("Created peer connection");

        Ok(Self { peer_connection })
    }
}

/// Route webrtc-rs callbacks onto the event queue
///
/// Sends never block; a closed queue means the session is gone and the event
/// is dropped.
fn install_handlers(pc: &Arc<RTCPeerConnection>, events: PeerEventSink) {
    let tx = events.clone();
    pc.on_negotiation_needed(Box::new(move || {
        let _ = tx.send(PeerEvent::NegotiationNeeded);
        Box::pin(async {})
    }));

    let tx = events.clone();
    pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
        let event = match candidate.map(|c| c.to_json()).transpose() {
            Ok(init) => Some(PeerEvent::IceCandidate(init.map(IceCandidateInit::from))),
            Err(e) => {
                warn!("Failed to serialize local ICE candidate: {}", e);
                None
            }
        };
        if let Some(event) = event {
            let _ = tx.send(event);
        }
        Box::pin(async {})
    }));

    let tx = events.clone();
    pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
        let _ = tx.send(PeerEvent::ConnectionStateChanged(state.into()));
        Box::pin(async {})
    }));

    let tx = events;
    pc.on_track(Box::new(move |track: Arc<TrackRemote>, _receiver, _transceiver| {
        debug!(
            "Remote track: id={}, stream_id={}, kind={}, ssrc={}",
            track.id(),
            track.stream_id(),
            track.kind(),
            track.ssrc()
        );
        let _ = tx.send(PeerEvent::Track(Arc::new(RtcRemoteTrack { track })));
        Box::pin(async {})
    }));
}

#[async_trait]
impl PeerConnectionCapability for RtcPeerConnection {
    async fn create_offer(&self) -> Result<SessionDescription> {
        let offer = self
            .peer_connection
            .create_offer(None)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to create offer: {}", e)))?;
        offer.try_into()
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        let answer = self
            .peer_connection
            .create_answer(None)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to create answer: {}", e)))?;
        answer.try_into()
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()> {
        self.peer_connection
            .set_local_description(desc.try_into()?)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to set local description: {}", e)))
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()> {
        self.peer_connection
            .set_remote_description(desc.try_into()?)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to set remote description: {}", e)))
    }

    async fn add_ice_candidate(&self, candidate: IceCandidateInit) -> Result<()> {
        self.peer_connection
            .add_ice_candidate(candidate.into())
            .await
            .map_err(|e| Error::IceCandidateError(format!("Failed to add ICE candidate: {}", e)))
    }

    async fn add_track(
        &self,
        codec: &CodecCapability,
        track_id: &str,
        stream_id: &str,
    ) -> Result<Arc<dyn LocalTrack>> {
        let track = Arc::new(TrackLocalStaticRTP::new(
            codec.clone().into(),
            track_id.to_string(),
            stream_id.to_string(),
        ));

        let sender = self
            .peer_connection
            .add_track(Arc::clone(&track) as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(|e| Error::MediaTrackError(format!("Failed to add track: {}", e)))?;

        // Drain RTCP so the sender's interceptors keep running
        tokio::spawn(async move {
            let mut rtcp_buf = vec![0u8; 1500];
            while sender.read(&mut rtcp_buf).await.is_ok() {}
        });

        Ok(Arc::new(RtcLocalTrack { track }))
    }

    async fn list_senders(&self) -> Vec<SenderInfo> {
        let mut senders = Vec::new();
        for sender in self.peer_connection.get_senders().await {
            let track_id = sender.track().await.map(|t| t.id().to_string());
            senders.push(SenderInfo { track_id });
        }
        senders
    }

    fn signaling_state(&self) -> SignalingState {
        self.peer_connection.signaling_state().into()
    }

    async fn close(&self) -> Result<()> {
        self.peer_connection
            .close()
            .await
            .map_err(|e| Error::PeerConnectionError(format!("Failed to close: {}", e)))
    }
}

/// Inbound track received from a client
struct RtcRemoteTrack {
    track: Arc<TrackRemote>,
}

#[async_trait]
impl RemoteTrack for RtcRemoteTrack {
    fn id(&self) -> String {
        self.track.id()
    }

    fn stream_id(&self) -> String {
        self.track.stream_id()
    }

    fn kind(&self) -> TrackKind {
        match self.track.kind() {
            RTPCodecType::Video => TrackKind::Video,
            _ => TrackKind::Audio,
        }
    }

    fn codec(&self) -> CodecCapability {
        self.track.codec().capability.into()
    }

    async fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let (packet, _attributes) = self
            .track
            .read_rtp()
            .await
            .map_err(|e| Error::MediaTrackError(format!("read: {}", e)))?;
        packet
            .marshal_to(buf)
            .map_err(|e| Error::MediaTrackError(format!("marshal: {}", e)))
    }
}

/// Outbound track relaying another client's media
struct RtcLocalTrack {
    track: Arc<TrackLocalStaticRTP>,
}

#[async_trait]
impl LocalTrack for RtcLocalTrack {
    fn id(&self) -> String {
        self.track.id().to_string()
    }

    fn stream_id(&self) -> String {
        self.track.stream_id().to_string()
    }

    async fn write(&self, packet: &[u8]) -> Result<usize> {
        self.track
            .write(packet)
            .await
            .map_err(|e| Error::MediaTrackError(format!("write: {}", e)))
    }
}

impl TryFrom<RTCSessionDescription> for SessionDescription {
    type Error = Error;

    fn try_from(desc: RTCSessionDescription) -> Result<Self> {
        let sdp_type = match desc.sdp_type {
            RTCSdpType::Offer => SdpType::Offer,
            RTCSdpType::Answer => SdpType::Answer,
            RTCSdpType::Pranswer => SdpType::Pranswer,
            other => {
                return Err(Error::SdpError(format!(
                    "Unsupported description type: {}",
                    other
                )))
            }
        };
        Ok(SessionDescription {
            sdp_type,
            sdp: desc.sdp,
        })
    }
}

impl TryFrom<SessionDescription> for RTCSessionDescription {
    type Error = Error;

    fn try_from(desc: SessionDescription) -> Result<Self> {
        let parsed = match desc.sdp_type {
            SdpType::Offer => RTCSessionDescription::offer(desc.sdp),
            SdpType::Answer => RTCSessionDescription::answer(desc.sdp),
            SdpType::Pranswer => RTCSessionDescription::pranswer(desc.sdp),
        };
        parsed.map_err(|e| Error::SdpError(format!("Invalid SDP: {}", e)))
    }
}

impl From<RTCIceCandidateInit> for IceCandidateInit {
    fn from(init: RTCIceCandidateInit) -> Self {
        Self {
            candidate: init.candidate,
            sdp_mid: init.sdp_mid,
            sdp_mline_index: init.sdp_mline_index,
            username_fragment: init.username_fragment,
        }
    }
}

impl From<IceCandidateInit> for RTCIceCandidateInit {
    fn from(init: IceCandidateInit) -> Self {
        Self {
            candidate: init.candidate,
            sdp_mid: init.sdp_mid,
            sdp_mline_index: init.sdp_mline_index,
            username_fragment: init.username_fragment,
        }
    }
}

impl From<RTCRtpCodecCapability> for CodecCapability {
    fn from(codec: RTCRtpCodecCapability) -> Self {
        Self {
            mime_type: codec.mime_type,
            clock_rate: codec.clock_rate,
            channels: codec.channels,
            sdp_fmtp_line: codec.sdp_fmtp_line,
        }
    }
}

impl From<CodecCapability> for RTCRtpCodecCapability {
    fn from(codec: CodecCapability) -> Self {
        Self {
            mime_type: codec.mime_type,
            clock_rate: codec.clock_rate,
            channels: codec.channels,
            sdp_fmtp_line: codec.sdp_fmtp_line,
            ..Default::default()
        }
    }
}

impl From<RTCSignalingState> for SignalingState {
    fn from(state: RTCSignalingState) -> Self {
        match state {
            RTCSignalingState::Stable => SignalingState::Stable,
            RTCSignalingState::HaveLocalOffer => SignalingState::HaveLocalOffer,
            RTCSignalingState::HaveRemoteOffer => SignalingState::HaveRemoteOffer,
            RTCSignalingState::HaveLocalPranswer => SignalingState::HaveLocalPranswer,
            RTCSignalingState::HaveRemotePranswer => SignalingState::HaveRemotePranswer,
            RTCSignalingState::Closed => SignalingState::Closed,
            _ => SignalingState::Unspecified,
        }
    }
}

impl From<RTCPeerConnectionState> for ConnectionState {
    fn from(state: RTCPeerConnectionState) -> Self {
        match state {
            RTCPeerConnectionState::New => ConnectionState::New,
            RTCPeerConnectionState::Connecting => ConnectionState::Connecting,
            RTCPeerConnectionState::Connected => ConnectionState::Connected,
            RTCPeerConnectionState::Disconnected => ConnectionState::Disconnected,
            RTCPeerConnectionState::Failed => ConnectionState::Failed,
            RTCPeerConnectionState::Closed => ConnectionState::Closed,
            _ => ConnectionState::Unspecified,
        }
    }
}
