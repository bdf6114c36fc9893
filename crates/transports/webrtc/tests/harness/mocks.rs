//! In-memory peer connections, tracks and signaling channels

use super::{wait_until, HarnessResult};
use async_trait::async_trait;
use pairlink_webrtc::peer::{
    CodecCapability, IceServer, LocalTrack, PeerConnectionCapability, PeerConnectionFactory,
    PeerEvent, PeerEventSink, RemoteTrack, SenderInfo, SignalingState, TrackKind,
};
use pairlink_webrtc::signaling::{
    ChannelReader, ChannelWriter, IceCandidateInit, SdpType, SessionDescription,
};
use pairlink_webrtc::{run_session, Error, RelayConfig, Result, SessionRegistry};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

// ============================================================================
// Peer connection
// ============================================================================

/// Outbound track attached through [`MockPeer::add_track`]
#[derive(Debug, Clone, PartialEq)]
pub struct AddedTrack {
    pub track_id: String,
    pub stream_id: String,
    pub codec: CodecCapability,
}

/// Peer connection that records every call
///
/// Signaling state follows the offer/answer state machine closely enough
/// for renegotiation checks.
pub struct MockPeer {
    events: PeerEventSink,
    state: Mutex<SignalingState>,
    added: Mutex<Vec<AddedTrack>>,
    local_tracks: Mutex<Vec<Arc<MockLocalTrack>>>,
    local_descriptions: Mutex<Vec<SessionDescription>>,
    remote_descriptions: Mutex<Vec<SessionDescription>>,
    candidates: Mutex<Vec<IceCandidateInit>>,
    offers_created: AtomicUsize,
    closed: AtomicBool,
}

impl MockPeer {
    pub fn new(events: PeerEventSink) -> Self {
        Self {
            events,
            state: Mutex::new(SignalingState::Stable),
            added: Mutex::new(Vec::new()),
            local_tracks: Mutex::new(Vec::new()),
            local_descriptions: Mutex::new(Vec::new()),
            remote_descriptions: Mutex::new(Vec::new()),
            candidates: Mutex::new(Vec::new()),
            offers_created: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Raise an event as the WebRTC stack would
    pub fn emit(&self, event: PeerEvent) {
        let _ = self.events.send(event);
    }

    pub fn set_signaling_state(&self, state: SignalingState) {
        *self.state.lock().unwrap() = state;
    }

    pub fn added_tracks(&self) -> Vec<AddedTrack> {
        self.added.lock().unwrap().clone()
    }

    pub fn local_track(&self, track_id: &str) -> Option<Arc<MockLocalTrack>> {
        self.local_tracks
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.track_id == track_id)
            .cloned()
    }

    pub fn local_descriptions(&self) -> Vec<SessionDescription> {
        self.local_descriptions.lock().unwrap().clone()
    }

    pub fn remote_descriptions(&self) -> Vec<SessionDescription> {
        self.remote_descriptions.lock().unwrap().clone()
    }

    pub fn candidates(&self) -> Vec<IceCandidateInit> {
        self.candidates.lock().unwrap().clone()
    }

    pub fn offers_created(&self) -> usize {
        self.offers_created.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PeerConnectionCapability for MockPeer {
    async fn create_offer(&self) -> Result<SessionDescription> {
        let n = self.offers_created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(SessionDescription::offer(format!("v=0\r\ns=mock-offer-{}\r\n", n)))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        if *self.state.lock().unwrap() != SignalingState::HaveRemoteOffer {
            return Err(Error::SdpError("no remote offer".to_string()));
        }
        Ok(SessionDescription::answer("v=0\r\ns=mock-answer\r\n"))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()> {
        let next = match desc.sdp_type {
            SdpType::Offer => SignalingState::HaveLocalOffer,
            SdpType::Answer => SignalingState::Stable,
            SdpType::Pranswer => SignalingState::HaveLocalPranswer,
        };
        *self.state.lock().unwrap() = next;
        self.local_descriptions.lock().unwrap().push(desc);
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()> {
        let next = match desc.sdp_type {
            SdpType::Offer => SignalingState::HaveRemoteOffer,
            SdpType::Answer => SignalingState::Stable,
            SdpType::Pranswer => SignalingState::HaveRemotePranswer,
        };
        *self.state.lock().unwrap() = next;
        self.remote_descriptions.lock().unwrap().push(desc);
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidateInit) -> Result<()> {
        self.candidates.lock().unwrap().push(candidate);
        Ok(())
    }

    async fn add_track(
        &self,
        codec: &CodecCapability,
        track_id: &str,
        stream_id: &str,
    ) -> Result<Arc<dyn LocalTrack>> {
        if self.is_closed() {
            return Err(Error::PeerConnectionError("closed".to_string()));
        }

        let track = Arc::new(MockLocalTrack::new(track_id, stream_id));
        self.added.lock().unwrap().push(AddedTrack {
            track_id: track_id.to_string(),
            stream_id: stream_id.to_string(),
            codec: codec.clone(),
        });
        self.local_tracks.lock().unwrap().push(Arc::clone(&track));
        self.emit(PeerEvent::NegotiationNeeded);
        Ok(track)
    }

    async fn list_senders(&self) -> Vec<SenderInfo> {
        self.added
            .lock()
            .unwrap()
            .iter()
            .map(|t| SenderInfo {
                track_id: Some(t.track_id.clone()),
            })
            .collect()
    }

    fn signaling_state(&self) -> SignalingState {
        *self.state.lock().unwrap()
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        *self.state.lock().unwrap() = SignalingState::Closed;
        Ok(())
    }
}

/// Factory handing out [`MockPeer`]s in creation order
#[derive(Default)]
pub struct MockFactory {
    peers: Mutex<Vec<Arc<MockPeer>>>,
    fail: AtomicBool,
}

impl MockFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        let factory = Self::default();
        factory.fail.store(true, Ordering::SeqCst);
        Arc::new(factory)
    }

    /// Number of peer connections constructed so far
    pub fn created(&self) -> usize {
        self.peers.lock().unwrap().len()
    }

    pub fn peer(&self, index: usize) -> Arc<MockPeer> {
        Arc::clone(&self.peers.lock().unwrap()[index])
    }
}

#[async_trait]
impl PeerConnectionFactory for MockFactory {
    async fn create(
        &self,
        _ice_servers: &[IceServer],
        events: PeerEventSink,
    ) -> Result<Arc<dyn PeerConnectionCapability>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::PeerConnectionError("factory disabled".to_string()));
        }
        let peer = Arc::new(MockPeer::new(events));
        self.peers.lock().unwrap().push(Arc::clone(&peer));
        Ok(peer)
    }
}

// ============================================================================
// Tracks
// ============================================================================

/// Inbound track fed packet by packet from the test
pub struct MockRemoteTrack {
    id: String,
    stream_id: String,
    kind: TrackKind,
    codec: CodecCapability,
    packets: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
}

impl MockRemoteTrack {
    /// Create a track and the sender that feeds it; dropping the sender ends
    /// the track
    pub fn new(
        id: &str,
        stream_id: &str,
        kind: TrackKind,
    ) -> (Arc<Self>, mpsc::UnboundedSender<Vec<u8>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let codec = match kind {
            TrackKind::Audio => CodecCapability {
                mime_type: "audio/opus".to_string(),
                clock_rate: 48000,
                channels: 2,
                sdp_fmtp_line: "minptime=10;useinbandfec=1".to_string(),
            },
            TrackKind::Video => CodecCapability {
                mime_type: "video/VP8".to_string(),
                clock_rate: 90000,
                channels: 0,
                sdp_fmtp_line: String::new(),
            },
        };
        let track = Arc::new(Self {
            id: id.to_string(),
            stream_id: stream_id.to_string(),
            kind,
            codec,
            packets: tokio::sync::Mutex::new(rx),
        });
        (track, tx)
    }
}

#[async_trait]
impl RemoteTrack for MockRemoteTrack {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn stream_id(&self) -> String {
        self.stream_id.clone()
    }

    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn codec(&self) -> CodecCapability {
        self.codec.clone()
    }

    async fn read(&self, buf: &mut [u8]) -> Result<usize> {
        match self.packets.lock().await.recv().await {
            Some(packet) => {
                let n = packet.len().min(buf.len());
                buf[..n].copy_from_slice(&packet[..n]);
                Ok(n)
            }
            None => Err(Error::MediaTrackError("EOF".to_string())),
        }
    }
}

/// Outbound track recording every packet written
pub struct MockLocalTrack {
    pub track_id: String,
    pub stream_id: String,
    written: Mutex<Vec<Vec<u8>>>,
}

impl MockLocalTrack {
    fn new(track_id: &str, stream_id: &str) -> Self {
        Self {
            track_id: track_id.to_string(),
            stream_id: stream_id.to_string(),
            written: Mutex::new(Vec::new()),
        }
    }

    pub fn written(&self) -> Vec<Vec<u8>> {
        self.written.lock().unwrap().clone()
    }
}

#[async_trait]
impl LocalTrack for MockLocalTrack {
    fn id(&self) -> String {
        self.track_id.clone()
    }

    fn stream_id(&self) -> String {
        self.stream_id.clone()
    }

    async fn write(&self, packet: &[u8]) -> Result<usize> {
        self.written.lock().unwrap().push(packet.to_vec());
        Ok(packet.len())
    }
}

// ============================================================================
// Signaling channel
// ============================================================================

/// Channel writer recording frames
///
/// Flags any two sends that overlap in time.
#[derive(Default)]
pub struct MockWriter {
    sent: Mutex<Vec<String>>,
    closed: AtomicBool,
    in_flight: AtomicBool,
    overlapped: AtomicBool,
    send_delay: Option<Duration>,
}

impl MockWriter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Writer that holds each send open for `delay`
    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            send_delay: Some(delay),
            ..Default::default()
        })
    }

    pub fn texts(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn messages(&self) -> Vec<Value> {
        self.texts()
            .iter()
            .map(|t| serde_json::from_str(t).unwrap())
            .collect()
    }

    /// Messages that carry the given `type`
    pub fn messages_of_type(&self, kind: &str) -> Vec<Value> {
        self.messages()
            .into_iter()
            .filter(|m| m["type"] == kind)
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn overlapped(&self) -> bool {
        self.overlapped.load(Ordering::SeqCst)
    }

    pub async fn wait_for_messages(&self, count: usize) -> HarnessResult<Vec<Value>> {
        wait_until(&format!("{} signaling messages", count), || async move {
            self.sent.lock().unwrap().len() >= count
        })
        .await?;
        Ok(self.messages())
    }
}

#[async_trait]
impl ChannelWriter for MockWriter {
    async fn send_text(&self, text: String) -> Result<()> {
        if self.is_closed() {
            return Err(Error::ChannelClosed);
        }
        if self.in_flight.swap(true, Ordering::SeqCst) {
            self.overlapped.store(true, Ordering::SeqCst);
        }
        if let Some(delay) = self.send_delay {
            tokio::time::sleep(delay).await;
        }
        self.sent.lock().unwrap().push(text);
        self.in_flight.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Channel reader fed from the test through [`MockClient`]
pub struct MockReader {
    inbound: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl ChannelReader for MockReader {
    async fn read_text(&mut self) -> Result<String> {
        self.inbound.recv().await.ok_or(Error::ChannelClosed)
    }
}

// ============================================================================
// Client
// ============================================================================

/// Client session driven by [`run_session`] over mock channel halves
pub struct MockClient {
    pub endpoint: String,
    pub writer: Arc<MockWriter>,
    inbound: Option<mpsc::UnboundedSender<String>>,
    task: JoinHandle<Result<()>>,
}

impl MockClient {
    /// Connect a client to `registry` as `endpoint`
    pub fn connect(registry: &Arc<SessionRegistry>, endpoint: &str) -> Self {
        Self::connect_with_writer(registry, endpoint, MockWriter::new())
    }

    pub fn connect_with_writer(
        registry: &Arc<SessionRegistry>,
        endpoint: &str,
        writer: Arc<MockWriter>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let reader = MockReader { inbound: rx };
        let task = tokio::spawn(run_session(
            Arc::clone(registry),
            endpoint.to_string(),
            writer.clone(),
            reader,
        ));

        Self {
            endpoint: endpoint.to_string(),
            writer,
            inbound: Some(tx),
            task,
        }
    }

    /// Send one raw text frame to the server
    pub fn send_text(&self, text: impl Into<String>) {
        if let Some(tx) = &self.inbound {
            let _ = tx.send(text.into());
        }
    }

    pub fn send_json(&self, value: Value) {
        self.send_text(value.to_string());
    }

    /// Close the client's side of the channel
    pub fn disconnect(&mut self) {
        self.inbound.take();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the session driver to return
    pub async fn join(self) -> Result<()> {
        match tokio::time::timeout(super::WAIT, self.task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(Error::Other(anyhow::anyhow!("session task panicked: {}", e))),
            Err(_) => Err(Error::Other(anyhow::anyhow!("session task did not finish"))),
        }
    }
}

/// Registry backed by `factory` with the default relay configuration
pub fn mock_registry(factory: &Arc<MockFactory>) -> Arc<SessionRegistry> {
    registry_with_config(factory, RelayConfig::default())
}

pub fn registry_with_config(factory: &Arc<MockFactory>, config: RelayConfig) -> Arc<SessionRegistry> {
    Arc::new(SessionRegistry::new(
        Arc::new(config),
        Arc::clone(factory) as Arc<dyn PeerConnectionFactory>,
    ))
}
