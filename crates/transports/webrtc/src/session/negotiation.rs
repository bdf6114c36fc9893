//! Offer/answer and ICE exchange for one session

use super::registry::SessionRegistry;
use super::session::Session;
use crate::peer::{ConnectionState, SignalingState};
use crate::signaling::{ClientMessage, IceCandidateInit, SdpType, ServerMessage, SessionDescription};
use crate::Result;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Reacts to peer connection events and inbound signaling for one session
///
/// The server renegotiates whenever its side of the connection changes, so
/// either party may produce an offer. Failures are logged and never end the
/// session.
pub struct NegotiationController {
    registry: Arc<SessionRegistry>,
    session: Arc<Session>,
}

impl NegotiationController {
    pub fn new(registry: Arc<SessionRegistry>, session: Arc<Session>) -> Self {
        Self { registry, session }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Send a fresh offer, unless a negotiation is already in flight
    ///
    /// Returns `true` if an offer was sent.
    pub async fn on_negotiation_needed(&self) -> bool {
        let state = self.session.peer().signaling_state();
        if state != SignalingState::Stable {
            debug!(
                "Session {}: skipping renegotiation in signaling state {:?}",
                self.session.id(),
                state
            );
            return false;
        }

        match self.send_offer().await {
            Ok(()) => true,
            Err(e) => {
                warn!("Session {}: renegotiation failed: {}", self.session.id(), e);
                false
            }
        }
    }

    /// Forward a locally gathered candidate to the client
    ///
    /// The end-of-gathering marker is not forwarded.
    pub async fn on_ice_candidate(&self, candidate: Option<IceCandidateInit>) {
        let Some(candidate) = candidate else {
            debug!("Session {}: ICE gathering complete", self.session.id());
            return;
        };

        if let Err(e) = self
            .registry
            .send(&self.session, &ServerMessage::Candidate(candidate))
            .await
        {
            warn!("Session {}: failed to send ICE candidate: {}", self.session.id(), e);
        }
    }

    /// Record a transport state change
    ///
    /// With `close_on_peer_failure` set, a failed or closed connection shuts
    /// the session down.
    pub fn on_connection_state_change(&self, state: ConnectionState) {
        info!(
            session_id = %self.session.id(),
            endpoint = self.session.endpoint(),
            state = %state,
            "Peer connection state changed"
        );

        if state.is_terminal() && self.registry.config().close_on_peer_failure {
            warn!(
                "Session {}: peer connection {}, closing session",
                self.session.id(),
                state
            );
            self.session.shutdown_token().cancel();
        }
    }

    /// Apply one inbound signaling message
    pub async fn handle_message(&self, message: ClientMessage) {
        match message {
            ClientMessage::Description(desc) => {
                if let Err(e) = self.apply_description(desc).await {
                    warn!("Session {}: failed to apply description: {}", self.session.id(), e);
                }
            }
            ClientMessage::Candidate(candidate) => {
                if let Err(e) = self.session.peer().add_ice_candidate(candidate).await {
                    warn!("Session {}: failed to add ICE candidate: {}", self.session.id(), e);
                }
            }
            ClientMessage::Ignored => {
                debug!("Session {}: ignoring unrecognized message", self.session.id());
            }
        }
    }

    async fn send_offer(&self) -> Result<()> {
        let offer = self.session.peer().create_offer().await?;
        self.session.peer().set_local_description(offer.clone()).await?;
        self.registry
            .send(&self.session, &ServerMessage::Description(offer))
            .await?;

        debug!("Session {}: offer sent", self.session.id());
        Ok(())
    }

    async fn apply_description(&self, desc: SessionDescription) -> Result<()> {
        let sdp_type = desc.sdp_type;
        self.session.peer().set_remote_description(desc).await?;

        if sdp_type != SdpType::Offer {
            return Ok(());
        }

        let answer = self.session.peer().create_answer().await?;
        self.session.peer().set_local_description(answer.clone()).await?;
        self.registry
            .send(&self.session, &ServerMessage::Description(answer))
            .await?;

        debug!("Session {}: answer sent", self.session.id());
        Ok(())
    }
}
