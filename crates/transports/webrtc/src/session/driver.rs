//! Per-connection lifecycle
//!
//! Admission, then two concurrent loops: the read loop applies inbound
//! signaling, the event worker drains the peer connection's event queue.
//! Whichever way the session ends, it is removed from the registry exactly
//! once before this returns.

use super::negotiation::NegotiationController;
use super::registry::{Admission, SessionRegistry};
use super::session::Session;
use crate::media::MediaRelay;
use crate::peer::{PeerEvent, PeerEventStream};
use crate::signaling::{ChannelReader, ChannelWriter};
use crate::{Error, Result};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Serve one client over an already-established signaling channel
///
/// # Errors
///
/// Returns an error only if the client could not be admitted because its
/// peer connection failed to initialize. A refused or disconnected client
/// is not an error.
pub async fn run_session<R>(
    registry: Arc<SessionRegistry>,
    endpoint: String,
    writer: Arc<dyn ChannelWriter>,
    mut reader: R,
) -> Result<()>
where
    R: ChannelReader,
{
    let (session, events) = match registry.admit(endpoint.clone(), Arc::clone(&writer)).await {
        Ok(Admission::Admitted { session, events }) => (session, events),
        Ok(Admission::Rejected) => {
            if let Err(e) = writer.close().await {
                debug!("Error closing refused channel {}: {}", endpoint, e);
            }
            return Ok(());
        }
        Err(e) => {
            error!("Failed to create peer connection for {}: {}", endpoint, e);
            if let Err(close_err) = writer.close().await {
                debug!("Error closing channel {}: {}", endpoint, close_err);
            }
            return Err(e);
        }
    };

    let controller = Arc::new(NegotiationController::new(
        Arc::clone(&registry),
        Arc::clone(&session),
    ));
    let relay = MediaRelay::new(Arc::clone(&registry));
    let worker = tokio::spawn(process_events(Arc::clone(&controller), relay, events));

    match read_loop(&controller, &mut reader).await {
        Some(e) if e.is_disconnect() => info!("Client {} disconnected: {}", endpoint, e),
        Some(e) => warn!("Closing session for {}: {}", endpoint, e),
        None => info!("Session for {} shut down", endpoint),
    }

    registry.remove(&session).await;

    if let Err(e) = worker.await {
        warn!("Event worker for {} panicked: {}", endpoint, e);
    }

    Ok(())
}

/// Apply inbound messages until the channel fails or the session shuts down
///
/// Returns the error that ended the loop, or `None` on shutdown.
async fn read_loop<R>(controller: &NegotiationController, reader: &mut R) -> Option<Error>
where
    R: ChannelReader,
{
    let session = controller.session();
    loop {
        let message = tokio::select! {
            _ = session.shutdown_token().cancelled() => return None,
            message = reader.read_message() => message,
        };

        match message {
            Ok(message) => controller.handle_message(message).await,
            // Malformed JSON ends the session like a read failure
            Err(e) => return Some(e),
        }
    }
}

/// Drain the session's peer connection events in arrival order
async fn process_events(
    controller: Arc<NegotiationController>,
    relay: MediaRelay,
    mut events: PeerEventStream,
) {
    let session: Arc<Session> = Arc::clone(controller.session());

    loop {
        let event = tokio::select! {
            biased;
            _ = session.shutdown_token().cancelled() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        debug!("Session {}: {:?}", session.id(), event);

        match event {
            PeerEvent::NegotiationNeeded => {
                controller.on_negotiation_needed().await;
            }
            PeerEvent::IceCandidate(candidate) => controller.on_ice_candidate(candidate).await,
            PeerEvent::ConnectionStateChanged(state) => controller.on_connection_state_change(state),
            PeerEvent::Track(track) => {
                relay.relay_track(&session, track).await;
            }
        }
    }

    debug!("Event worker for session {} stopped", session.id());
}
