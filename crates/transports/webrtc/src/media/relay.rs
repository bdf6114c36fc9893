//! Track fan-out between sessions

use super::forwarder::{forward_packets, ForwardEnd};
use crate::peer::RemoteTrack;
use crate::session::{Session, SessionRegistry};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Id of a relayed copy of `source_id` published toward `endpoint`
///
/// Derived from the receiving session's endpoint so the same inbound track
/// maps to the same outbound id on every call.
pub fn relayed_id(source_id: &str, endpoint: &str) -> String {
    format!("{}-{}", source_id, endpoint)
}

/// Republishes inbound tracks to the other sessions of the room
pub struct MediaRelay {
    registry: Arc<SessionRegistry>,
}

impl MediaRelay {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    /// Relay a track received from `source` to every other session
    ///
    /// For each receiver, an outbound track with the same codec is attached
    /// to its peer connection (unless one with the derived id already
    /// exists) and a forwarding task is started. Returns the number of
    /// outbound tracks created.
    pub async fn relay_track(&self, source: &Arc<Session>, track: Arc<dyn RemoteTrack>) -> usize {
        info!(
            session_id = %source.id(),
            track_id = %track.id(),
            stream_id = %track.stream_id(),
            kind = %track.kind(),
            "Track received"
        );

        let buffer_size = self.registry.config().relay_buffer_size;

        let created = self
            .registry
            .for_each_other(source, |receiver| {
                let source = Arc::clone(source);
                let track = Arc::clone(&track);
                async move { relay_to(source, receiver, track, buffer_size).await }
            })
            .await;

        let created = created.into_iter().filter(|added| *added).count();
        if created == 0 {
            debug!("Session {}: track {} not relayed", source.id(), track.id());
        }
        created
    }
}

async fn relay_to(
    source: Arc<Session>,
    receiver: Arc<Session>,
    track: Arc<dyn RemoteTrack>,
    buffer_size: usize,
) -> bool {
    let track_id = relayed_id(&track.id(), receiver.endpoint());
    let stream_id = relayed_id(&track.stream_id(), receiver.endpoint());

    let senders = receiver.peer().list_senders().await;
    if senders
        .iter()
        .any(|sender| sender.track_id.as_deref() == Some(track_id.as_str()))
    {
        debug!("Session {}: track {} already relayed", receiver.id(), track_id);
        return false;
    }

    let outbound = match receiver
        .peer()
        .add_track(&track.codec(), &track_id, &stream_id)
        .await
    {
        Ok(outbound) => outbound,
        Err(e) => {
            warn!("Session {}: failed to add track {}: {}", receiver.id(), track_id, e);
            return false;
        }
    };

    info!(
        from = %source.id(),
        to = %receiver.id(),
        track_id = %track_id,
        "Relaying track"
    );

    let stop = {
        let source_token = source.shutdown_token().clone();
        let receiver_token = receiver.shutdown_token().clone();
        async move {
            tokio::select! {
                _ = source_token.cancelled() => {}
                _ = receiver_token.cancelled() => {}
            }
        }
    };

    let forwarding = async move {
        let stats = forward_packets(track, outbound, buffer_size, stop).await;
        match stats.end {
            ForwardEnd::SourceClosed(e) => debug!(
                "Forwarding {} stopped after {} packets: source closed: {}",
                track_id, stats.packets, e
            ),
            ForwardEnd::SinkFailed(e) => warn!(
                "Forwarding {} stopped after {} packets: write failed: {}",
                track_id, stats.packets, e
            ),
            ForwardEnd::Cancelled => debug!(
                "Forwarding {} cancelled after {} packets",
                track_id, stats.packets
            ),
        }
    };

    // Tracked by both sessions so either teardown waits for it.
    tokio::spawn(receiver.tasks().track_future(source.tasks().track_future(forwarding)));

    true
}
