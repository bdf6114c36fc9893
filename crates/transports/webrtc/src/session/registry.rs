//! Session registry
//!
//! Holds the live sessions of the room. One async mutex guards the session
//! list and also serializes every signaling write, so concurrent callbacks
//! for the same client never interleave frames on its channel.

use super::session::{Role, Session, SessionId};
use crate::config::{RelayConfig, ROOM_CAPACITY};
use crate::peer::{event_queue, PeerConnectionFactory, PeerEventStream};
use crate::signaling::{ChannelWriter, ServerMessage};
use crate::Result;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Outcome of an admission attempt
pub enum Admission {
    /// Session registered; `events` receives its peer connection events
    Admitted {
        session: Arc<Session>,
        events: PeerEventStream,
    },

    /// Room already full; the client was sent the room-full error
    Rejected,
}

/// Registry of the sessions sharing the room
pub struct SessionRegistry {
    sessions: Mutex<Vec<Arc<Session>>>,

    config: Arc<RelayConfig>,

    factory: Arc<dyn PeerConnectionFactory>,
}

impl SessionRegistry {
    /// Create an empty registry
    ///
    /// # Arguments
    ///
    /// * `config` - ICE servers and relay settings
    /// * `factory` - Constructs a peer connection per admitted session
    pub fn new(config: Arc<RelayConfig>, factory: Arc<dyn PeerConnectionFactory>) -> Self {
        Self {
            sessions: Mutex::new(Vec::with_capacity(ROOM_CAPACITY)),
            config,
            factory,
        }
    }

    pub fn config(&self) -> &Arc<RelayConfig> {
        &self.config
    }

    /// Admit a client whose channel handshake just completed
    ///
    /// Refuses the client with a `room is full` error when the room is at
    /// capacity; no peer connection is created in that case. Otherwise
    /// creates the peer connection, assigns the role and reports it to the
    /// client.
    ///
    /// # Errors
    ///
    /// Returns an error if the peer connection cannot be created.
    pub async fn admit(
        &self,
        endpoint: String,
        writer: Arc<dyn ChannelWriter>,
    ) -> Result<Admission> {
        let mut sessions = self.sessions.lock().await;

        if sessions.len() >= ROOM_CAPACITY {
            info!("Rejecting {}: room is full", endpoint);
            if let Err(e) = writer.send_text(ServerMessage::room_full().to_json()?).await {
                debug!("Failed to send room-full error to {}: {}", endpoint, e);
            }
            return Ok(Admission::Rejected);
        }

        let (events_tx, events) = event_queue();
        let peer = self
            .factory
            .create(&self.config.ice_servers(), events_tx)
            .await?;

        let role = if sessions.is_empty() {
            Role::Initiator
        } else {
            Role::Responder
        };
        let session = Arc::new(Session::new(endpoint, role, peer, writer));
        sessions.push(Arc::clone(&session));
        let participants = sessions.len();
        drop(sessions);

        info!(
            session_id = %session.id(),
            endpoint = session.endpoint(),
            role = %role,
            participants,
            "Session admitted"
        );

        let role_message = ServerMessage::Role {
            initiator: role.is_initiator(),
            participants,
        };
        if let Err(e) = self.send(&session, &role_message).await {
            warn!("Failed to send role to session {}: {}", session.id(), e);
        }

        Ok(Admission::Admitted { session, events })
    }

    /// Remove a session and release its resources
    ///
    /// Returns `false` without doing anything if the session was already
    /// removed.
    pub async fn remove(&self, session: &Session) -> bool {
        let mut sessions = self.sessions.lock().await;

        let Some(index) = sessions.iter().position(|s| s.id() == session.id()) else {
            debug!("Session {} already removed", session.id());
            return false;
        };

        let removed = sessions.remove(index);
        removed.release().await;

        info!(
            session_id = %removed.id(),
            endpoint = removed.endpoint(),
            remaining = sessions.len(),
            "Session removed"
        );

        true
    }

    /// Run `f` once for every registered session other than `session`
    ///
    /// The registry lock is held for the whole enumeration, so sessions can
    /// neither join nor leave meanwhile. Nothing is visited once `session`
    /// itself has been removed.
    pub async fn for_each_other<F, Fut, T>(&self, session: &Session, mut f: F) -> Vec<T>
    where
        F: FnMut(Arc<Session>) -> Fut,
        Fut: Future<Output = T>,
    {
        let sessions = self.sessions.lock().await;

        if !sessions.iter().any(|s| s.id() == session.id()) {
            return Vec::new();
        }

        let mut results = Vec::with_capacity(sessions.len());
        for other in sessions.iter().filter(|s| s.id() != session.id()) {
            results.push(f(Arc::clone(other)).await);
        }
        results
    }

    /// Write one message to a session's signaling channel
    pub async fn send(&self, session: &Session, message: &ServerMessage) -> Result<()> {
        let text = message.to_json()?;
        let _guard = self.sessions.lock().await;
        session.writer().send_text(text).await
    }

    /// Number of registered sessions
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }

    pub async fn contains(&self, id: SessionId) -> bool {
        self.sessions.lock().await.iter().any(|s| s.id() == id)
    }

    /// Snapshot of the registered sessions in admission order
    pub async fn sessions(&self) -> Vec<Arc<Session>> {
        self.sessions.lock().await.clone()
    }
}
