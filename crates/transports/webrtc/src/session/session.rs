//! Per-client session state

use crate::peer::PeerConnectionCapability;
use crate::signaling::ChannelWriter;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};
use uuid::Uuid;

/// Unique session identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generate a new random session ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which side proposes the first offer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Initiator,
    Responder,
}

impl Role {
    pub fn is_initiator(&self) -> bool {
        matches!(self, Role::Initiator)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Initiator => f.write_str("initiator"),
            Role::Responder => f.write_str("responder"),
        }
    }
}

/// Server-side state of one connected client
///
/// Owns the client's peer connection and the write half of its signaling
/// channel; both are released together by [`Session::release`]. Tasks
/// spawned on behalf of the session are tracked so that teardown can cancel
/// them and wait for them to exit first.
pub struct Session {
    id: SessionId,

    /// Remote address of the signaling channel
    endpoint: String,

    role: Role,

    peer: Arc<dyn PeerConnectionCapability>,

    writer: Arc<dyn ChannelWriter>,

    shutdown: CancellationToken,

    tasks: TaskTracker,
}

impl Session {
    pub(crate) fn new(
        endpoint: String,
        role: Role,
        peer: Arc<dyn PeerConnectionCapability>,
        writer: Arc<dyn ChannelWriter>,
    ) -> Self {
        Self {
            id: SessionId::new(),
            endpoint,
            role,
            peer,
            writer,
            shutdown: CancellationToken::new(),
            tasks: TaskTracker::new(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Endpoint identifier used to derive relayed track ids
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn peer(&self) -> &Arc<dyn PeerConnectionCapability> {
        &self.peer
    }

    pub(crate) fn writer(&self) -> &Arc<dyn ChannelWriter> {
        &self.writer
    }

    /// Token cancelled when the session is torn down
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Tracker for tasks that must finish before resources are released
    pub fn tasks(&self) -> &TaskTracker {
        &self.tasks
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Cancel tracked tasks, wait for them, then close the peer connection
    /// and the channel
    pub(crate) async fn release(&self) {
        self.shutdown.cancel();
        self.tasks.close();
        self.tasks.wait().await;

        if let Err(e) = self.peer.close().await {
            warn!("Error closing peer connection for session {}: {}", self.id, e);
        }
        if let Err(e) = self.writer.close().await {
            debug!("Error closing signaling channel for session {}: {}", self.id, e);
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("endpoint", &self.endpoint)
            .field("role", &self.role)
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}
