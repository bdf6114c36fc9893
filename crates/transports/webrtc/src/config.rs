//! Configuration types for the relay

use crate::peer::IceServer;
use serde::{Deserialize, Serialize};

/// Number of participants a room can hold
pub const ROOM_CAPACITY: usize = 2;

/// Default STUN server handed to every peer connection
pub const DEFAULT_STUN_SERVER: &str = "stun:stun.l.google.com:19302";

/// Default packet buffer, one MTU-sized RTP packet
pub const DEFAULT_RELAY_BUFFER_SIZE: usize = 1500;

/// Main configuration for the session registry and media relay
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// STUN server URLs (at least one required)
    pub stun_servers: Vec<String>,

    /// TURN server configurations (optional)
    pub turn_servers: Vec<TurnServerConfig>,

    /// Size of the per-packet read buffer used by forwarding tasks
    pub relay_buffer_size: usize,

    /// Tear a session down when its peer connection reports `Failed`
    ///
    /// Off by default: a failed peer connection lingers until its
    /// signaling channel closes.
    pub close_on_peer_failure: bool,
}

/// TURN server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnServerConfig {
    /// TURN server URL (turn: or turns:)
    pub url: String,

    /// Username for TURN authentication
    pub username: String,

    /// Credential for TURN authentication
    pub credential: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            stun_servers: vec![DEFAULT_STUN_SERVER.to_string()],
            turn_servers: Vec::new(),
            relay_buffer_size: DEFAULT_RELAY_BUFFER_SIZE,
            close_on_peer_failure: false,
        }
    }
}

impl RelayConfig {
    /// Validate configuration parameters
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `stun_servers` is empty or holds a non-STUN URL
    /// - a TURN server URL does not use the turn: or turns: scheme
    /// - `relay_buffer_size` is not in range 1200-65535
    pub fn validate(&self) -> crate::Result<()> {
        use crate::Error;

        if self.stun_servers.is_empty() {
            return Err(Error::InvalidConfig(
                "At least one STUN server is required".to_string(),
            ));
        }

        if let Some(url) = self
            .stun_servers
            .iter()
            .find(|url| !url.starts_with("stun:") && !url.starts_with("stuns:"))
        {
            return Err(Error::InvalidConfig(format!(
                "STUN server must start with stun: or stuns:, got {}",
                url
            )));
        }

        if let Some(turn) = self
            .turn_servers
            .iter()
            .find(|turn| !turn.url.starts_with("turn:") && !turn.url.starts_with("turns:"))
        {
            return Err(Error::InvalidConfig(format!(
                "TURN server must start with turn: or turns:, got {}",
                turn.url
            )));
        }

        if !(1200..=65535).contains(&self.relay_buffer_size) {
            return Err(Error::InvalidConfig(format!(
                "relay_buffer_size must be in range 1200-65535, got {}",
                self.relay_buffer_size
            )));
        }

        Ok(())
    }

    /// ICE servers handed to each new peer connection
    pub fn ice_servers(&self) -> Vec<IceServer> {
        self.stun_servers
            .iter()
            .map(|url| IceServer {
                urls: vec![url.clone()],
                username: String::new(),
                credential: String::new(),
            })
            .chain(self.turn_servers.iter().map(|turn| IceServer {
                urls: vec![turn.url.clone()],
                username: turn.username.clone(),
                credential: turn.credential.clone(),
            }))
            .collect()
    }

    /// Add TURN servers to this configuration
    pub fn with_turn_servers(mut self, turn_servers: Vec<TurnServerConfig>) -> Self {
        self.turn_servers = turn_servers;
        self
    }
}
