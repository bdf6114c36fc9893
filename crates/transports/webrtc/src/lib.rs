//! Two-party WebRTC signaling and media relay
//!
//! Clients join a room of two over a WebSocket signaling channel. Each one
//! negotiates a peer connection with the server, and every media track a
//! client sends is republished to the other client with RTP packets copied
//! through unmodified.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────┐
//! │  Browser A                          Browser B         │
//! │  ↓ (WebSocket /ws + WebRTC)         ↓                 │
//! │  run_session                        run_session       │
//! │  ├─ NegotiationController (SDP offer/answer, ICE)     │
//! │  └─ event worker ← PeerEvent queue                    │
//! │                                                       │
//! │  SessionRegistry (room of 2, serialized writes)       │
//! │  MediaRelay: track from A → relayed track on B        │
//! └───────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use pairlink_webrtc::RelayConfig;
//!
//! let config = RelayConfig {
//!     relay_buffer_size: 1500,
//!     ..Default::default()
//! };
//!
//! assert!(config.validate().is_ok());
//! assert_eq!(config.ice_servers().len(), 1);
//! ```
//!
//! ## Serving
//!
//! ```no_run
//! use pairlink_webrtc::{http, RelayConfig, RtcPeerConnectionFactory, SessionRegistry};
//! use std::net::SocketAddr;
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let registry = Arc::new(SessionRegistry::new(
//!     Arc::new(RelayConfig::default()),
//!     Arc::new(RtcPeerConnectionFactory),
//! ));
//! let app = http::router(http::AppState::new(registry, "static/index.html"));
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod http;
pub mod media;
pub mod peer;
pub mod session;
pub mod signaling;

// Re-exports for public API
pub use config::{RelayConfig, TurnServerConfig, DEFAULT_RELAY_BUFFER_SIZE, ROOM_CAPACITY};
pub use error::{Error, Result};
pub use media::MediaRelay;
pub use peer::{
    ConnectionState, PeerConnectionCapability, PeerConnectionFactory, PeerEvent,
    RtcPeerConnectionFactory,
};
pub use session::{run_session, Admission, NegotiationController, Role, Session, SessionId, SessionRegistry};
pub use signaling::{ClientMessage, ServerMessage};

/// Get the version of this crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
