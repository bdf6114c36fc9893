//! Signaling channel and wire protocol
//!
//! The channel carries JSON objects: role assignment, SDP offers/answers,
//! ICE candidates and admission errors.

pub mod channel;
pub mod protocol;
pub mod websocket;

pub use channel::{ChannelReader, ChannelWriter};
pub use protocol::{
    ClientMessage, IceCandidateInit, SdpType, ServerMessage, SessionDescription,
    ROOM_FULL_MESSAGE,
};
pub use websocket::{WsChannelReader, WsChannelWriter};
