//! Signaling wire messages
//!
//! Every message is a JSON object. Clients send SDP descriptions and ICE
//! candidates; the server additionally sends a role assignment after
//! admission and an error object when the room is full.
//!
//! ```text
//! server → client  {"type":"role","initiator":true,"participants":1}
//! both ways        {"type":"offer"|"answer","sdp":"v=0..."}
//! both ways        {"candidate":"candidate:...","sdpMid":"0","sdpMLineIndex":0,...}
//! server → client  {"error":"room is full"}
//! ```

use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Error text sent to a client that is refused admission
pub const ROOM_FULL_MESSAGE: &str = "room is full";

/// SDP description type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    /// Offer from the side starting a negotiation round
    Offer,
    /// Final answer to an offer
    Answer,
    /// Provisional answer
    Pranswer,
}

impl SdpType {
    /// Parse the `type` field of an SDP message
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "offer" => Some(SdpType::Offer),
            "answer" => Some(SdpType::Answer),
            "pranswer" => Some(SdpType::Pranswer),
            _ => None,
        }
    }
}

/// SDP session description as exchanged over the signaling channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    /// Description type
    #[serde(rename = "type")]
    pub sdp_type: SdpType,

    /// Raw SDP body
    pub sdp: String,
}

impl SessionDescription {
    /// Build an offer description
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    /// Build an answer description
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// ICE candidate in its browser JSON form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidateInit {
    /// Candidate attribute line
    pub candidate: String,

    /// Media stream identification tag
    #[serde(rename = "sdpMid", default)]
    pub sdp_mid: Option<String>,

    /// Index of the media description the candidate belongs to
    #[serde(rename = "sdpMLineIndex", default)]
    pub sdp_mline_index: Option<u16>,

    /// ICE username fragment
    #[serde(rename = "usernameFragment", default)]
    pub username_fragment: Option<String>,
}

impl IceCandidateInit {
    /// Candidate carrying only the attribute line
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_mline_index: None,
            username_fragment: None,
        }
    }
}

/// Messages written by the server
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// Role assignment sent right after admission
    Role {
        /// Whether this client starts the first negotiation
        initiator: bool,
        /// Participants in the room, this client included
        participants: usize,
    },

    /// Local offer or answer
    Description(SessionDescription),

    /// Locally gathered ICE candidate
    Candidate(IceCandidateInit),

    /// Admission failure
    Error {
        /// Human-readable reason
        error: String,
    },
}

impl ServerMessage {
    /// The error sent when admission is refused
    pub fn room_full() -> Self {
        ServerMessage::Error {
            error: ROOM_FULL_MESSAGE.to_string(),
        }
    }

    /// Convert to a JSON value
    pub fn to_value(&self) -> Result<Value> {
        let value = match self {
            ServerMessage::Role {
                initiator,
                participants,
            } => json!({
                "type": "role",
                "initiator": initiator,
                "participants": participants,
            }),
            ServerMessage::Description(desc) => serde_json::to_value(desc)?,
            ServerMessage::Candidate(candidate) => serde_json::to_value(candidate)?,
            ServerMessage::Error { error } => json!({ "error": error }),
        };
        Ok(value)
    }

    /// Convert to a JSON string
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.to_value()?)?)
    }
}

/// Messages read from a client
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// SDP offer or answer
    Description(SessionDescription),

    /// Remote ICE candidate
    Candidate(IceCandidateInit),

    /// Any other shape, dropped without reply
    Ignored,
}

impl ClientMessage {
    /// Parse a text frame
    ///
    /// Invalid JSON is an error; valid JSON of an unknown shape decodes to
    /// [`ClientMessage::Ignored`].
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        Ok(Self::from_value(value))
    }

    /// Classify a decoded JSON value
    ///
    /// A non-empty string `type` marks an SDP message; otherwise a
    /// `candidate` field marks an ICE candidate.
    pub fn from_value(value: Value) -> Self {
        let Value::Object(map) = value else {
            return ClientMessage::Ignored;
        };

        match map.get("type") {
            Some(Value::String(kind)) if !kind.is_empty() => Self::description(kind, &map),
            _ if map.contains_key("candidate") => {
                serde_json::from_value::<IceCandidateInit>(Value::Object(map))
                    .map(ClientMessage::Candidate)
                    .unwrap_or(ClientMessage::Ignored)
            }
            _ => ClientMessage::Ignored,
        }
    }

    fn description(kind: &str, map: &Map<String, Value>) -> Self {
        let Some(sdp_type) = SdpType::parse(kind) else {
            return ClientMessage::Ignored;
        };

        match map.get("sdp") {
            Some(Value::String(sdp)) => ClientMessage::Description(SessionDescription {
                sdp_type,
                sdp: sdp.clone(),
            }),
            _ => ClientMessage::Ignored,
        }
    }
}
