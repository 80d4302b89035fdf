//! Structured, displayable messages sent to the client as JSON.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

/// The minimal JSON text component: `{"text": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextComponent {
    pub text: String,
}

impl TextComponent {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Why a connection is being closed.
///
/// Always carries a human-readable message. When the client is in a phase
/// that understands it, the reason travels as a text component before the
/// transport is closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectReason {
    text: String,
}

impl DisconnectReason {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// The wire form sent in a disconnect packet.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(&TextComponent::new(self.text.clone()))?)
    }

    /// Parses a text component, or a bare JSON string.
    pub fn from_json(json: &str) -> Result<Self, ProtocolError> {
        if let Ok(component) = serde_json::from_str::<TextComponent>(json) {
            return Ok(Self::new(component.text));
        }
        Ok(Self::new(serde_json::from_str::<String>(json)?))
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl From<&str> for DisconnectReason {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for DisconnectReason {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}

// ---------------------------------------------------------------------------
// Server list status
// ---------------------------------------------------------------------------

/// Body of the status response shown in the client's server list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: StatusVersion,
    pub players: StatusPlayers,
    pub description: TextComponent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusVersion {
    pub name: String,
    pub protocol: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusPlayers {
    pub max: u32,
    pub online: u32,
    #[serde(default)]
    pub sample: Vec<PlayerSample>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSample {
    pub name: String,
    pub id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disconnect_reason_json_is_text_component() {
        let reason = DisconnectReason::new("Took too long to log in");
        assert_eq!(reason.to_json().unwrap(), r#"{"text":"Took too long to log in"}"#);
    }

    #[test]
    fn test_disconnect_reason_from_json_accepts_bare_string() {
        let reason = DisconnectReason::from_json(r#""bye""#).unwrap();
        assert_eq!(reason.text(), "bye");
    }

    #[test]
    fn test_disconnect_reason_escapes_quotes() {
        let reason = DisconnectReason::new(r#"say "hi""#);
        let back = DisconnectReason::from_json(&reason.to_json().unwrap()).unwrap();
        assert_eq!(back, reason);
    }

    #[test]
    fn test_status_response_json_shape() {
        let status = StatusResponse {
            version: StatusVersion {
                name: "1.20.4".into(),
                protocol: 765,
            },
            players: StatusPlayers {
                max: 20,
                online: 3,
                sample: Vec::new(),
            },
            description: TextComponent::new("A Drawbridge server"),
        };
        let value: serde_json::Value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["version"]["protocol"], 765);
        assert_eq!(value["players"]["online"], 3);
        assert_eq!(value["description"]["text"], "A Drawbridge server");
    }
}
