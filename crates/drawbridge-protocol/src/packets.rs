//! Typed packets for the phases this engine owns.
//!
//! Decoding always takes the connection's current [`Phase`]: the same
//! packet id means different things in different phases, and an id with
//! no meaning in the current phase is rejected as
//! [`ProtocolError::IllegalPacket`] before any field is read.

use bytes::{BufMut, Bytes, BytesMut};

use crate::text::DisconnectReason;
use crate::wire::{PacketReader, put_byte_array, put_string, put_varint};
use crate::{Phase, ProtocolError};

const MAX_ADDRESS_CHARS: usize = 255;
const MAX_NAME_CHARS: usize = 16;
const MAX_SERVER_ID_CHARS: usize = 20;
const MAX_PROPERTY_NAME_CHARS: usize = 64;
const MAX_PROPERTY_VALUE_CHARS: usize = 32_767;
const MAX_JSON_CHARS: usize = 262_144;
const MAX_CRYPTO_BYTES: usize = 1_024;

/// What the client wants after the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextState {
    Status,
    Login,
}

impl NextState {
    fn from_wire(value: i32) -> Result<Self, ProtocolError> {
        match value {
            1 => Ok(Self::Status),
            2 => Ok(Self::Login),
            other => Err(ProtocolError::InvalidValue(format!("handshake next state {other}"))),
        }
    }

    fn to_wire(self) -> i32 {
        match self {
            Self::Status => 1,
            Self::Login => 2,
        }
    }

    /// The phase this intent leads to.
    pub fn phase(self) -> Phase {
        match self {
            Self::Status => Phase::Status,
            Self::Login => Phase::Login,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub protocol_version: i32,
    pub server_address: String,
    pub server_port: u16,
    pub next_state: NextState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginStart {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionResponse {
    /// Shared secret, encrypted with the server's public key.
    pub shared_secret: Vec<u8>,
    /// The server's nonce, encrypted the same way.
    pub verify_token: Vec<u8>,
}

/// A signed profile property carried in the login success packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    pub name: String,
    pub value: String,
    pub signature: Option<String>,
}

// ---------------------------------------------------------------------------
// Serverbound
// ---------------------------------------------------------------------------

/// Packets sent by the client before gameplay begins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Serverbound {
    Handshake(Handshake),
    StatusRequest,
    StatusPing { payload: i64 },
    LoginStart(LoginStart),
    EncryptionResponse(EncryptionResponse),
}

impl Serverbound {
    pub const HANDSHAKE: i32 = 0x00;
    pub const STATUS_REQUEST: i32 = 0x00;
    pub const STATUS_PING: i32 = 0x01;
    pub const LOGIN_START: i32 = 0x00;
    pub const ENCRYPTION_RESPONSE: i32 = 0x01;

    /// Decodes one frame payload received in `phase`.
    pub fn decode(phase: Phase, payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = PacketReader::new(payload);
        let id = r.read_varint("packet id")?;

        let packet = match (phase, id) {
            (Phase::Handshake, Self::HANDSHAKE) => {
                let protocol_version = r.read_varint("protocol version")?;
                let server_address = r.read_string("server address", MAX_ADDRESS_CHARS)?;
                let server_port = r.read_u16("server port")?;
                let next_state = NextState::from_wire(r.read_varint("next state")?)?;
                Self::Handshake(Handshake {
                    protocol_version,
                    server_address,
                    server_port,
                    next_state,
                })
            }
            (Phase::Status, Self::STATUS_REQUEST) => Self::StatusRequest,
            (Phase::Status, Self::STATUS_PING) => Self::StatusPing {
                payload: r.read_i64("ping payload")?,
            },
            (Phase::Login, Self::LOGIN_START) => {
                let name = r.read_string("name", MAX_NAME_CHARS)?;
                // Newer clients append a profile id; only the name matters here.
                return Ok(Self::LoginStart(LoginStart { name }));
            }
            (Phase::KeyExchange, Self::ENCRYPTION_RESPONSE) => {
                Self::EncryptionResponse(EncryptionResponse {
                    shared_secret: r.read_byte_array("shared secret", MAX_CRYPTO_BYTES)?,
                    verify_token: r.read_byte_array("verify token", MAX_CRYPTO_BYTES)?,
                })
            }
            _ => return Err(ProtocolError::IllegalPacket { phase, id }),
        };

        if r.remaining() > 0 {
            return Err(ProtocolError::InvalidValue(format!(
                "{} trailing bytes after packet 0x{id:02X}",
                r.remaining()
            )));
        }
        Ok(packet)
    }

    pub fn id(&self) -> i32 {
        match self {
            Self::Handshake(_) => Self::HANDSHAKE,
            Self::StatusRequest => Self::STATUS_REQUEST,
            Self::StatusPing { .. } => Self::STATUS_PING,
            Self::LoginStart(_) => Self::LOGIN_START,
            Self::EncryptionResponse(_) => Self::ENCRYPTION_RESPONSE,
        }
    }

    /// Encodes the packet as a frame payload. Used by clients and tests.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        put_varint(&mut buf, self.id());
        match self {
            Self::Handshake(h) => {
                put_varint(&mut buf, h.protocol_version);
                put_string(&mut buf, &h.server_address);
                buf.put_u16(h.server_port);
                put_varint(&mut buf, h.next_state.to_wire());
            }
            Self::StatusRequest => {}
            Self::StatusPing { payload } => buf.put_i64(*payload),
            Self::LoginStart(l) => put_string(&mut buf, &l.name),
            Self::EncryptionResponse(e) => {
                put_byte_array(&mut buf, &e.shared_secret);
                put_byte_array(&mut buf, &e.verify_token);
            }
        }
        buf.freeze()
    }
}

// ---------------------------------------------------------------------------
// Clientbound
// ---------------------------------------------------------------------------

/// Packets sent by the server before gameplay begins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Clientbound {
    StatusResponse {
        json: String,
    },
    Pong {
        payload: i64,
    },
    LoginDisconnect {
        reason: DisconnectReason,
    },
    EncryptionRequest {
        server_id: String,
        /// DER-encoded SubjectPublicKeyInfo.
        public_key: Vec<u8>,
        verify_token: Vec<u8>,
    },
    LoginSuccess {
        uuid: u128,
        name: String,
        properties: Vec<Property>,
    },
    SetCompression {
        threshold: i32,
    },
}

impl Clientbound {
    pub const STATUS_RESPONSE: i32 = 0x00;
    pub const PONG: i32 = 0x01;
    pub const LOGIN_DISCONNECT: i32 = 0x00;
    pub const ENCRYPTION_REQUEST: i32 = 0x01;
    pub const LOGIN_SUCCESS: i32 = 0x02;
    pub const SET_COMPRESSION: i32 = 0x03;

    pub fn id(&self) -> i32 {
        match self {
            Self::StatusResponse { .. } => Self::STATUS_RESPONSE,
            Self::Pong { .. } => Self::PONG,
            Self::LoginDisconnect { .. } => Self::LOGIN_DISCONNECT,
            Self::EncryptionRequest { .. } => Self::ENCRYPTION_REQUEST,
            Self::LoginSuccess { .. } => Self::LOGIN_SUCCESS,
            Self::SetCompression { .. } => Self::SET_COMPRESSION,
        }
    }

    /// Encodes the packet as a frame payload.
    pub fn encode(&self) -> Result<Bytes, ProtocolError> {
        let mut buf = BytesMut::new();
        put_varint(&mut buf, self.id());
        match self {
            Self::StatusResponse { json } => put_string(&mut buf, json),
            Self::Pong { payload } => buf.put_i64(*payload),
            Self::LoginDisconnect { reason } => put_string(&mut buf, &reason.to_json()?),
            Self::EncryptionRequest {
                server_id,
                public_key,
                verify_token,
            } => {
                put_string(&mut buf, server_id);
                put_byte_array(&mut buf, public_key);
                put_byte_array(&mut buf, verify_token);
            }
            Self::LoginSuccess {
                uuid,
                name,
                properties,
            } => {
                buf.put_u128(*uuid);
                put_string(&mut buf, name);
                put_varint(&mut buf, properties.len() as i32);
                for p in properties {
                    put_string(&mut buf, &p.name);
                    put_string(&mut buf, &p.value);
                    match &p.signature {
                        Some(sig) => {
                            buf.put_u8(1);
                            put_string(&mut buf, sig);
                        }
                        None => buf.put_u8(0),
                    }
                }
            }
            Self::SetCompression { threshold } => put_varint(&mut buf, *threshold),
        }
        Ok(buf.freeze())
    }

    /// Decodes a payload the client side received while in `phase`.
    pub fn decode(phase: Phase, payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = PacketReader::new(payload);
        let id = r.read_varint("packet id")?;
        let login = phase.accepts_login_disconnect();

        let packet = match id {
            Self::STATUS_RESPONSE if phase == Phase::Status => Self::StatusResponse {
                json: r.read_string("status json", MAX_JSON_CHARS)?,
            },
            Self::PONG if phase == Phase::Status => Self::Pong {
                payload: r.read_i64("pong payload")?,
            },
            Self::LOGIN_DISCONNECT if login => Self::LoginDisconnect {
                reason: DisconnectReason::from_json(
                    &r.read_string("disconnect reason", MAX_JSON_CHARS)?,
                )?,
            },
            Self::ENCRYPTION_REQUEST if login => Self::EncryptionRequest {
                server_id: r.read_string("server id", MAX_SERVER_ID_CHARS)?,
                public_key: r.read_byte_array("public key", MAX_CRYPTO_BYTES)?,
                verify_token: r.read_byte_array("verify token", MAX_CRYPTO_BYTES)?,
            },
            Self::LOGIN_SUCCESS if login => {
                let uuid = r.read_u128("uuid")?;
                let name = r.read_string("name", MAX_NAME_CHARS)?;
                let count = r.read_varint("property count")?;
                let count = usize::try_from(count).map_err(|_| {
                    ProtocolError::InvalidValue(format!("property count {count}"))
                })?;
                let mut properties = Vec::with_capacity(count.min(16));
                for _ in 0..count {
                    let name = r.read_string("property name", MAX_PROPERTY_NAME_CHARS)?;
                    let value = r.read_string("property value", MAX_PROPERTY_VALUE_CHARS)?;
                    let signature = if r.read_bool("has signature")? {
                        Some(r.read_string("property signature", MAX_PROPERTY_VALUE_CHARS)?)
                    } else {
                        None
                    };
                    properties.push(Property {
                        name,
                        value,
                        signature,
                    });
                }
                Self::LoginSuccess {
                    uuid,
                    name,
                    properties,
                }
            }
            Self::SET_COMPRESSION if login => Self::SetCompression {
                threshold: r.read_varint("threshold")?,
            },
            _ => return Err(ProtocolError::IllegalPacket { phase, id }),
        };

        if r.remaining() > 0 {
            return Err(ProtocolError::InvalidValue(format!(
                "{} trailing bytes after packet 0x{id:02X}",
                r.remaining()
            )));
        }
        Ok(packet)
    }
}

// ---------------------------------------------------------------------------
// RawPacket
// ---------------------------------------------------------------------------

/// A packet whose body this engine does not interpret.
///
/// Gameplay traffic is passed through in this form: the id is split off
/// and the rest is left to whoever owns the connection's packet dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPacket {
    pub id: i32,
    pub body: Bytes,
}

impl RawPacket {
    pub fn new(id: i32, body: impl Into<Bytes>) -> Self {
        Self {
            id,
            body: body.into(),
        }
    }

    /// Splits a decoded frame payload into id and body.
    pub fn parse(mut payload: BytesMut) -> Result<Self, ProtocolError> {
        let (id, len) = crate::varint::peek(&payload)?
            .ok_or(ProtocolError::Truncated("packet id"))?;
        let body = payload.split_off(len).freeze();
        Ok(Self { id, body })
    }

    /// The frame payload: id followed by body.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.body.len() + 5);
        put_varint(&mut buf, self.id);
        buf.put_slice(&self.body);
        buf.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // -- Helpers ----------------------------------------------------------

    fn handshake(next_state: NextState) -> Serverbound {
        Serverbound::Handshake(Handshake {
            protocol_version: 765,
            server_address: "play.example.net".into(),
            server_port: 25565,
            next_state,
        })
    }

    // =====================================================================
    // Serverbound
    // =====================================================================

    #[test]
    fn test_decode_handshake_in_handshake_phase() {
        let bytes = handshake(NextState::Login).encode();
        let decoded = Serverbound::decode(Phase::Handshake, &bytes).unwrap();
        assert_eq!(decoded, handshake(NextState::Login));
    }

    #[test]
    fn test_decode_handshake_bad_next_state_is_invalid() {
        let mut buf = BytesMut::new();
        put_varint(&mut buf, 0x00);
        put_varint(&mut buf, 765);
        put_string(&mut buf, "host");
        buf.put_u16(25565);
        put_varint(&mut buf, 3);
        assert!(matches!(
            Serverbound::decode(Phase::Handshake, &buf),
            Err(ProtocolError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_decode_play_packet_in_handshake_is_illegal() {
        let raw = RawPacket::new(0x12, vec![1, 2, 3]).encode();
        assert!(matches!(
            Serverbound::decode(Phase::Handshake, &raw),
            Err(ProtocolError::IllegalPacket { phase: Phase::Handshake, id: 0x12 })
        ));
    }

    #[test]
    fn test_decode_login_start_outside_login_is_rejected() {
        // Same id as the status request, but a string body: the phase
        // decides, not the id.
        let bytes = Serverbound::LoginStart(LoginStart { name: "Alex".into() }).encode();
        assert!(matches!(
            Serverbound::decode(Phase::Status, &bytes),
            Err(ProtocolError::InvalidValue(_))
        ));
        let bytes = Serverbound::EncryptionResponse(EncryptionResponse {
            shared_secret: vec![1],
            verify_token: vec![2],
        })
        .encode();
        assert!(matches!(
            Serverbound::decode(Phase::Login, &bytes),
            Err(ProtocolError::IllegalPacket { phase: Phase::Login, id: 0x01 })
        ));
    }

    #[test]
    fn test_decode_anything_in_authenticating_is_illegal() {
        for id in 0..4 {
            let raw = RawPacket::new(id, Vec::new()).encode();
            assert!(matches!(
                Serverbound::decode(Phase::Authenticating, &raw),
                Err(ProtocolError::IllegalPacket { .. })
            ));
        }
    }

    #[test]
    fn test_decode_login_start_ignores_trailing_profile_id() {
        let mut buf = BytesMut::from(
            &Serverbound::LoginStart(LoginStart { name: "Alex".into() }).encode()[..],
        );
        buf.put_u128(0xDEAD_BEEF);
        let decoded = Serverbound::decode(Phase::Login, &buf).unwrap();
        assert_eq!(decoded, Serverbound::LoginStart(LoginStart { name: "Alex".into() }));
    }

    #[test]
    fn test_decode_status_ping_round_trip() {
        let bytes = Serverbound::StatusPing { payload: -42 }.encode();
        assert_eq!(
            Serverbound::decode(Phase::Status, &bytes).unwrap(),
            Serverbound::StatusPing { payload: -42 }
        );
    }

    // =====================================================================
    // Clientbound
    // =====================================================================

    #[test]
    fn test_encode_login_success_with_signed_property() {
        let packet = Clientbound::LoginSuccess {
            uuid: 0x0123_4567_89AB_CDEF_0123_4567_89AB_CDEF,
            name: "Notch".into(),
            properties: vec![Property {
                name: "textures".into(),
                value: "e30=".into(),
                signature: Some("c2ln".into()),
            }],
        };
        let bytes = packet.encode().unwrap();
        assert_eq!(bytes[0], 0x02);
        assert_eq!(Clientbound::decode(Phase::Login, &bytes).unwrap(), packet);
    }

    #[test]
    fn test_encode_login_disconnect_carries_json_reason() {
        let packet = Clientbound::LoginDisconnect {
            reason: DisconnectReason::new("Invalid username"),
        };
        let bytes = packet.encode().unwrap();
        let mut r = PacketReader::new(&bytes);
        assert_eq!(r.read_varint("id").unwrap(), 0x00);
        assert_eq!(
            r.read_string("json", 256).unwrap(),
            r#"{"text":"Invalid username"}"#
        );
    }

    #[test]
    fn test_decode_clientbound_status_ids_rejected_in_login() {
        let bytes = Clientbound::Pong { payload: 1 }.encode().unwrap();
        // 0x01 in LOGIN is an encryption request, whose body this is not.
        assert!(Clientbound::decode(Phase::Login, &bytes).is_err());
        assert!(matches!(
            Clientbound::decode(Phase::Play, &bytes),
            Err(ProtocolError::IllegalPacket { .. })
        ));
    }

    #[test]
    fn test_decode_clientbound_trailing_bytes_rejected() {
        let mut bytes = Clientbound::SetCompression { threshold: 256 }
            .encode()
            .unwrap()
            .to_vec();
        bytes.push(0);
        assert!(matches!(
            Clientbound::decode(Phase::Login, &bytes),
            Err(ProtocolError::InvalidValue(_))
        ));
    }

    // =====================================================================
    // RawPacket
    // =====================================================================

    #[test]
    fn test_raw_packet_parse_splits_id_and_body() {
        let encoded = RawPacket::new(300, vec![9, 8, 7]).encode();
        let parsed = RawPacket::parse(BytesMut::from(&encoded[..])).unwrap();
        assert_eq!(parsed.id, 300);
        assert_eq!(&parsed.body[..], &[9, 8, 7]);
    }

    #[test]
    fn test_raw_packet_parse_empty_is_truncated() {
        assert!(matches!(
            RawPacket::parse(BytesMut::new()),
            Err(ProtocolError::Truncated("packet id"))
        ));
    }
}
