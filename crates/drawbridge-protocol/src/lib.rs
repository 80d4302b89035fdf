//! Wire protocol for Drawbridge.
//!
//! This crate turns a raw byte stream into packet payloads and back, and
//! knows which packets are legal in which phase of a connection:
//!
//! - **Framing** ([`FrameCodec`]): varint length prefix, optional zlib
//!   compression above a threshold, optional AES/CFB8 cipher stage.
//! - **Phases** ([`Phase`]): the closed set of connection stages and the
//!   transition table between them.
//! - **Packets** ([`Serverbound`], [`Clientbound`], [`RawPacket`]): typed
//!   handshake, status and login packets; gameplay traffic stays raw.
//! - **Errors** ([`ProtocolError`], [`CipherError`]): every variant is
//!   fatal for the connection.
//!
//! ```text
//! Transport (bytes) → FrameCodec (payloads) → Serverbound (typed, per phase) → Session
//! ```

pub mod cipher;
mod codec;
pub mod compression;
mod error;
mod packets;
mod phase;
mod text;
pub mod varint;
pub mod wire;

pub use cipher::{CipherError, CipherStage};
pub use codec::{COMPRESSION_DISABLED, DEFAULT_MAX_FRAME_SIZE, FrameCodec};
pub use error::ProtocolError;
pub use packets::{
    Clientbound, EncryptionResponse, Handshake, LoginStart, NextState, Property, RawPacket,
    Serverbound,
};
pub use phase::Phase;
pub use text::{
    DisconnectReason, PlayerSample, StatusPlayers, StatusResponse, StatusVersion, TextComponent,
};
