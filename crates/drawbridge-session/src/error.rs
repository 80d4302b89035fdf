//! Session error types.

use drawbridge_identity::VerificationError;
use drawbridge_protocol::{CipherError, DisconnectReason, Phase, ProtocolError};
use drawbridge_transport::TransportError;

use crate::crypto::CryptoError;

/// Everything that can end a login.
///
/// Each variant maps to a player-facing [`DisconnectReason`] through
/// [`SessionError::disconnect_reason`] and to an [`ErrorClass`] that
/// decides how loudly it is logged.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Malformed frame or packet, or a packet illegal in the current phase.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The symmetric cipher could not be installed.
    #[error("cipher setup failed: {0}")]
    Cipher(#[from] CipherError),

    /// The asymmetric key exchange failed.
    #[error("key exchange failed: {0}")]
    Crypto(#[from] CryptoError),

    /// The identity service refused or could not confirm the player.
    #[error("verification failed: {0}")]
    Verification(#[from] VerificationError),

    /// A login handshake announced a protocol version we do not speak.
    #[error("client protocol {client} does not match server protocol {server}")]
    VersionMismatch {
        client: i32,
        server: i32,
        version_name: String,
    },

    /// The claimed name is empty, too long, or uses disallowed characters.
    #[error("invalid username {0:?}")]
    InvalidName(String),

    /// The state machine was asked to make a move it does not allow.
    #[error("illegal transition {from} -> {to}")]
    IllegalTransition { from: Phase, to: Phase },

    /// An operation that needs a specific phase was called in another.
    #[error("expected phase {expected}, session is in {actual}")]
    WrongPhase { expected: Phase, actual: Phase },

    /// A second identity was offered to a session that already has one.
    #[error("identity already assigned")]
    IdentityAlreadyAssigned,

    /// The login did not finish in time.
    #[error("login timed out after {ticks} ticks")]
    TimedOut { ticks: u64 },

    /// The underlying connection failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Coarse grouping of [`SessionError`] used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Framing,
    Crypto,
    Sequencing,
    Verification,
    Rejected,
    Timeout,
    Transport,
}

impl SessionError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Protocol(e) if e.is_sequencing() => ErrorClass::Sequencing,
            Self::Protocol(_) => ErrorClass::Framing,
            Self::Cipher(_) | Self::Crypto(_) => ErrorClass::Crypto,
            Self::Verification(_) => ErrorClass::Verification,
            Self::VersionMismatch { .. } | Self::InvalidName(_) => ErrorClass::Rejected,
            Self::IllegalTransition { .. }
            | Self::WrongPhase { .. }
            | Self::IdentityAlreadyAssigned => ErrorClass::Sequencing,
            Self::TimedOut { .. } => ErrorClass::Timeout,
            Self::Transport(_) => ErrorClass::Transport,
        }
    }

    /// The text the player sees when this error ends their login.
    pub fn disconnect_reason(&self) -> DisconnectReason {
        let text = match self {
            Self::Protocol(e) if e.is_sequencing() => "Unexpected packet".to_string(),
            Self::Protocol(_) => "Malformed packet stream".to_string(),
            Self::Cipher(_) | Self::Crypto(_) => "Encryption handshake failed".to_string(),
            Self::Verification(e) => e.user_message().to_string(),
            Self::VersionMismatch {
                client,
                server,
                version_name,
            } => {
                if client < server {
                    format!("Outdated client! Please use {version_name}")
                } else {
                    format!("Outdated server! I'm still on {version_name}")
                }
            }
            Self::InvalidName(_) => "Invalid username".to_string(),
            Self::IllegalTransition { .. }
            | Self::WrongPhase { .. }
            | Self::IdentityAlreadyAssigned => "Unexpected packet".to_string(),
            Self::TimedOut { .. } => "Took too long to log in".to_string(),
            Self::Transport(_) => "Connection lost".to_string(),
        };
        DisconnectReason::new(text)
    }
}
