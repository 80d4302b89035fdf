//! Unified error type for Drawbridge.

use drawbridge_identity::VerificationError;
use drawbridge_protocol::ProtocolError;
use drawbridge_session::{CryptoError, SessionError};
use drawbridge_transport::TransportError;

/// Top-level error wrapping every crate-specific error.
///
/// The `#[from]` conversions let `?` lift sub-crate errors, so code using
/// the `drawbridge` crate only deals with this one type.
#[derive(Debug, thiserror::Error)]
pub enum DrawbridgeError {
    /// Binding, accepting, or talking to a connection failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A frame or packet could not be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A login failed.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The identity service refused or could not be reached.
    #[error(transparent)]
    Verification(#[from] VerificationError),

    /// The server key could not be created.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// The configuration could not be loaded or is invalid.
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
