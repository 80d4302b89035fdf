//! Error types for the protocol layer.
//!
//! Every variant is fatal for the connection that produced it. The two
//! predicates on [`ProtocolError`] sort them into framing failures (the
//! byte stream itself is broken) and sequencing failures (a well-formed
//! packet arrived in the wrong phase).

use crate::Phase;

/// Errors that can occur while framing or decoding packets.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// A varint ran past five bytes.
    #[error("varint is longer than 5 bytes")]
    VarIntTooLong,

    /// A frame declared a negative length.
    #[error("negative frame length {0}")]
    NegativeLength(i32),

    /// A frame (or its inflated payload) exceeds the configured ceiling.
    #[error("frame of {size} bytes exceeds the maximum of {max}")]
    FrameTooLarge {
        /// Declared or actual size in bytes.
        size: usize,
        /// Configured ceiling.
        max: usize,
    },

    /// A compressed frame declared an uncompressed size the sender should
    /// never have compressed.
    #[error("corrupt compression marker: declared {declared} bytes, threshold is {threshold}")]
    CompressionMarker {
        /// The size written in the frame.
        declared: i32,
        /// The threshold in force on this connection.
        threshold: i32,
    },

    /// Inflating a compressed frame produced a different size than it
    /// declared.
    #[error("inflated size {actual} does not match declared size {declared}")]
    InflatedSizeMismatch {
        /// The size written in the frame.
        declared: usize,
        /// Bytes actually produced (capped at `declared + 1`).
        actual: usize,
    },

    /// zlib rejected the stream.
    #[error("compression failed: {0}")]
    Compression(#[source] std::io::Error),

    /// A packet body ended before all of its fields were read.
    #[error("packet truncated while reading {0}")]
    Truncated(&'static str),

    /// A string or byte array is longer than the field allows.
    #[error("{field} is {len} long, maximum is {max}")]
    FieldTooLong {
        /// Name of the field.
        field: &'static str,
        /// Length found on the wire.
        len: usize,
        /// Maximum allowed.
        max: usize,
    },

    /// A string field is not valid UTF-8.
    #[error("{0} is not valid UTF-8")]
    InvalidUtf8(&'static str),

    /// A field holds a value outside its domain.
    #[error("invalid value: {0}")]
    InvalidValue(String),

    /// The packet id is not legal in the connection's current phase.
    #[error("packet 0x{id:02X} is not legal in phase {phase}")]
    IllegalPacket {
        /// Phase the connection was in.
        phase: Phase,
        /// Packet id received.
        id: i32,
    },

    /// A JSON payload could not be produced or parsed.
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error surfaced through a `tokio_util` codec.
    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// The byte stream itself is unusable: bad length, oversized frame,
    /// corrupt compression marker, or a packet body that does not parse.
    pub fn is_framing(&self) -> bool {
        !self.is_sequencing()
    }

    /// A well-formed packet arrived in a phase where it is not allowed.
    pub fn is_sequencing(&self) -> bool {
        matches!(self, Self::IllegalPacket { .. })
    }
}
