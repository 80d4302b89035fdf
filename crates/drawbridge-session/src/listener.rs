//! The seam between the login engine and gameplay.

use bytes::{Bytes, BytesMut};
use tokio_util::codec::Encoder;

use drawbridge_protocol::{DisconnectReason, FrameCodec, ProtocolError, RawPacket};

/// Receives a promoted session's packets once it reaches play.
///
/// Callbacks run with the session locked. Queue replies through the
/// provided [`PlayOutbound`]; calling back into the owning session from
/// inside a callback would deadlock.
pub trait PlayListener: Send + 'static {
    /// A packet arrived in play, already decrypted and decompressed.
    fn on_packet(&mut self, packet: RawPacket, out: &mut PlayOutbound<'_>);

    /// The session is closing. This is the last callback; anything queued
    /// on `out` is still written before the transport closes.
    fn on_close(&mut self, reason: &DisconnectReason, out: &mut PlayOutbound<'_>) {
        let _ = (reason, out);
    }
}

/// Write access to a session's outbound stream during a listener callback.
pub struct PlayOutbound<'a> {
    codec: &'a mut FrameCodec,
    buffer: &'a mut BytesMut,
    closing: bool,
    disconnect: Option<DisconnectReason>,
}

impl<'a> PlayOutbound<'a> {
    pub(crate) fn new(codec: &'a mut FrameCodec, buffer: &'a mut BytesMut, closing: bool) -> Self {
        Self {
            codec,
            buffer,
            closing,
            disconnect: None,
        }
    }

    /// Frames and queues a packet.
    pub fn send(&mut self, packet: &RawPacket) -> Result<(), ProtocolError> {
        self.send_payload(packet.encode())
    }

    /// Frames and queues an already-encoded payload (id followed by body).
    pub fn send_payload(&mut self, payload: Bytes) -> Result<(), ProtocolError> {
        self.codec.encode(payload, self.buffer)
    }

    /// Asks the engine to close the session once the callback returns.
    /// Only the first request counts. Ignored inside `on_close`.
    pub fn disconnect(&mut self, reason: impl Into<DisconnectReason>) {
        if !self.closing && self.disconnect.is_none() {
            self.disconnect = Some(reason.into());
        }
    }

    pub fn is_closing(&self) -> bool {
        self.closing
    }

    pub(crate) fn take_disconnect(&mut self) -> Option<DisconnectReason> {
        self.disconnect.take()
    }
}
