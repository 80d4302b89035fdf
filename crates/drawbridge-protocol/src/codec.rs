//! Length-prefixed frame codec with optional zlib compression and an
//! optional cipher stage.
//!
//! ```text
//! uncompressed:  VarInt(len) ++ payload
//! compressed:    VarInt(len) ++ VarInt(data_len) ++ (zlib(payload) | payload)
//!                                 data_len == 0 means "sent raw"
//! ```
//!
//! With a cipher installed every byte of the above is encrypted on the
//! way out and decrypted on the way in. The codec is synchronous and owns
//! no I/O; it only mutates the buffers it is handed.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::cipher::{CipherError, CipherStage};
use crate::{ProtocolError, compression, varint};

/// Default ceiling on a frame's declared length (8 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 8 * 1024 * 1024;

/// Compression threshold value meaning "compression off".
pub const COMPRESSION_DISABLED: i32 = -1;

/// Worst-case growth of a compressed body over `len` payload bytes: the
/// zlib bound for incompressible input plus the data-length VarInt.
fn compressed_overhead(len: usize) -> usize {
    (len >> 12) + (len >> 14) + (len >> 25) + 13 + varint::MAX_VARINT_LEN
}

/// Frame codec for one connection.
///
/// One instance handles both directions. Compression and encryption are
/// switched on mid-stream by the login sequence and never switched off.
#[derive(Debug)]
pub struct FrameCodec {
    threshold: i32,
    max_frame_size: usize,
    cipher: Option<CipherStage>,
    /// Bytes at the front of the inbound buffer already decrypted.
    decrypted: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_SIZE)
    }
}

impl FrameCodec {
    /// A codec with compression and encryption off.
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            threshold: COMPRESSION_DISABLED,
            max_frame_size,
            cipher: None,
            decrypted: 0,
        }
    }

    /// Switches to the compressed frame layout. Negative values turn
    /// compression off again only if it was never on.
    pub fn enable_compression(&mut self, threshold: i32) {
        self.threshold = threshold.max(COMPRESSION_DISABLED);
    }

    /// Installs the cipher stage.
    ///
    /// Any inbound bytes already buffered but not yet framed are treated as
    /// ciphertext from here on.
    pub fn enable_encryption(&mut self, key: &[u8]) -> Result<(), CipherError> {
        if self.cipher.is_some() {
            return Err(CipherError::AlreadyInstalled);
        }
        self.cipher = Some(CipherStage::new(key)?);
        self.decrypted = 0;
        Ok(())
    }

    pub fn compression_threshold(&self) -> i32 {
        self.threshold
    }

    pub fn is_compressed(&self) -> bool {
        self.threshold >= 0
    }

    pub fn is_encrypted(&self) -> bool {
        self.cipher.is_some()
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Ceiling on a frame's length on the wire.
    ///
    /// `max_frame_size` bounds the payload. Once compression is on, the
    /// body may exceed it by the deflate overhead of a maximum-size
    /// payload that did not shrink.
    pub fn max_body_len(&self) -> usize {
        if self.threshold < 0 {
            self.max_frame_size
        } else {
            self.max_frame_size + compressed_overhead(self.max_frame_size)
        }
    }

    fn unwrap_body(&self, mut body: BytesMut) -> Result<BytesMut, ProtocolError> {
        if self.threshold < 0 {
            return Ok(body);
        }
        let (declared, header) = varint::peek(&body)?
            .ok_or(ProtocolError::Truncated("compression header"))?;
        body.advance(header);

        if declared == 0 {
            return Ok(body);
        }
        if declared < self.threshold {
            return Err(ProtocolError::CompressionMarker {
                declared,
                threshold: self.threshold,
            });
        }
        let declared = usize::try_from(declared).map_err(|_| ProtocolError::CompressionMarker {
            declared,
            threshold: self.threshold,
        })?;
        if declared > self.max_frame_size {
            return Err(ProtocolError::FrameTooLarge {
                size: declared,
                max: self.max_frame_size,
            });
        }
        let inflated = compression::inflate(&body, declared)?;
        Ok(BytesMut::from(&inflated[..]))
    }
}

impl Decoder for FrameCodec {
    type Item = BytesMut;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<BytesMut>, ProtocolError> {
        if let Some(cipher) = self.cipher.as_mut() {
            if src.len() > self.decrypted {
                cipher.decrypt(&mut src[self.decrypted..]);
                self.decrypted = src.len();
            }
        }

        let Some((len, header)) = varint::peek(src)? else {
            return Ok(None);
        };
        let len = usize::try_from(len).map_err(|_| ProtocolError::NegativeLength(len))?;
        if len > self.max_body_len() {
            return Err(ProtocolError::FrameTooLarge {
                size: len,
                max: self.max_body_len(),
            });
        }
        if src.len() < header + len {
            src.reserve(header + len - src.len());
            return Ok(None);
        }

        src.advance(header);
        let body = src.split_to(len);
        if self.cipher.is_some() {
            self.decrypted -= header + len;
        }
        self.unwrap_body(body).map(Some)
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, payload: Bytes, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        if payload.len() > self.max_frame_size {
            return Err(ProtocolError::FrameTooLarge {
                size: payload.len(),
                max: self.max_frame_size,
            });
        }
        let start = dst.len();

        if self.threshold < 0 {
            varint::write(dst, payload.len() as i32);
            dst.put_slice(&payload);
        } else if !payload.is_empty() && payload.len() >= self.threshold as usize {
            let packed = compression::deflate(&payload)?;
            let marker = payload.len() as i32;
            let body_len = varint::encoded_len(marker) + packed.len();
            if body_len > self.max_body_len() {
                return Err(ProtocolError::FrameTooLarge {
                    size: body_len,
                    max: self.max_body_len(),
                });
            }
            varint::write(dst, body_len as i32);
            varint::write(dst, marker);
            dst.put_slice(&packed);
        } else {
            varint::write(dst, (payload.len() + 1) as i32);
            dst.put_u8(0);
            dst.put_slice(&payload);
        }

        if let Some(cipher) = self.cipher.as_mut() {
            cipher.encrypt(&mut dst[start..]);
        }
        Ok(())
    }
}
