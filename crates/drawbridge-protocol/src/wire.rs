//! Field-level reading and writing inside a packet payload.

use bytes::{BufMut, BytesMut};

use crate::{ProtocolError, varint};

/// Cursor over a packet payload.
pub struct PacketReader<'a> {
    buf: &'a [u8],
}

impl<'a> PacketReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    fn take(&mut self, n: usize, what: &'static str) -> Result<&'a [u8], ProtocolError> {
        if self.buf.len() < n {
            return Err(ProtocolError::Truncated(what));
        }
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    pub fn read_varint(&mut self, what: &'static str) -> Result<i32, ProtocolError> {
        match varint::peek(self.buf)? {
            Some((value, len)) => {
                self.buf = &self.buf[len..];
                Ok(value)
            }
            None => Err(ProtocolError::Truncated(what)),
        }
    }

    pub fn read_u8(&mut self, what: &'static str) -> Result<u8, ProtocolError> {
        Ok(self.take(1, what)?[0])
    }

    pub fn read_bool(&mut self, what: &'static str) -> Result<bool, ProtocolError> {
        match self.read_u8(what)? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(ProtocolError::InvalidValue(format!("{what}: boolean byte {other}"))),
        }
    }

    pub fn read_u16(&mut self, what: &'static str) -> Result<u16, ProtocolError> {
        let b = self.take(2, what)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn read_i64(&mut self, what: &'static str) -> Result<i64, ProtocolError> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.take(8, what)?);
        Ok(i64::from_be_bytes(raw))
    }

    pub fn read_u128(&mut self, what: &'static str) -> Result<u128, ProtocolError> {
        let mut raw = [0u8; 16];
        raw.copy_from_slice(self.take(16, what)?);
        Ok(u128::from_be_bytes(raw))
    }

    /// Reads a length-prefixed UTF-8 string of at most `max_chars`
    /// characters.
    pub fn read_string(
        &mut self,
        what: &'static str,
        max_chars: usize,
    ) -> Result<String, ProtocolError> {
        let len = self.read_length(what, max_chars * 4)?;
        let raw = self.take(len, what)?;
        let s = std::str::from_utf8(raw).map_err(|_| ProtocolError::InvalidUtf8(what))?;
        let chars = s.chars().count();
        if chars > max_chars {
            return Err(ProtocolError::FieldTooLong {
                field: what,
                len: chars,
                max: max_chars,
            });
        }
        Ok(s.to_owned())
    }

    /// Reads a length-prefixed byte array of at most `max` bytes.
    pub fn read_byte_array(
        &mut self,
        what: &'static str,
        max: usize,
    ) -> Result<Vec<u8>, ProtocolError> {
        let len = self.read_length(what, max)?;
        Ok(self.take(len, what)?.to_vec())
    }

    fn read_length(&mut self, what: &'static str, max: usize) -> Result<usize, ProtocolError> {
        let len = self.read_varint(what)?;
        let len = usize::try_from(len)
            .map_err(|_| ProtocolError::InvalidValue(format!("{what}: negative length {len}")))?;
        if len > max {
            return Err(ProtocolError::FieldTooLong {
                field: what,
                len,
                max,
            });
        }
        Ok(len)
    }
}

pub fn put_varint(buf: &mut BytesMut, value: i32) {
    varint::write(buf, value);
}

pub fn put_string(buf: &mut BytesMut, s: &str) {
    put_byte_array(buf, s.as_bytes());
}

pub fn put_byte_array(buf: &mut BytesMut, data: &[u8]) {
    varint::write(buf, data.len() as i32);
    buf.put_slice(data);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_string_within_limit_returns_value() {
        let mut buf = BytesMut::new();
        put_string(&mut buf, "Steve");
        let mut r = PacketReader::new(&buf);
        assert_eq!(r.read_string("name", 16).unwrap(), "Steve");
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn test_read_string_over_limit_is_error() {
        let mut buf = BytesMut::new();
        put_string(&mut buf, "seventeen_chars__");
        let mut r = PacketReader::new(&buf);
        let err = r.read_string("name", 16).unwrap_err();
        assert!(matches!(err, ProtocolError::FieldTooLong { field: "name", .. }));
    }

    #[test]
    fn test_read_string_counts_chars_not_bytes() {
        let mut buf = BytesMut::new();
        put_string(&mut buf, "ééé");
        let mut r = PacketReader::new(&buf);
        assert_eq!(r.read_string("s", 3).unwrap(), "ééé");
    }

    #[test]
    fn test_read_string_invalid_utf8_is_error() {
        let mut buf = BytesMut::new();
        put_byte_array(&mut buf, &[0xC3, 0x28]);
        let mut r = PacketReader::new(&buf);
        assert!(matches!(r.read_string("s", 8), Err(ProtocolError::InvalidUtf8("s"))));
    }

    #[test]
    fn test_read_byte_array_truncated_is_error() {
        let mut buf = BytesMut::new();
        put_varint(&mut buf, 10);
        buf.put_slice(&[1, 2, 3]);
        let mut r = PacketReader::new(&buf);
        assert!(matches!(r.read_byte_array("token", 64), Err(ProtocolError::Truncated("token"))));
    }

    #[test]
    fn test_read_fixed_width_fields_are_big_endian() {
        let raw = [0x63, 0xDD, 0, 0, 0, 0, 0, 0, 0x01, 0x02];
        let mut r = PacketReader::new(&raw);
        assert_eq!(r.read_u16("port").unwrap(), 25_565);
        assert_eq!(r.read_i64("payload").unwrap(), 0x0102);
    }
}
