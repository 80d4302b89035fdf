//! Variable-length integers: 7 bits per byte, low groups first, high bit
//! set on every byte except the last.

use bytes::BufMut;

use crate::ProtocolError;

/// Longest encoding of a 32-bit value.
pub const MAX_VARINT_LEN: usize = 5;

/// Reads a varint from the front of `buf`.
///
/// Returns `Ok(None)` if `buf` ends before the varint does, and the value
/// together with the number of bytes it occupied otherwise.
pub fn peek(buf: &[u8]) -> Result<Option<(i32, usize)>, ProtocolError> {
    let mut value: u32 = 0;
    for (i, &byte) in buf.iter().enumerate() {
        if i == MAX_VARINT_LEN {
            return Err(ProtocolError::VarIntTooLong);
        }
        value |= u32::from(byte & 0x7F) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(Some((value as i32, i + 1)));
        }
    }
    if buf.len() >= MAX_VARINT_LEN {
        return Err(ProtocolError::VarIntTooLong);
    }
    Ok(None)
}

/// Appends `value` to `buf`.
pub fn write(buf: &mut impl BufMut, value: i32) {
    let mut v = value as u32;
    loop {
        if v & !0x7F == 0 {
            buf.put_u8(v as u8);
            return;
        }
        buf.put_u8((v & 0x7F) as u8 | 0x80);
        v >>= 7;
    }
}

/// Number of bytes [`write`] would emit for `value`.
pub fn encoded_len(value: i32) -> usize {
    let v = value as u32;
    match v {
        0..=0x7F => 1,
        0x80..=0x3FFF => 2,
        0x4000..=0x1F_FFFF => 3,
        0x20_0000..=0x0FFF_FFFF => 4,
        _ => 5,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(value: i32) -> Vec<u8> {
        let mut out = Vec::new();
        write(&mut out, value);
        out
    }

    #[test]
    fn test_write_known_values_match_wire_format() {
        assert_eq!(encode(0), [0x00]);
        assert_eq!(encode(1), [0x01]);
        assert_eq!(encode(127), [0x7F]);
        assert_eq!(encode(128), [0x80, 0x01]);
        assert_eq!(encode(255), [0xFF, 0x01]);
        assert_eq!(encode(25_565), [0xDD, 0xC7, 0x01]);
        assert_eq!(encode(2_097_151), [0xFF, 0xFF, 0x7F]);
        assert_eq!(encode(i32::MAX), [0xFF, 0xFF, 0xFF, 0xFF, 0x07]);
        assert_eq!(encode(-1), [0xFF, 0xFF, 0xFF, 0xFF, 0x0F]);
    }

    #[test]
    fn test_peek_reads_value_and_length() {
        assert_eq!(peek(&[0xDD, 0xC7, 0x01, 0x42]).unwrap(), Some((25_565, 3)));
        assert_eq!(peek(&[0xFF, 0xFF, 0xFF, 0xFF, 0x0F]).unwrap(), Some((-1, 5)));
    }

    #[test]
    fn test_peek_partial_returns_none() {
        assert_eq!(peek(&[]).unwrap(), None);
        assert_eq!(peek(&[0x80]).unwrap(), None);
        assert_eq!(peek(&[0xFF, 0xFF]).unwrap(), None);
    }

    #[test]
    fn test_peek_six_byte_varint_is_error() {
        let err = peek(&[0x80, 0x80, 0x80, 0x80, 0x80, 0x01]).unwrap_err();
        assert!(matches!(err, ProtocolError::VarIntTooLong));
    }

    #[test]
    fn test_peek_five_continuation_bytes_is_error() {
        let err = peek(&[0x80, 0x80, 0x80, 0x80, 0x80]).unwrap_err();
        assert!(matches!(err, ProtocolError::VarIntTooLong));
    }

    #[test]
    fn test_encoded_len_matches_write() {
        for v in [0, 1, 127, 128, 16_383, 16_384, 2_097_152, i32::MAX, -1] {
            assert_eq!(encoded_len(v), encode(v).len(), "value {v}");
        }
    }
}
