//! zlib helpers for the frame codec.

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;

use crate::ProtocolError;

/// Deflates `data` with the default compression level.
pub fn deflate(data: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(data.len() / 2), Compression::default());
    encoder.write_all(data).map_err(ProtocolError::Compression)?;
    encoder.finish().map_err(ProtocolError::Compression)
}

/// Inflates `data`, which must expand to exactly `expected` bytes.
///
/// Output is capped one byte past `expected`, so a stream that lies about
/// its size costs at most that much memory before it is rejected.
pub fn inflate(data: &[u8], expected: usize) -> Result<Vec<u8>, ProtocolError> {
    let mut out = Vec::with_capacity(expected);
    ZlibDecoder::new(data)
        .take(expected as u64 + 1)
        .read_to_end(&mut out)
        .map_err(ProtocolError::Compression)?;
    if out.len() != expected {
        return Err(ProtocolError::InflatedSizeMismatch {
            declared: expected,
            actual: out.len(),
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inflate_restores_deflated_bytes() {
        let data = b"abcabcabcabcabcabcabcabcabcabcabcabc".repeat(10);
        let packed = deflate(&data).unwrap();
        assert!(packed.len() < data.len());
        assert_eq!(inflate(&packed, data.len()).unwrap(), data);
    }

    #[test]
    fn test_inflate_declared_too_small_is_mismatch() {
        let data = vec![7u8; 500];
        let packed = deflate(&data).unwrap();
        let err = inflate(&packed, 100).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::InflatedSizeMismatch { declared: 100, actual: 101 }
        ));
    }

    #[test]
    fn test_inflate_declared_too_large_is_mismatch() {
        let data = vec![7u8; 500];
        let packed = deflate(&data).unwrap();
        let err = inflate(&packed, 600).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::InflatedSizeMismatch { declared: 600, actual: 500 }
        ));
    }

    #[test]
    fn test_inflate_garbage_is_compression_error() {
        let err = inflate(&[0xDE, 0xAD, 0xBE, 0xEF], 10).unwrap_err();
        assert!(matches!(err, ProtocolError::Compression(_)));
    }
}
