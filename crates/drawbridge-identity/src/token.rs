//! Join token derivation.
//!
//! The token is the SHA-1 of the server id, the shared secret, and the
//! server's public key, printed as a signed big-endian integer in
//! hexadecimal. Both the client and this server compute it independently,
//! so the session service can match the two halves of the same login.

use sha1::{Digest, Sha1};

/// Computes the join token for one key exchange.
pub fn join_token(server_id: &str, shared_secret: &[u8], public_key_der: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(server_id.as_bytes());
    hasher.update(shared_secret);
    hasher.update(public_key_der);
    signed_hex_digest(hasher.finalize().into())
}

/// Formats a digest as a two's-complement signed hex number without
/// leading zeros.
pub fn signed_hex_digest(mut digest: [u8; 20]) -> String {
    let negative = digest[0] & 0x80 != 0;
    if negative {
        let mut carry = true;
        for byte in digest.iter_mut().rev() {
            *byte = !*byte;
            if carry {
                let (sum, overflow) = byte.overflowing_add(1);
                *byte = sum;
                carry = overflow;
            }
        }
    }

    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    let trimmed = match hex.trim_start_matches('0') {
        "" => "0",
        t => t,
    };
    if negative {
        format!("-{trimmed}")
    } else {
        trimmed.to_owned()
    }
}
