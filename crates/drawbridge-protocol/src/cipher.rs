//! AES-128/CFB8 stream cipher stage.
//!
//! Both directions are keyed with the shared secret as key and IV but keep
//! independent state, so the inbound and outbound streams advance
//! separately.

use aes::Aes128;
use cfb8::cipher::generic_array::GenericArray;
use cfb8::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};

/// Length of the shared secret in bytes.
pub const KEY_LEN: usize = 16;

/// Errors raised when installing the cipher.
#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    /// The shared secret is not a 16-byte AES-128 key.
    #[error("bad key material: expected {KEY_LEN} bytes, got {0}")]
    InvalidKeyLength(usize),

    /// A cipher is already in place. There is no re-key or downgrade.
    #[error("cipher already installed")]
    AlreadyInstalled,
}

/// Paired encryptor and decryptor for one connection.
pub struct CipherStage {
    encryptor: cfb8::Encryptor<Aes128>,
    decryptor: cfb8::Decryptor<Aes128>,
}

impl CipherStage {
    /// Builds both directions from the shared secret.
    pub fn new(key: &[u8]) -> Result<Self, CipherError> {
        if key.len() != KEY_LEN {
            return Err(CipherError::InvalidKeyLength(key.len()));
        }
        let encryptor = cfb8::Encryptor::<Aes128>::new_from_slices(key, key)
            .map_err(|_| CipherError::InvalidKeyLength(key.len()))?;
        let decryptor = cfb8::Decryptor::<Aes128>::new_from_slices(key, key)
            .map_err(|_| CipherError::InvalidKeyLength(key.len()))?;
        Ok(Self {
            encryptor,
            decryptor,
        })
    }

    /// Encrypts outbound bytes in place.
    pub fn encrypt(&mut self, data: &mut [u8]) {
        for byte in data {
            self.encryptor
                .encrypt_block_mut(GenericArray::from_mut_slice(std::slice::from_mut(byte)));
        }
    }

    /// Decrypts inbound bytes in place.
    pub fn decrypt(&mut self, data: &mut [u8]) {
        for byte in data {
            self.decryptor
                .decrypt_block_mut(GenericArray::from_mut_slice(std::slice::from_mut(byte)));
        }
    }
}

impl std::fmt::Debug for CipherStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CipherStage(aes-128-cfb8)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 16] = *b"0123456789abcdef";

    #[test]
    fn test_new_wrong_key_length_is_rejected() {
        assert!(matches!(
            CipherStage::new(&[0u8; 15]),
            Err(CipherError::InvalidKeyLength(15))
        ));
        assert!(matches!(
            CipherStage::new(&[0u8; 32]),
            Err(CipherError::InvalidKeyLength(32))
        ));
    }

    #[test]
    fn test_decrypt_reverses_encrypt_across_chunk_boundaries() {
        let mut sender = CipherStage::new(&KEY).unwrap();
        let mut receiver = CipherStage::new(&KEY).unwrap();
        let plain = b"the quick brown fox jumps over the lazy dog".to_vec();

        let mut wire = plain.clone();
        sender.encrypt(&mut wire[..10]);
        sender.encrypt(&mut wire[10..]);
        assert_ne!(wire, plain);

        // Receiver sees different chunking than the sender produced.
        receiver.decrypt(&mut wire[..3]);
        receiver.decrypt(&mut wire[3..]);
        assert_eq!(wire, plain);
    }

    #[test]
    fn test_directions_have_independent_state() {
        let mut stage = CipherStage::new(&KEY).unwrap();
        let mut a = *b"same";
        let mut b = *b"same";
        stage.encrypt(&mut a);
        let mut fresh = CipherStage::new(&KEY).unwrap();
        fresh.decrypt(&mut [0u8; 7]);
        fresh.encrypt(&mut b);
        assert_eq!(a, b);
    }
}
