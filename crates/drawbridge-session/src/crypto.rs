//! The server's RSA key for the login key exchange.

use std::fmt;

use rsa::pkcs8::EncodePublicKey;
use rsa::rand_core::OsRng;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};

/// Failures in the asymmetric half of the key exchange.
///
/// All of these end the connection and are logged as a possible attack.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// A value the client encrypted with our public key did not decrypt.
    #[error("could not decrypt client value")]
    Decrypt,

    /// The echoed nonce differs from the one we issued.
    #[error("verify token mismatch")]
    NonceMismatch,

    /// A key-exchange reply arrived with no nonce outstanding.
    #[error("no verify token outstanding")]
    MissingNonce,

    /// Key pair generation failed.
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    /// The public key could not be DER-encoded.
    #[error("public key encoding failed: {0}")]
    KeyEncoding(String),
}

/// RSA key pair plus the DER form of its public half, which is sent to
/// every client and hashed into every join token.
pub struct ServerKey {
    private: RsaPrivateKey,
    public: RsaPublicKey,
    public_der: Vec<u8>,
}

impl ServerKey {
    /// Generates a fresh key pair.
    pub fn generate(bits: usize) -> Result<Self, CryptoError> {
        let private = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
        Self::from_private_key(private)
    }

    /// Wraps an existing private key.
    pub fn from_private_key(private: RsaPrivateKey) -> Result<Self, CryptoError> {
        let public = RsaPublicKey::from(&private);
        let public_der = public
            .to_public_key_der()
            .map_err(|e| CryptoError::KeyEncoding(e.to_string()))?
            .into_vec();
        Ok(Self {
            private,
            public,
            public_der,
        })
    }

    /// X.509 SubjectPublicKeyInfo DER of the public key.
    pub fn public_der(&self) -> &[u8] {
        &self.public_der
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public
    }

    /// Decrypts a PKCS#1 v1.5 ciphertext produced with the public key.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.private
            .decrypt(Pkcs1v15Encrypt, ciphertext)
            .map_err(|_| CryptoError::Decrypt)
    }
}

impl fmt::Debug for ServerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerKey")
            .field("public_der_len", &self.public_der.len())
            .finish_non_exhaustive()
    }
}
