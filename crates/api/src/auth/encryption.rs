//! Authenticated encryption for short identities embedded in links
//!
//! Output layout, before encoding: `nonce (12 bytes) || ciphertext || tag (16 bytes)`,
//! encoded as unpadded base64url so it fits in a single query value.

use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    AeadCore, Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// AES-256-GCM codec bound to one key
#[derive(Clone)]
pub struct Encryptor {
    cipher: Aes256Gcm,
}

impl Encryptor {
    pub fn new(key: &[u8; 32]) -> Self {
        Self {
            cipher: Aes256Gcm::new(key.into()),
        }
    }

    /// Build from a 64-character hex key
    pub fn from_hex(hex_key: &str) -> Result<Self, CodecError> {
        Ok(Self::new(&parse_encryption_key(hex_key)?))
    }

    /// Encrypt with a fresh random nonce
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CodecError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| CodecError::Encryption)?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(URL_SAFE_NO_PAD.encode(out))
    }

    /// Decrypt, failing closed on bad encoding, truncation or a tag mismatch
    pub fn decrypt(&self, encoded: &str) -> Result<String, CodecError> {
        let raw = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|_| CodecError::Encoding)?;

        if raw.len() < NONCE_LEN + TAG_LEN {
            return Err(CodecError::Truncated);
        }
        let (nonce, ciphertext) = raw.split_at(NONCE_LEN);

        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CodecError::Decryption)?;

        String::from_utf8(plaintext).map_err(|_| CodecError::Decryption)
    }
}

/// Parse encryption key from hex string
pub fn parse_encryption_key(hex_key: &str) -> Result<[u8; 32], CodecError> {
    let bytes = hex::decode(hex_key).map_err(|_| CodecError::InvalidKey)?;
    bytes.try_into().map_err(|_| CodecError::InvalidKey)
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("Invalid encryption key")]
    InvalidKey,
    #[error("Encryption failed")]
    Encryption,
    #[error("Ciphertext is not valid base64url")]
    Encoding,
    #[error("Ciphertext is truncated")]
    Truncated,
    #[error("Decryption failed")]
    Decryption,
}
