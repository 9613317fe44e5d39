//! ChaCha20Poly1305 sealing under a derived session key

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Key,
};
use rand::{rngs::OsRng, RngCore};

use crate::{CryptoError, CryptoResult, SessionKey, NONCE_SIZE, TAG_SIZE};

/// 96-bit AEAD nonce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Nonce([u8; NONCE_SIZE]);

impl Nonce {
    /// Draw a fresh nonce from the OS random source
    pub fn generate() -> CryptoResult<Self> {
        let mut bytes = [0u8; NONCE_SIZE];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
        Ok(Self(bytes))
    }

    pub fn from_bytes(bytes: [u8; NONCE_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> CryptoResult<Self> {
        let bytes: [u8; NONCE_SIZE] = bytes.try_into().map_err(|_| CryptoError::Truncated {
            needed: NONCE_SIZE,
            available: bytes.len(),
        })?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.0
    }
}

/// AEAD keyed by a [`SessionKey`]
pub struct SessionCipher {
    cipher: ChaCha20Poly1305,
}

impl SessionCipher {
    pub fn new(key: &SessionKey) -> Self {
        Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(key.as_bytes())),
        }
    }

    /// Encrypt and authenticate `plaintext`, binding `aad`
    ///
    /// Returns: [ciphertext][16-byte auth tag]
    pub fn seal(&self, nonce: &Nonce, aad: &[u8], plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
        self.cipher
            .encrypt(
                chacha20poly1305::Nonce::from_slice(nonce.as_bytes()),
                Payload {
                    msg: plaintext,
                    aad,
                },
            )
            .map_err(|e| CryptoError::Encryption(e.to_string()))
    }

    /// Verify and decrypt
    ///
    /// Any mismatch of key, nonce, aad or ciphertext is an [`CryptoError::AuthFailure`];
    /// no partial plaintext is ever returned.
    pub fn open(&self, nonce: &Nonce, aad: &[u8], ciphertext: &[u8]) -> CryptoResult<Vec<u8>> {
        if ciphertext.len() < TAG_SIZE {
            return Err(CryptoError::AuthFailure);
        }
        self.cipher
            .decrypt(
                chacha20poly1305::Nonce::from_slice(nonce.as_bytes()),
                Payload {
                    msg: ciphertext,
                    aad,
                },
            )
            .map_err(|_| CryptoError::AuthFailure)
    }
}

/// One-shot seal under `key`
pub fn seal(key: &SessionKey, nonce: &Nonce, aad: &[u8], plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
    SessionCipher::new(key).seal(nonce, aad, plaintext)
}

/// One-shot open under `key`
pub fn open(key: &SessionKey, nonce: &Nonce, aad: &[u8], ciphertext: &[u8]) -> CryptoResult<Vec<u8>> {
    SessionCipher::new(key).open(nonce, aad, ciphertext)
}
