//! Wire layout of a sealed message
//!
//! `[nonce: 12][ciphertext + tag][ephemeral public key: 32]?`
//!
//! The trailing key is present only under the ephemeral-static scheme.

use crate::{CryptoError, CryptoResult, Nonce, NONCE_SIZE, PUBLIC_KEY_SIZE, TAG_SIZE};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CipherPayload {
    pub nonce: Nonce,
    pub ciphertext: Vec<u8>,
    pub ephemeral_public: Option<[u8; PUBLIC_KEY_SIZE]>,
}

impl CipherPayload {
    /// Smallest valid payload for the given layout
    pub fn min_len(with_ephemeral: bool) -> usize {
        NONCE_SIZE + TAG_SIZE + if with_ephemeral { PUBLIC_KEY_SIZE } else { 0 }
    }

    pub fn encoded_len(&self) -> usize {
        NONCE_SIZE
            + self.ciphertext.len()
            + self.ephemeral_public.map_or(0, |_| PUBLIC_KEY_SIZE)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        out.extend_from_slice(self.nonce.as_bytes());
        out.extend_from_slice(&self.ciphertext);
        if let Some(public) = &self.ephemeral_public {
            out.extend_from_slice(public);
        }
        out
    }

    /// Split a received payload into its parts
    pub fn parse(data: &[u8], with_ephemeral: bool) -> CryptoResult<Self> {
        let needed = Self::min_len(with_ephemeral);
        if data.len() < needed {
            return Err(CryptoError::Truncated {
                needed,
                available: data.len(),
            });
        }

        let (nonce, rest) = data.split_at(NONCE_SIZE);
        let (ciphertext, ephemeral_public) = if with_ephemeral {
            let (ciphertext, public) = rest.split_at(rest.len() - PUBLIC_KEY_SIZE);
            let mut key = [0u8; PUBLIC_KEY_SIZE];
            key.copy_from_slice(public);
            (ciphertext, Some(key))
        } else {
            (rest, None)
        };

        Ok(Self {
            nonce: Nonce::from_slice(nonce)?,
            ciphertext: ciphertext.to_vec(),
            ephemeral_public,
        })
    }
}
