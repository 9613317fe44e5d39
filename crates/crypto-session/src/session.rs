//! Scheme-level sealing: key agreement, derivation and AEAD in one call

use tracing::debug;
use x25519_dalek::PublicKey;

use crate::{
    derive_session_key, CipherPayload, CryptoError, CryptoResult, KeyPair, Nonce, SessionCipher,
    NONCE_SIZE, PUBLIC_KEY_SIZE, TAG_SIZE,
};

/// Key agreement scheme in use on a link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    /// Fresh sender key pair per message against the receiver's static key
    EphemeralStatic,
    /// One session key from both long-term keys
    StaticStatic,
}

impl Scheme {
    /// Bytes added to a plaintext by sealing
    pub fn overhead(&self) -> usize {
        match self {
            Scheme::EphemeralStatic => NONCE_SIZE + TAG_SIZE + PUBLIC_KEY_SIZE,
            Scheme::StaticStatic => NONCE_SIZE + TAG_SIZE,
        }
    }

    fn carries_ephemeral(&self) -> bool {
        matches!(self, Scheme::EphemeralStatic)
    }
}

/// Sending half of a link
pub enum Sealer {
    EphemeralStatic { recipient: PublicKey },
    StaticStatic { cipher: SessionCipher },
}

impl Sealer {
    /// Encrypt to a receiver's long-term public key
    pub fn ephemeral_static(recipient: PublicKey) -> CryptoResult<Self> {
        if recipient.as_bytes().iter().all(|b| *b == 0) {
            return Err(CryptoError::InvalidKey);
        }
        Ok(Self::EphemeralStatic { recipient })
    }

    /// Derive the session key once from both long-term keys
    pub fn static_static(local: &KeyPair, peer: &PublicKey) -> CryptoResult<Self> {
        let key = derive_session_key(&local.agree(peer)?)?;
        Ok(Self::StaticStatic {
            cipher: SessionCipher::new(&key),
        })
    }

    pub fn scheme(&self) -> Scheme {
        match self {
            Sealer::EphemeralStatic { .. } => Scheme::EphemeralStatic,
            Sealer::StaticStatic { .. } => Scheme::StaticStatic,
        }
    }

    /// Seal `plaintext` into a [`CipherPayload`] byte string
    ///
    /// Every call draws its own nonce, and under the ephemeral-static scheme
    /// its own key pair, which is dropped (and wiped) before returning.
    pub fn seal(&self, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
        let nonce = Nonce::generate()?;
        let payload = match self {
            Sealer::EphemeralStatic { recipient } => {
                let ephemeral = KeyPair::generate()?;
                let ephemeral_public = ephemeral.public_key_bytes();
                let key = derive_session_key(&ephemeral.agree(recipient)?)?;
                let ciphertext = SessionCipher::new(&key).seal(&nonce, &ephemeral_public, plaintext)?;
                CipherPayload {
                    nonce,
                    ciphertext,
                    ephemeral_public: Some(ephemeral_public),
                }
            }
            Sealer::StaticStatic { cipher } => CipherPayload {
                nonce,
                ciphertext: cipher.seal(&nonce, &[], plaintext)?,
                ephemeral_public: None,
            },
        };
        Ok(payload.to_bytes())
    }
}

/// Receiving half of a link
pub enum Opener {
    EphemeralStatic { local: KeyPair },
    StaticStatic { cipher: SessionCipher },
}

impl Opener {
    /// Open payloads sealed to `local`'s public key
    pub fn ephemeral_static(local: KeyPair) -> Self {
        Self::EphemeralStatic { local }
    }

    pub fn static_static(local: &KeyPair, peer: &PublicKey) -> CryptoResult<Self> {
        let key = derive_session_key(&local.agree(peer)?)?;
        Ok(Self::StaticStatic {
            cipher: SessionCipher::new(&key),
        })
    }

    pub fn scheme(&self) -> Scheme {
        match self {
            Opener::EphemeralStatic { .. } => Scheme::EphemeralStatic,
            Opener::StaticStatic { .. } => Scheme::StaticStatic,
        }
    }

    /// Verify and decrypt a received [`CipherPayload`]
    ///
    /// A degenerate ephemeral key on the wire is reported as
    /// [`CryptoError::AuthFailure`] like any other tampering.
    pub fn open(&self, data: &[u8]) -> CryptoResult<Vec<u8>> {
        let payload = CipherPayload::parse(data, self.scheme().carries_ephemeral())?;
        match self {
            Opener::EphemeralStatic { local } => {
                let Some(ephemeral_public) = payload.ephemeral_public else {
                    return Err(CryptoError::AuthFailure);
                };
                let shared = local
                    .agree(&PublicKey::from(ephemeral_public))
                    .map_err(|e| {
                        debug!("Ephemeral key rejected: {}", e);
                        CryptoError::AuthFailure
                    })?;
                let key = derive_session_key(&shared)?;
                SessionCipher::new(&key).open(&payload.nonce, &ephemeral_public, &payload.ciphertext)
            }
            Opener::StaticStatic { cipher } => {
                cipher.open(&payload.nonce, &[], &payload.ciphertext)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ephemeral_pair() -> (Sealer, Opener) {
        let receiver = KeyPair::generate().unwrap();
        let sealer = Sealer::ephemeral_static(receiver.public_key()).unwrap();
        (sealer, Opener::ephemeral_static(receiver))
    }

    fn static_pair() -> (Sealer, Opener) {
        let peripheral = KeyPair::generate().unwrap();
        let companion = KeyPair::generate().unwrap();
        let sealer = Sealer::static_static(&peripheral, &companion.public_key()).unwrap();
        let opener = Opener::static_static(&companion, &peripheral.public_key()).unwrap();
        (sealer, opener)
    }

    #[test]
    fn test_ephemeral_static_roundtrip() {
        let (sealer, opener) = ephemeral_pair();
        let sealed = sealer.seal(&[2, 4, 0x00, 0x00, 0x20, 0x41]).unwrap();
        assert_eq!(sealed.len(), 6 + Scheme::EphemeralStatic.overhead());
        assert_eq!(opener.open(&sealed).unwrap(), vec![2, 4, 0x00, 0x00, 0x20, 0x41]);
    }

    #[test]
    fn test_ephemeral_key_is_fresh_per_message() {
        let (sealer, _) = ephemeral_pair();
        let first = sealer.seal(b"same").unwrap();
        let second = sealer.seal(b"same").unwrap();
        assert_ne!(&first[first.len() - 32..], &second[second.len() - 32..]);
        assert_ne!(first, second);
    }

    #[test]
    fn test_static_static_roundtrip() {
        let (sealer, opener) = static_pair();
        for i in 0..50u8 {
            let sealed = sealer.seal(&[i; 8]).unwrap();
            assert_eq!(sealed.len(), 8 + Scheme::StaticStatic.overhead());
            assert_eq!(opener.open(&sealed).unwrap(), vec![i; 8]);
        }
    }

    #[test]
    fn test_wrong_receiver_fails() {
        let (sealer, _) = ephemeral_pair();
        let (_, stranger) = ephemeral_pair();
        let sealed = sealer.seal(b"secret").unwrap();
        assert_eq!(stranger.open(&sealed), Err(CryptoError::AuthFailure));
    }

    #[test]
    fn test_spliced_ephemeral_key_fails() {
        let (sealer, opener) = ephemeral_pair();
        let first = sealer.seal(b"first").unwrap();
        let mut second = sealer.seal(b"first").unwrap();
        let split = second.len() - PUBLIC_KEY_SIZE;
        second[split..].copy_from_slice(&first[split..]);
        assert_eq!(opener.open(&second), Err(CryptoError::AuthFailure));
    }

    #[test]
    fn test_zero_ephemeral_key_is_auth_failure() {
        let (sealer, opener) = ephemeral_pair();
        let mut sealed = sealer.seal(b"x").unwrap();
        let split = sealed.len() - PUBLIC_KEY_SIZE;
        sealed[split..].fill(0);
        assert_eq!(opener.open(&sealed), Err(CryptoError::AuthFailure));
    }

    #[test]
    fn test_zero_recipient_rejected() {
        assert!(matches!(
            Sealer::ephemeral_static(PublicKey::from([0u8; 32])),
            Err(CryptoError::InvalidKey)
        ));
    }

    #[test]
    fn test_truncated_payload() {
        let (_, opener) = ephemeral_pair();
        assert!(matches!(
            opener.open(&[0u8; 40]),
            Err(CryptoError::Truncated { needed: 60, .. })
        ));
    }

    proptest! {
        #[test]
        fn sealed_payload_roundtrip(plaintext in prop::collection::vec(any::<u8>(), 0..=250)) {
            let (sealer, opener) = ephemeral_pair();
            let sealed = sealer.seal(&plaintext).unwrap();
            prop_assert_eq!(opener.open(&sealed).unwrap(), plaintext);
        }

        #[test]
        fn any_bit_flip_is_auth_failure(
            plaintext in prop::collection::vec(any::<u8>(), 0..32),
            bit in any::<prop::sample::Index>(),
        ) {
            let (sealer, opener) = ephemeral_pair();
            let mut sealed = sealer.seal(&plaintext).unwrap();
            let bit = bit.index(sealed.len() * 8);
            sealed[bit / 8] ^= 1 << (bit % 8);
            prop_assert_eq!(opener.open(&sealed), Err(CryptoError::AuthFailure));
        }
    }
}
