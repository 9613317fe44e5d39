//! X25519 key agreement and HKDF-SHA256 session key derivation

use hkdf::Hkdf;
use rand::{rngs::OsRng, RngCore};
use sha2::Sha256;
use tracing::debug;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::{CryptoError, CryptoResult, KEY_SIZE, PUBLIC_KEY_SIZE, SECRET_KEY_SIZE};

/// X25519 key pair
///
/// Used both as a long-term identity and as a single-use ephemeral pair;
/// the private scalar is wiped when the pair is dropped.
pub struct KeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl KeyPair {
    /// Generate a fresh key pair from the OS random source
    pub fn generate() -> CryptoResult<Self> {
        let mut bytes = Zeroizing::new([0u8; SECRET_KEY_SIZE]);
        OsRng
            .try_fill_bytes(&mut *bytes)
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
        Ok(Self::from_secret_bytes(*bytes))
    }

    /// Rebuild a key pair from a stored private scalar
    ///
    /// The argument is wiped once the secret has been built from it.
    pub fn from_secret_bytes(mut bytes: [u8; SECRET_KEY_SIZE]) -> Self {
        let secret = StaticSecret::from(bytes);
        bytes.zeroize();
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    pub fn from_secret_slice(bytes: &[u8]) -> CryptoResult<Self> {
        let bytes: [u8; SECRET_KEY_SIZE] =
            bytes.try_into().map_err(|_| CryptoError::InvalidKeyLength {
                expected: SECRET_KEY_SIZE,
                actual: bytes.len(),
            })?;
        Ok(Self::from_secret_bytes(bytes))
    }

    pub fn public_key(&self) -> PublicKey {
        self.public
    }

    /// Get the public key bytes
    pub fn public_key_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        *self.public.as_bytes()
    }

    /// Export the private scalar for provisioning
    pub fn secret_bytes(&self) -> Zeroizing<[u8; SECRET_KEY_SIZE]> {
        Zeroizing::new(self.secret.to_bytes())
    }

    /// Perform Diffie-Hellman against a peer public key
    pub fn agree(&self, their_public: &PublicKey) -> CryptoResult<SharedSecret> {
        if their_public.as_bytes().iter().all(|b| *b == 0) {
            return Err(CryptoError::InvalidKey);
        }
        let shared = self.secret.diffie_hellman(their_public);
        if !shared.was_contributory() {
            debug!("Rejected low-order peer public key");
            return Err(CryptoError::InvalidKey);
        }
        Ok(SharedSecret(Zeroizing::new(*shared.as_bytes())))
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public.as_bytes())
            .finish_non_exhaustive()
    }
}

/// Raw X25519 output, consumed by [`derive_session_key`]
pub struct SharedSecret(Zeroizing<[u8; KEY_SIZE]>);

impl SharedSecret {
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SharedSecret(..)")
    }
}

/// Symmetric key for one sealed message or one static session
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; KEY_SIZE]);

impl SessionKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKey(..)")
    }
}

/// Parse a peer public key, rejecting the wrong length and the all-zero point
pub fn parse_public_key(bytes: &[u8]) -> CryptoResult<PublicKey> {
    let bytes: [u8; PUBLIC_KEY_SIZE] =
        bytes.try_into().map_err(|_| CryptoError::InvalidKeyLength {
            expected: PUBLIC_KEY_SIZE,
            actual: bytes.len(),
        })?;
    if bytes.iter().all(|b| *b == 0) {
        return Err(CryptoError::InvalidKey);
    }
    Ok(PublicKey::from(bytes))
}

/// Generate a key pair; failure of the random source is fatal
pub fn generate_key_pair() -> CryptoResult<KeyPair> {
    KeyPair::generate()
}

/// X25519 over raw bytes
pub fn compute_shared_secret(private: &[u8], peer_public: &[u8]) -> CryptoResult<SharedSecret> {
    let local = KeyPair::from_secret_slice(private)?;
    let peer = parse_public_key(peer_public)?;
    local.agree(&peer)
}

/// HKDF-SHA256 with no salt and no info, 32 bytes of output
pub fn derive_session_key(shared: &SharedSecret) -> CryptoResult<SessionKey> {
    let hk = Hkdf::<Sha256>::new(None, shared.as_bytes());
    let mut okm = [0u8; KEY_SIZE];
    hk.expand(&[], &mut okm)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    let key = SessionKey(okm);
    okm.zeroize();
    Ok(key)
}
