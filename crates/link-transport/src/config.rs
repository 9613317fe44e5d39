//! Link configuration
//!
//! Built once (usually from a JSON file), checked once by `validate()` and
//! then handed by value to the component that owns it. Keys are hex strings.

use std::time::Duration;

use crypto_session::{parse_public_key, KeyPair, Opener, PublicKey, Sealer};
use serde::{Deserialize, Deserializer};
use telemetry_protocol::AUTH_SECRET_MAX_LEN;
use zeroize::Zeroizing;

use crate::{ConfigError, TransportResult, DEFAULT_PUBLISH_INTERVAL_MS, DEFAULT_QUEUE_CAPACITY};

/// 32 bytes of key material read from a hex string
#[derive(Clone, PartialEq, Eq)]
pub struct KeyMaterial(Zeroizing<[u8; 32]>);

impl KeyMaterial {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(Zeroizing::new(bytes))
    }

    pub fn from_hex(text: &str) -> Result<Self, String> {
        let mut bytes = Zeroizing::new([0u8; 32]);
        hex::decode_to_slice(text.trim(), &mut *bytes).map_err(|e| e.to_string())?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    fn key_pair(&self) -> KeyPair {
        KeyPair::from_secret_bytes(*self.0)
    }

    fn public_key(&self, field: &'static str) -> Result<PublicKey, ConfigError> {
        parse_public_key(self.as_bytes()).map_err(|e| ConfigError::InvalidKey {
            field,
            reason: e.to_string(),
        })
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("KeyMaterial(..)")
    }
}

impl<'de> Deserialize<'de> for KeyMaterial {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = Zeroizing::new(String::deserialize(deserializer)?);
        Self::from_hex(&text).map_err(serde::de::Error::custom)
    }
}

/// Pre-shared pairing secret (PIN or key)
#[derive(Clone, Default, PartialEq, Eq)]
pub struct PairingSecret(Zeroizing<Vec<u8>>);

impl PairingSecret {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self(Zeroizing::new(secret.into()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for PairingSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PairingSecret({} bytes)", self.0.len())
    }
}

impl<'de> Deserialize<'de> for PairingSecret {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Ok(Self::new(text.into_bytes()))
    }
}

/// Peripheral pairing policy
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PairingConfig {
    /// When false the gate is permanently open
    pub required: bool,
    pub secret: PairingSecret,
}

impl PairingConfig {
    pub fn required(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            required: true,
            secret: PairingSecret::new(secret),
        }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.required && self.secret.is_empty() {
            return Err(ConfigError::EmptyPairingSecret);
        }
        validate_secret_len(&self.secret)
    }
}

fn validate_secret_len(secret: &PairingSecret) -> Result<(), ConfigError> {
    if secret.len() > AUTH_SECRET_MAX_LEN {
        return Err(ConfigError::PairingSecretTooLong {
            len: secret.len(),
            max: AUTH_SECRET_MAX_LEN,
        });
    }
    Ok(())
}

/// Backoff for an unavailable link
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 50,
            max_backoff_ms: 2000,
        }
    }
}

impl RetryPolicy {
    /// Delay after the given failed attempt (1-based), doubling up to the cap
    pub fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        let millis = self
            .initial_backoff_ms
            .saturating_mul(1u64 << shift)
            .min(self.max_backoff_ms);
        Duration::from_millis(millis)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "retry.max_attempts",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.initial_backoff_ms > self.max_backoff_ms {
            return Err(ConfigError::InvalidValue {
                field: "retry.initial_backoff_ms",
                reason: format!("exceeds max_backoff_ms ({})", self.max_backoff_ms),
            });
        }
        Ok(())
    }
}

/// Key agreement on the sending side
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "scheme", rename_all = "snake_case")]
pub enum PeripheralScheme {
    /// Seal every message to the companion's long-term public key
    EphemeralStatic { recipient_public: KeyMaterial },
    StaticStatic {
        local_secret: KeyMaterial,
        peer_public: KeyMaterial,
    },
}

impl PeripheralScheme {
    fn validate(&self) -> Result<(), ConfigError> {
        match self {
            PeripheralScheme::EphemeralStatic { recipient_public } => {
                recipient_public.public_key("recipient_public").map(drop)
            }
            PeripheralScheme::StaticStatic {
                local_secret,
                peer_public,
            } => {
                check_secret(local_secret, "local_secret")?;
                peer_public.public_key("peer_public").map(drop)
            }
        }
    }

    /// Build the sealing half
    pub fn sealer(&self) -> TransportResult<Sealer> {
        let sealer = match self {
            PeripheralScheme::EphemeralStatic { recipient_public } => {
                Sealer::ephemeral_static(recipient_public.public_key("recipient_public")?)?
            }
            PeripheralScheme::StaticStatic {
                local_secret,
                peer_public,
            } => Sealer::static_static(
                &local_secret.key_pair(),
                &peer_public.public_key("peer_public")?,
            )?,
        };
        Ok(sealer)
    }
}

/// Key agreement on the receiving side
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "scheme", rename_all = "snake_case")]
pub enum CompanionScheme {
    /// Open messages sealed to this long-term key
    EphemeralStatic { static_secret: KeyMaterial },
    StaticStatic {
        local_secret: KeyMaterial,
        peer_public: KeyMaterial,
    },
}

impl CompanionScheme {
    fn validate(&self) -> Result<(), ConfigError> {
        match self {
            CompanionScheme::EphemeralStatic { static_secret } => {
                check_secret(static_secret, "static_secret")
            }
            CompanionScheme::StaticStatic {
                local_secret,
                peer_public,
            } => {
                check_secret(local_secret, "local_secret")?;
                peer_public.public_key("peer_public").map(drop)
            }
        }
    }

    /// Build the opening half
    pub fn opener(&self) -> TransportResult<Opener> {
        let opener = match self {
            CompanionScheme::EphemeralStatic { static_secret } => {
                Opener::ephemeral_static(static_secret.key_pair())
            }
            CompanionScheme::StaticStatic {
                local_secret,
                peer_public,
            } => Opener::static_static(
                &local_secret.key_pair(),
                &peer_public.public_key("peer_public")?,
            )?,
        };
        Ok(opener)
    }
}

fn check_secret(secret: &KeyMaterial, field: &'static str) -> Result<(), ConfigError> {
    // Any 32 bytes clamp to a valid scalar; all-zero means "not provisioned"
    if secret.is_zero() {
        return Err(ConfigError::InvalidKey {
            field,
            reason: "all-zero secret".to_string(),
        });
    }
    Ok(())
}

fn check_positive(value: u64, field: &'static str) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidValue {
            field,
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(())
}

fn parse_json<T: for<'de> Deserialize<'de>>(json: &str) -> Result<T, ConfigError> {
    serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))
}

/// Peripheral configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PeripheralConfig {
    pub scheme: PeripheralScheme,
    #[serde(default)]
    pub pairing: PairingConfig,
    #[serde(default = "default_publish_interval_ms")]
    pub publish_interval_ms: u64,
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_publish_interval_ms() -> u64 {
    DEFAULT_PUBLISH_INTERVAL_MS
}

impl PeripheralConfig {
    pub fn new(scheme: PeripheralScheme, pairing: PairingConfig) -> Self {
        Self {
            scheme,
            pairing,
            publish_interval_ms: DEFAULT_PUBLISH_INTERVAL_MS,
            retry: RetryPolicy::default(),
        }
    }

    /// Parse and validate
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = parse_json(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scheme.validate()?;
        self.pairing.validate()?;
        check_positive(self.publish_interval_ms, "publish_interval_ms")?;
        self.retry.validate()
    }

    pub fn publish_interval(&self) -> Duration {
        Duration::from_millis(self.publish_interval_ms)
    }
}

/// Companion configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CompanionConfig {
    pub scheme: CompanionScheme,
    /// Secret presented to the peripheral after connecting
    #[serde(default)]
    pub pairing_secret: Option<PairingSecret>,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

impl CompanionConfig {
    pub fn new(scheme: CompanionScheme, pairing_secret: Option<PairingSecret>) -> Self {
        Self {
            scheme,
            pairing_secret,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            retry: RetryPolicy::default(),
        }
    }

    /// Parse and validate
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = parse_json(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scheme.validate()?;
        if let Some(secret) = &self.pairing_secret {
            if secret.is_empty() {
                return Err(ConfigError::EmptyPairingSecret);
            }
            validate_secret_len(secret)?;
        }
        check_positive(self.queue_capacity as u64, "queue_capacity")?;
        self.retry.validate()
    }
}

/// Public half of a stored secret, for provisioning the other side
pub fn public_key_hex(secret: &KeyMaterial) -> String {
    hex::encode(secret.key_pair().public_key_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMPANION_SECRET: &str = "5dab087e624a8a4b79e17f8b83800ee66f3bb1292618b6fd1c2f8b27ff88e0eb";
    const COMPANION_PUBLIC: &str = "de9edb7d7b7dc1b4d35b61c2ece435373f8343c85b78674dadfc7e146f882b4f";

    #[test]
    fn test_peripheral_from_json() {
        let json = format!(
            r#"{{
                "scheme": {{ "scheme": "ephemeral_static", "recipient_public": "{}" }},
                "pairing": {{ "required": true, "secret": "123456" }}
            }}"#,
            COMPANION_PUBLIC
        );
        let config = PeripheralConfig::from_json(&json).unwrap();
        assert_eq!(config.publish_interval(), Duration::from_millis(3000));
        assert_eq!(config.pairing.secret.as_bytes(), b"123456");
        assert_eq!(config.retry, RetryPolicy::default());
        assert!(config.scheme.sealer().is_ok());
    }

    #[test]
    fn test_companion_from_json() {
        let json = format!(
            r#"{{
                "scheme": {{ "scheme": "ephemeral_static", "static_secret": "{}" }},
                "pairing_secret": "123456",
                "queue_capacity": 4
            }}"#,
            COMPANION_SECRET
        );
        let config = CompanionConfig::from_json(&json).unwrap();
        assert_eq!(config.queue_capacity, 4);
        assert!(config.scheme.opener().is_ok());
    }

    #[test]
    fn test_bad_hex_is_parse_error() {
        let json = r#"{ "scheme": { "scheme": "ephemeral_static", "recipient_public": "zz" } }"#;
        assert!(matches!(
            PeripheralConfig::from_json(json),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_zero_public_key_rejected() {
        let config = PeripheralConfig::new(
            PeripheralScheme::EphemeralStatic {
                recipient_public: KeyMaterial::from_bytes([0; 32]),
            },
            PairingConfig::disabled(),
        );
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidKey {
                field: "recipient_public",
                ..
            })
        ));
    }

    #[test]
    fn test_pairing_validation() {
        let scheme = PeripheralScheme::EphemeralStatic {
            recipient_public: KeyMaterial::from_hex(COMPANION_PUBLIC).unwrap(),
        };

        let mut config = PeripheralConfig::new(scheme.clone(), PairingConfig::required(""));
        assert_eq!(config.validate(), Err(ConfigError::EmptyPairingSecret));

        config.pairing = PairingConfig::required(vec![b'1'; 33]);
        assert_eq!(
            config.validate(),
            Err(ConfigError::PairingSecretTooLong { len: 33, max: 32 })
        );

        config.pairing = PairingConfig::disabled();
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn test_zero_interval_and_capacity_rejected() {
        let mut peripheral = PeripheralConfig::new(
            PeripheralScheme::EphemeralStatic {
                recipient_public: KeyMaterial::from_hex(COMPANION_PUBLIC).unwrap(),
            },
            PairingConfig::disabled(),
        );
        peripheral.publish_interval_ms = 0;
        assert!(matches!(
            peripheral.validate(),
            Err(ConfigError::InvalidValue { field: "publish_interval_ms", .. })
        ));

        let mut companion = CompanionConfig::new(
            CompanionScheme::EphemeralStatic {
                static_secret: KeyMaterial::from_hex(COMPANION_SECRET).unwrap(),
            },
            None,
        );
        companion.queue_capacity = 0;
        assert!(matches!(
            companion.validate(),
            Err(ConfigError::InvalidValue { field: "queue_capacity", .. })
        ));
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_backoff_ms: 100,
            max_backoff_ms: 1000,
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(4), Duration::from_millis(800));
        assert_eq!(policy.backoff(5), Duration::from_millis(1000));
        assert_eq!(policy.backoff(40), Duration::from_millis(1000));
    }

    #[test]
    fn test_public_key_hex() {
        let secret = KeyMaterial::from_hex(COMPANION_SECRET).unwrap();
        assert_eq!(public_key_hex(&secret), COMPANION_PUBLIC);
    }

    #[test]
    fn test_secrets_not_in_debug_output() {
        let config = PairingConfig::required("123456");
        assert!(!format!("{:?}", config).contains("123456"));
    }
}
