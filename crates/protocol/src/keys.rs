//! Ed25519 identity keys for mesh addressing.
//!
//! Every node on the mesh is addressed by an Ed25519 public key. Keys are
//! rendered as lowercase hex everywhere they cross a boundary: CLI flags,
//! wire frames, and log output. Secret keys never implement `Display` and
//! their `Debug` output is redacted.

use std::fmt;
use std::str::FromStr;

use ed25519_dalek::{SigningKey, VerifyingKey, PUBLIC_KEY_LENGTH, SECRET_KEY_LENGTH};
use rand::rngs::OsRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::error::{ProtocolError, Result};

/// A node's public identity on the mesh.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PubKey([u8; PUBLIC_KEY_LENGTH]);

impl PubKey {
    /// Creates a `PubKey` from raw bytes, rejecting byte strings that are
    /// not a valid Ed25519 point.
    pub fn from_bytes(bytes: &[u8; PUBLIC_KEY_LENGTH]) -> Result<Self> {
        VerifyingKey::from_bytes(bytes)
            .map_err(|e| ProtocolError::InvalidPublicKey(e.to_string()))?;
        Ok(Self(*bytes))
    }

    /// Returns the raw key bytes.
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LENGTH] {
        &self.0
    }

    /// Generates a short human-readable fingerprint of this key.
    ///
    /// The fingerprint is the first 8 bytes of the key's SHA-256 digest,
    /// formatted as groups of 4 hex characters separated by colons, for
    /// example: `a1b2:c3d4:e5f6:7890`.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.0);
        digest[..8]
            .chunks(2)
            .map(|chunk| format!("{:02x}{:02x}", chunk[0], chunk[1]))
            .collect::<Vec<_>>()
            .join(":")
    }
}

impl fmt::Display for PubKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for PubKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PubKey({})", self.fingerprint())
    }
}

impl FromStr for PubKey {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        let bytes =
            hex::decode(s).map_err(|e| ProtocolError::InvalidPublicKey(e.to_string()))?;
        let arr: [u8; PUBLIC_KEY_LENGTH] = bytes.try_into().map_err(|b: Vec<u8>| {
            ProtocolError::InvalidPublicKey(format!(
                "expected {} bytes, got {}",
                PUBLIC_KEY_LENGTH,
                b.len()
            ))
        })?;
        Self::from_bytes(&arr)
    }
}

impl Serialize for PubKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for PubKey {
    fn deserialize<D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        let s: String = Deserialize::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A node's secret key.
///
/// Holds the Ed25519 signing key. Deliberately not `Display` and `Debug`
/// redacts the key material so it cannot leak into log output.
#[derive(Clone)]
pub struct SecKey(SigningKey);

impl SecKey {
    /// Reconstructs a secret key from raw bytes.
    pub fn from_bytes(bytes: &[u8; SECRET_KEY_LENGTH]) -> Self {
        Self(SigningKey::from_bytes(bytes))
    }

    /// Parses a secret key from its hex representation.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes =
            hex::decode(s).map_err(|e| ProtocolError::InvalidSecretKey(e.to_string()))?;
        let arr: [u8; SECRET_KEY_LENGTH] = bytes.try_into().map_err(|b: Vec<u8>| {
            ProtocolError::InvalidSecretKey(format!(
                "expected {} bytes, got {}",
                SECRET_KEY_LENGTH,
                b.len()
            ))
        })?;
        Ok(Self::from_bytes(&arr))
    }

    /// Returns the raw secret key bytes.
    pub fn to_bytes(&self) -> [u8; SECRET_KEY_LENGTH] {
        self.0.to_bytes()
    }

    /// Derives the public key for this secret key.
    pub fn public_key(&self) -> PubKey {
        PubKey(self.0.verifying_key().to_bytes())
    }
}

impl fmt::Debug for SecKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecKey(<redacted>)")
    }
}

/// A full identity keypair.
#[derive(Debug, Clone)]
pub struct Keypair {
    /// The public half, used for addressing.
    pub public: PubKey,
    /// The secret half.
    pub secret: SecKey,
}

impl Keypair {
    /// Generates a fresh random keypair.
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        let public = PubKey(signing_key.verifying_key().to_bytes());
        Self {
            public,
            secret: SecKey(signing_key),
        }
    }

    /// Builds the keypair belonging to an existing secret key.
    pub fn from_secret(secret: SecKey) -> Self {
        Self {
            public: secret.public_key(),
            secret,
        }
    }
}
