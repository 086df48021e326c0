use std::{fmt, str::FromStr};

use serde::{de::Error, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

/// 20-byte account identifier shared by holders and contracts.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address([u8; 20]);

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AddressParseError {
    #[error("address must start with 0x or @")]
    MissingPrefix,
    #[error("address label must not be empty")]
    EmptyLabel,
    #[error("address must be 20 bytes, got {0}")]
    BadLength(usize),
    #[error("invalid hex in address: {0}")]
    BadHex(String),
}

impl Address {
    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Deterministic address for a well-known name (contracts, scenario actors).
    pub fn from_label(label: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"blueico:label:");
        hasher.update(label.as_bytes());
        Self::from_digest(hasher.finalize().into())
    }

    /// Address of the holder of an ed25519 verifying key.
    pub fn from_public_key(public_key: &[u8; 32]) -> Self {
        Self::from_digest(Sha256::digest(public_key).into())
    }

    fn from_digest(digest: [u8; 32]) -> Self {
        let mut out = [0u8; 20];
        out.copy_from_slice(&digest[12..]);
        Self(out)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(label) = s.strip_prefix('@') {
            if label.is_empty() {
                return Err(AddressParseError::EmptyLabel);
            }
            return Ok(Self::from_label(label));
        }
        let digits = s
            .strip_prefix("0x")
            .ok_or(AddressParseError::MissingPrefix)?;
        let bytes = hex::decode(digits).map_err(|e| AddressParseError::BadHex(e.to_string()))?;
        if bytes.len() != 20 {
            return Err(AddressParseError::BadLength(bytes.len()));
        }
        let mut out = [0u8; 20];
        out.copy_from_slice(&bytes);
        Ok(Self(out))
    }
}

impl Serialize for Address {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        encoded.parse().map_err(D::Error::custom)
    }
}
