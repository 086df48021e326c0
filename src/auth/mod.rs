//! Caller authentication for externally submitted calls.
//!
//! A [`SignedCall`] binds a [`Call`] to an ed25519 key, a per-account nonce
//! and the [`DeploymentId`] of the runtime it is meant for. The caller's ledger
//! address is derived from the verifying key, so a valid signature is the only
//! way to act as that address through [`crate::runtime::Runtime::submit`].

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::ledger::Address;
use crate::runtime::Call;

const CALL_DOMAIN: &[u8] = b"blueico-call-v1";

/// Identifies one deployment (contract addresses, owner, genesis time).
/// Signatures made for one deployment do not verify on another.
pub type DeploymentId = [u8; 32];

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignedCall {
    #[serde(with = "serde_hex32")]
    pub public_key: [u8; 32],
    pub nonce: u64,
    pub call: Call,
    #[serde(with = "serde_bytes")]
    pub signature: Vec<u8>,
}

impl SignedCall {
    pub fn sign(
        key: &SigningKey,
        deployment: &DeploymentId,
        nonce: u64,
        call: Call,
    ) -> Result<Self, VerificationError> {
        let public_key = key.verifying_key().to_bytes();
        let digest = call_digest(deployment, &public_key, nonce, &call)?;
        let signature = key.sign(&digest).to_bytes().to_vec();
        Ok(Self {
            public_key,
            nonce,
            call,
            signature,
        })
    }

    pub fn caller(&self) -> Address {
        Address::from_public_key(&self.public_key)
    }

    /// Checks the signature and returns the address the call acts for.
    pub fn verify(&self, deployment: &DeploymentId) -> Result<Address, VerificationError> {
        let key = VerifyingKey::from_bytes(&self.public_key)
            .map_err(|_| VerificationError::MalformedKey)?;
        let signature = Signature::from_slice(&self.signature)
            .map_err(|_| VerificationError::MalformedSignature)?;
        let digest = call_digest(deployment, &self.public_key, self.nonce, &self.call)?;
        key.verify_strict(&digest, &signature)
            .map_err(|_| VerificationError::InvalidSignature(self.caller()))?;
        Ok(self.caller())
    }
}

pub fn call_digest(
    deployment: &DeploymentId,
    public_key: &[u8; 32],
    nonce: u64,
    call: &Call,
) -> Result<[u8; 32], VerificationError> {
    let encoded =
        serde_json::to_vec(call).map_err(|e| VerificationError::Encoding(e.to_string()))?;
    let mut hasher = Sha256::new();
    hasher.update(CALL_DOMAIN);
    hasher.update(deployment);
    hasher.update(public_key);
    hasher.update(nonce.to_le_bytes());
    hasher.update(&encoded);
    Ok(hasher.finalize().into())
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerificationError {
    #[error("public key is not a valid ed25519 point")]
    MalformedKey,
    #[error("signature is not 64 bytes")]
    MalformedSignature,
    #[error("invalid signature for caller {0}")]
    InvalidSignature(Address),
    #[error("call encoding failed: {0}")]
    Encoding(String),
}

pub(crate) mod serde_bytes {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        hex::decode(&encoded).map_err(D::Error::custom)
    }
}

pub(crate) mod serde_hex32 {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 32], D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        let bytes = hex::decode(&encoded).map_err(D::Error::custom)?;
        bytes
            .try_into()
            .map_err(|b: Vec<u8>| D::Error::custom(format!("expected 32 bytes, got {}", b.len())))
    }
}
