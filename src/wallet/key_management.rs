// src/wallet/key_management.rs
//! Operator key management.
//!
//! The operator key signs every ledger transaction that leaves the submission
//! lane. Uses the following primitives:
//! - secp256k1 ECDSA (via `k256`)
//! - SHA-256 prehashing (via `ring`)
//! - System randomness for key generation

use crate::utils::crypto::hash_data;
use k256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("invalid key material: {0}")]
    InvalidKey(String),

    #[error("signing failed: {0}")]
    Signing(String),
}

/// Holds the operator signing key.
///
/// # Security Notes
/// - The secret scalar never leaves this struct
/// - Signatures are deterministic ECDSA (RFC 6979) over a SHA-256 prehash
#[derive(Clone)]
pub struct KeyManager {
    signing_key: SigningKey,
    /// Derived public key for verification
    pub verifying_key: VerifyingKey,
}

impl KeyManager {
    /// Generates a KeyManager with a fresh random key.
    pub fn new() -> Self {
        let signing_key = SigningKey::random(&mut rand::thread_rng());
        Self::from_signing_key(signing_key)
    }

    /// Loads a key from its hex-encoded 32-byte secret (with or without `0x`).
    pub fn from_hex(secret_hex: &str) -> Result<Self, KeyError> {
        let trimmed = secret_hex.trim();
        let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes = hex::decode(digits).map_err(|e| KeyError::InvalidKey(e.to_string()))?;
        let signing_key =
            SigningKey::from_slice(&bytes).map_err(|e| KeyError::InvalidKey(e.to_string()))?;
        Ok(Self::from_signing_key(signing_key))
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let verifying_key = *signing_key.verifying_key();
        KeyManager {
            signing_key,
            verifying_key,
        }
    }

    /// Signs a message; returns the 64-byte compact signature (R || S).
    ///
    /// # Process Flow
    /// 1. Hashes the message with SHA-256
    /// 2. Signs the hash using ECDSA
    pub fn sign_message(&self, message: &[u8]) -> Result<Vec<u8>, KeyError> {
        let hash = hash_data(message);
        let signature: Signature = self
            .signing_key
            .sign_prehash(&hash)
            .map_err(|e| KeyError::Signing(e.to_string()))?;
        Ok(signature.to_bytes().to_vec())
    }

    /// Hex SEC1 compressed public key, used as the signer id on transactions.
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.verifying_key.to_encoded_point(true).as_bytes())
    }

    /// Short account address: last 20 bytes of SHA-256 of the public key.
    pub fn address(&self) -> String {
        let digest = hash_data(self.verifying_key.to_encoded_point(false).as_bytes());
        format!("0x{}", hex::encode(&digest[12..]))
    }
}

impl Default for KeyManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Checks a signature produced by [`KeyManager::sign_message`].
///
/// Returns false for malformed keys or signatures.
pub fn verify_signature(public_key_hex: &str, message: &[u8], signature: &[u8]) -> bool {
    let Ok(key_bytes) = hex::decode(public_key_hex) else {
        return false;
    };
    let Ok(verifying_key) = VerifyingKey::from_sec1_bytes(&key_bytes) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(signature) else {
        return false;
    };
    verifying_key
        .verify_prehash(&hash_data(message), &signature)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify() {
        let keys = KeyManager::new();
        let signature = keys.sign_message(b"mint c0ffee").unwrap();
        assert_eq!(signature.len(), 64);
        assert!(verify_signature(&keys.public_key_hex(), b"mint c0ffee", &signature));
        assert!(!verify_signature(&keys.public_key_hex(), b"mint decaf", &signature));
    }

    #[test]
    fn test_foreign_key_rejected() {
        let keys = KeyManager::new();
        let other = KeyManager::new();
        let signature = keys.sign_message(b"payload").unwrap();
        assert!(!verify_signature(&other.public_key_hex(), b"payload", &signature));
        assert!(!verify_signature("zz", b"payload", &signature));
        assert!(!verify_signature(&keys.public_key_hex(), b"payload", &[0u8; 3]));
    }

    #[test]
    fn test_from_hex_is_stable() {
        let secret = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";
        let a = KeyManager::from_hex(secret).unwrap();
        let b = KeyManager::from_hex(&secret[2..]).unwrap();
        assert_eq!(a.public_key_hex(), b.public_key_hex());
        assert_eq!(a.address(), b.address());
        assert_eq!(a.address().len(), 42);
        assert_eq!(
            a.sign_message(b"same").unwrap(),
            b.sign_message(b"same").unwrap()
        );
    }

    #[test]
    fn test_bad_key_material() {
        assert!(matches!(KeyManager::from_hex("not-hex"), Err(KeyError::InvalidKey(_))));
        assert!(matches!(KeyManager::from_hex("00"), Err(KeyError::InvalidKey(_))));
        assert!(KeyManager::from_hex(&"00".repeat(32)).is_err());
    }
}
