// src/zkp/proof_generation.rs
//! Proof generation for selective credential disclosure.
//!
//! A proof binds a credential commitment to one verifier and one nonce:
//!
//! ```text
//! proof_hash = SHA-256(len ‖ commitment_hash ‖ len ‖ verifier_id ‖ len ‖ nonce)
//! ```
//!
//! The artifact carries only the attributes the holder chose to disclose, and it
//! is time-boxed by `expires_at`. Anyone holding the public commitment can
//! recompute the hash; nobody can move the proof to another verifier or nonce
//! without the hash changing.

use crate::error::{CredentialError, CredentialResult};
use crate::models::credential::{CommitmentHash, HeldCredential};
use crate::models::proof::{Challenge, Proof};
use crate::utils::crypto::{hash_fields_hex, is_zero_key};
use crate::utils::serialization::{decode_compact, encode_compact};
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

const PROOF_DOMAIN: &[u8] = b"credential-proof/v1";
const CHALLENGE_DOMAIN: &[u8] = b"verification-challenge/v1";

/// Computes the verifier-bound proof hash.
///
/// Deterministic; changing any one of the three inputs changes the result.
pub fn compute_proof_hash(commitment: &CommitmentHash, verifier_id: &str, nonce: &str) -> String {
    hash_fields_hex(&[
        PROOF_DOMAIN,
        commitment.as_str().as_bytes(),
        verifier_id.as_bytes(),
        nonce.as_bytes(),
    ])
}

/// Derives the challenge of a verification request from its id.
///
/// Holder and verifier compute the same nonce independently, so the nonce never
/// has to travel separately from the request id.
pub fn derive_challenge(request_id: &str, verifier_id: &str) -> Challenge {
    let nonce = hash_fields_hex(&[CHALLENGE_DOMAIN, request_id.as_bytes(), verifier_id.as_bytes()]);
    Challenge::new(verifier_id, nonce)
}

/// Random 128-bit nonce, hex encoded, for ad-hoc challenges.
pub fn fresh_nonce() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Packages a proof for `challenge` disclosing exactly `disclose`.
///
/// # Arguments
/// * `held` - The credential as held by its holder
/// * `disclose` - Names of the attributes to reveal
/// * `challenge` - Verifier id and nonce the proof is bound to
/// * `ttl` - Lifetime of the proof
/// * `now` - Creation time
///
/// # Errors
/// `InvalidInput` when a disclosed attribute is not part of the credential,
/// when the challenge is incomplete, or when `ttl` is not positive.
pub fn generate_proof(
    held: &HeldCredential,
    disclose: &BTreeSet<String>,
    challenge: &Challenge,
    ttl: Duration,
    now: DateTime<Utc>,
) -> CredentialResult<Proof> {
    if challenge.verifier_id.trim().is_empty() || challenge.nonce.trim().is_empty() {
        return Err(CredentialError::InvalidInput(
            "challenge needs a verifier id and a nonce".into(),
        ));
    }
    if ttl <= Duration::zero() {
        return Err(CredentialError::InvalidInput("proof ttl must be positive".into()));
    }
    if is_zero_key(held.commitment_hash.as_str()) {
        return Err(CredentialError::InvalidInput("credential has no commitment".into()));
    }

    let unknown: Vec<&str> = disclose
        .iter()
        .filter(|name| !held.attributes.contains_key(name.as_str()))
        .map(String::as_str)
        .collect();
    if !unknown.is_empty() {
        return Err(CredentialError::InvalidInput(format!(
            "credential has no attribute(s): {}",
            unknown.join(", ")
        )));
    }

    let disclosed_attributes: BTreeMap<String, String> = held
        .attributes
        .iter()
        .filter(|(name, _)| disclose.contains(*name))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();

    Ok(Proof {
        proof_id: Uuid::new_v4().to_string(),
        commitment_hash: held.commitment_hash.clone(),
        verifier_id: challenge.verifier_id.clone(),
        nonce: challenge.nonce.clone(),
        proof_hash: compute_proof_hash(
            &held.commitment_hash,
            &challenge.verifier_id,
            &challenge.nonce,
        ),
        disclosed_attributes,
        created_at: now,
        expires_at: now + ttl,
    })
}

/// Encodes a proof for transport (URL-safe base64 JSON).
pub fn encode_proof(proof: &Proof) -> CredentialResult<String> {
    encode_compact(proof).map_err(|e| CredentialError::InvalidInput(e.to_string()))
}

/// Decodes a proof produced by [`encode_proof`].
pub fn decode_proof(encoded: &str) -> CredentialResult<Proof> {
    decode_compact(encoded).map_err(CredentialError::InvalidInput)
}
