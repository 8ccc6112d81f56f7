// src/wallet/zkp_generation.rs
//! Holder-side proof packaging.
//!
//! Looks a credential up in the holder's wallet and builds a verifier-bound
//! disclosure proof from it.

use crate::error::{CredentialError, CredentialResult};
use crate::models::credential::CommitmentHash;
use crate::models::proof::{Challenge, Proof};
use crate::wallet::credential_storage::CredentialStorage;
use crate::zkp::proof_generation::generate_proof;
use chrono::{DateTime, Duration, Utc};
use log::debug;
use std::collections::BTreeSet;

/// Generates a proof for a credential held in `wallet`.
///
/// # Errors
/// - `NotFound` if the wallet does not hold `commitment`
/// - `InvalidInput` if a disclosed attribute is not part of the credential
pub fn generate_credential_proof(
    wallet: &CredentialStorage,
    commitment: &CommitmentHash,
    disclose: &BTreeSet<String>,
    challenge: &Challenge,
    ttl: Duration,
    now: DateTime<Utc>,
) -> CredentialResult<Proof> {
    let held = wallet
        .get_credential(commitment)
        .ok_or_else(|| CredentialError::not_found("held credential", commitment.as_str()))?;
    let proof = generate_proof(held, disclose, challenge, ttl, now)?;
    debug!(
        "Holder proof {} for verifier {} discloses {} attribute(s)",
        proof.proof_id,
        challenge.verifier_id,
        proof.disclosed_attributes.len()
    );
    Ok(proof)
}
