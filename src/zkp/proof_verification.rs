// src/zkp/proof_verification.rs
//! Proof verification against the credential ledger.
//!
//! Checks run in a fixed order and the first failure decides the rejection:
//! 1. The proof is bound to the expected challenge
//! 2. The presented hash equals the recomputed one
//! 3. The ledger confirms the binding and current validity
//! 4. The proof has not expired
//! 5. Every required attribute is disclosed
//! 6. The proof was not consumed before
//!
//! A proof that passes every check is consumed; presenting it again yields
//! [`RejectionReason::ProofReplayed`]. Consumption is keyed on the proof hash,
//! which covers the commitment, verifier and nonce, so a copy with a fresh
//! `proof_id` is still a replay. `expires_at` is asserted by the holder, so a
//! consumed hash is kept until its proof expired and the replay retention
//! window elapsed, whichever is later.

use crate::contracts::credential_ledger::CredentialLedger;
use crate::models::credential::CredentialStatus;
use crate::models::proof::{Challenge, Proof, RejectionReason, VerificationOutcome};
use crate::utils::clock::SharedClock;
use crate::utils::crypto::digests_match;
use crate::zkp::proof_generation::compute_proof_hash;
use chrono::{DateTime, Duration, Utc};
use log::{debug, info};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

/// Default time a consumed proof hash is remembered after verification.
pub const DEFAULT_REPLAY_RETENTION_SECS: i64 = 86_400;

pub struct ProofVerifier {
    ledger: Arc<CredentialLedger>,
    /// Consumed proof hash -> time it may be forgotten
    consumed: Mutex<HashMap<String, DateTime<Utc>>>,
    retention: Duration,
    clock: SharedClock,
}

impl ProofVerifier {
    pub fn new(ledger: Arc<CredentialLedger>, clock: SharedClock) -> Self {
        Self {
            ledger,
            consumed: Mutex::new(HashMap::new()),
            retention: Duration::seconds(DEFAULT_REPLAY_RETENTION_SECS),
            clock,
        }
    }

    /// Overrides how long consumed proof hashes are remembered.
    pub fn with_replay_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    fn consumed(&self) -> MutexGuard<'_, HashMap<String, DateTime<Utc>>> {
        self.consumed.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Verifies `proof` for `expected` and consumes it on success.
    ///
    /// Never fails; a rejected proof is reported through the outcome.
    pub fn verify_proof(
        &self,
        proof: &Proof,
        expected: &Challenge,
        required_attributes: &BTreeSet<String>,
    ) -> VerificationOutcome {
        let now = self.clock.now();
        let binding = self
            .ledger
            .verify_proof_binding(&proof.commitment_hash, &proof.proof_hash, expected);

        let rejection = if proof.challenge() != *expected {
            Some(RejectionReason::ChallengeMismatch)
        } else if !digests_match(
            &compute_proof_hash(&proof.commitment_hash, &proof.verifier_id, &proof.nonce),
            &proof.proof_hash,
        ) {
            Some(RejectionReason::HashMismatch)
        } else if !binding.valid {
            Some(ledger_rejection(&binding.validity.status, binding.binding_matches))
        } else if proof.is_expired_at(now) {
            Some(RejectionReason::ProofExpired)
        } else {
            let missing: Vec<String> = required_attributes
                .iter()
                .filter(|name| !proof.disclosed_attributes.contains_key(*name))
                .cloned()
                .collect();
            if !missing.is_empty() {
                Some(RejectionReason::MissingAttributes { missing })
            } else if !self.consume(proof, now) {
                Some(RejectionReason::ProofReplayed)
            } else {
                None
            }
        };

        match &rejection {
            None => info!(
                "Proof {} accepted for verifier {}",
                proof.proof_id, expected.verifier_id
            ),
            Some(reason) => debug!("Proof {} rejected: {}", proof.proof_id, reason),
        }

        VerificationOutcome {
            valid: rejection.is_none(),
            proof_id: proof.proof_id.clone(),
            commitment_hash: proof.commitment_hash.clone(),
            disclosed_attributes: if rejection.is_none() {
                proof.disclosed_attributes.clone()
            } else {
                BTreeMap::new()
            },
            rejection,
            validity: binding.validity,
            checked_at: now,
        }
    }

    /// Marks a proof hash as used. Returns false when it was already used.
    ///
    /// Forgets hashes whose retention has passed.
    fn consume(&self, proof: &Proof, now: DateTime<Utc>) -> bool {
        let mut consumed = self.consumed();
        consumed.retain(|_, forget_at| *forget_at > now);
        if consumed.contains_key(&proof.proof_hash) {
            return false;
        }
        let forget_at = proof.expires_at.max(now + self.retention);
        consumed.insert(proof.proof_hash.clone(), forget_at);
        true
    }

    pub fn is_consumed(&self, proof_hash: &str) -> bool {
        self.consumed().contains_key(proof_hash)
    }

    /// Number of proof hashes currently remembered.
    pub fn consumed_count(&self) -> usize {
        self.consumed().len()
    }
}

fn ledger_rejection(status: &Option<CredentialStatus>, binding_matches: bool) -> RejectionReason {
    match status {
        None => RejectionReason::CredentialUnknown,
        Some(CredentialStatus::Revoked) => RejectionReason::CredentialRevoked,
        Some(CredentialStatus::Expired) => RejectionReason::CredentialExpired,
        Some(CredentialStatus::Active) if !binding_matches => RejectionReason::HashMismatch,
        Some(_) => RejectionReason::CredentialInactive,
    }
}
