// src/models/proof.rs
//! Proof artifacts exchanged between holders and verifiers.

use crate::models::credential::{CommitmentHash, ValidityReport};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The verifier-side half of a proof binding: who is asking and the single-use nonce.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct Challenge {
    pub verifier_id: String,
    pub nonce: String,
}

impl Challenge {
    pub fn new(verifier_id: impl Into<String>, nonce: impl Into<String>) -> Self {
        Self {
            verifier_id: verifier_id.into(),
            nonce: nonce.into(),
        }
    }
}

/// A verifier-bound, time-boxed disclosure of selected credential attributes.
///
/// `proof_hash = H(commitment_hash ‖ verifier_id ‖ nonce)`. Attributes outside
/// `disclosed_attributes` are never part of the artifact.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Proof {
    pub proof_id: String,
    pub commitment_hash: CommitmentHash,
    pub verifier_id: String,
    pub nonce: String,
    pub proof_hash: String,
    pub disclosed_attributes: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Proof {
    pub fn challenge(&self) -> Challenge {
        Challenge::new(self.verifier_id.clone(), self.nonce.clone())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Ledger answer to `verify_proof_binding`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct BindingCheck {
    pub valid: bool,
    pub binding_matches: bool,
    pub validity: ValidityReport,
}

/// Why a proof was rejected.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectionReason {
    /// Proof was bound to a different verifier or nonce
    ChallengeMismatch,
    /// Recomputed hash differs from the presented one
    HashMismatch,
    CredentialUnknown,
    CredentialRevoked,
    CredentialExpired,
    /// Pending, suspended or failed credential
    CredentialInactive,
    ProofExpired,
    /// Proof was already consumed by an earlier successful verification
    ProofReplayed,
    MissingAttributes { missing: Vec<String> },
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionReason::ChallengeMismatch => f.write_str("challenge mismatch"),
            RejectionReason::HashMismatch => f.write_str("proof hash mismatch"),
            RejectionReason::CredentialUnknown => f.write_str("credential unknown"),
            RejectionReason::CredentialRevoked => f.write_str("credential revoked"),
            RejectionReason::CredentialExpired => f.write_str("credential expired"),
            RejectionReason::CredentialInactive => f.write_str("credential inactive"),
            RejectionReason::ProofExpired => f.write_str("proof expired"),
            RejectionReason::ProofReplayed => f.write_str("proof already used"),
            RejectionReason::MissingAttributes { missing } => {
                write!(f, "missing attributes: {}", missing.join(", "))
            }
        }
    }
}

/// Result of verifying a proof.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct VerificationOutcome {
    pub valid: bool,
    pub proof_id: String,
    pub commitment_hash: CommitmentHash,
    pub rejection: Option<RejectionReason>,
    pub validity: ValidityReport,
    /// Attributes the verifier may rely on; empty when rejected
    pub disclosed_attributes: BTreeMap<String, String>,
    pub checked_at: DateTime<Utc>,
}
