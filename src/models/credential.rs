// src/models/credential.rs
//! Credential commitment records and their lifecycle.
//!
//! The ledger never stores attribute values. A credential on the ledger is a
//! commitment hash plus the metadata needed to decide validity: holder,
//! issuer of record, validity window and lifecycle status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Hex-encoded SHA-256 commitment uniquely identifying a credential instance.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct CommitmentHash(String);

impl CommitmentHash {
    pub fn new(hex: impl Into<String>) -> Self {
        CommitmentHash(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommitmentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CommitmentHash {
    fn from(value: &str) -> Self {
        CommitmentHash(value.to_string())
    }
}

/// Opaque pointer into the blob-storage collaborator (e.g. an IPFS CID).
///
/// Carried through unmodified; its content is never inspected.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(transparent)]
pub struct MetadataRef(pub String);

/// Lifecycle state of a credential.
///
/// ```text
/// Pending -> Active -> {Expired | Revoked | Suspended}
/// Pending -> {Revoked | Failed}
/// Suspended -> Active
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CredentialStatus {
    Pending,
    Active,
    Expired,
    Revoked,
    Suspended,
    /// The mint transaction never confirmed. Distinct from `Revoked`.
    Failed,
}

impl CredentialStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, CredentialStatus::Revoked | CredentialStatus::Failed)
    }

    /// Edges of the lifecycle graph.
    ///
    /// `Expired -> Revoked` is allowed because a persisted `Expired` is only a
    /// cached form of a lazily expired `Active` credential.
    pub fn can_transition_to(self, next: CredentialStatus) -> bool {
        use CredentialStatus::*;
        matches!(
            (self, next),
            (Pending, Active)
                | (Pending, Revoked)
                | (Pending, Failed)
                | (Active, Expired)
                | (Active, Revoked)
                | (Active, Suspended)
                | (Expired, Revoked)
                | (Suspended, Active)
        )
    }
}

impl fmt::Display for CredentialStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CredentialStatus::Pending => "pending",
            CredentialStatus::Active => "active",
            CredentialStatus::Expired => "expired",
            CredentialStatus::Revoked => "revoked",
            CredentialStatus::Suspended => "suspended",
            CredentialStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A credential commitment as recorded on the ledger.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub commitment_hash: CommitmentHash,

    /// Subject of the credential
    pub holder_key: String,

    /// Issuer of record (stays resolvable after issuer removal)
    pub issuer_id: String,

    /// Credential type, e.g. "UniversityDegree" or "AgeOver18"
    pub credential_type: String,

    pub metadata_ref: MetadataRef,

    /// Recorded when the commitment was first appended
    pub issued_at: DateTime<Utc>,

    pub valid_from: DateTime<Utc>,

    /// `None` means the credential never expires
    pub valid_until: Option<DateTime<Utc>>,

    /// Stored status; read through [`Credential::effective_status`]
    pub status: CredentialStatus,

    pub revocation_reason: Option<String>,

    /// Hash of the confirming ledger transaction, once minted
    pub mint_tx: Option<String>,

    /// Bumped on every mutation
    pub version: u64,
}

impl Credential {
    /// True once `now` has reached `valid_until`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.valid_until.map_or(false, |until| now >= until)
    }

    /// Status with lazy expiry applied.
    pub fn effective_status(&self, now: DateTime<Utc>) -> CredentialStatus {
        match self.status {
            CredentialStatus::Active | CredentialStatus::Suspended if self.is_expired_at(now) => {
                CredentialStatus::Expired
            }
            status => status,
        }
    }
}

/// Result of a validity check. Unknown commitments yield all-false flags.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidityReport {
    pub exists: bool,
    pub valid: bool,
    pub revoked: bool,
    pub expired: bool,
    pub suspended: bool,
    pub status: Option<CredentialStatus>,
    pub issued_at: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
}

/// What an issuer asks the pipeline to mint.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CredentialIntent {
    pub holder_key: String,
    pub credential_type: String,
    pub valid_until: Option<DateTime<Utc>>,
    pub metadata_ref: MetadataRef,

    /// Cleartext attributes delivered to the holder, never to the ledger
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl CredentialIntent {
    pub fn new(holder_key: impl Into<String>, credential_type: impl Into<String>) -> Self {
        Self {
            holder_key: holder_key.into(),
            credential_type: credential_type.into(),
            valid_until: None,
            metadata_ref: MetadataRef::default(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn valid_until(mut self, until: DateTime<Utc>) -> Self {
        self.valid_until = Some(until);
        self
    }

    pub fn metadata(mut self, metadata_ref: impl Into<String>) -> Self {
        self.metadata_ref = MetadataRef(metadata_ref.into());
        self
    }

    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }
}

/// A minted credential as handed to its holder: the ledger commitment plus the
/// cleartext attributes the issuer attested.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct HeldCredential {
    pub commitment_hash: CommitmentHash,
    pub issuer_id: String,
    pub credential_type: String,
    pub attributes: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample(status: CredentialStatus, valid_until: Option<DateTime<Utc>>) -> Credential {
        let now = Utc::now();
        Credential {
            commitment_hash: CommitmentHash::new("c0ffee"),
            holder_key: "holder".into(),
            issuer_id: "issuer".into(),
            credential_type: "AgeOver18".into(),
            metadata_ref: MetadataRef::default(),
            issued_at: now,
            valid_from: now,
            valid_until,
            status,
            revocation_reason: None,
            mint_tx: None,
            version: 1,
        }
    }

    #[test]
    fn test_lifecycle_edges() {
        use CredentialStatus::*;
        assert!(Pending.can_transition_to(Active));
        assert!(Active.can_transition_to(Suspended));
        assert!(Suspended.can_transition_to(Active));
        assert!(!Revoked.can_transition_to(Active));
        assert!(!Failed.can_transition_to(Active));
        assert!(!Suspended.can_transition_to(Revoked));
        assert!(!Active.can_transition_to(Pending));
        assert!(Revoked.is_terminal() && Failed.is_terminal());
    }

    #[test]
    fn test_lazy_expiry_overrides_active() {
        let now = Utc::now();
        let cred = sample(CredentialStatus::Active, Some(now - Duration::seconds(1)));
        assert_eq!(cred.effective_status(now), CredentialStatus::Expired);

        let open_ended = sample(CredentialStatus::Active, None);
        assert_eq!(open_ended.effective_status(now), CredentialStatus::Active);
    }

    #[test]
    fn test_expiry_boundary_is_inclusive() {
        let now = Utc::now();
        let cred = sample(CredentialStatus::Active, Some(now));
        assert!(cred.is_expired_at(now));
    }

    #[test]
    fn test_revoked_stays_revoked_after_expiry() {
        let now = Utc::now();
        let cred = sample(CredentialStatus::Revoked, Some(now - Duration::days(1)));
        assert_eq!(cred.effective_status(now), CredentialStatus::Revoked);
    }
}
