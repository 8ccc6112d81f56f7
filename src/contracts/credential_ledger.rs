// src/contracts/credential_ledger.rs
//! Credential Ledger: append-only record of credential commitments.
//!
//! Provides issuing, revoking, suspending and validity checking of credential
//! commitments. Attribute values never reach the ledger; a record only holds
//! the commitment hash, the holder, the issuer of record, the validity window
//! and the lifecycle status.
//!
//! Expiry is lazy: a credential whose `valid_until` has passed reports
//! `Expired` on every read even if the stored status still says `Active`.
//! [`CredentialLedger::sweep_expired`] may persist that status in bulk.

use crate::contracts::trust_registry::TrustRegistry;
use crate::error::{CredentialError, CredentialResult};
use crate::models::credential::{
    CommitmentHash, Credential, CredentialIntent, CredentialStatus, MetadataRef, ValidityReport,
};
use crate::models::issuer::Issuer;
use crate::models::proof::{BindingCheck, Challenge};
use crate::services::audit::{AuditEvent, AuditEventKind, AuditTrail};
use crate::storage::credential_store::CredentialStore;
use crate::storage::StoreError;
use crate::utils::clock::SharedClock;
use crate::utils::crypto::{digests_match, hash_fields_hex, is_zero_key};
use crate::zkp::proof_generation::compute_proof_hash;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use rand::RngCore;
use std::sync::{Arc, Mutex, MutexGuard};

const COMMITMENT_DOMAIN: &[u8] = b"credential-commitment/v1";

/// Derives the commitment hash of a credential instance.
///
/// Deterministic in its inputs; the random `nonce` and the issuance timestamp
/// make repeated attribute sets produce distinct commitments.
pub fn compute_commitment(
    issuer_id: &str,
    holder_key: &str,
    credential_type: &str,
    nonce: &[u8],
    issued_at: DateTime<Utc>,
) -> CommitmentHash {
    let timestamp = issued_at
        .timestamp_nanos_opt()
        .unwrap_or_else(|| issued_at.timestamp_micros())
        .to_be_bytes();
    CommitmentHash::new(hash_fields_hex(&[
        COMMITMENT_DOMAIN,
        issuer_id.as_bytes(),
        holder_key.as_bytes(),
        credential_type.as_bytes(),
        nonce,
        &timestamp,
    ]))
}

/// The governing ledger authority for credential commitments.
///
/// Every mutation for any credential runs under one lock, so operations on the
/// same commitment never interleave. Records also carry a version that the
/// store checks on every update.
pub struct CredentialLedger {
    store: Mutex<Box<dyn CredentialStore>>,
    registry: Arc<TrustRegistry>,
    clock: SharedClock,
    audit: Arc<AuditTrail>,
}

impl CredentialLedger {
    pub fn new(
        store: Box<dyn CredentialStore>,
        registry: Arc<TrustRegistry>,
        clock: SharedClock,
        audit: Arc<AuditTrail>,
    ) -> Self {
        Self {
            store: Mutex::new(store),
            registry,
            clock,
            audit,
        }
    }

    fn store(&self) -> MutexGuard<'_, Box<dyn CredentialStore>> {
        self.store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn registry(&self) -> &Arc<TrustRegistry> {
        &self.registry
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Mints a credential directly on the ledger; the record is `Active` at once.
    ///
    /// # Arguments
    /// * `caller` - Controller key of a verified issuer
    /// * `holder_key` - Subject of the credential, must not be empty or zero
    /// * `credential_type` - e.g. "UniversityDegree"
    /// * `valid_until` - Optional end of the validity window
    /// * `metadata_ref` - Pointer into blob storage, passed through untouched
    ///
    /// # Errors
    /// - `Unauthorized` if the caller is not a verified issuer (no record is written)
    /// - `InvalidHolder` for an empty or zero holder key
    pub fn issue_credential(
        &self,
        caller: &str,
        holder_key: &str,
        credential_type: &str,
        valid_until: Option<DateTime<Utc>>,
        metadata_ref: MetadataRef,
    ) -> CredentialResult<Credential> {
        let issuer = self.registry.authorize_minter(caller)?;
        let credential = self.append(
            &issuer,
            holder_key,
            credential_type,
            valid_until,
            metadata_ref,
            CredentialStatus::Active,
        )?;

        info!(
            "Issued credential {} ({}) to holder {}",
            credential.commitment_hash, credential.credential_type, credential.holder_key
        );
        self.audit.record(
            AuditEvent::new(
                AuditEventKind::CredentialIssued,
                credential.commitment_hash.as_str(),
                credential.issued_at,
            )
            .actor(caller)
            .detail(credential.credential_type.clone()),
        );
        Ok(credential)
    }

    /// Records a `Pending` commitment on behalf of the issuance pipeline.
    ///
    /// Same preconditions as [`issue_credential`](Self::issue_credential).
    pub fn reserve_credential(
        &self,
        caller: &str,
        intent: &CredentialIntent,
    ) -> CredentialResult<Credential> {
        let issuer = self.registry.authorize_minter(caller)?;
        let credential = self.append(
            &issuer,
            &intent.holder_key,
            &intent.credential_type,
            intent.valid_until,
            intent.metadata_ref.clone(),
            CredentialStatus::Pending,
        )?;

        debug!("Reserved pending credential {}", credential.commitment_hash);
        self.audit.record(
            AuditEvent::new(
                AuditEventKind::CredentialReserved,
                credential.commitment_hash.as_str(),
                credential.issued_at,
            )
            .actor(caller),
        );
        Ok(credential)
    }

    fn append(
        &self,
        issuer: &Issuer,
        holder_key: &str,
        credential_type: &str,
        valid_until: Option<DateTime<Utc>>,
        metadata_ref: MetadataRef,
        status: CredentialStatus,
    ) -> CredentialResult<Credential> {
        if is_zero_key(holder_key) {
            return Err(CredentialError::InvalidHolder);
        }
        if credential_type.trim().is_empty() {
            return Err(CredentialError::InvalidInput("credential type is empty".into()));
        }

        let issued_at = self.clock.now();
        let mut nonce = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut nonce);

        let credential = Credential {
            commitment_hash: compute_commitment(
                &issuer.id,
                holder_key,
                credential_type,
                &nonce,
                issued_at,
            ),
            holder_key: holder_key.to_string(),
            issuer_id: issuer.id.clone(),
            credential_type: credential_type.to_string(),
            metadata_ref,
            issued_at,
            valid_from: issued_at,
            valid_until,
            status,
            revocation_reason: None,
            mint_tx: None,
            version: 1,
        };

        self.store()
            .append(credential.clone())
            .map_err(|e| store_error(&credential.commitment_hash, e))?;
        Ok(credential)
    }

    /// Moves a stored credential along one lifecycle edge.
    ///
    /// Must be called with the store lock held.
    fn transition(
        store: &mut Box<dyn CredentialStore>,
        mut credential: Credential,
        next: CredentialStatus,
        edit: impl FnOnce(&mut Credential),
    ) -> CredentialResult<Credential> {
        if !credential.status.can_transition_to(next) {
            if credential.status.is_terminal() {
                return Err(CredentialError::AlreadyInTerminalState {
                    entity: "credential",
                    id: credential.commitment_hash.to_string(),
                    state: credential.status.to_string(),
                });
            }
            return Err(CredentialError::InvalidTransition {
                id: credential.commitment_hash.to_string(),
                from: credential.status.to_string(),
                to: next.to_string(),
            });
        }
        credential.status = next;
        credential.version += 1;
        edit(&mut credential);
        store
            .update(credential.clone())
            .map_err(|e| store_error(&credential.commitment_hash, e))?;
        Ok(credential)
    }

    fn load(
        store: &MutexGuard<'_, Box<dyn CredentialStore>>,
        commitment: &CommitmentHash,
    ) -> CredentialResult<Credential> {
        store
            .get(commitment)
            .ok_or_else(|| CredentialError::not_found("credential", commitment.as_str()))
    }

    /// Confirms a pending mint: `Pending -> Active`.
    pub fn activate_credential(
        &self,
        commitment: &CommitmentHash,
        tx_hash: &str,
    ) -> CredentialResult<Credential> {
        let credential = {
            let mut store = self.store();
            let current = Self::load(&store, commitment)?;
            Self::transition(&mut store, current, CredentialStatus::Active, |c| {
                c.mint_tx = Some(tx_hash.to_string());
            })?
        };

        info!("Credential {} active (tx {})", commitment, tx_hash);
        self.audit.record(
            AuditEvent::new(AuditEventKind::CredentialActivated, commitment.as_str(), self.clock.now())
                .detail(tx_hash),
        );
        Ok(credential)
    }

    /// Marks a pending mint as never minted: `Pending -> Failed`.
    pub fn mark_failed(
        &self,
        commitment: &CommitmentHash,
        reason: &str,
    ) -> CredentialResult<Credential> {
        let credential = {
            let mut store = self.store();
            let current = Self::load(&store, commitment)?;
            Self::transition(&mut store, current, CredentialStatus::Failed, |_| {})?
        };

        warn!("Credential {} failed to mint: {}", commitment, reason);
        self.audit.record(
            AuditEvent::new(AuditEventKind::CredentialFailed, commitment.as_str(), self.clock.now())
                .error(reason),
        );
        Ok(credential)
    }

    /// Revokes a credential. Terminal.
    ///
    /// # Errors
    /// - `NotFound` for an unknown commitment
    /// - `Unauthorized` unless `caller` is the issuer of record or the administrator
    /// - `AlreadyRevoked` if it was revoked before
    /// - `InvalidTransition` for a suspended credential
    pub fn revoke_credential(
        &self,
        caller: &str,
        commitment: &CommitmentHash,
        reason: &str,
    ) -> CredentialResult<Credential> {
        if reason.trim().is_empty() {
            return Err(CredentialError::InvalidInput("revocation reason is empty".into()));
        }

        let credential = {
            let mut store = self.store();
            let current = Self::load(&store, commitment)?;
            self.authorize_revocation(caller, &current)?;
            if current.status == CredentialStatus::Revoked {
                return Err(CredentialError::AlreadyRevoked(commitment.to_string()));
            }
            Self::transition(&mut store, current, CredentialStatus::Revoked, |c| {
                c.revocation_reason = Some(reason.to_string());
            })?
        };

        info!("Credential {} revoked: {}", commitment, reason);
        self.audit.record(
            AuditEvent::new(AuditEventKind::CredentialRevoked, commitment.as_str(), self.clock.now())
                .actor(caller)
                .detail(reason),
        );
        Ok(credential)
    }

    fn authorize_revocation(&self, caller: &str, credential: &Credential) -> CredentialResult<()> {
        if self.registry.is_admin(caller) {
            return Ok(());
        }
        let issuer_of_record = self
            .registry
            .issuer(&credential.issuer_id)
            .map_or(false, |issuer| issuer.controller_key == caller);
        if issuer_of_record {
            Ok(())
        } else {
            Err(CredentialError::Unauthorized(
                "only the issuer of record or the administrator may revoke".into(),
            ))
        }
    }

    /// Freezes every active credential of a holder. Administrator only.
    ///
    /// Returns the number of credentials suspended. Lazily expired credentials
    /// are left alone.
    pub fn suspend_holder(&self, caller: &str, holder_key: &str) -> CredentialResult<usize> {
        self.bulk_holder_transition(
            caller,
            holder_key,
            CredentialStatus::Active,
            CredentialStatus::Suspended,
            AuditEventKind::CredentialSuspended,
        )
    }

    /// Lifts a holder suspension: `Suspended -> Active`. Administrator only.
    pub fn reinstate_holder(&self, caller: &str, holder_key: &str) -> CredentialResult<usize> {
        self.bulk_holder_transition(
            caller,
            holder_key,
            CredentialStatus::Suspended,
            CredentialStatus::Active,
            AuditEventKind::CredentialReinstated,
        )
    }

    fn bulk_holder_transition(
        &self,
        caller: &str,
        holder_key: &str,
        from: CredentialStatus,
        to: CredentialStatus,
        kind: AuditEventKind,
    ) -> CredentialResult<usize> {
        if !self.registry.is_admin(caller) {
            return Err(CredentialError::Unauthorized(
                "holder suspension requires the administrator".into(),
            ));
        }
        let now = self.clock.now();
        let changed: Vec<CommitmentHash> = {
            let mut store = self.store();
            let candidates: Vec<Credential> = store
                .by_holder(holder_key)
                .into_iter()
                .filter(|c| c.status == from && !c.is_expired_at(now))
                .collect();
            let mut changed = Vec::with_capacity(candidates.len());
            for credential in candidates {
                let hash = credential.commitment_hash.clone();
                Self::transition(&mut store, credential, to, |_| {})?;
                changed.push(hash);
            }
            changed
        };

        for hash in &changed {
            self.audit
                .record(AuditEvent::new(kind, hash.as_str(), now).actor(caller).detail(holder_key));
        }
        info!("{:?}: {} credential(s) of holder {}", kind, changed.len(), holder_key);
        Ok(changed.len())
    }

    /// Validity of a commitment at the current time.
    ///
    /// Pure read. Unknown commitments produce an all-false report rather than
    /// an error.
    pub fn check_validity(&self, commitment: &CommitmentHash) -> ValidityReport {
        let now = self.clock.now();
        match self.store().get(commitment) {
            Some(credential) => validity_of(&credential, now),
            None => ValidityReport::default(),
        }
    }

    /// Checks that `proof_hash` binds `commitment` to `context`, and that the
    /// credential is valid right now.
    ///
    /// A verification audit event is recorded whatever the outcome.
    pub fn verify_proof_binding(
        &self,
        commitment: &CommitmentHash,
        proof_hash: &str,
        context: &Challenge,
    ) -> BindingCheck {
        let validity = self.check_validity(commitment);
        let expected = compute_proof_hash(commitment, &context.verifier_id, &context.nonce);
        let binding_matches = digests_match(&expected, proof_hash);
        let valid = validity.valid && binding_matches;

        self.audit.record(
            AuditEvent::new(AuditEventKind::ProofBindingChecked, commitment.as_str(), self.clock.now())
                .actor(context.verifier_id.clone())
                .detail(format!("valid={} binding={}", valid, binding_matches)),
        );

        BindingCheck {
            valid,
            binding_matches,
            validity,
        }
    }

    /// Stored record, without lazy expiry applied.
    pub fn credential(&self, commitment: &CommitmentHash) -> Option<Credential> {
        self.store().get(commitment)
    }

    /// All commitments of a holder ordered by issuance time.
    pub fn credentials_by_holder(&self, holder_key: &str) -> Vec<Credential> {
        self.store().by_holder(holder_key)
    }

    /// All commitments minted by an issuer ordered by issuance time.
    pub fn credentials_by_issuer(&self, issuer_id: &str) -> Vec<Credential> {
        self.store().by_issuer(issuer_id)
    }

    /// Persists lazy expiry for every active credential past `valid_until`.
    ///
    /// Returns the number of records updated. Reads never depend on this.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let expired: Vec<CommitmentHash> = {
            let mut store = self.store();
            let due: Vec<Credential> = store
                .scan()
                .into_iter()
                .filter(|c| c.status == CredentialStatus::Active && c.is_expired_at(now))
                .collect();
            let mut expired = Vec::with_capacity(due.len());
            for credential in due {
                let hash = credential.commitment_hash.clone();
                match Self::transition(&mut store, credential, CredentialStatus::Expired, |_| {}) {
                    Ok(_) => expired.push(hash),
                    Err(e) => warn!("Expiry sweep skipped {}: {}", hash, e),
                }
            }
            expired
        };

        for hash in &expired {
            self.audit
                .record(AuditEvent::new(AuditEventKind::CredentialExpired, hash.as_str(), now));
        }
        if !expired.is_empty() {
            info!("Expiry sweep persisted {} credential(s)", expired.len());
        }
        expired.len()
    }

    /// Number of commitments on the ledger.
    pub fn len(&self) -> usize {
        self.store().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Builds the validity report of a stored credential at `now`.
pub fn validity_of(credential: &Credential, now: DateTime<Utc>) -> ValidityReport {
    let status = credential.effective_status(now);
    let revoked = status == CredentialStatus::Revoked;
    let expired = !revoked && credential.is_expired_at(now);
    ValidityReport {
        exists: true,
        valid: status == CredentialStatus::Active,
        revoked,
        expired,
        suspended: status == CredentialStatus::Suspended,
        status: Some(status),
        issued_at: Some(credential.issued_at),
        valid_until: credential.valid_until,
    }
}

fn store_error(commitment: &CommitmentHash, err: StoreError) -> CredentialError {
    match err {
        StoreError::Missing(_) => CredentialError::not_found("credential", commitment.as_str()),
        other => CredentialError::InvalidInput(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::services::audit::MemoryAuditSink;
    use crate::storage::credential_store::MemoryCredentialStore;
    use crate::storage::issuer_store::MemoryIssuerStore;
    use crate::utils::clock::{Clock, ManualClock};
    use chrono::Duration;

    const ADMIN: &str = "admin-key";
    const ISSUER_KEY: &str = "uni-key";

    struct Fixture {
        ledger: CredentialLedger,
        registry: Arc<TrustRegistry>,
        clock: Arc<ManualClock>,
        sink: Arc<MemoryAuditSink>,
        issuer: Issuer,
    }

    fn fixture(verified: bool) -> Fixture {
        let clock = Arc::new(ManualClock::default());
        let sink = Arc::new(MemoryAuditSink::new());
        let audit = Arc::new(AuditTrail::with_sink(sink.clone()));
        let registry = Arc::new(
            TrustRegistry::new(
                ADMIN,
                Box::new(MemoryIssuerStore::new()),
                clock.clone(),
                audit.clone(),
            )
            .unwrap(),
        );
        let mut issuer = registry
            .register_issuer("Example University", "did:web:uni.example", ISSUER_KEY)
            .unwrap();
        if verified {
            issuer = registry.verify_issuer(ADMIN, &issuer.id).unwrap();
        }
        let ledger = CredentialLedger::new(
            Box::new(MemoryCredentialStore::new()),
            registry.clone(),
            clock.clone(),
            audit,
        );
        Fixture {
            ledger,
            registry,
            clock,
            sink,
            issuer,
        }
    }

    fn issue(fx: &Fixture, holder: &str, valid_until: Option<DateTime<Utc>>) -> Credential {
        fx.ledger
            .issue_credential(ISSUER_KEY, holder, "Degree", valid_until, MetadataRef("ipfs://m".into()))
            .unwrap()
    }

    #[test]
    fn test_unverified_issuer_cannot_mint() {
        let fx = fixture(false);
        let err = fx
            .ledger
            .issue_credential(ISSUER_KEY, "alice", "Degree", None, MetadataRef::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert!(fx.ledger.is_empty());

        let stranger = fx
            .ledger
            .issue_credential("stranger", "alice", "Degree", None, MetadataRef::default())
            .unwrap_err();
        assert_eq!(stranger.kind(), ErrorKind::Unauthorized);
        assert!(fx.ledger.is_empty());
    }

    #[test]
    fn test_issue_records_active_commitment() {
        let fx = fixture(true);
        let cred = issue(&fx, "alice", None);

        assert_eq!(cred.status, CredentialStatus::Active);
        assert_eq!(cred.issuer_id, fx.issuer.id);
        assert_eq!(cred.metadata_ref, MetadataRef("ipfs://m".into()));
        assert_eq!(cred.commitment_hash.as_str().len(), 64);

        let report = fx.ledger.check_validity(&cred.commitment_hash);
        assert!(report.exists && report.valid);
        assert!(!report.revoked && !report.expired);
        assert_eq!(fx.sink.count(AuditEventKind::CredentialIssued), 1);
    }

    #[test]
    fn test_zero_holder_rejected() {
        let fx = fixture(true);
        for holder in ["", "0x0000000000000000000000000000000000000000"] {
            let err = fx
                .ledger
                .issue_credential(ISSUER_KEY, holder, "Degree", None, MetadataRef::default())
                .unwrap_err();
            assert_eq!(err, CredentialError::InvalidHolder);
        }
        assert!(fx.ledger.is_empty());
    }

    #[test]
    fn test_repeated_attribute_sets_get_distinct_commitments() {
        let fx = fixture(true);
        let a = issue(&fx, "alice", None);
        let b = issue(&fx, "alice", None);
        assert_ne!(a.commitment_hash, b.commitment_hash);
    }

    #[test]
    fn test_commitment_is_deterministic() {
        let at = Utc::now();
        let a = compute_commitment("i", "h", "t", b"nonce", at);
        let b = compute_commitment("i", "h", "t", b"nonce", at);
        assert_eq!(a, b);
        assert_ne!(a, compute_commitment("i", "h", "t", b"other", at));
        assert_ne!(a, compute_commitment("i", "h2", "t", b"nonce", at));
    }

    #[test]
    fn test_unknown_commitment_is_all_false() {
        let fx = fixture(true);
        let report = fx.ledger.check_validity(&"does-not-exist".into());
        assert_eq!(report, ValidityReport::default());
        assert!(!report.exists && !report.valid && !report.revoked && !report.expired);
    }

    #[test]
    fn test_already_expired_credential() {
        let fx = fixture(true);
        let now = fx.clock.now();
        let cred = issue(&fx, "alice", Some(now));

        let report = fx.ledger.check_validity(&cred.commitment_hash);
        assert!(report.exists);
        assert!(!report.valid);
        assert!(report.expired);
        assert!(!report.revoked);
        assert_eq!(fx.ledger.credential(&cred.commitment_hash).unwrap().status, CredentialStatus::Active);
    }

    #[test]
    fn test_lazy_expiry_as_time_advances() {
        let fx = fixture(true);
        let cred = issue(&fx, "alice", Some(fx.clock.now() + Duration::hours(1)));
        assert!(fx.ledger.check_validity(&cred.commitment_hash).valid);

        fx.clock.advance(Duration::hours(2));
        let report = fx.ledger.check_validity(&cred.commitment_hash);
        assert!(report.expired && !report.valid);
    }

    #[test]
    fn test_revocation_is_permanent() {
        let fx = fixture(true);
        let cred = issue(&fx, "alice", None);

        let revoked = fx
            .ledger
            .revoke_credential(ISSUER_KEY, &cred.commitment_hash, "duplicate")
            .unwrap();
        assert_eq!(revoked.status, CredentialStatus::Revoked);
        assert_eq!(revoked.revocation_reason.as_deref(), Some("duplicate"));

        for _ in 0..3 {
            fx.clock.advance(Duration::days(365));
            let report = fx.ledger.check_validity(&cred.commitment_hash);
            assert!(report.revoked);
            assert!(!report.valid);
        }

        let again = fx
            .ledger
            .revoke_credential(ISSUER_KEY, &cred.commitment_hash, "duplicate")
            .unwrap_err();
        assert_eq!(again.kind(), ErrorKind::AlreadyInTerminalState);
    }

    #[test]
    fn test_revoke_expired_credential() {
        let fx = fixture(true);
        let cred = issue(&fx, "alice", Some(fx.clock.now()));
        fx.ledger
            .revoke_credential(ISSUER_KEY, &cred.commitment_hash, "duplicate")
            .unwrap();
        let report = fx.ledger.check_validity(&cred.commitment_hash);
        assert!(report.revoked && !report.valid);
    }

    #[test]
    fn test_revoke_authorization() {
        let fx = fixture(true);
        let cred = issue(&fx, "alice", None);

        let other = fx
            .registry
            .register_issuer("Other", "did:web:other.example", "other-key")
            .unwrap();
        fx.registry.verify_issuer(ADMIN, &other.id).unwrap();

        let err = fx
            .ledger
            .revoke_credential("other-key", &cred.commitment_hash, "spite")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);

        let err = fx
            .ledger
            .revoke_credential(ISSUER_KEY, &"missing".into(), "gone")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        fx.ledger
            .revoke_credential(ADMIN, &cred.commitment_hash, "abuse")
            .unwrap();
    }

    #[test]
    fn test_issuer_of_record_can_revoke_after_unverification() {
        let fx = fixture(true);
        let cred = issue(&fx, "alice", None);
        fx.registry.unverify_issuer(ADMIN, &fx.issuer.id).unwrap();

        assert!(fx.ledger.check_validity(&cred.commitment_hash).valid);
        fx.ledger
            .revoke_credential(ISSUER_KEY, &cred.commitment_hash, "course withdrawn")
            .unwrap();
    }

    #[test]
    fn test_suspend_and_reinstate_holder() {
        let fx = fixture(true);
        let a = issue(&fx, "alice", None);
        let b = issue(&fx, "alice", None);
        let bob = issue(&fx, "bob", None);

        let err = fx.ledger.suspend_holder(ISSUER_KEY, "alice").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);

        assert_eq!(fx.ledger.suspend_holder(ADMIN, "alice").unwrap(), 2);
        for hash in [&a.commitment_hash, &b.commitment_hash] {
            let report = fx.ledger.check_validity(hash);
            assert!(report.suspended && !report.valid);
        }
        assert!(fx.ledger.check_validity(&bob.commitment_hash).valid);

        let err = fx
            .ledger
            .revoke_credential(ADMIN, &a.commitment_hash, "abuse")
            .unwrap_err();
        assert!(matches!(err, CredentialError::InvalidTransition { .. }));

        assert_eq!(fx.ledger.reinstate_holder(ADMIN, "alice").unwrap(), 2);
        assert!(fx.ledger.check_validity(&a.commitment_hash).valid);
    }

    #[test]
    fn test_pending_lifecycle() {
        let fx = fixture(true);
        let intent = CredentialIntent::new("alice", "Degree");
        let pending = fx.ledger.reserve_credential(ISSUER_KEY, &intent).unwrap();
        assert_eq!(pending.status, CredentialStatus::Pending);
        assert!(!fx.ledger.check_validity(&pending.commitment_hash).valid);

        let active = fx
            .ledger
            .activate_credential(&pending.commitment_hash, "0xabc")
            .unwrap();
        assert_eq!(active.status, CredentialStatus::Active);
        assert_eq!(active.mint_tx.as_deref(), Some("0xabc"));
        assert_eq!(active.version, 2);

        let err = fx
            .ledger
            .mark_failed(&pending.commitment_hash, "late failure")
            .unwrap_err();
        assert!(matches!(err, CredentialError::InvalidTransition { .. }));
    }

    #[test]
    fn test_failed_is_distinct_from_revoked() {
        let fx = fixture(true);
        let pending = fx
            .ledger
            .reserve_credential(ISSUER_KEY, &CredentialIntent::new("alice", "Degree"))
            .unwrap();
        fx.ledger
            .mark_failed(&pending.commitment_hash, "chain unavailable")
            .unwrap();

        let report = fx.ledger.check_validity(&pending.commitment_hash);
        assert_eq!(report.status, Some(CredentialStatus::Failed));
        assert!(!report.revoked && !report.valid);

        let err = fx
            .ledger
            .activate_credential(&pending.commitment_hash, "0x1")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyInTerminalState);
    }

    #[test]
    fn test_queries_by_holder_and_issuer() {
        let fx = fixture(true);
        let first = issue(&fx, "alice", None);
        fx.clock.advance(Duration::seconds(1));
        issue(&fx, "bob", None);
        fx.clock.advance(Duration::seconds(1));
        let third = issue(&fx, "alice", None);

        let alice: Vec<_> = fx
            .ledger
            .credentials_by_holder("alice")
            .into_iter()
            .map(|c| c.commitment_hash)
            .collect();
        assert_eq!(alice, vec![first.commitment_hash, third.commitment_hash]);
        assert_eq!(fx.ledger.credentials_by_issuer(&fx.issuer.id).len(), 3);
    }

    #[test]
    fn test_sweep_persists_expiry() {
        let fx = fixture(true);
        let short = issue(&fx, "alice", Some(fx.clock.now() + Duration::minutes(1)));
        let long = issue(&fx, "alice", None);

        fx.clock.advance(Duration::minutes(5));
        assert_eq!(fx.ledger.sweep_expired(), 1);
        assert_eq!(fx.ledger.sweep_expired(), 0);

        assert_eq!(
            fx.ledger.credential(&short.commitment_hash).unwrap().status,
            CredentialStatus::Expired
        );
        assert!(fx.ledger.check_validity(&short.commitment_hash).expired);
        assert!(fx.ledger.check_validity(&long.commitment_hash).valid);
        assert_eq!(fx.sink.count(AuditEventKind::CredentialExpired), 1);
    }

    #[test]
    fn test_binding_check_is_audited_either_way() {
        let fx = fixture(true);
        let cred = issue(&fx, "alice", None);
        let challenge = Challenge::new("verifier-1", "nonce-1");
        let good = compute_proof_hash(&cred.commitment_hash, "verifier-1", "nonce-1");

        assert!(fx.ledger.verify_proof_binding(&cred.commitment_hash, &good, &challenge).valid);

        let wrong = Challenge::new("verifier-2", "nonce-1");
        let check = fx.ledger.verify_proof_binding(&cred.commitment_hash, &good, &wrong);
        assert!(!check.valid && !check.binding_matches);

        let unknown = fx.ledger.verify_proof_binding(&"nope".into(), &good, &challenge);
        assert!(!unknown.valid);

        assert_eq!(fx.sink.count(AuditEventKind::ProofBindingChecked), 3);
    }
}
