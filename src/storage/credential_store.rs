// src/storage/credential_store.rs
//! Append-only credential commitment storage.
//!
//! Records are keyed by commitment hash (unique) with secondary indexes by
//! holder and by issuer. Nothing is ever deleted; updates are limited to
//! lifecycle fields and guarded by an optimistic version check.

use crate::models::credential::{CommitmentHash, Credential};
use crate::storage::StoreError;
use std::collections::HashMap;

/// Storage collaborator of the credential ledger.
pub trait CredentialStore: Send + Sync {
    /// Appends a new commitment. Fails on a duplicate hash.
    fn append(&mut self, credential: Credential) -> Result<(), StoreError>;

    /// Stores a new revision of an existing record.
    ///
    /// `credential.version` must be exactly one above the stored version, and
    /// the holder, issuer and type must be unchanged.
    fn update(&mut self, credential: Credential) -> Result<(), StoreError>;

    fn get(&self, commitment: &CommitmentHash) -> Option<Credential>;

    /// Credentials of a holder in issuance order.
    fn by_holder(&self, holder_key: &str) -> Vec<Credential>;

    /// Credentials minted by an issuer in issuance order.
    fn by_issuer(&self, issuer_id: &str) -> Vec<Credential>;

    /// Every stored record in issuance order.
    fn scan(&self) -> Vec<Credential>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory storage for credential commitments.
#[derive(Default)]
pub struct MemoryCredentialStore {
    credentials: HashMap<CommitmentHash, Credential>,
    /// Append order, used for issuance-ordered scans
    order: Vec<CommitmentHash>,
    by_holder: HashMap<String, Vec<CommitmentHash>>,
    by_issuer: HashMap<String, Vec<CommitmentHash>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn collect(&self, hashes: Option<&Vec<CommitmentHash>>) -> Vec<Credential> {
        let mut found: Vec<Credential> = hashes
            .map(|hashes| {
                hashes
                    .iter()
                    .filter_map(|h| self.credentials.get(h).cloned())
                    .collect()
            })
            .unwrap_or_default();
        // append order already follows issuance; the stable sort only guards
        // against clock skew between appends
        found.sort_by(|a, b| a.issued_at.cmp(&b.issued_at));
        found
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn append(&mut self, credential: Credential) -> Result<(), StoreError> {
        let key = credential.commitment_hash.clone();
        if self.credentials.contains_key(&key) {
            return Err(StoreError::Duplicate {
                index: "commitment_hash",
                key: key.to_string(),
            });
        }
        self.by_holder
            .entry(credential.holder_key.clone())
            .or_default()
            .push(key.clone());
        self.by_issuer
            .entry(credential.issuer_id.clone())
            .or_default()
            .push(key.clone());
        self.order.push(key.clone());
        self.credentials.insert(key, credential);
        Ok(())
    }

    fn update(&mut self, credential: Credential) -> Result<(), StoreError> {
        let key = credential.commitment_hash.to_string();
        let stored = self
            .credentials
            .get(&credential.commitment_hash)
            .ok_or_else(|| StoreError::Missing(key.clone()))?;

        if credential.version != stored.version + 1 {
            return Err(StoreError::VersionConflict {
                key,
                stored: stored.version,
                attempted: credential.version,
            });
        }
        let immutable = [
            ("holder_key", stored.holder_key == credential.holder_key),
            ("issuer_id", stored.issuer_id == credential.issuer_id),
            ("credential_type", stored.credential_type == credential.credential_type),
            ("issued_at", stored.issued_at == credential.issued_at),
        ];
        if let Some((field, _)) = immutable.iter().find(|(_, same)| !same) {
            return Err(StoreError::Immutable { key, field });
        }

        self.credentials
            .insert(credential.commitment_hash.clone(), credential);
        Ok(())
    }

    fn get(&self, commitment: &CommitmentHash) -> Option<Credential> {
        self.credentials.get(commitment).cloned()
    }

    fn by_holder(&self, holder_key: &str) -> Vec<Credential> {
        self.collect(self.by_holder.get(holder_key))
    }

    fn by_issuer(&self, issuer_id: &str) -> Vec<Credential> {
        self.collect(self.by_issuer.get(issuer_id))
    }

    fn scan(&self) -> Vec<Credential> {
        self.collect(Some(&self.order))
    }

    fn len(&self) -> usize {
        self.credentials.len()
    }
}
