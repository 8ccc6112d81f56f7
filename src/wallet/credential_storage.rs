// src/wallet/credential_storage.rs
//! Holder-side credential storage.
//!
//! Keeps the credentials a holder received, keyed by commitment hash. The
//! cleartext attributes only ever live here; the ledger sees the commitment.

use crate::models::credential::{CommitmentHash, HeldCredential};
use std::collections::HashMap;

/// In-memory wallet of held credentials.
///
/// Not synchronized; wrap it in a lock when shared between tasks.
#[derive(Default)]
pub struct CredentialStorage {
    credentials: HashMap<CommitmentHash, HeldCredential>,
}

impl CredentialStorage {
    pub fn new() -> Self {
        CredentialStorage {
            credentials: HashMap::new(),
        }
    }

    /// Stores a credential; replaces an earlier copy with the same commitment.
    pub fn store_credential(&mut self, credential: HeldCredential) {
        self.credentials
            .insert(credential.commitment_hash.clone(), credential);
    }

    pub fn get_credential(&self, commitment: &CommitmentHash) -> Option<&HeldCredential> {
        self.credentials.get(commitment)
    }

    pub fn count_credentials(&self) -> usize {
        self.credentials.len()
    }

    pub fn contains_credential(&self, commitment: &CommitmentHash) -> bool {
        self.credentials.contains_key(commitment)
    }

    /// Returns true if a credential was removed.
    pub fn remove_credential(&mut self, commitment: &CommitmentHash) -> bool {
        self.credentials.remove(commitment).is_some()
    }

    /// Held credentials of one type, e.g. every "UniversityDegree".
    pub fn credentials_of_type(&self, credential_type: &str) -> Vec<&HeldCredential> {
        let mut found: Vec<&HeldCredential> = self
            .credentials
            .values()
            .filter(|c| c.credential_type == credential_type)
            .collect();
        found.sort_by(|a, b| a.commitment_hash.cmp(&b.commitment_hash));
        found
    }
}
