// src/storage/issuer_store.rs
//! Issuer records keyed by id, with unique controller-key and DID indexes.

use crate::models::issuer::Issuer;
use crate::storage::StoreError;
use std::collections::HashMap;

/// Storage collaborator of the trust registry.
///
/// Secondary indexes only cover active (not removed) issuers; removed records
/// stay readable by id.
pub trait IssuerStore: Send + Sync {
    /// Inserts a new issuer. Fails if the id, controller key or DID is taken.
    fn insert(&mut self, issuer: Issuer) -> Result<(), StoreError>;

    /// Replaces an existing record and refreshes its indexes.
    fn update(&mut self, issuer: Issuer) -> Result<(), StoreError>;

    fn get(&self, id: &str) -> Option<Issuer>;

    fn id_by_controller(&self, controller_key: &str) -> Option<String>;

    fn id_by_did(&self, did: &str) -> Option<String>;

    /// Every record, removed ones included.
    fn all(&self) -> Vec<Issuer>;
}

/// O(1) hash-indexed issuer storage.
#[derive(Default)]
pub struct MemoryIssuerStore {
    issuers: HashMap<String, Issuer>,
    by_controller: HashMap<String, String>,
    by_did: HashMap<String, String>,
}

impl MemoryIssuerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn unindex(&mut self, issuer: &Issuer) {
        if self.by_controller.get(&issuer.controller_key) == Some(&issuer.id) {
            self.by_controller.remove(&issuer.controller_key);
        }
        if self.by_did.get(issuer.did.as_str()) == Some(&issuer.id) {
            self.by_did.remove(issuer.did.as_str());
        }
    }

    fn check_free(&self, issuer: &Issuer) -> Result<(), StoreError> {
        if let Some(owner) = self.by_controller.get(&issuer.controller_key) {
            if owner != &issuer.id {
                return Err(StoreError::Duplicate {
                    index: "controller_key",
                    key: issuer.controller_key.clone(),
                });
            }
        }
        if let Some(owner) = self.by_did.get(issuer.did.as_str()) {
            if owner != &issuer.id {
                return Err(StoreError::Duplicate {
                    index: "did",
                    key: issuer.did.to_string(),
                });
            }
        }
        Ok(())
    }

    fn index(&mut self, issuer: &Issuer) {
        if issuer.is_active() {
            self.by_controller
                .insert(issuer.controller_key.clone(), issuer.id.clone());
            self.by_did.insert(issuer.did.to_string(), issuer.id.clone());
        }
    }
}

impl IssuerStore for MemoryIssuerStore {
    fn insert(&mut self, issuer: Issuer) -> Result<(), StoreError> {
        if self.issuers.contains_key(&issuer.id) {
            return Err(StoreError::Duplicate {
                index: "id",
                key: issuer.id.clone(),
            });
        }
        self.check_free(&issuer)?;
        self.index(&issuer);
        self.issuers.insert(issuer.id.clone(), issuer);
        Ok(())
    }

    fn update(&mut self, issuer: Issuer) -> Result<(), StoreError> {
        let previous = self
            .issuers
            .get(&issuer.id)
            .cloned()
            .ok_or_else(|| StoreError::Missing(issuer.id.clone()))?;
        if issuer.is_active() {
            self.check_free(&issuer)?;
        }
        self.unindex(&previous);
        self.index(&issuer);
        self.issuers.insert(issuer.id.clone(), issuer);
        Ok(())
    }

    fn get(&self, id: &str) -> Option<Issuer> {
        self.issuers.get(id).cloned()
    }

    fn id_by_controller(&self, controller_key: &str) -> Option<String> {
        self.by_controller.get(controller_key).cloned()
    }

    fn id_by_did(&self, did: &str) -> Option<String> {
        self.by_did.get(did).cloned()
    }

    fn all(&self) -> Vec<Issuer> {
        let mut all: Vec<Issuer> = self.issuers.values().cloned().collect();
        all.sort_by(|a, b| a.registered_at.cmp(&b.registered_at).then(a.id.cmp(&b.id)));
        all
    }
}
