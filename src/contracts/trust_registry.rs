// src/contracts/trust_registry.rs
//! Trust Registry: the set of recognized issuers.
//!
//! Decides which issuers may mint credentials. Registration is open; verifying,
//! unverifying and removing issuers is reserved to a single administrator key.
//! All mutations serialize through one lock, which plays the role the chain's
//! transaction ordering plays in a ledger-backed deployment.

use crate::error::{CredentialError, CredentialResult};
use crate::models::did::Did;
use crate::models::issuer::Issuer;
use crate::services::audit::{AuditEvent, AuditEventKind, AuditTrail};
use crate::storage::issuer_store::IssuerStore;
use crate::storage::StoreError;
use crate::utils::clock::SharedClock;
use crate::utils::crypto::is_zero_key;
use log::{debug, info};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

struct RegistryState {
    store: Box<dyn IssuerStore>,
    admin_key: String,
}

/// Registry of issuers and of the administrator role.
///
/// # Invariants
/// - `verified == false` issuers cannot mint
/// - controller keys and DIDs are unique among active issuers
/// - removed issuers stay resolvable by id for historical verification
pub struct TrustRegistry {
    state: Mutex<RegistryState>,
    clock: SharedClock,
    audit: Arc<AuditTrail>,
}

impl TrustRegistry {
    /// Creates a registry administered by `admin_key`.
    ///
    /// # Errors
    /// [`CredentialError::InvalidInput`] if the admin key is empty or zero.
    pub fn new(
        admin_key: impl Into<String>,
        store: Box<dyn IssuerStore>,
        clock: SharedClock,
        audit: Arc<AuditTrail>,
    ) -> CredentialResult<Self> {
        let admin_key = admin_key.into();
        if is_zero_key(&admin_key) {
            return Err(CredentialError::InvalidInput(
                "administrator key must not be empty or zero".into(),
            ));
        }
        Ok(Self {
            state: Mutex::new(RegistryState { store, admin_key }),
            clock,
            audit,
        })
    }

    fn state(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn require_admin(state: &RegistryState, caller: &str) -> CredentialResult<()> {
        if state.admin_key == caller {
            Ok(())
        } else {
            Err(CredentialError::Unauthorized(
                "operation requires the registry administrator".into(),
            ))
        }
    }

    fn load(state: &RegistryState, issuer_id: &str) -> CredentialResult<Issuer> {
        state
            .store
            .get(issuer_id)
            .filter(Issuer::is_active)
            .ok_or_else(|| CredentialError::NotRegistered(issuer_id.to_string()))
    }

    fn save(state: &mut RegistryState, issuer: Issuer) -> CredentialResult<()> {
        state.store.update(issuer).map_err(store_error)
    }

    /// Registers a new, unverified issuer.
    ///
    /// # Arguments
    /// * `display_name` - Human readable name
    /// * `did` - Public identifier, `did:<method>:<id>`
    /// * `controller_key` - Key the issuer will authenticate with
    ///
    /// # Errors
    /// - `DuplicateIssuer` if the controller key or DID is already registered
    /// - `InvalidDid` / `InvalidInput` for malformed input
    pub fn register_issuer(
        &self,
        display_name: &str,
        did: &str,
        controller_key: &str,
    ) -> CredentialResult<Issuer> {
        let did = Did::parse(did)?;
        if display_name.trim().is_empty() {
            return Err(CredentialError::InvalidInput("display name is empty".into()));
        }
        if is_zero_key(controller_key) {
            return Err(CredentialError::InvalidInput(
                "controller key must not be empty or zero".into(),
            ));
        }

        let issuer = Issuer {
            id: Uuid::new_v4().to_string(),
            display_name: display_name.trim().to_string(),
            did,
            controller_key: controller_key.to_string(),
            verified: false,
            registered_at: self.clock.now(),
            verified_at: None,
            removed_at: None,
        };

        {
            let mut state = self.state();
            state.store.insert(issuer.clone()).map_err(store_error)?;
        }

        info!("Registered issuer {} ({})", issuer.id, issuer.did);
        self.audit.record(
            AuditEvent::new(AuditEventKind::IssuerRegistered, &issuer.id, issuer.registered_at)
                .actor(controller_key)
                .detail(issuer.did.to_string()),
        );
        Ok(issuer)
    }

    /// Marks an issuer as verified. Administrator only.
    ///
    /// # Errors
    /// `Unauthorized`, `NotRegistered`, `AlreadyVerified`
    pub fn verify_issuer(&self, caller: &str, issuer_id: &str) -> CredentialResult<Issuer> {
        let now = self.clock.now();
        let issuer = {
            let mut state = self.state();
            Self::require_admin(&state, caller)?;
            let mut issuer = Self::load(&state, issuer_id)?;
            if issuer.verified {
                return Err(CredentialError::AlreadyVerified(issuer_id.to_string()));
            }
            issuer.verified = true;
            issuer.verified_at = Some(now);
            Self::save(&mut state, issuer.clone())?;
            issuer
        };

        info!("Issuer {} verified", issuer_id);
        self.audit.record(
            AuditEvent::new(AuditEventKind::IssuerVerified, issuer_id, now).actor(caller),
        );
        Ok(issuer)
    }

    /// Withdraws verification. Credentials minted earlier stay valid.
    ///
    /// # Errors
    /// `Unauthorized`, `NotRegistered`, `NotVerified`
    pub fn unverify_issuer(&self, caller: &str, issuer_id: &str) -> CredentialResult<Issuer> {
        let now = self.clock.now();
        let issuer = {
            let mut state = self.state();
            Self::require_admin(&state, caller)?;
            let mut issuer = Self::load(&state, issuer_id)?;
            if !issuer.verified {
                return Err(CredentialError::NotVerified(issuer_id.to_string()));
            }
            issuer.verified = false;
            Self::save(&mut state, issuer.clone())?;
            issuer
        };

        info!("Issuer {} unverified", issuer_id);
        self.audit.record(
            AuditEvent::new(AuditEventKind::IssuerUnverified, issuer_id, now).actor(caller),
        );
        Ok(issuer)
    }

    /// Removes an issuer from active lookup without orphaning its credentials.
    ///
    /// # Errors
    /// `Unauthorized`, `NotRegistered`
    pub fn remove_issuer(&self, caller: &str, issuer_id: &str) -> CredentialResult<Issuer> {
        let now = self.clock.now();
        let issuer = {
            let mut state = self.state();
            Self::require_admin(&state, caller)?;
            let mut issuer = Self::load(&state, issuer_id)?;
            issuer.verified = false;
            issuer.removed_at = Some(now);
            Self::save(&mut state, issuer.clone())?;
            issuer
        };

        info!("Issuer {} removed from active lookup", issuer_id);
        self.audit.record(
            AuditEvent::new(AuditEventKind::IssuerRemoved, issuer_id, now).actor(caller),
        );
        Ok(issuer)
    }

    /// True if `controller_key` belongs to an active, verified issuer.
    pub fn is_verified_issuer(&self, controller_key: &str) -> bool {
        self.resolve_by_controller(controller_key)
            .map_or(false, |issuer| issuer.can_mint())
    }

    /// Resolves an active issuer by DID.
    ///
    /// # Errors
    /// `NotFound` if no active issuer uses this DID.
    pub fn resolve_by_did(&self, did: &str) -> CredentialResult<Issuer> {
        let state = self.state();
        state
            .store
            .id_by_did(did)
            .and_then(|id| state.store.get(&id))
            .ok_or_else(|| CredentialError::not_found("issuer", did))
    }

    /// Resolves an active issuer by controller key.
    pub fn resolve_by_controller(&self, controller_key: &str) -> Option<Issuer> {
        let state = self.state();
        state
            .store
            .id_by_controller(controller_key)
            .and_then(|id| state.store.get(&id))
    }

    /// Looks up an issuer by id, removed issuers included.
    pub fn issuer(&self, issuer_id: &str) -> Option<Issuer> {
        self.state().store.get(issuer_id)
    }

    /// Issuers still in active lookup, in registration order.
    pub fn active_issuers(&self) -> Vec<Issuer> {
        self.state()
            .store
            .all()
            .into_iter()
            .filter(Issuer::is_active)
            .collect()
    }

    /// Returns the issuer allowed to mint with `controller_key`.
    ///
    /// # Errors
    /// `Unauthorized` if the key is unknown, removed or not verified.
    pub fn authorize_minter(&self, controller_key: &str) -> CredentialResult<Issuer> {
        match self.resolve_by_controller(controller_key) {
            Some(issuer) if issuer.can_mint() => Ok(issuer),
            Some(issuer) => {
                debug!("Issuer {} attempted to mint while unverified", issuer.id);
                Err(CredentialError::Unauthorized(format!(
                    "issuer '{}' is not verified",
                    issuer.id
                )))
            }
            None => Err(CredentialError::Unauthorized(
                "caller is not a registered issuer".into(),
            )),
        }
    }

    pub fn is_admin(&self, key: &str) -> bool {
        self.state().admin_key == key
    }

    pub fn admin_key(&self) -> String {
        self.state().admin_key.clone()
    }

    /// Hands the administrator role to `new_admin`.
    ///
    /// # Errors
    /// - `Unauthorized` unless `caller` is the current administrator
    /// - `InvalidInput` for an empty or zero target
    pub fn transfer_admin(&self, caller: &str, new_admin: &str) -> CredentialResult<()> {
        if is_zero_key(new_admin) {
            return Err(CredentialError::InvalidInput(
                "new administrator key must not be empty or zero".into(),
            ));
        }
        let now = self.clock.now();
        {
            let mut state = self.state();
            Self::require_admin(&state, caller)?;
            state.admin_key = new_admin.to_string();
        }

        info!("Registry administrator transferred");
        self.audit.record(
            AuditEvent::new(AuditEventKind::AdminTransferred, new_admin, now).actor(caller),
        );
        Ok(())
    }
}

fn store_error(err: StoreError) -> CredentialError {
    match err {
        StoreError::Duplicate { index, key } => CredentialError::DuplicateIssuer {
            field: index,
            value: key,
        },
        StoreError::Missing(id) => CredentialError::NotRegistered(id),
        other => CredentialError::InvalidInput(other.to_string()),
    }
}
