// src/models/issuer.rs
//! Issuer record kept by the trust registry.

use crate::models::did::Did;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An entity that may mint credentials once verified by the administrator.
///
/// Issuers are never hard-deleted: removal stamps `removed_at` and drops the
/// record from the active lookup indexes, but credentials minted earlier keep
/// resolving their `issuer_id`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Issuer {
    /// Registry-assigned identifier
    pub id: String,

    /// Human readable name, e.g. "Example University"
    pub display_name: String,

    /// Public identifier of the issuer
    pub did: Did,

    /// Key the issuer authenticates with when minting or revoking
    pub controller_key: String,

    /// Only verified issuers may mint
    pub verified: bool,

    pub registered_at: DateTime<Utc>,

    pub verified_at: Option<DateTime<Utc>>,

    /// Set when the administrator removed the issuer from active lookup
    pub removed_at: Option<DateTime<Utc>>,
}

impl Issuer {
    /// True when the issuer is verified and not removed.
    pub fn can_mint(&self) -> bool {
        self.verified && self.removed_at.is_none()
    }

    pub fn is_active(&self) -> bool {
        self.removed_at.is_none()
    }
}
