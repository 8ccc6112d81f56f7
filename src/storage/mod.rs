// src/storage/mod.rs
//! Storage collaborators for the registry and the ledger.
//!
//! The core only needs keyed reads/writes with unique secondary indexes. The
//! in-memory implementations here back tests and single-process deployments;
//! a relational or chain-backed store plugs in through the same traits.

pub mod credential_store;
pub mod issuer_store;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A unique index already holds the key
    #[error("duplicate {index} '{key}'")]
    Duplicate { index: &'static str, key: String },

    #[error("record '{0}' does not exist")]
    Missing(String),

    /// Optimistic concurrency check failed
    #[error("version conflict on '{key}': stored {stored}, attempted {attempted}")]
    VersionConflict { key: String, stored: u64, attempted: u64 },

    /// Attempt to change an immutable field
    #[error("immutable field '{field}' changed on '{key}'")]
    Immutable { key: String, field: &'static str },
}
