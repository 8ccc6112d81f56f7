// src/lib.rs
//! # Credential Ledger
//!
//! Trust and lifecycle engine for verifiable credentials.
//!
//! ## Layers
//! 1. **Contracts**: trust registry of issuers and the append-only credential ledger
//! 2. **Blockchain**: `LedgerClient` and the submission lane that signs and sequences mints
//! 3. **ZKP**: verifier-bound committed-hash proofs
//! 4. **Services**: issuance pipeline, verification exchange, audit trail and the API facade
//! 5. **Wallet**: holder credential storage and operator keys

pub mod blockchain;
pub mod config;
pub mod contracts;
pub mod error;
pub mod models;
pub mod services;
pub mod storage;
pub mod utils;
pub mod wallet;
pub mod zkp;

pub use error::{CredentialError, CredentialResult, ErrorKind};
pub use services::api::CredentialService;
