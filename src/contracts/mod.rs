// src/contracts/mod.rs
//! Ledger authorities: who may issue, and what was issued.

pub mod credential_ledger;
pub mod trust_registry;
