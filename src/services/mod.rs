// src/services/mod.rs
//! Business logic built on the ledger authorities.

pub mod api;
pub mod audit;
pub mod issuance_pipeline;
pub mod notifier;
pub mod verifier;
