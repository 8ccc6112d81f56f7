// src/zkp/mod.rs
//! Committed-hash disclosure proofs.

pub mod proof_generation;
pub mod proof_verification;
