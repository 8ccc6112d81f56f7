// src/wallet/mod.rs
//! Holder wallet and operator keys.

pub mod credential_storage;
pub mod key_management;
pub mod zkp_generation;
