// src/utils/mod.rs
//! Helper functions: hashing, serialization and time.

pub mod clock;
pub mod crypto;
pub mod serialization;
