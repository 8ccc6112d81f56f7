// src/models/mod.rs
//! Data structures shared by every component.

pub mod credential;
pub mod did;
pub mod issuer;
pub mod job;
pub mod proof;
pub mod verification;
