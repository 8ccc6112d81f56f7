// src/blockchain/mod.rs
//! Chain access: the ledger client and the single submission lane in front of it.

pub mod ledger_client;
pub mod submission_lane;
