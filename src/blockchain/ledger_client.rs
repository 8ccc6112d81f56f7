// src/blockchain/ledger_client.rs
//! Ledger client abstraction.
//!
//! The engine talks to the chain through [`LedgerClient`]: one call that takes
//! a signed transaction and returns a receipt once it is confirmed. Two
//! implementations live here:
//! - [`SimulatedChain`], an in-memory chain that checks signatures and
//!   per-signer sequence numbers
//! - [`FlakyChain`], a wrapper that fails a fixed number of submissions first

use crate::models::credential::CommitmentHash;
use crate::utils::crypto::hash_fields_hex;
use crate::utils::serialization::canonical_bytes;
use crate::wallet::key_management::verify_signature;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

/// Contract call carried by a transaction.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TransactionPayload {
    pub method: String,
    pub commitment_hash: CommitmentHash,
    pub issuer_id: String,
    pub holder_key: String,
}

impl TransactionPayload {
    pub fn mint(commitment_hash: CommitmentHash, issuer_id: &str, holder_key: &str) -> Self {
        Self {
            method: "mintCredential".into(),
            commitment_hash,
            issuer_id: issuer_id.to_string(),
            holder_key: holder_key.to_string(),
        }
    }
}

/// The bytes covered by the operator signature.
#[derive(Serialize)]
struct SigningEnvelope<'a> {
    sequence: u64,
    signer: &'a str,
    payload: &'a TransactionPayload,
}

/// Canonical signing bytes for a transaction.
pub fn signing_bytes(
    sequence: u64,
    signer: &str,
    payload: &TransactionPayload,
) -> Result<Vec<u8>, ChainError> {
    canonical_bytes(&SigningEnvelope {
        sequence,
        signer,
        payload,
    })
    .map_err(|e| ChainError::Rejected(format!("unencodable payload: {}", e)))
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub sequence: u64,
    /// Hex SEC1 public key of the operator
    pub signer: String,
    pub payload: TransactionPayload,
    /// Hex compact ECDSA signature over [`signing_bytes`]
    pub signature: String,
}

impl SignedTransaction {
    /// Transaction hash: digest over the signed bytes and the signature.
    pub fn tx_hash(&self) -> String {
        let body = signing_bytes(self.sequence, &self.signer, &self.payload).unwrap_or_default();
        format!(
            "0x{}",
            hash_fields_hex(&[b"tx", &body, self.signature.as_bytes()])
        )
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TransactionReceipt {
    pub tx_hash: String,
    pub sequence: u64,
    pub block_height: u64,
    pub confirmed_at: DateTime<Utc>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("chain unavailable: {0}")]
    Unavailable(String),

    #[error("confirmation timed out after {0:?}")]
    Timeout(Duration),

    #[error("sequence mismatch: expected {expected}, got {got}")]
    SequenceMismatch { expected: u64, got: u64 },

    #[error("invalid transaction signature")]
    BadSignature,

    #[error("transaction rejected: {0}")]
    Rejected(String),

    #[error("submission lane is closed")]
    LaneClosed,
}

impl ChainError {
    /// Failures worth resubmitting. Signature and validation rejections are final.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ChainError::Unavailable(_) | ChainError::Timeout(_) | ChainError::SequenceMismatch { .. }
        )
    }
}

#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Submits a signed transaction and waits for its confirmation.
    async fn submit(&self, tx: SignedTransaction) -> Result<TransactionReceipt, ChainError>;
}

#[derive(Default)]
struct ChainState {
    next_sequence: HashMap<String, u64>,
    minted: HashMap<CommitmentHash, TransactionReceipt>,
    height: u64,
}

/// In-memory chain.
///
/// Mints are idempotent per commitment: resubmitting a commitment that is
/// already on chain returns the original receipt and consumes no sequence.
#[derive(Default)]
pub struct SimulatedChain {
    state: Mutex<ChainState>,
    latency: Duration,
}

impl SimulatedChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every confirmation by `latency`.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            state: Mutex::default(),
            latency,
        }
    }

    pub fn height(&self) -> u64 {
        self.state().height
    }

    pub fn receipt_for(&self, commitment: &CommitmentHash) -> Option<TransactionReceipt> {
        self.state().minted.get(commitment).cloned()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, ChainState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn apply(&self, tx: &SignedTransaction) -> Result<TransactionReceipt, ChainError> {
        let body = signing_bytes(tx.sequence, &tx.signer, &tx.payload)?;
        let signature = hex::decode(&tx.signature).map_err(|_| ChainError::BadSignature)?;
        if !verify_signature(&tx.signer, &body, &signature) {
            return Err(ChainError::BadSignature);
        }

        let mut state = self.state();
        if let Some(existing) = state.minted.get(&tx.payload.commitment_hash) {
            debug!("Commitment {} already on chain", tx.payload.commitment_hash);
            return Ok(existing.clone());
        }

        let expected = state.next_sequence.get(&tx.signer).copied().unwrap_or(0);
        if tx.sequence != expected {
            return Err(ChainError::SequenceMismatch {
                expected,
                got: tx.sequence,
            });
        }

        state.height += 1;
        let receipt = TransactionReceipt {
            tx_hash: tx.tx_hash(),
            sequence: tx.sequence,
            block_height: state.height,
            confirmed_at: Utc::now(),
        };
        state.next_sequence.insert(tx.signer.clone(), expected + 1);
        state
            .minted
            .insert(tx.payload.commitment_hash.clone(), receipt.clone());
        Ok(receipt)
    }
}

#[async_trait]
impl LedgerClient for SimulatedChain {
    async fn submit(&self, tx: SignedTransaction) -> Result<TransactionReceipt, ChainError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.apply(&tx)
    }
}

/// Fails the first `failures` submissions with [`ChainError::Unavailable`],
/// then delegates to the inner client.
pub struct FlakyChain {
    inner: Arc<dyn LedgerClient>,
    remaining_failures: AtomicU32,
    calls: AtomicU32,
}

impl FlakyChain {
    pub fn new(inner: Arc<dyn LedgerClient>, failures: u32) -> Self {
        Self {
            inner,
            remaining_failures: AtomicU32::new(failures),
            calls: AtomicU32::new(0),
        }
    }

    /// Number of submissions seen so far.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LedgerClient for FlakyChain {
    async fn submit(&self, tx: SignedTransaction) -> Result<TransactionReceipt, ChainError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let fail = self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            warn!("Injected chain failure for sequence {}", tx.sequence);
            return Err(ChainError::Unavailable("injected failure".into()));
        }
        self.inner.submit(tx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::key_management::KeyManager;

    fn signed(keys: &KeyManager, sequence: u64, commitment: &str) -> SignedTransaction {
        let signer = keys.public_key_hex();
        let payload = TransactionPayload::mint(commitment.into(), "issuer-1", "alice");
        let body = signing_bytes(sequence, &signer, &payload).unwrap();
        SignedTransaction {
            sequence,
            signer,
            payload,
            signature: hex::encode(keys.sign_message(&body).unwrap()),
        }
    }

    #[tokio::test]
    async fn test_chain_accepts_in_order() {
        let chain = SimulatedChain::new();
        let keys = KeyManager::new();

        let first = chain.submit(signed(&keys, 0, "c1")).await.unwrap();
        let second = chain.submit(signed(&keys, 1, "c2")).await.unwrap();
        assert_eq!(first.block_height, 1);
        assert_eq!(second.sequence, 1);
        assert!(second.tx_hash.starts_with("0x"));
        assert_eq!(chain.height(), 2);
    }

    #[tokio::test]
    async fn test_chain_rejects_gaps_and_forgeries() {
        let chain = SimulatedChain::new();
        let keys = KeyManager::new();

        let gap = chain.submit(signed(&keys, 3, "c1")).await.unwrap_err();
        assert_eq!(gap, ChainError::SequenceMismatch { expected: 0, got: 3 });

        let mut forged = signed(&keys, 0, "c1");
        forged.payload.holder_key = "mallory".into();
        assert_eq!(chain.submit(forged).await.unwrap_err(), ChainError::BadSignature);
        assert_eq!(chain.height(), 0);
    }

    #[tokio::test]
    async fn test_resubmitted_mint_is_idempotent() {
        let chain = SimulatedChain::new();
        let keys = KeyManager::new();
        let receipt = chain.submit(signed(&keys, 0, "c1")).await.unwrap();
        let again = chain.submit(signed(&keys, 1, "c1")).await.unwrap();
        assert_eq!(receipt, again);
        assert_eq!(chain.receipt_for(&"c1".into()), Some(receipt));
        assert_eq!(chain.height(), 1);
    }

    #[test]
    fn test_flaky_chain_fails_then_recovers() {
        let chain = FlakyChain::new(Arc::new(SimulatedChain::new()), 2);
        let keys = KeyManager::new();

        for _ in 0..2 {
            let err = tokio_test::block_on(chain.submit(signed(&keys, 0, "c1"))).unwrap_err();
            assert!(err.is_transient());
        }
        tokio_test::assert_ok!(tokio_test::block_on(chain.submit(signed(&keys, 0, "c1"))));
        assert_eq!(chain.calls(), 3);
    }

    #[test]
    fn test_transient_classification() {
        assert!(ChainError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(!ChainError::BadSignature.is_transient());
        assert!(!ChainError::Rejected("no".into()).is_transient());
    }
}
