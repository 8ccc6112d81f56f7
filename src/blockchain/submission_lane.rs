// src/blockchain/submission_lane.rs
//! Submission lane: the single path every ledger transaction takes.
//!
//! One task owns the operator key and the sequence counter. Workers hand it
//! payloads over an mpsc channel and wait for the receipt on a oneshot. The
//! task assigns the next sequence number, signs, submits with a bounded
//! confirmation timeout, and only advances the counter on confirmation.

use crate::blockchain::ledger_client::{
    signing_bytes, ChainError, LedgerClient, SignedTransaction, TransactionPayload,
    TransactionReceipt,
};
use crate::wallet::key_management::KeyManager;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

const LANE_CAPACITY: usize = 64;

struct Submission {
    payload: TransactionPayload,
    reply: oneshot::Sender<Result<TransactionReceipt, ChainError>>,
}

/// Cloneable sender side of the lane.
#[derive(Clone)]
pub struct SubmissionHandle {
    sender: mpsc::Sender<Submission>,
    operator: String,
}

impl SubmissionHandle {
    /// Queues `payload` and waits for its receipt.
    pub async fn submit(
        &self,
        payload: TransactionPayload,
    ) -> Result<TransactionReceipt, ChainError> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(Submission { payload, reply })
            .await
            .map_err(|_| ChainError::LaneClosed)?;
        response.await.map_err(|_| ChainError::LaneClosed)?
    }

    /// Address of the operator key signing for this lane.
    pub fn operator(&self) -> &str {
        &self.operator
    }
}

pub struct SubmissionLane {
    client: Arc<dyn LedgerClient>,
    keys: KeyManager,
    confirmation_timeout: Duration,
    sequence: u64,
}

impl SubmissionLane {
    /// Starts the lane task on the current tokio runtime.
    ///
    /// The task stops once every [`SubmissionHandle`] is dropped.
    pub fn spawn(
        client: Arc<dyn LedgerClient>,
        keys: KeyManager,
        confirmation_timeout: Duration,
    ) -> SubmissionHandle {
        let (sender, receiver) = mpsc::channel(LANE_CAPACITY);
        let operator = keys.address();
        let lane = SubmissionLane {
            client,
            keys,
            confirmation_timeout,
            sequence: 0,
        };
        info!("Submission lane started for operator {}", operator);
        tokio::spawn(lane.run(receiver));
        SubmissionHandle { sender, operator }
    }

    async fn run(mut self, mut receiver: mpsc::Receiver<Submission>) {
        while let Some(submission) = receiver.recv().await {
            let result = self.process(submission.payload).await;
            if submission.reply.send(result).is_err() {
                debug!("Submitter went away before its receipt arrived");
            }
        }
        info!("Submission lane stopped at sequence {}", self.sequence);
    }

    async fn process(
        &mut self,
        payload: TransactionPayload,
    ) -> Result<TransactionReceipt, ChainError> {
        let tx = self.sign(payload)?;
        let sequence = tx.sequence;

        let outcome = match tokio::time::timeout(self.confirmation_timeout, self.client.submit(tx)).await {
            Ok(result) => result,
            Err(_) => Err(ChainError::Timeout(self.confirmation_timeout)),
        };

        match &outcome {
            Ok(receipt) => {
                if receipt.sequence == sequence {
                    self.sequence += 1;
                }
                debug!("Sequence {} confirmed as {}", sequence, receipt.tx_hash);
            }
            Err(ChainError::SequenceMismatch { expected, .. }) => {
                warn!("Lane resyncing sequence {} -> {}", self.sequence, expected);
                self.sequence = *expected;
            }
            Err(e) => warn!("Submission at sequence {} failed: {}", sequence, e),
        }
        outcome
    }

    fn sign(&self, payload: TransactionPayload) -> Result<SignedTransaction, ChainError> {
        let signer = self.keys.public_key_hex();
        let body = signing_bytes(self.sequence, &signer, &payload)?;
        let signature = self
            .keys
            .sign_message(&body)
            .map_err(|e| ChainError::Rejected(e.to_string()))?;
        Ok(SignedTransaction {
            sequence: self.sequence,
            signer,
            payload,
            signature: hex::encode(signature),
        })
    }
}
