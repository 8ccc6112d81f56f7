// src/models/job.rs
//! Issuance jobs owned by the issuance pipeline.

use crate::models::credential::{CommitmentHash, CredentialIntent};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    InFlight,
    Succeeded,
    Failed,
    /// Stopped by an administrator before the mint confirmed
    Cancelled,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::Failed | JobState::Cancelled
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Queued => "queued",
            JobState::InFlight => "in_flight",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// One credential mint, tracked from intent to confirmed transaction.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct IssuanceJob {
    pub job_id: String,
    pub issuer_id: String,
    pub intent: CredentialIntent,
    /// Reserved (pending) commitment the job will activate
    pub commitment_hash: CommitmentHash,
    pub attempt_count: u32,
    pub last_error: Option<String>,
    pub state: JobState,
    pub cancel_requested: bool,
    /// Hash of the confirming transaction
    pub tx_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Per-item outcome of a batch issuance.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct BatchItem {
    pub holder_key: String,
    pub job_id: Option<String>,
    pub commitment_hash: Option<CommitmentHash>,
    pub state: Option<JobState>,
    pub error: Option<String>,
}

/// Batch issuance never fails as a whole; it reports counts.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct BatchReport {
    pub succeeded: usize,
    pub failed: usize,
    pub items: Vec<BatchItem>,
}
