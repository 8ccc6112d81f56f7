// src/models/verification.rs
//! Verification requests created by verifiers.

use crate::models::proof::VerificationOutcome;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Completed,
    Failed,
    Expired,
}

impl RequestStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Completed => "completed",
            RequestStatus::Failed => "failed",
            RequestStatus::Expired => "expired",
        };
        f.write_str(name)
    }
}

/// A verifier's declaration of what it needs proven, and by when.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct VerificationRequest {
    pub request_id: String,
    pub verifier_id: String,
    pub required_attributes: BTreeSet<String>,
    /// Challenge nonce, derived from the request id
    pub nonce: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub callback_url: Option<String>,
    pub status: RequestStatus,
    pub result: Option<VerificationOutcome>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl VerificationRequest {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Body of the single outbound notification sent per terminal request.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CallbackPayload {
    pub request_id: String,
    pub status: RequestStatus,
    pub result: Option<VerificationOutcome>,
    pub timestamp: DateTime<Utc>,
}

impl CallbackPayload {
    pub fn for_request(request: &VerificationRequest, timestamp: DateTime<Utc>) -> Self {
        Self {
            request_id: request.request_id.clone(),
            status: request.status,
            result: request.result.clone(),
            timestamp,
        }
    }
}
