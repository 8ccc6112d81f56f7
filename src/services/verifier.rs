// src/services/verifier.rs
//! Verification exchange.
//!
//! A verifier opens a [`VerificationRequest`] naming the attributes it needs and
//! how long it will wait. The holder answers with a proof bound to the request's
//! challenge. Each request resolves exactly once:
//!
//! ```text
//! Pending -> Completed   valid proof within the window
//! Pending -> Failed      rejected proof within the window
//! Pending -> Expired     window elapsed (seen on query, sweep or late submission)
//! ```
//!
//! Every resolution fires one best-effort callback when the request carries a
//! callback URL. A failed callback is audited and never changes the result.

use crate::error::{CredentialError, CredentialResult};
use crate::models::proof::{Challenge, Proof};
use crate::models::verification::{CallbackPayload, RequestStatus, VerificationRequest};
use crate::services::audit::{AuditEvent, AuditEventKind, AuditTrail};
use crate::services::notifier::CallbackNotifier;
use crate::utils::clock::SharedClock;
use crate::utils::serialization::{decode_compact, encode_compact};
use crate::zkp::proof_generation::derive_challenge;
use crate::zkp::proof_verification::ProofVerifier;
use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

/// Out-of-band (QR code) form of a verification request.
///
/// Carries everything a holder wallet needs to build its proof offline.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct OutOfBandInvitation {
    pub request_id: String,
    pub verifier_id: String,
    pub nonce: String,
    pub required_attributes: BTreeSet<String>,
    pub expires_at: DateTime<Utc>,
}

impl OutOfBandInvitation {
    pub fn for_request(request: &VerificationRequest) -> Self {
        Self {
            request_id: request.request_id.clone(),
            verifier_id: request.verifier_id.clone(),
            nonce: request.nonce.clone(),
            required_attributes: request.required_attributes.clone(),
            expires_at: request.expires_at,
        }
    }

    /// URL-safe base64 JSON, suitable for a QR payload.
    pub fn encode(&self) -> CredentialResult<String> {
        encode_compact(self).map_err(|e| CredentialError::InvalidInput(e.to_string()))
    }

    pub fn decode(encoded: &str) -> CredentialResult<Self> {
        decode_compact(encoded).map_err(CredentialError::InvalidInput)
    }

    pub fn challenge(&self) -> Challenge {
        Challenge::new(self.verifier_id.clone(), self.nonce.clone())
    }
}

pub struct VerificationExchange {
    requests: Mutex<HashMap<String, VerificationRequest>>,
    proofs: Arc<ProofVerifier>,
    notifier: Arc<dyn CallbackNotifier>,
    clock: SharedClock,
    audit: Arc<AuditTrail>,
}

impl VerificationExchange {
    pub fn new(
        proofs: Arc<ProofVerifier>,
        notifier: Arc<dyn CallbackNotifier>,
        clock: SharedClock,
        audit: Arc<AuditTrail>,
    ) -> Self {
        Self {
            requests: Mutex::new(HashMap::new()),
            proofs,
            notifier,
            clock,
            audit,
        }
    }

    fn requests(&self) -> MutexGuard<'_, HashMap<String, VerificationRequest>> {
        self.requests.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Opens a request.
    ///
    /// # Arguments
    /// * `verifier_id` - Identity of the verifier; proofs are bound to it
    /// * `required_attributes` - Attribute names the proof must disclose
    /// * `ttl` - How long the request accepts proofs
    /// * `callback_url` - Optional http(s) endpoint notified on resolution
    ///
    /// # Errors
    /// `InvalidInput` for an empty verifier id, a non-positive ttl or a
    /// callback URL that is not http(s).
    pub fn create_request(
        &self,
        verifier_id: &str,
        required_attributes: BTreeSet<String>,
        ttl: Duration,
        callback_url: Option<String>,
    ) -> CredentialResult<VerificationRequest> {
        if verifier_id.trim().is_empty() {
            return Err(CredentialError::InvalidInput("verifier id is empty".into()));
        }
        if ttl <= Duration::zero() {
            return Err(CredentialError::InvalidInput(
                "request ttl must be positive".into(),
            ));
        }
        if let Some(url) = &callback_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(CredentialError::InvalidInput(format!(
                    "callback url '{}' is not http(s)",
                    url
                )));
            }
        }

        let now = self.clock.now();
        let request_id = Uuid::new_v4().to_string();
        let challenge = derive_challenge(&request_id, verifier_id);
        let request = VerificationRequest {
            request_id: request_id.clone(),
            verifier_id: verifier_id.to_string(),
            required_attributes,
            nonce: challenge.nonce,
            created_at: now,
            expires_at: now + ttl,
            callback_url,
            status: RequestStatus::Pending,
            result: None,
            resolved_at: None,
        };
        self.requests().insert(request_id.clone(), request.clone());

        info!(
            "Verification request {} opened by {} (expires {})",
            request_id, verifier_id, request.expires_at
        );
        self.audit.record(
            AuditEvent::new(AuditEventKind::RequestCreated, request_id.as_str(), now)
                .actor(verifier_id),
        );
        Ok(request)
    }

    /// The challenge a holder must bind its proof to.
    pub fn challenge_for(&self, request_id: &str) -> CredentialResult<Challenge> {
        let request = self.get_request(request_id)?;
        Ok(Challenge::new(request.verifier_id, request.nonce))
    }

    /// QR invitation for a request.
    pub fn invitation(&self, request_id: &str) -> CredentialResult<OutOfBandInvitation> {
        self.get_request(request_id)
            .map(|request| OutOfBandInvitation::for_request(&request))
    }

    /// Reads a request, applying lazy expiry.
    pub fn get_request(&self, request_id: &str) -> CredentialResult<VerificationRequest> {
        let now = self.clock.now();
        let (request, expired_now) = {
            let mut requests = self.requests();
            let request = requests
                .get_mut(request_id)
                .ok_or_else(|| CredentialError::not_found("verification request", request_id))?;
            let expired_now = Self::expire_if_due(request, now);
            (request.clone(), expired_now)
        };
        if expired_now {
            self.resolved(&request);
        }
        Ok(request)
    }

    /// Submits a proof for a pending request.
    ///
    /// Returns the resolved request; a rejected proof resolves it as `Failed`.
    ///
    /// # Errors
    /// - `NotFound` for an unknown request
    /// - `RequestExpired` if the window elapsed, now or before
    /// - `AlreadyInTerminalState` if the request was already resolved
    pub fn submit_proof(
        &self,
        request_id: &str,
        proof: &Proof,
    ) -> CredentialResult<VerificationRequest> {
        let now = self.clock.now();
        let (challenge, required) = {
            let mut requests = self.requests();
            let request = requests
                .get_mut(request_id)
                .ok_or_else(|| CredentialError::not_found("verification request", request_id))?;
            Self::ensure_pending(request_id, request)?;

            if Self::expire_if_due(request, now) {
                let expired = request.clone();
                drop(requests);
                self.resolved(&expired);
                return Err(CredentialError::RequestExpired(request_id.to_string()));
            }
            (
                Challenge::new(request.verifier_id.clone(), request.nonce.clone()),
                request.required_attributes.clone(),
            )
        };

        // Verification reads the ledger and the replay set; the requests map stays unlocked.
        let outcome = self.proofs.verify_proof(proof, &challenge, &required);

        let resolved = {
            let mut requests = self.requests();
            let request = requests
                .get_mut(request_id)
                .ok_or_else(|| CredentialError::not_found("verification request", request_id))?;
            Self::ensure_pending(request_id, request)?;

            request.status = if outcome.valid {
                RequestStatus::Completed
            } else {
                RequestStatus::Failed
            };
            request.result = Some(outcome);
            request.resolved_at = Some(now);
            request.clone()
        };

        self.resolved(&resolved);
        Ok(resolved)
    }

    /// Expires every pending request past its window. Returns how many.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let expired: Vec<VerificationRequest> = {
            let mut requests = self.requests();
            requests
                .values_mut()
                .filter_map(|request| Self::expire_if_due(request, now).then(|| request.clone()))
                .collect()
        };
        for request in &expired {
            self.resolved(request);
        }
        expired.len()
    }

    /// Requests in a given status, oldest first.
    pub fn requests_with_status(&self, status: RequestStatus) -> Vec<VerificationRequest> {
        let mut found: Vec<VerificationRequest> = self
            .requests()
            .values()
            .filter(|request| request.status == status)
            .cloned()
            .collect();
        found.sort_by_key(|request| request.created_at);
        found
    }

    fn ensure_pending(request_id: &str, request: &VerificationRequest) -> CredentialResult<()> {
        match request.status {
            RequestStatus::Pending => Ok(()),
            RequestStatus::Expired => Err(CredentialError::RequestExpired(request_id.to_string())),
            RequestStatus::Completed | RequestStatus::Failed => {
                Err(CredentialError::AlreadyInTerminalState {
                    entity: "verification request",
                    id: request_id.to_string(),
                    state: request.status.to_string(),
                })
            }
        }
    }

    fn expire_if_due(request: &mut VerificationRequest, now: DateTime<Utc>) -> bool {
        if request.status == RequestStatus::Pending && request.is_expired_at(now) {
            request.status = RequestStatus::Expired;
            request.resolved_at = Some(now);
            true
        } else {
            false
        }
    }

    /// Audits a resolution and fires its callback.
    fn resolved(&self, request: &VerificationRequest) {
        let now = self.clock.now();
        info!(
            "Verification request {} resolved as {}",
            request.request_id, request.status
        );
        self.audit.record(
            AuditEvent::new(AuditEventKind::RequestResolved, request.request_id.as_str(), now)
                .actor(request.verifier_id.clone())
                .detail(request.status.to_string()),
        );
        self.dispatch_callback(request, now);
    }

    fn dispatch_callback(&self, request: &VerificationRequest, now: DateTime<Utc>) {
        let Some(url) = request.callback_url.clone() else {
            return;
        };
        let payload = CallbackPayload::for_request(request, now);

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!(
                    "No async runtime, callback for {} not sent",
                    request.request_id
                );
                self.audit.record(
                    AuditEvent::new(AuditEventKind::CallbackFailed, request.request_id.as_str(), now)
                        .error("no async runtime"),
                );
                return;
            }
        };

        let notifier = self.notifier.clone();
        let audit = self.audit.clone();
        let clock = self.clock.clone();
        handle.spawn(async move {
            match notifier.notify(&url, &payload).await {
                Ok(()) => debug!("Callback sent for {}", payload.request_id),
                Err(e) => {
                    warn!("Callback for {} failed: {}", payload.request_id, e);
                    audit.record(
                        AuditEvent::new(
                            AuditEventKind::CallbackFailed,
                            payload.request_id.as_str(),
                            clock.now(),
                        )
                        .detail(url)
                        .error(e.to_string()),
                    );
                }
            }
        });
    }
}
