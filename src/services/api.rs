// src/services/api.rs
//! Caller-facing facade.
//!
//! Wires the trust registry, credential ledger, proof verifier, issuance
//! pipeline and verification exchange together and exposes the operations
//! issuers, holders and verifiers call. Failures surface as
//! [`CredentialError`]; use [`CredentialError::report`] for the serializable
//! `{kind, message}` form.

use crate::blockchain::ledger_client::LedgerClient;
use crate::blockchain::submission_lane::SubmissionLane;
use crate::config::Settings;
use crate::contracts::credential_ledger::CredentialLedger;
use crate::contracts::trust_registry::TrustRegistry;
use crate::error::{CredentialError, CredentialResult};
use crate::models::credential::{
    CommitmentHash, Credential, CredentialIntent, HeldCredential, ValidityReport,
};
use crate::models::issuer::Issuer;
use crate::models::job::{BatchReport, IssuanceJob, JobState};
use crate::models::proof::{Challenge, Proof, VerificationOutcome};
use crate::models::verification::VerificationRequest;
use crate::services::audit::AuditTrail;
use crate::services::issuance_pipeline::IssuancePipeline;
use crate::services::notifier::CallbackNotifier;
use crate::services::verifier::VerificationExchange;
use crate::storage::credential_store::MemoryCredentialStore;
use crate::storage::issuer_store::MemoryIssuerStore;
use crate::utils::clock::SharedClock;
use crate::wallet::credential_storage::CredentialStorage;
use crate::wallet::key_management::KeyManager;
use crate::wallet::zkp_generation::generate_credential_proof;
use crate::zkp::proof_verification::ProofVerifier;
use chrono::Duration;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

/// A confirmed issuance: the job, the ledger record and the holder's copy.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Issuance {
    pub job: IssuanceJob,
    pub credential: Credential,
    pub held: HeldCredential,
}

/// Counts from one expiry sweep.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SweepReport {
    pub credentials_expired: usize,
    pub requests_expired: usize,
}

pub struct CredentialService {
    registry: Arc<TrustRegistry>,
    ledger: Arc<CredentialLedger>,
    proofs: Arc<ProofVerifier>,
    pipeline: Arc<IssuancePipeline>,
    exchange: VerificationExchange,
    settings: Settings,
    clock: SharedClock,
}

impl CredentialService {
    /// Builds the engine over in-memory storage.
    ///
    /// Spawns the submission lane, so it must run inside a tokio runtime.
    ///
    /// # Errors
    /// `InvalidInput` for an empty admin key or a malformed operator key.
    pub fn new(
        settings: Settings,
        chain: Arc<dyn LedgerClient>,
        notifier: Arc<dyn CallbackNotifier>,
        clock: SharedClock,
        audit: Arc<AuditTrail>,
    ) -> CredentialResult<Self> {
        let keys = match &settings.operator_key_hex {
            Some(secret) => KeyManager::from_hex(secret)
                .map_err(|e| CredentialError::InvalidInput(e.to_string()))?,
            None => KeyManager::new(),
        };

        let registry = Arc::new(TrustRegistry::new(
            &settings.admin_key,
            Box::new(MemoryIssuerStore::new()),
            clock.clone(),
            audit.clone(),
        )?);
        let ledger = Arc::new(CredentialLedger::new(
            Box::new(MemoryCredentialStore::new()),
            registry.clone(),
            clock.clone(),
            audit.clone(),
        ));
        let proofs = Arc::new(
            ProofVerifier::new(ledger.clone(), clock.clone())
                .with_replay_retention(settings.proofs.replay_retention()),
        );

        let lane = SubmissionLane::spawn(chain, keys, settings.pipeline.confirmation_timeout());
        info!("Operator address {}", lane.operator());
        let pipeline = Arc::new(IssuancePipeline::new(
            ledger.clone(),
            lane,
            settings.pipeline.clone(),
            clock.clone(),
            audit.clone(),
        ));
        let exchange = VerificationExchange::new(proofs.clone(), notifier, clock.clone(), audit);

        Ok(Self {
            registry,
            ledger,
            proofs,
            pipeline,
            exchange,
            settings,
            clock,
        })
    }

    pub fn registry(&self) -> &Arc<TrustRegistry> {
        &self.registry
    }

    pub fn ledger(&self) -> &Arc<CredentialLedger> {
        &self.ledger
    }

    pub fn pipeline(&self) -> &Arc<IssuancePipeline> {
        &self.pipeline
    }

    pub fn exchange(&self) -> &VerificationExchange {
        &self.exchange
    }

    // Issuers

    pub fn register_issuer(
        &self,
        display_name: &str,
        did: &str,
        controller_key: &str,
    ) -> CredentialResult<Issuer> {
        self.registry.register_issuer(display_name, did, controller_key)
    }

    pub fn verify_issuer(&self, caller: &str, issuer_id: &str) -> CredentialResult<Issuer> {
        self.registry.verify_issuer(caller, issuer_id)
    }

    pub fn unverify_issuer(&self, caller: &str, issuer_id: &str) -> CredentialResult<Issuer> {
        self.registry.unverify_issuer(caller, issuer_id)
    }

    pub fn remove_issuer(&self, caller: &str, issuer_id: &str) -> CredentialResult<Issuer> {
        self.registry.remove_issuer(caller, issuer_id)
    }

    pub fn resolve_issuer(&self, did: &str) -> CredentialResult<Issuer> {
        self.registry.resolve_by_did(did)
    }

    // Credentials

    /// Issues a credential through the pipeline and waits for the mint.
    ///
    /// # Errors
    /// - `Unauthorized` if `caller` is not a verified issuer
    /// - `InvalidHolder` for an empty or zero holder key
    /// - `TransactionFailed` if the mint never confirmed; the credential is
    ///   then left `Failed`
    pub async fn issue_credential(
        &self,
        caller: &str,
        intent: CredentialIntent,
    ) -> CredentialResult<Issuance> {
        let attributes = intent.attributes.clone();
        let job = self.pipeline.issue(caller, intent).await?;
        if job.state != JobState::Succeeded {
            return Err(CredentialError::TransactionFailed(
                job.last_error
                    .unwrap_or_else(|| format!("issuance job ended {}", job.state)),
            ));
        }

        let credential = self
            .ledger
            .credential(&job.commitment_hash)
            .ok_or_else(|| CredentialError::not_found("credential", job.commitment_hash.as_str()))?;
        let held = HeldCredential {
            commitment_hash: credential.commitment_hash.clone(),
            issuer_id: credential.issuer_id.clone(),
            credential_type: credential.credential_type.clone(),
            attributes,
        };
        Ok(Issuance {
            job,
            credential,
            held,
        })
    }

    pub async fn issue_batch(&self, caller: &str, intents: Vec<CredentialIntent>) -> BatchReport {
        self.pipeline.issue_batch(caller, intents).await
    }

    pub fn cancel_job(&self, caller: &str, job_id: &str) -> CredentialResult<IssuanceJob> {
        self.pipeline.cancel_job(caller, job_id)
    }

    pub fn job(&self, job_id: &str) -> CredentialResult<IssuanceJob> {
        self.pipeline
            .job(job_id)
            .ok_or_else(|| CredentialError::not_found("issuance job", job_id))
    }

    pub fn revoke_credential(
        &self,
        caller: &str,
        commitment: &CommitmentHash,
        reason: &str,
    ) -> CredentialResult<Credential> {
        self.ledger.revoke_credential(caller, commitment, reason)
    }

    pub fn suspend_holder(&self, caller: &str, holder_key: &str) -> CredentialResult<usize> {
        self.ledger.suspend_holder(caller, holder_key)
    }

    pub fn reinstate_holder(&self, caller: &str, holder_key: &str) -> CredentialResult<usize> {
        self.ledger.reinstate_holder(caller, holder_key)
    }

    pub fn check_validity(&self, commitment: &CommitmentHash) -> ValidityReport {
        self.ledger.check_validity(commitment)
    }

    pub fn credentials_of_holder(&self, holder_key: &str) -> Vec<Credential> {
        self.ledger.credentials_by_holder(holder_key)
    }

    // Proofs

    /// Builds a proof from a wallet credential. `ttl` defaults to the
    /// configured proof lifetime.
    pub fn generate_proof(
        &self,
        wallet: &CredentialStorage,
        commitment: &CommitmentHash,
        disclose: &BTreeSet<String>,
        challenge: &Challenge,
        ttl: Option<Duration>,
    ) -> CredentialResult<Proof> {
        let ttl = ttl.unwrap_or_else(|| self.settings.proofs.default_ttl());
        generate_credential_proof(wallet, commitment, disclose, challenge, ttl, self.clock.now())
    }

    pub fn verify_proof(
        &self,
        proof: &Proof,
        expected: &Challenge,
        required_attributes: &BTreeSet<String>,
    ) -> VerificationOutcome {
        self.proofs.verify_proof(proof, expected, required_attributes)
    }

    // Verification requests

    /// Opens a request. `ttl` defaults to the configured request lifetime.
    pub fn create_verification_request(
        &self,
        verifier_id: &str,
        required_attributes: BTreeSet<String>,
        ttl: Option<Duration>,
        callback_url: Option<String>,
    ) -> CredentialResult<VerificationRequest> {
        let ttl = ttl.unwrap_or_else(|| self.settings.verification.default_ttl());
        self.exchange
            .create_request(verifier_id, required_attributes, ttl, callback_url)
    }

    /// QR payload for a request.
    pub fn request_invitation(&self, request_id: &str) -> CredentialResult<String> {
        self.exchange.invitation(request_id)?.encode()
    }

    pub fn get_verification_request(&self, request_id: &str) -> CredentialResult<VerificationRequest> {
        self.exchange.get_request(request_id)
    }

    pub fn submit_proof_for_request(
        &self,
        request_id: &str,
        proof: &Proof,
    ) -> CredentialResult<VerificationRequest> {
        self.exchange.submit_proof(request_id, proof)
    }

    /// Persists lazy expiry for credentials and requests.
    pub fn sweep(&self) -> SweepReport {
        let report = SweepReport {
            credentials_expired: self.ledger.sweep_expired(),
            requests_expired: self.exchange.sweep_expired(),
        };
        if report.credentials_expired + report.requests_expired > 0 {
            info!(
                "Sweep expired {} credential(s) and {} request(s)",
                report.credentials_expired, report.requests_expired
            );
        }
        report
    }
}
