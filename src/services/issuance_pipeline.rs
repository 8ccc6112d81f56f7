// src/services/issuance_pipeline.rs
//! Issuance pipeline.
//!
//! Reconciles an off-ledger issuance intent with the on-ledger mint:
//!
//! 1. `enqueue` reserves a `Pending` commitment and records a `Queued` job
//! 2. a worker re-validates the issuer, the holder and the pending credential
//! 3. the mint goes out through the submission lane
//! 4. on confirmation the credential becomes `Active` and the job `Succeeded`
//!
//! Transient chain failures are retried with exponential backoff up to
//! `max_attempts`; after that the job and its credential end `Failed`.
//! Validation failures are never retried. A cancelled job ends `Cancelled`
//! with its credential `Failed`.
//!
//! A run whose future is dropped releases its commitment and leaves the job
//! `Queued`, so `run_job` can resume it. A mint that was already on the wire
//! is picked up again through the chain's idempotent receipt.

use crate::blockchain::ledger_client::{ChainError, TransactionPayload};
use crate::blockchain::submission_lane::SubmissionHandle;
use crate::config::PipelineSettings;
use crate::contracts::credential_ledger::CredentialLedger;
use crate::contracts::trust_registry::TrustRegistry;
use crate::error::{CredentialError, CredentialResult};
use crate::models::credential::{CommitmentHash, CredentialIntent, CredentialStatus};
use crate::models::job::{BatchItem, BatchReport, IssuanceJob, JobState};
use crate::services::audit::{AuditEvent, AuditEventKind, AuditTrail};
use crate::utils::clock::SharedClock;
use crate::utils::crypto::is_zero_key;
use futures::future::join_all;
use log::{debug, error, info, warn};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Delay before retry number `attempt` (1-based): `base * 2^(attempt - 1)`.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
    base.saturating_mul(factor)
}

/// Holds a commitment's in-flight slot for one run.
///
/// Dropping it releases the slot and puts an interrupted job back in `Queued`.
struct InFlightSlot<'a> {
    pipeline: &'a IssuancePipeline,
    job_id: String,
    commitment: CommitmentHash,
}

impl Drop for InFlightSlot<'_> {
    fn drop(&mut self) {
        self.pipeline.in_flight().remove(&self.commitment);
        let mut jobs = self.pipeline.jobs();
        if let Some(job) = jobs.get_mut(&self.job_id) {
            if job.state == JobState::InFlight {
                warn!("Run of job {} interrupted; back to queued", self.job_id);
                job.state = JobState::Queued;
                job.updated_at = self.pipeline.clock.now();
            }
        }
    }
}

/// How an attempt ended.
enum Attempt {
    Confirmed(String),
    Retry(CredentialError),
    Fatal(CredentialError),
}

pub struct IssuancePipeline {
    jobs: Mutex<HashMap<String, IssuanceJob>>,
    in_flight: Mutex<HashSet<CommitmentHash>>,
    ledger: Arc<CredentialLedger>,
    registry: Arc<TrustRegistry>,
    lane: SubmissionHandle,
    workers: Semaphore,
    settings: PipelineSettings,
    clock: SharedClock,
    audit: Arc<AuditTrail>,
}

impl IssuancePipeline {
    pub fn new(
        ledger: Arc<CredentialLedger>,
        lane: SubmissionHandle,
        settings: PipelineSettings,
        clock: SharedClock,
        audit: Arc<AuditTrail>,
    ) -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashSet::new()),
            registry: ledger.registry().clone(),
            ledger,
            lane,
            workers: Semaphore::new(settings.workers.max(1)),
            settings,
            clock,
            audit,
        }
    }

    fn jobs(&self) -> MutexGuard<'_, HashMap<String, IssuanceJob>> {
        self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn in_flight(&self) -> MutexGuard<'_, HashSet<CommitmentHash>> {
        self.in_flight.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Reserves a pending credential and queues its mint.
    ///
    /// # Errors
    /// Fails without creating a job when the caller is not a verified issuer
    /// (`Unauthorized`) or the holder key is empty (`InvalidHolder`).
    pub fn enqueue(&self, caller: &str, intent: CredentialIntent) -> CredentialResult<IssuanceJob> {
        let credential = self.ledger.reserve_credential(caller, &intent)?;
        let now = self.clock.now();
        let job = IssuanceJob {
            job_id: Uuid::new_v4().to_string(),
            issuer_id: credential.issuer_id.clone(),
            intent,
            commitment_hash: credential.commitment_hash,
            attempt_count: 0,
            last_error: None,
            state: JobState::Queued,
            cancel_requested: false,
            tx_hash: None,
            created_at: now,
            updated_at: now,
        };
        self.jobs().insert(job.job_id.clone(), job.clone());

        info!("Queued issuance job {} for {}", job.job_id, job.commitment_hash);
        self.audit.record(
            AuditEvent::new(AuditEventKind::JobQueued, job.commitment_hash.as_str(), now)
                .actor(caller)
                .job(job.job_id.clone(), 0),
        );
        Ok(job)
    }

    pub fn job(&self, job_id: &str) -> Option<IssuanceJob> {
        self.jobs().get(job_id).cloned()
    }

    /// Jobs ordered by creation time.
    pub fn jobs_snapshot(&self) -> Vec<IssuanceJob> {
        let mut jobs: Vec<IssuanceJob> = self.jobs().values().cloned().collect();
        jobs.sort_by_key(|job| job.created_at);
        jobs
    }

    fn update_job(
        &self,
        job_id: &str,
        edit: impl FnOnce(&mut IssuanceJob),
    ) -> CredentialResult<IssuanceJob> {
        let now = self.clock.now();
        let mut jobs = self.jobs();
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| CredentialError::not_found("issuance job", job_id))?;
        edit(job);
        job.updated_at = now;
        Ok(job.clone())
    }

    /// Asks a job to stop. Administrator only.
    ///
    /// The flag is checked before every attempt, so an attempt already on the
    /// wire still completes.
    pub fn cancel_job(&self, caller: &str, job_id: &str) -> CredentialResult<IssuanceJob> {
        if !self.registry.is_admin(caller) {
            return Err(CredentialError::Unauthorized(
                "cancelling jobs requires the administrator".into(),
            ));
        }
        let mut jobs = self.jobs();
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| CredentialError::not_found("issuance job", job_id))?;
        if job.state.is_terminal() {
            return Err(CredentialError::AlreadyInTerminalState {
                entity: "issuance job",
                id: job_id.to_string(),
                state: job.state.to_string(),
            });
        }
        job.cancel_requested = true;
        job.updated_at = self.clock.now();
        info!("Cancellation requested for job {}", job_id);
        Ok(job.clone())
    }

    /// Drives a queued job to a terminal state and returns it.
    ///
    /// # Errors
    /// - `NotFound` for an unknown job
    /// - `AlreadyInTerminalState` for a finished job
    /// - `InvalidInput` while another worker runs the same commitment
    pub async fn run_job(&self, job_id: &str) -> CredentialResult<IssuanceJob> {
        let job = self
            .job(job_id)
            .ok_or_else(|| CredentialError::not_found("issuance job", job_id))?;
        if job.state.is_terminal() {
            return Err(CredentialError::AlreadyInTerminalState {
                entity: "issuance job",
                id: job_id.to_string(),
                state: job.state.to_string(),
            });
        }
        if !self.in_flight().insert(job.commitment_hash.clone()) {
            return Err(CredentialError::InvalidInput(format!(
                "commitment {} already has a job in flight",
                job.commitment_hash
            )));
        }
        let _slot = InFlightSlot {
            pipeline: self,
            job_id: job.job_id.clone(),
            commitment: job.commitment_hash.clone(),
        };

        self.drive(job).await
    }

    /// Runs a job on its own task.
    pub fn spawn_job(self: &Arc<Self>, job_id: String) -> JoinHandle<CredentialResult<IssuanceJob>> {
        let pipeline = Arc::clone(self);
        tokio::spawn(async move { pipeline.run_job(&job_id).await })
    }

    /// Enqueues and runs one intent.
    pub async fn issue(&self, caller: &str, intent: CredentialIntent) -> CredentialResult<IssuanceJob> {
        let job = self.enqueue(caller, intent)?;
        self.run_job(&job.job_id).await
    }

    /// Issues every intent as an independent job. Never fails as a whole.
    pub async fn issue_batch(&self, caller: &str, intents: Vec<CredentialIntent>) -> BatchReport {
        let runs = intents.into_iter().map(|intent| async move {
            let holder_key = intent.holder_key.clone();
            match self.issue(caller, intent).await {
                Ok(job) => BatchItem {
                    holder_key,
                    job_id: Some(job.job_id),
                    commitment_hash: Some(job.commitment_hash),
                    error: job.last_error.filter(|_| job.state != JobState::Succeeded),
                    state: Some(job.state),
                },
                Err(e) => BatchItem {
                    holder_key,
                    job_id: None,
                    commitment_hash: None,
                    state: None,
                    error: Some(e.to_string()),
                },
            }
        });
        let items = join_all(runs).await;

        let succeeded = items
            .iter()
            .filter(|item| item.state == Some(JobState::Succeeded))
            .count();
        let report = BatchReport {
            succeeded,
            failed: items.len() - succeeded,
            items,
        };
        info!(
            "Batch issuance finished: {} succeeded, {} failed",
            report.succeeded, report.failed
        );
        report
    }

    async fn drive(&self, job: IssuanceJob) -> CredentialResult<IssuanceJob> {
        let job_id = job.job_id.clone();
        let commitment = job.commitment_hash.clone();
        let max_attempts = self.settings.max_attempts.max(1);

        let _permit = match self.workers.acquire().await {
            Ok(permit) => permit,
            Err(_) => {
                let err = CredentialError::TransactionFailed("worker pool closed".into());
                return self.finish_failed(&job_id, &commitment, job.attempt_count, err);
            }
        };

        loop {
            let current = self
                .job(&job_id)
                .ok_or_else(|| CredentialError::not_found("issuance job", job_id.as_str()))?;
            if current.cancel_requested {
                return self.finish_cancelled(&job_id, &commitment, current.attempt_count);
            }

            let attempt = current.attempt_count + 1;
            self.update_job(&job_id, |j| {
                j.attempt_count = attempt;
                j.state = JobState::InFlight;
            })?;
            self.audit.record(
                AuditEvent::new(AuditEventKind::JobAttempt, commitment.as_str(), self.clock.now())
                    .job(job_id.clone(), attempt),
            );

            match self.attempt(&current).await {
                Attempt::Confirmed(tx_hash) => {
                    return self.finish_succeeded(&job_id, &commitment, attempt, tx_hash)
                }
                Attempt::Fatal(err) => {
                    return self.finish_failed(&job_id, &commitment, attempt, err)
                }
                Attempt::Retry(err) if attempt >= max_attempts => {
                    return self.finish_failed(&job_id, &commitment, attempt, err)
                }
                Attempt::Retry(err) => {
                    let delay = backoff_delay(self.settings.backoff_base(), attempt);
                    warn!(
                        "Job {} attempt {}/{} failed: {}; retrying in {:?}",
                        job_id, attempt, max_attempts, err, delay
                    );
                    self.update_job(&job_id, |j| {
                        j.last_error = Some(err.to_string());
                        j.state = JobState::Queued;
                    })?;
                    self.audit.record(
                        AuditEvent::new(
                            AuditEventKind::JobRetryScheduled,
                            commitment.as_str(),
                            self.clock.now(),
                        )
                        .job(job_id.clone(), attempt)
                        .error(err.to_string())
                        .detail(format!("backoff {:?}", delay)),
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn attempt(&self, job: &IssuanceJob) -> Attempt {
        let issuer_can_mint = self
            .registry
            .issuer(&job.issuer_id)
            .map_or(false, |issuer| issuer.can_mint());
        if !issuer_can_mint {
            return Attempt::Fatal(CredentialError::Unauthorized(format!(
                "issuer {} is no longer verified",
                job.issuer_id
            )));
        }
        if is_zero_key(&job.intent.holder_key) {
            return Attempt::Fatal(CredentialError::InvalidHolder);
        }
        match self.ledger.credential(&job.commitment_hash) {
            Some(credential) if credential.status == CredentialStatus::Pending => {}
            Some(credential) => {
                return Attempt::Fatal(CredentialError::AlreadyInTerminalState {
                    entity: "credential",
                    id: job.commitment_hash.to_string(),
                    state: credential.status.to_string(),
                })
            }
            None => {
                return Attempt::Fatal(CredentialError::not_found(
                    "credential",
                    job.commitment_hash.as_str(),
                ))
            }
        }

        let payload = TransactionPayload::mint(
            job.commitment_hash.clone(),
            &job.issuer_id,
            &job.intent.holder_key,
        );
        match self.lane.submit(payload).await {
            Ok(receipt) => {
                self.audit.record(
                    AuditEvent::new(
                        AuditEventKind::TransactionSubmitted,
                        job.commitment_hash.as_str(),
                        self.clock.now(),
                    )
                    .job(job.job_id.clone(), job.attempt_count + 1)
                    .detail(receipt.tx_hash.clone()),
                );
                Attempt::Confirmed(receipt.tx_hash)
            }
            Err(chain_err) => {
                let err = CredentialError::TransactionFailed(chain_err.to_string());
                if chain_err.is_transient() || chain_err == ChainError::LaneClosed {
                    Attempt::Retry(err)
                } else {
                    Attempt::Fatal(err)
                }
            }
        }
    }

    fn finish_succeeded(
        &self,
        job_id: &str,
        commitment: &CommitmentHash,
        attempt: u32,
        tx_hash: String,
    ) -> CredentialResult<IssuanceJob> {
        if let Err(e) = self.ledger.activate_credential(commitment, &tx_hash) {
            return self.finish_orphaned(job_id, commitment, attempt, tx_hash, e);
        }
        let job = self.update_job(job_id, |j| {
            j.state = JobState::Succeeded;
            j.tx_hash = Some(tx_hash.clone());
        })?;
        info!("Job {} succeeded after {} attempt(s)", job_id, attempt);
        self.audit.record(
            AuditEvent::new(AuditEventKind::JobSucceeded, commitment.as_str(), self.clock.now())
                .job(job_id, attempt)
                .detail(tx_hash),
        );
        Ok(job)
    }

    /// The mint confirmed but the credential left `Pending` meanwhile (e.g.
    /// revoked). The job fails, keeps the transaction hash and the credential
    /// keeps its current status.
    fn finish_orphaned(
        &self,
        job_id: &str,
        commitment: &CommitmentHash,
        attempt: u32,
        tx_hash: String,
        err: CredentialError,
    ) -> CredentialResult<IssuanceJob> {
        let reason = format!("mint {} confirmed but credential not activated: {}", tx_hash, err);
        let job = self.update_job(job_id, |j| {
            j.state = JobState::Failed;
            j.tx_hash = Some(tx_hash.clone());
            j.last_error = Some(reason.clone());
        })?;
        error!("Job {}: {}", job_id, reason);
        self.audit.record(
            AuditEvent::new(AuditEventKind::OrphanedMint, commitment.as_str(), self.clock.now())
                .job(job_id, attempt)
                .error(err.to_string())
                .detail(tx_hash),
        );
        Ok(job)
    }

    fn finish_failed(
        &self,
        job_id: &str,
        commitment: &CommitmentHash,
        attempt: u32,
        err: CredentialError,
    ) -> CredentialResult<IssuanceJob> {
        self.fail_credential(commitment, &err.to_string());
        let job = self.update_job(job_id, |j| {
            j.state = JobState::Failed;
            j.last_error = Some(err.to_string());
        })?;
        error!("Job {} failed after {} attempt(s): {}", job_id, attempt, err);
        self.audit.record(
            AuditEvent::new(AuditEventKind::JobFailed, commitment.as_str(), self.clock.now())
                .job(job_id, attempt)
                .error(err.to_string()),
        );
        Ok(job)
    }

    fn finish_cancelled(
        &self,
        job_id: &str,
        commitment: &CommitmentHash,
        attempt: u32,
    ) -> CredentialResult<IssuanceJob> {
        self.fail_credential(commitment, "issuance cancelled");
        let job = self.update_job(job_id, |j| j.state = JobState::Cancelled)?;
        info!("Job {} cancelled", job_id);
        self.audit.record(
            AuditEvent::new(AuditEventKind::JobCancelled, commitment.as_str(), self.clock.now())
                .job(job_id, attempt),
        );
        Ok(job)
    }

    fn fail_credential(&self, commitment: &CommitmentHash, reason: &str) {
        if let Err(e) = self.ledger.mark_failed(commitment, reason) {
            debug!("Credential {} not marked failed: {}", commitment, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::ledger_client::{FlakyChain, LedgerClient, SimulatedChain};
    use crate::blockchain::submission_lane::SubmissionLane;
    use crate::error::ErrorKind;
    use crate::models::credential::CredentialStatus;
    use crate::services::audit::MemoryAuditSink;
    use crate::storage::credential_store::MemoryCredentialStore;
    use crate::storage::issuer_store::MemoryIssuerStore;
    use crate::utils::clock::system_clock;
    use crate::wallet::key_management::KeyManager;

    const ADMIN: &str = "admin";
    const ISSUER: &str = "uni-key";

    struct Fixture {
        pipeline: Arc<IssuancePipeline>,
        ledger: Arc<CredentialLedger>,
        registry: Arc<TrustRegistry>,
        sink: Arc<MemoryAuditSink>,
        issuer_id: String,
    }

    fn settings(max_attempts: u32) -> PipelineSettings {
        PipelineSettings {
            workers: 2,
            max_attempts,
            backoff_base_ms: 1,
            confirmation_timeout_secs: 5,
        }
    }

    fn fixture(chain: Arc<dyn LedgerClient>, settings: PipelineSettings) -> Fixture {
        let clock = system_clock();
        let sink = Arc::new(MemoryAuditSink::new());
        let audit = Arc::new(AuditTrail::with_sink(sink.clone()));
        let registry = Arc::new(
            TrustRegistry::new(ADMIN, Box::new(MemoryIssuerStore::new()), clock.clone(), audit.clone())
                .unwrap(),
        );
        let issuer = registry.register_issuer("Uni", "did:web:uni.example", ISSUER).unwrap();
        registry.verify_issuer(ADMIN, &issuer.id).unwrap();
        let ledger = Arc::new(CredentialLedger::new(
            Box::new(MemoryCredentialStore::new()),
            registry.clone(),
            clock.clone(),
            audit.clone(),
        ));
        let lane = SubmissionLane::spawn(chain, KeyManager::new(), settings.confirmation_timeout());
        Fixture {
            pipeline: Arc::new(IssuancePipeline::new(ledger.clone(), lane, settings, clock, audit)),
            ledger,
            registry,
            sink,
            issuer_id: issuer.id,
        }
    }

    fn status(fx: &Fixture, job: &IssuanceJob) -> CredentialStatus {
        fx.ledger.credential(&job.commitment_hash).unwrap().status
    }

    #[test]
    fn test_backoff_doubles() {
        let base = Duration::from_millis(100);
        assert_eq!(backoff_delay(base, 1), Duration::from_millis(100));
        assert_eq!(backoff_delay(base, 2), Duration::from_millis(200));
        assert_eq!(backoff_delay(base, 4), Duration::from_millis(800));
        assert!(backoff_delay(base, 40) >= backoff_delay(base, 31));
    }

    #[tokio::test]
    async fn test_transient_failures_then_success() {
        let chain = Arc::new(FlakyChain::new(Arc::new(SimulatedChain::new()), 2));
        let fx = fixture(chain.clone(), settings(5));

        let job = fx
            .pipeline
            .issue(ISSUER, CredentialIntent::new("alice", "Degree"))
            .await
            .unwrap();

        assert_eq!(job.state, JobState::Succeeded);
        assert_eq!(job.attempt_count, 3);
        assert!(job.tx_hash.is_some());
        assert_eq!(status(&fx, &job), CredentialStatus::Active);
        assert_eq!(chain.calls(), 3);
        assert_eq!(fx.sink.count(AuditEventKind::JobRetryScheduled), 2);

        let retries: Vec<_> = fx
            .sink
            .events()
            .into_iter()
            .filter(|e| e.kind == AuditEventKind::JobRetryScheduled)
            .collect();
        assert_eq!(retries[0].job_id.as_deref(), Some(job.job_id.as_str()));
        assert_eq!(retries[1].attempt, Some(2));
        assert!(retries[0].error.as_deref().unwrap_or("").contains("injected"));
    }

    #[tokio::test]
    async fn test_retries_exhausted_marks_failed() {
        let chain = Arc::new(FlakyChain::new(Arc::new(SimulatedChain::new()), 10));
        let fx = fixture(chain, settings(3));

        let job = fx
            .pipeline
            .issue(ISSUER, CredentialIntent::new("alice", "Degree"))
            .await
            .unwrap();

        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.attempt_count, 3);
        assert!(job.last_error.is_some());
        assert_eq!(status(&fx, &job), CredentialStatus::Failed);
        let report = fx.ledger.check_validity(&job.commitment_hash);
        assert!(!report.revoked && !report.valid);
    }

    #[tokio::test]
    async fn test_validation_failures_not_retried() {
        let fx = fixture(Arc::new(SimulatedChain::new()), settings(5));

        let err = fx
            .pipeline
            .issue("stranger", CredentialIntent::new("alice", "Degree"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        let err = fx
            .pipeline
            .issue(ISSUER, CredentialIntent::new("", "Degree"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(fx.pipeline.jobs_snapshot().is_empty());

        let job = fx
            .pipeline
            .enqueue(ISSUER, CredentialIntent::new("alice", "Degree"))
            .unwrap();
        fx.registry.unverify_issuer(ADMIN, &fx.issuer_id).unwrap();
        let job = fx.pipeline.run_job(&job.job_id).await.unwrap();
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.attempt_count, 1);
        assert_eq!(status(&fx, &job), CredentialStatus::Failed);
    }

    #[tokio::test]
    async fn test_cancelled_job() {
        let fx = fixture(Arc::new(SimulatedChain::new()), settings(5));
        let job = fx
            .pipeline
            .enqueue(ISSUER, CredentialIntent::new("alice", "Degree"))
            .unwrap();

        let err = fx.pipeline.cancel_job(ISSUER, &job.job_id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert!(fx.pipeline.cancel_job(ADMIN, &job.job_id).unwrap().cancel_requested);

        let job = fx.pipeline.run_job(&job.job_id).await.unwrap();
        assert_eq!(job.state, JobState::Cancelled);
        assert_eq!(job.attempt_count, 0);
        assert_eq!(status(&fx, &job), CredentialStatus::Failed);
        assert_eq!(fx.sink.count(AuditEventKind::JobCancelled), 1);

        let err = fx.pipeline.cancel_job(ADMIN, &job.job_id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyInTerminalState);
        let err = fx.pipeline.run_job(&job.job_id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyInTerminalState);
    }

    #[tokio::test]
    async fn test_unknown_job_is_not_found() {
        let fx = fixture(Arc::new(SimulatedChain::new()), settings(5));

        let err = fx.pipeline.run_job("no-such-job").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = fx.pipeline.cancel_job(ADMIN, "no-such-job").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(fx.pipeline.jobs_snapshot().is_empty());
        assert!(fx.pipeline.update_job("no-such-job", |j| j.attempt_count = 9).is_err());
        assert!(fx.pipeline.job("no-such-job").is_none());
    }

    fn slow_backoff(max_attempts: u32, backoff_base_ms: u64) -> PipelineSettings {
        PipelineSettings {
            backoff_base_ms,
            ..settings(max_attempts)
        }
    }

    async fn wait_for_retry(fx: &Fixture, job_id: &str) {
        for _ in 0..200 {
            if fx.pipeline.job(job_id).and_then(|j| j.last_error).is_some() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("job {} never scheduled a retry", job_id);
    }

    #[tokio::test]
    async fn test_cancel_during_backoff_stops_submissions() {
        let chain = Arc::new(FlakyChain::new(Arc::new(SimulatedChain::new()), 1));
        let fx = fixture(chain.clone(), slow_backoff(5, 300));
        let job = fx
            .pipeline
            .enqueue(ISSUER, CredentialIntent::new("alice", "Degree"))
            .unwrap();

        let handle = fx.pipeline.spawn_job(job.job_id.clone());
        wait_for_retry(&fx, &job.job_id).await;
        fx.pipeline.cancel_job(ADMIN, &job.job_id).unwrap();

        let job = handle.await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Cancelled);
        assert_eq!(job.attempt_count, 1);
        assert_eq!(chain.calls(), 1);
        assert_eq!(status(&fx, &job), CredentialStatus::Failed);
    }

    #[tokio::test]
    async fn test_dropped_run_can_resume() {
        let chain = Arc::new(FlakyChain::new(Arc::new(SimulatedChain::new()), 1));
        let fx = fixture(chain.clone(), slow_backoff(5, 300));
        let job = fx
            .pipeline
            .enqueue(ISSUER, CredentialIntent::new("alice", "Degree"))
            .unwrap();

        let interrupted =
            tokio::time::timeout(Duration::from_millis(100), fx.pipeline.run_job(&job.job_id)).await;
        assert!(interrupted.is_err());
        let parked = fx.pipeline.job(&job.job_id).unwrap();
        assert_eq!(parked.state, JobState::Queued);
        assert_eq!(parked.attempt_count, 1);

        let job = fx.pipeline.run_job(&job.job_id).await.unwrap();
        assert_eq!(job.state, JobState::Succeeded);
        assert_eq!(job.attempt_count, 2);
        assert_eq!(chain.calls(), 2);
        assert_eq!(status(&fx, &job), CredentialStatus::Active);
    }

    #[tokio::test]
    async fn test_run_dropped_mid_submission_requeues() {
        let chain = Arc::new(SimulatedChain::with_latency(Duration::from_millis(200)));
        let fx = fixture(chain.clone(), settings(3));
        let job = fx
            .pipeline
            .enqueue(ISSUER, CredentialIntent::new("alice", "Degree"))
            .unwrap();

        let interrupted =
            tokio::time::timeout(Duration::from_millis(50), fx.pipeline.run_job(&job.job_id)).await;
        assert!(interrupted.is_err());
        assert_eq!(fx.pipeline.job(&job.job_id).unwrap().state, JobState::Queued);

        let job = fx.pipeline.run_job(&job.job_id).await.unwrap();
        assert_eq!(job.state, JobState::Succeeded);
        assert_eq!(status(&fx, &job), CredentialStatus::Active);
        assert_eq!(chain.height(), 1);
    }

    #[tokio::test]
    async fn test_revoked_while_pending_is_not_minted() {
        let chain = Arc::new(SimulatedChain::new());
        let fx = fixture(chain.clone(), settings(3));
        let job = fx
            .pipeline
            .enqueue(ISSUER, CredentialIntent::new("alice", "Degree"))
            .unwrap();
        fx.ledger
            .revoke_credential(ISSUER, &job.commitment_hash, "withdrawn")
            .unwrap();

        let job = fx.pipeline.run_job(&job.job_id).await.unwrap();
        assert_eq!(job.state, JobState::Failed);
        assert!(job.tx_hash.is_none());
        assert_eq!(chain.height(), 0);
        assert_eq!(status(&fx, &job), CredentialStatus::Revoked);
    }

    #[tokio::test]
    async fn test_mint_confirmed_after_revocation_is_recorded() {
        let chain = Arc::new(SimulatedChain::with_latency(Duration::from_millis(200)));
        let fx = fixture(chain.clone(), settings(3));
        let job = fx
            .pipeline
            .enqueue(ISSUER, CredentialIntent::new("alice", "Degree"))
            .unwrap();

        let handle = fx.pipeline.spawn_job(job.job_id.clone());
        tokio::time::sleep(Duration::from_millis(50)).await;
        fx.ledger
            .revoke_credential(ISSUER, &job.commitment_hash, "withdrawn")
            .unwrap();

        let job = handle.await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Failed);
        let receipt = chain.receipt_for(&job.commitment_hash).unwrap();
        assert_eq!(job.tx_hash.as_deref(), Some(receipt.tx_hash.as_str()));
        assert!(job.last_error.as_ref().unwrap().contains("not activated"));
        assert_eq!(status(&fx, &job), CredentialStatus::Revoked);
        assert_eq!(fx.sink.count(AuditEventKind::OrphanedMint), 1);
    }

    #[tokio::test]
    async fn test_batch_reports_counts() {
        let fx = fixture(Arc::new(SimulatedChain::new()), settings(3));
        let intents = vec![
            CredentialIntent::new("alice", "Degree"),
            CredentialIntent::new("0x0", "Degree"),
            CredentialIntent::new("bob", "Degree"),
        ];

        let report = fx.pipeline.issue_batch(ISSUER, intents).await;
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.items[1].holder_key, "0x0");
        assert!(report.items[1].error.is_some());
        assert!(report.items[0].error.is_none());
        assert_eq!(fx.ledger.credentials_by_issuer(&fx.issuer_id).len(), 2);
    }

    #[tokio::test]
    async fn test_spawned_jobs_run_concurrently() {
        let fx = fixture(Arc::new(SimulatedChain::new()), settings(3));
        let mut handles = Vec::new();
        for holder in ["a", "b", "c", "d"] {
            let job = fx
                .pipeline
                .enqueue(ISSUER, CredentialIntent::new(holder, "Degree"))
                .unwrap();
            handles.push(fx.pipeline.spawn_job(job.job_id));
        }
        for handle in handles {
            let job = handle.await.unwrap().unwrap();
            assert_eq!(job.state, JobState::Succeeded);
        }
        assert_eq!(fx.sink.count(AuditEventKind::JobSucceeded), 4);
    }
}
