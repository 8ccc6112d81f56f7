// src/services/audit.rs
//! Audit trail for lifecycle transitions.
//!
//! Every component appends [`AuditEvent`]s through a shared [`AuditTrail`].
//! Appends are best-effort: a failing sink never blocks or fails the operation
//! that produced the event. Failures are swallowed, counted and logged.

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// What happened.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventKind {
    IssuerRegistered,
    IssuerVerified,
    IssuerUnverified,
    IssuerRemoved,
    AdminTransferred,
    CredentialReserved,
    CredentialIssued,
    CredentialActivated,
    CredentialFailed,
    CredentialRevoked,
    CredentialSuspended,
    CredentialReinstated,
    CredentialExpired,
    ProofBindingChecked,
    TransactionSubmitted,
    JobQueued,
    JobAttempt,
    JobRetryScheduled,
    JobSucceeded,
    JobFailed,
    JobCancelled,
    /// A mint confirmed on chain for a credential that was no longer pending
    OrphanedMint,
    RequestCreated,
    RequestResolved,
    CallbackFailed,
}

/// A single audit record.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub kind: AuditEventKind,
    /// Entity the event is about (issuer id, commitment, job id, request id)
    pub subject: String,
    pub actor: Option<String>,
    pub job_id: Option<String>,
    pub attempt: Option<u32>,
    /// Upstream error that caused the transition, if any
    pub error: Option<String>,
    pub detail: Option<String>,
}

impl AuditEvent {
    pub fn new(kind: AuditEventKind, subject: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            kind,
            subject: subject.into(),
            actor: None,
            job_id: None,
            attempt: None,
            error: None,
            detail: None,
        }
    }

    pub fn actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn job(mut self, job_id: impl Into<String>, attempt: u32) -> Self {
        self.job_id = Some(job_id.into());
        self.attempt = Some(attempt);
        self
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit sink unavailable: {0}")]
    Unavailable(String),
}

/// Destination for audit events. Implementations must tolerate concurrent appends.
pub trait AuditSink: Send + Sync {
    fn append(&self, event: &AuditEvent) -> Result<(), AuditError>;
}

/// Keeps events in memory; backs queries and tests.
#[derive(Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn events_for(&self, subject: &str) -> Vec<AuditEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.subject == subject)
            .collect()
    }

    pub fn count(&self, kind: AuditEventKind) -> usize {
        self.events().iter().filter(|e| e.kind == kind).count()
    }
}

impl AuditSink for MemoryAuditSink {
    fn append(&self, event: &AuditEvent) -> Result<(), AuditError> {
        let mut events = self
            .events
            .lock()
            .map_err(|_| AuditError::Unavailable("memory sink poisoned".into()))?;
        events.push(event.clone());
        Ok(())
    }
}

/// Mirrors events into the `audit` log target.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAuditSink;

impl AuditSink for LogAuditSink {
    fn append(&self, event: &AuditEvent) -> Result<(), AuditError> {
        let line = serde_json::to_string(event)
            .map_err(|e| AuditError::Unavailable(e.to_string()))?;
        info!(target: "audit", "{}", line);
        Ok(())
    }
}

/// Fan-out over the configured sinks with a counter of swallowed failures.
#[derive(Default)]
pub struct AuditTrail {
    sinks: Vec<Arc<dyn AuditSink>>,
    dropped: AtomicU64,
}

impl AuditTrail {
    pub fn new(sinks: Vec<Arc<dyn AuditSink>>) -> Self {
        Self {
            sinks,
            dropped: AtomicU64::new(0),
        }
    }

    /// A trail that records into `sink` only.
    pub fn with_sink(sink: Arc<dyn AuditSink>) -> Self {
        Self::new(vec![sink])
    }

    /// Appends to every sink. Never fails.
    pub fn record(&self, event: AuditEvent) {
        for sink in &self.sinks {
            if let Err(e) = sink.append(&event) {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("audit append failed for {:?} on '{}': {}", event.kind, event.subject, e);
            }
        }
    }

    /// Number of appends that failed and were swallowed.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
