// src/services/notifier.rs
//! Outbound callback notifications for resolved verification requests.
//!
//! Delivery is best-effort: one attempt per terminal request, failures are
//! reported to the caller (who audits them) and never retried here.

use crate::models::verification::CallbackPayload;
use async_trait::async_trait;
use log::debug;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NotifyError {
    #[error("callback transport error: {0}")]
    Transport(String),

    #[error("callback endpoint answered {0}")]
    Status(u16),

    #[error("could not build http client: {0}")]
    Client(String),
}

#[async_trait]
pub trait CallbackNotifier: Send + Sync {
    async fn notify(&self, url: &str, payload: &CallbackPayload) -> Result<(), NotifyError>;
}

/// POSTs the payload as JSON.
pub struct HttpCallbackNotifier {
    client: reqwest::Client,
}

impl HttpCallbackNotifier {
    pub fn new(timeout: Duration) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::Client(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl CallbackNotifier for HttpCallbackNotifier {
    async fn notify(&self, url: &str, payload: &CallbackPayload) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Status(status.as_u16()));
        }
        debug!("Callback for {} delivered to {}", payload.request_id, url);
        Ok(())
    }
}

/// Notifier that keeps every call in memory.
#[cfg(test)]
#[derive(Default)]
pub struct RecordingNotifier {
    calls: std::sync::Mutex<Vec<(String, CallbackPayload)>>,
    fail: bool,
}

#[cfg(test)]
impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            calls: Default::default(),
            fail: true,
        }
    }

    pub fn calls(&self) -> Vec<(String, CallbackPayload)> {
        self.calls.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl CallbackNotifier for RecordingNotifier {
    async fn notify(&self, url: &str, payload: &CallbackPayload) -> Result<(), NotifyError> {
        self.calls
            .lock()
            .unwrap()
            .push((url.to_string(), payload.clone()));
        if self.fail {
            Err(NotifyError::Status(503))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::verification::RequestStatus;
    use chrono::Utc;
    use mockito::Matcher;
    use serde_json::json;

    fn payload(request_id: &str) -> CallbackPayload {
        CallbackPayload {
            request_id: request_id.into(),
            status: RequestStatus::Completed,
            result: None,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_http_notifier_posts_json() {
        let endpoint = mockito::mock("POST", "/callbacks/ok")
            .match_header("content-type", "application/json")
            .match_body(Matcher::PartialJson(json!({
                "request_id": "req-1",
                "status": "completed"
            })))
            .with_status(200)
            .create();

        let notifier = HttpCallbackNotifier::new(Duration::from_secs(2)).unwrap();
        let url = format!("{}/callbacks/ok", mockito::server_url());
        notifier.notify(&url, &payload("req-1")).await.unwrap();
        endpoint.assert();
    }

    #[tokio::test]
    async fn test_http_notifier_reports_error_status() {
        let _endpoint = mockito::mock("POST", "/callbacks/down")
            .with_status(503)
            .create();

        let notifier = HttpCallbackNotifier::new(Duration::from_secs(2)).unwrap();
        let url = format!("{}/callbacks/down", mockito::server_url());
        let err = notifier.notify(&url, &payload("req-2")).await.unwrap_err();
        assert_eq!(err, NotifyError::Status(503));
    }

    #[tokio::test]
    async fn test_http_notifier_transport_error() {
        let notifier = HttpCallbackNotifier::new(Duration::from_millis(200)).unwrap();
        let err = notifier
            .notify("http://127.0.0.1:1/", &payload("req-3"))
            .await
            .unwrap_err();
        assert!(matches!(err, NotifyError::Transport(_)));
    }
}
