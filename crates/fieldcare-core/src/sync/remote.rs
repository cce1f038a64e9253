//! Push protocol: one "submit visit" request per pending visit.
//!
//! Any success-class response is an acknowledgement. Transport errors,
//! timeouts and non-success responses are all the same outcome: the visit
//! stays pending. The remote service is expected to treat a re-submitted
//! visit as a duplicate; every request carries an `Idempotency-Key` derived
//! from the visit's UUID and content hash to make that easy.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::config::SyncConfig;
use crate::models::Visit;

/// Why a single push did not get acknowledged.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PushError {
    #[error("Push timed out after {0:?}")]
    Timeout(Duration),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Remote rejected visit: HTTP {0}")]
    Rejected(u16),
}

/// Acknowledgement of a pushed visit.
#[derive(Debug, Clone, PartialEq)]
pub struct PushReceipt {
    /// HTTP status (or equivalent) of the acknowledgement
    pub status: u16,
}

/// The remote service visits are pushed to.
#[async_trait]
pub trait VisitRemote: Send + Sync {
    /// Submit one visit's full payload.
    async fn submit_visit(&self, visit: &Visit) -> Result<PushReceipt, PushError>;
}

/// Idempotency key for a visit's current content.
pub fn idempotency_key(visit: &Visit) -> String {
    format!("{}:{}", visit.local_uuid, visit.content_hash())
}

/// HTTP implementation of the push protocol.
pub struct HttpRemote {
    client: reqwest::Client,
    endpoint: String,
    probe_url: String,
    timeout: Duration,
}

impl HttpRemote {
    pub fn new(config: &SyncConfig) -> Result<Self, PushError> {
        let client = reqwest::Client::builder()
            .timeout(config.push_timeout())
            .build()
            .map_err(|e| PushError::Network(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            probe_url: config.probe_url().to_string(),
            timeout: config.push_timeout(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Whether the remote service answers at all.
    ///
    /// Any HTTP response, even an error status, means the network path works.
    pub async fn probe(&self) -> bool {
        match self.client.head(&self.probe_url).send().await {
            Ok(response) => {
                debug!(status = %response.status(), url = %self.probe_url, "Reachability probe answered");
                true
            }
            Err(e) => {
                debug!(error = %e, url = %self.probe_url, "Reachability probe failed");
                false
            }
        }
    }

    fn map_error(&self, e: reqwest::Error) -> PushError {
        if e.is_timeout() {
            PushError::Timeout(self.timeout)
        } else {
            PushError::Network(e.to_string())
        }
    }
}

#[async_trait]
impl VisitRemote for HttpRemote {
    async fn submit_visit(&self, visit: &Visit) -> Result<PushReceipt, PushError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("Idempotency-Key", idempotency_key(visit))
            .json(visit)
            .send()
            .await
            .map_err(|e| self.map_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PushError::Rejected(status.as_u16()));
        }

        Ok(PushReceipt {
            status: status.as_u16(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idempotency_key_tracks_content() {
        let mut visit = Visit::new(1, "2024-06-01".into());
        let key = idempotency_key(&visit);
        assert!(key.starts_with(&visit.local_uuid));
        assert_eq!(key, idempotency_key(&visit.clone()));

        visit.notes = "Changed".into();
        assert_ne!(key, idempotency_key(&visit));
    }

    #[test]
    fn test_http_remote_from_config() {
        let config = SyncConfig {
            endpoint: "http://127.0.0.1:9/api/visits".into(),
            ..SyncConfig::default()
        };
        let remote = HttpRemote::new(&config).unwrap();
        assert_eq!(remote.endpoint(), "http://127.0.0.1:9/api/visits");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_a_push_failure() {
        // Port 9 (discard) is closed on any sane test host.
        let config = SyncConfig {
            endpoint: "http://127.0.0.1:9/api/visits".into(),
            push_timeout_secs: 2,
            ..SyncConfig::default()
        };
        let remote = HttpRemote::new(&config).unwrap();
        let visit = Visit::new(1, "2024-06-01".into());

        let result = remote.submit_visit(&visit).await;
        assert!(matches!(
            result,
            Err(PushError::Network(_)) | Err(PushError::Timeout(_))
        ));
        assert!(!remote.probe().await);
    }
}
