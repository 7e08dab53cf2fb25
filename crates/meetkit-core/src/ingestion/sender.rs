use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;

use crate::errors::MeetingError;

use super::config::IngestionConfiguration;
use super::record::IngestionRecord;

/// Delivers an ingestion record. Returns `true` once the endpoint accepted it.
#[async_trait]
pub trait EventSender: Send + Sync {
    async fn send_events(&self, record: &IngestionRecord) -> bool;
}

const RETRYABLE_STATUS_CODES: [u16; 6] = [408, 429, 500, 502, 503, 504];
const MAX_BACKOFF: Duration = Duration::from_secs(2 * 60 * 60);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Exponential backoff over a fixed set of retryable HTTP statuses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRetryPolicy {
    pub max_retries: u32,
    pub backoff_base: Duration,
}

impl HttpRetryPolicy {
    pub fn new(max_retries: u32, backoff_base: Duration) -> Self {
        Self {
            max_retries,
            backoff_base,
        }
    }

    pub fn is_retryable(&self, status: u16) -> bool {
        RETRYABLE_STATUS_CODES.contains(&status)
    }

    /// Delay before retry number `retry` (starting at 1).
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry);
        self.backoff_base.saturating_mul(factor).min(MAX_BACKOFF)
    }
}

pub struct HttpEventSender {
    client: reqwest::Client,
    ingestion_url: String,
    join_token: String,
    retry_policy: HttpRetryPolicy,
}

impl HttpEventSender {
    pub fn new(configuration: &IngestionConfiguration) -> Result<Self, MeetingError> {
        Self::with_timeout(configuration, REQUEST_TIMEOUT)
    }

    /// Like [`HttpEventSender::new`] with a custom per-request timeout.
    pub fn with_timeout(
        configuration: &IngestionConfiguration,
        timeout: Duration,
    ) -> Result<Self, MeetingError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MeetingError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            ingestion_url: configuration.ingestion_url.clone(),
            join_token: configuration
                .client_configuration
                .event_client_join_token
                .clone(),
            retry_policy: HttpRetryPolicy::new(
                configuration.retry_count_limit,
                Duration::from_millis(configuration.backoff_base_ms),
            ),
        })
    }

    async fn post(&self, body: Vec<u8>) -> Result<u16, reqwest::Error> {
        let resp = self
            .client
            .post(&self.ingestion_url)
            .bearer_auth(&self.join_token)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;
        Ok(resp.status().as_u16())
    }
}

#[async_trait]
impl EventSender for HttpEventSender {
    async fn send_events(&self, record: &IngestionRecord) -> bool {
        let body = match serde_json::to_vec(record) {
            Ok(body) => body,
            Err(e) => {
                tracing::error!("unable to encode ingestion record: {e}");
                return false;
            }
        };

        let mut retries = 0;
        loop {
            let status = match self.post(body.clone()).await {
                Ok(status) => status,
                Err(e) if e.is_timeout() => 408,
                Err(e) => {
                    tracing::warn!("ingestion request failed: {e}");
                    return false;
                }
            };

            if (200..300).contains(&status) {
                return true;
            }
            if !self.retry_policy.is_retryable(status) || retries >= self.retry_policy.max_retries {
                tracing::warn!("ingestion rejected with status {status} after {retries} retries");
                return false;
            }

            retries += 1;
            let delay = self.retry_policy.backoff(retries);
            tracing::debug!("ingestion status {status}, retry {retries} in {delay:?}");
            tokio::time::sleep(delay).await;
        }
    }
}
