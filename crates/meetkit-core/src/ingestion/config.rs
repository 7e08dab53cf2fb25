use serde::{Deserialize, Serialize};

use crate::errors::MeetingError;

pub const DEFAULT_FLUSH_SIZE: i64 = 20;
pub const DEFAULT_FLUSH_INTERVAL_MS: i64 = 5000;
pub const DEFAULT_RETRY_COUNT_LIMIT: i64 = 2;

const FLUSH_SIZE_RANGE: (i64, i64) = (1, 100);
const MIN_FLUSH_INTERVAL_MS: i64 = 300;
const RETRY_COUNT_LIMIT_RANGE: (i64, i64) = (1, 3);

/// Event client type sent as the `type` of every ingestion event.
pub const MEET_EVENT_CLIENT_TYPE: &str = "Meet";

/// Identity of the meeting whose events are ingested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeetingEventClientConfiguration {
    pub event_client_join_token: String,
    pub meeting_id: String,
    pub attendee_id: String,
}

impl MeetingEventClientConfiguration {
    pub fn new(
        event_client_join_token: impl Into<String>,
        meeting_id: impl Into<String>,
        attendee_id: impl Into<String>,
    ) -> Self {
        Self {
            event_client_join_token: event_client_join_token.into(),
            meeting_id: meeting_id.into(),
            attendee_id: attendee_id.into(),
        }
    }
}

/// Host platform and SDK identification attached to every ingestion record.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ClientMetadata {
    #[serde(default)]
    pub os_name: Option<String>,
    #[serde(default)]
    pub os_version: Option<String>,
    #[serde(default = "default_sdk_name")]
    pub sdk_name: Option<String>,
    #[serde(default = "default_sdk_version")]
    pub sdk_version: Option<String>,
    #[serde(default)]
    pub media_sdk_version: Option<String>,
    #[serde(default)]
    pub device_name: Option<String>,
    #[serde(default)]
    pub device_manufacturer: Option<String>,
    #[serde(default)]
    pub device_model: Option<String>,
}

fn default_sdk_name() -> Option<String> {
    Some(env!("CARGO_PKG_NAME").to_string())
}

fn default_sdk_version() -> Option<String> {
    Some(env!("CARGO_PKG_VERSION").to_string())
}

impl Default for ClientMetadata {
    fn default() -> Self {
        Self {
            os_name: Some(std::env::consts::OS.to_string()),
            os_version: None,
            sdk_name: default_sdk_name(),
            sdk_version: default_sdk_version(),
            media_sdk_version: None,
            device_name: None,
            device_manufacturer: None,
            device_model: None,
        }
    }
}

/// Validated settings for the event ingestion pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestionConfiguration {
    pub client_configuration: MeetingEventClientConfiguration,
    pub client_metadata: ClientMetadata,
    pub ingestion_url: String,
    pub disabled: bool,
    pub flush_size: usize,
    pub flush_interval_ms: u64,
    pub retry_count_limit: u32,
    pub backoff_base_ms: u64,
}

impl IngestionConfiguration {
    /// Out-of-range numeric values are clamped rather than rejected.
    pub fn new(
        client_configuration: MeetingEventClientConfiguration,
        ingestion_url: impl Into<String>,
        disabled: bool,
        flush_size: i64,
        flush_interval_ms: i64,
        retry_count_limit: i64,
    ) -> Self {
        Self {
            client_configuration,
            client_metadata: ClientMetadata::default(),
            ingestion_url: ingestion_url.into(),
            disabled,
            flush_size: flush_size.clamp(FLUSH_SIZE_RANGE.0, FLUSH_SIZE_RANGE.1) as usize,
            flush_interval_ms: flush_interval_ms.max(MIN_FLUSH_INTERVAL_MS) as u64,
            retry_count_limit: retry_count_limit
                .clamp(RETRY_COUNT_LIMIT_RANGE.0, RETRY_COUNT_LIMIT_RANGE.1)
                as u32,
            backoff_base_ms: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestionConfigurationBuilder {
    flush_size: i64,
    flush_interval_ms: i64,
    retry_count_limit: i64,
    backoff_base_ms: u64,
    client_metadata: ClientMetadata,
}

impl Default for IngestionConfigurationBuilder {
    fn default() -> Self {
        Self {
            flush_size: DEFAULT_FLUSH_SIZE,
            flush_interval_ms: DEFAULT_FLUSH_INTERVAL_MS,
            retry_count_limit: DEFAULT_RETRY_COUNT_LIMIT,
            backoff_base_ms: 0,
            client_metadata: ClientMetadata::default(),
        }
    }
}

impl IngestionConfigurationBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flush_size(mut self, flush_size: i64) -> Self {
        self.flush_size = flush_size;
        self
    }

    pub fn flush_interval_ms(mut self, flush_interval_ms: i64) -> Self {
        self.flush_interval_ms = flush_interval_ms;
        self
    }

    pub fn retry_count_limit(mut self, retry_count_limit: i64) -> Self {
        self.retry_count_limit = retry_count_limit;
        self
    }

    /// Base delay of the exponential backoff between HTTP retries.
    pub fn backoff_base_ms(mut self, backoff_base_ms: u64) -> Self {
        self.backoff_base_ms = backoff_base_ms;
        self
    }

    pub fn client_metadata(mut self, client_metadata: ClientMetadata) -> Self {
        self.client_metadata = client_metadata;
        self
    }

    /// Fails with `Configuration` when `ingestion_url` is not an absolute http(s) URL.
    pub fn build(
        self,
        disabled: bool,
        ingestion_url: &str,
        client_configuration: MeetingEventClientConfiguration,
    ) -> Result<IngestionConfiguration, MeetingError> {
        let parsed = url::Url::parse(ingestion_url)
            .map_err(|e| MeetingError::Configuration(format!("invalid ingestion url: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(MeetingError::Configuration(format!(
                "unsupported ingestion url scheme: {}",
                parsed.scheme()
            )));
        }

        let mut configuration = IngestionConfiguration::new(
            client_configuration,
            ingestion_url,
            disabled,
            self.flush_size,
            self.flush_interval_ms,
            self.retry_count_limit,
        );
        configuration.client_metadata = self.client_metadata;
        configuration.backoff_base_ms = self.backoff_base_ms;
        Ok(configuration)
    }
}
