use serde::{Deserialize, Serialize};

/// Top-level body POSTed to the ingestion endpoint.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IngestionRecord {
    pub metadata: IngestionMetadata,
    pub events: Vec<IngestionEvent>,
}

impl IngestionRecord {
    pub fn empty() -> Self {
        Self {
            metadata: IngestionMetadata::default(),
            events: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Ids of every payload in the record, in order.
    pub fn payload_ids(&self) -> Vec<String> {
        self.events
            .iter()
            .flat_map(|event| event.payloads.iter())
            .filter_map(|payload| payload.id.clone())
            .collect()
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IngestionEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(rename = "v")]
    pub version: u32,
    pub metadata: IngestionMetadata,
    pub payloads: Vec<IngestionPayload>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IngestionMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sdk_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sdk_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_sdk_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_manufacturer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meeting_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attendee_id: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IngestionPayload {
    pub name: String,
    pub ts: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_video_tile_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meeting_start_duration_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meeting_duration_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meeting_error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meeting_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poor_connection_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_input_error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<i64>,
}

/// Flattened event attributes as persisted in the event stores.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IngestionEventAttributes {
    #[serde(default)]
    pub timestamp_ms: Option<i64>,
    #[serde(default)]
    pub max_video_tile_count: Option<i64>,
    #[serde(default)]
    pub meeting_start_duration_ms: Option<i64>,
    #[serde(default)]
    pub meeting_duration_ms: Option<i64>,
    #[serde(default)]
    pub meeting_error_message: Option<String>,
    #[serde(default)]
    pub meeting_status: Option<String>,
    #[serde(default)]
    pub poor_connection_count: Option<i64>,
    #[serde(default)]
    pub retry_count: Option<i64>,
    #[serde(default)]
    pub video_input_error: Option<String>,
    #[serde(default)]
    pub meeting_id: Option<String>,
    #[serde(default)]
    pub attendee_id: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IngestionMeetingEvent {
    pub name: String,
    pub event_attributes: IngestionEventAttributes,
}

/// A buffered event awaiting its first delivery attempt.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct MeetingEventItem {
    pub id: String,
    pub data: IngestionMeetingEvent,
}

/// An event whose delivery failed, kept until `ttl` (epoch ms).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DirtyMeetingEventItem {
    pub id: String,
    pub data: IngestionMeetingEvent,
    pub ttl: i64,
}

impl DirtyMeetingEventItem {
    pub fn from_item(item: MeetingEventItem, ttl: i64) -> Self {
        Self {
            id: item.id,
            data: item.data,
            ttl,
        }
    }
}
