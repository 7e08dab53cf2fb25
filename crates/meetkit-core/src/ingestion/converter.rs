use crate::analytics::{EventAttributeName, EventAttributes, SdkEvent};

use super::config::{IngestionConfiguration, MEET_EVENT_CLIENT_TYPE};
use super::record::{
    IngestionEvent, IngestionEventAttributes, IngestionMeetingEvent, IngestionMetadata,
    IngestionPayload, IngestionRecord,
};
use super::store::StoredEvent;

const INGESTION_EVENT_VERSION: u32 = 1;

fn int_attr(attributes: &EventAttributes, name: EventAttributeName) -> Option<i64> {
    attributes.get(&name).and_then(|v| v.as_i64())
}

fn str_attr(attributes: &EventAttributes, name: EventAttributeName) -> Option<String> {
    attributes.get(&name).and_then(|v| v.as_str()).map(str::to_string)
}

/// Flatten an analytics event into its persisted form, tagged with the
/// configured meeting and attendee.
pub fn to_ingestion_meeting_event(
    event: &SdkEvent,
    configuration: &IngestionConfiguration,
) -> IngestionMeetingEvent {
    let attributes = &event.attributes;
    let client = &configuration.client_configuration;
    IngestionMeetingEvent {
        name: event.name.name().to_string(),
        event_attributes: IngestionEventAttributes {
            timestamp_ms: int_attr(attributes, EventAttributeName::TimestampMs),
            max_video_tile_count: int_attr(attributes, EventAttributeName::MaxVideoTileCount),
            meeting_start_duration_ms: int_attr(
                attributes,
                EventAttributeName::MeetingStartDurationMs,
            ),
            meeting_duration_ms: int_attr(attributes, EventAttributeName::MeetingDurationMs),
            meeting_error_message: str_attr(attributes, EventAttributeName::MeetingErrorMessage),
            meeting_status: str_attr(attributes, EventAttributeName::MeetingStatus),
            poor_connection_count: int_attr(attributes, EventAttributeName::PoorConnectionCount),
            retry_count: int_attr(attributes, EventAttributeName::RetryCount),
            video_input_error: str_attr(attributes, EventAttributeName::VideoInputError),
            meeting_id: Some(client.meeting_id.clone()),
            attendee_id: Some(client.attendee_id.clone()),
        },
    }
}

/// Build one record from stored items, one ingestion event per meeting id
/// in order of first appearance.
pub fn to_ingestion_record<T: StoredEvent>(
    items: &[T],
    configuration: &IngestionConfiguration,
) -> IngestionRecord {
    if items.is_empty() {
        return IngestionRecord::empty();
    }

    let mut groups: Vec<(Option<&str>, Vec<&T>)> = Vec::new();
    for item in items {
        let meeting_id = item.data().event_attributes.meeting_id.as_deref();
        match groups.iter_mut().find(|(id, _)| *id == meeting_id) {
            Some((_, members)) => members.push(item),
            None => groups.push((meeting_id, vec![item])),
        }
    }

    let events = groups
        .into_iter()
        .map(|(_, members)| {
            let first = members[0].data();
            IngestionEvent {
                event_type: MEET_EVENT_CLIENT_TYPE.to_string(),
                version: INGESTION_EVENT_VERSION,
                metadata: IngestionMetadata {
                    meeting_id: first.event_attributes.meeting_id.clone(),
                    attendee_id: first.event_attributes.attendee_id.clone(),
                    ..Default::default()
                },
                payloads: members.into_iter().map(to_payload).collect(),
            }
        })
        .collect();

    IngestionRecord {
        metadata: root_metadata(configuration),
        events,
    }
}

fn to_payload<T: StoredEvent>(item: &T) -> IngestionPayload {
    let data = item.data();
    let attributes = &data.event_attributes;
    IngestionPayload {
        name: data.name.clone(),
        ts: attributes.timestamp_ms.unwrap_or(0),
        id: Some(item.id().to_string()),
        max_video_tile_count: attributes.max_video_tile_count,
        meeting_start_duration_ms: attributes.meeting_start_duration_ms,
        meeting_duration_ms: attributes.meeting_duration_ms,
        meeting_error_message: attributes.meeting_error_message.clone(),
        meeting_status: attributes.meeting_status.clone(),
        poor_connection_count: attributes.poor_connection_count,
        retry_count: attributes.retry_count,
        video_input_error_message: attributes.video_input_error.clone(),
        ttl: item.ttl(),
    }
}

fn root_metadata(configuration: &IngestionConfiguration) -> IngestionMetadata {
    let metadata = &configuration.client_metadata;
    let client = &configuration.client_configuration;
    IngestionMetadata {
        os_name: metadata.os_name.clone(),
        os_version: metadata.os_version.clone(),
        sdk_version: metadata.sdk_version.clone(),
        sdk_name: metadata.sdk_name.clone(),
        media_sdk_version: metadata.media_sdk_version.clone(),
        device_name: metadata.device_name.clone(),
        device_manufacturer: metadata.device_manufacturer.clone(),
        device_model: metadata.device_model.clone(),
        meeting_id: Some(client.meeting_id.clone()),
        attendee_id: Some(client.attendee_id.clone()),
    }
}
