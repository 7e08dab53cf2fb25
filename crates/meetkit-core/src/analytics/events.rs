use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::status::MeetingSessionStatusCode;

/// Analytics events published by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventName {
    /// The camera selection failed.
    VideoInputFailed,
    /// The meeting will start.
    MeetingStartRequested,
    /// The meeting started.
    MeetingStartSucceeded,
    /// The meeting failed to start.
    MeetingStartFailed,
    /// The meeting reconnected after a drop.
    MeetingReconnected,
    /// The meeting ended with failure.
    MeetingFailed,
    /// The meeting ended.
    MeetingEnded,
}

impl EventName {
    pub fn name(self) -> &'static str {
        match self {
            Self::VideoInputFailed => "videoInputFailed",
            Self::MeetingStartRequested => "meetingStartRequested",
            Self::MeetingStartSucceeded => "meetingStartSucceeded",
            Self::MeetingStartFailed => "meetingStartFailed",
            Self::MeetingReconnected => "meetingReconnected",
            Self::MeetingFailed => "meetingFailed",
            Self::MeetingEnded => "meetingEnded",
        }
    }

    /// Events that carry the accumulated meeting stats.
    pub fn includes_meeting_stats(self) -> bool {
        matches!(
            self,
            Self::MeetingFailed
                | Self::MeetingEnded
                | Self::MeetingStartFailed
                | Self::MeetingStartSucceeded
                | Self::MeetingReconnected
        )
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventAttributeName {
    DeviceName,
    DeviceManufacturer,
    DeviceModel,
    OsName,
    OsVersion,
    SdkName,
    SdkVersion,
    MediaSdkVersion,
    TimestampMs,
    AttendeeId,
    ExternalMeetingId,
    ExternalUserId,
    MeetingId,
    MaxVideoTileCount,
    MeetingStartDurationMs,
    MeetingDurationMs,
    MeetingReconnectDurationMs,
    MeetingErrorMessage,
    MeetingStatus,
    PoorConnectionCount,
    RetryCount,
    VideoInputError,
    AppState,
    BatteryState,
    BatteryLevel,
    LowPowerModeEnabled,
}

pub type EventAttributes = BTreeMap<EventAttributeName, serde_json::Value>;

/// An event handed to the reporter for ingestion.
#[derive(Debug, Clone, PartialEq)]
pub struct SdkEvent {
    pub name: EventName,
    pub attributes: EventAttributes,
}

impl SdkEvent {
    pub fn new(name: EventName, attributes: EventAttributes) -> Self {
        Self { name, attributes }
    }

    pub fn timestamp_ms(&self) -> Option<i64> {
        self.attributes
            .get(&EventAttributeName::TimestampMs)
            .and_then(|v| v.as_i64())
    }

    pub fn meeting_status(&self) -> Option<MeetingSessionStatusCode> {
        self.attributes
            .get(&EventAttributeName::MeetingStatus)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeetingHistoryEvent {
    pub name: EventName,
    pub timestamp_ms: i64,
}
