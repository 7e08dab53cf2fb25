use std::fmt;

use serde::{Deserialize, Serialize};

/// Status codes reported by the media client alongside its state changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MeetingSessionStatusCode {
    /// Everything is OK so far.
    Ok,
    /// The audio leg failed.
    AudioDisconnected,
    /// Due to connection health a reconnect has been triggered.
    ConnectionHealthReconnect,
    /// Video service is unavailable.
    VideoServiceUnavailable,
    /// Network is not good enough for VoIP.
    NetworkBecamePoor,
    /// Server hung up.
    AudioServerHungup,
    /// The attendee joined from another device.
    AudioJoinedFromAnotherDevice,
    /// Internal server error on the audio leg.
    AudioInternalServerError,
    /// The client is not allowed on this call.
    AudioAuthenticationRejected,
    /// The call is at capacity.
    AudioCallAtCapacity,
    /// The audio service is unavailable.
    AudioServiceUnavailable,
    /// The attendee should switch from joined-with-audio to checked-in.
    AudioDisconnectAudio,
    /// The call was ended.
    AudioCallEnded,
    /// Raw status could not be parsed.
    Unknown,
    /// Maximum concurrent video channels reached.
    VideoAtCapacityViewOnly,
}

impl MeetingSessionStatusCode {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0 => Self::Ok,
            9 => Self::AudioDisconnected,
            10 => Self::ConnectionHealthReconnect,
            12 => Self::VideoServiceUnavailable,
            59 => Self::NetworkBecamePoor,
            60 => Self::AudioServerHungup,
            61 => Self::AudioJoinedFromAnotherDevice,
            62 => Self::AudioInternalServerError,
            63 => Self::AudioAuthenticationRejected,
            64 => Self::AudioCallAtCapacity,
            65 => Self::AudioServiceUnavailable,
            69 => Self::AudioDisconnectAudio,
            75 => Self::AudioCallEnded,
            206 => Self::VideoAtCapacityViewOnly,
            _ => Self::Unknown,
        }
    }

    pub fn raw(self) -> u32 {
        match self {
            Self::Ok => 0,
            Self::AudioDisconnected => 9,
            Self::ConnectionHealthReconnect => 10,
            Self::VideoServiceUnavailable => 12,
            Self::NetworkBecamePoor => 59,
            Self::AudioServerHungup => 60,
            Self::AudioJoinedFromAnotherDevice => 61,
            Self::AudioInternalServerError => 62,
            Self::AudioAuthenticationRejected => 63,
            Self::AudioCallAtCapacity => 64,
            Self::AudioServiceUnavailable => 65,
            Self::AudioDisconnectAudio => 69,
            Self::AudioCallEnded => 75,
            Self::Unknown => 78,
            Self::VideoAtCapacityViewOnly => 206,
        }
    }

    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }

    /// The server (or another device) has ended this attendee's session.
    /// These codes force a disconnect whatever state the client reports.
    pub fn is_authoritative_disconnect(self) -> bool {
        matches!(
            self,
            Self::AudioServerHungup
                | Self::AudioJoinedFromAnotherDevice
                | Self::AudioAuthenticationRejected
                | Self::AudioCallAtCapacity
                | Self::AudioDisconnectAudio
                | Self::AudioCallEnded
        )
    }

    /// Wire name used in telemetry payloads.
    pub fn name(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::AudioDisconnected => "audioDisconnected",
            Self::ConnectionHealthReconnect => "connectionHealthReconnect",
            Self::VideoServiceUnavailable => "videoServiceUnavailable",
            Self::NetworkBecamePoor => "networkBecamePoor",
            Self::AudioServerHungup => "audioServerHungup",
            Self::AudioJoinedFromAnotherDevice => "audioJoinedFromAnotherDevice",
            Self::AudioInternalServerError => "audioInternalServerError",
            Self::AudioAuthenticationRejected => "audioAuthenticationRejected",
            Self::AudioCallAtCapacity => "audioCallAtCapacity",
            Self::AudioServiceUnavailable => "audioServiceUnavailable",
            Self::AudioDisconnectAudio => "audioDisconnectAudio",
            Self::AudioCallEnded => "audioCallEnded",
            Self::Unknown => "unknown",
            Self::VideoAtCapacityViewOnly => "videoAtCapacityViewOnly",
        }
    }
}

impl fmt::Display for MeetingSessionStatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeetingSessionStatus {
    pub status_code: MeetingSessionStatusCode,
}

impl MeetingSessionStatus {
    pub fn new(status_code: MeetingSessionStatusCode) -> Self {
        Self { status_code }
    }

    pub fn ok() -> Self {
        Self::new(MeetingSessionStatusCode::Ok)
    }

    pub fn is_ok(&self) -> bool {
        self.status_code.is_ok()
    }
}

impl From<MeetingSessionStatusCode> for MeetingSessionStatus {
    fn from(status_code: MeetingSessionStatusCode) -> Self {
        Self::new(status_code)
    }
}
