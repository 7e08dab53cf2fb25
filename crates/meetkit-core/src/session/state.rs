use std::fmt;

use crate::status::MeetingSessionStatusCode;

/// Connection state reported by the platform audio client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RawAudioState {
    Unknown,
    Init,
    Connecting,
    Connected,
    Reconnecting,
    Disconnecting,
    DisconnectedNormal,
    DisconnectedAbnormal,
    ServerHungup,
    FailedToConnect,
}

impl RawAudioState {
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            0 => Self::Init,
            1 => Self::Connecting,
            2 => Self::Connected,
            3 => Self::Reconnecting,
            4 => Self::Disconnecting,
            5 => Self::DisconnectedNormal,
            6 => Self::DisconnectedAbnormal,
            7 => Self::ServerHungup,
            8 => Self::FailedToConnect,
            _ => Self::Unknown,
        }
    }
}

/// What a raw signal asks the controller to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum SessionAction {
    Unknown,
    Initialize,
    Connecting,
    FinishConnecting,
    Reconnecting,
    Disconnecting,
    FinishDisconnecting,
    Fail,
}

impl SessionAction {
    /// Authoritative disconnect statuses override whatever state was reported.
    pub(crate) fn from_signal(raw: RawAudioState, status: MeetingSessionStatusCode) -> Self {
        if status.is_authoritative_disconnect() {
            return Self::Fail;
        }
        match raw {
            RawAudioState::Unknown => Self::Unknown,
            RawAudioState::Init => Self::Initialize,
            RawAudioState::Connecting => Self::Connecting,
            RawAudioState::Connected => Self::FinishConnecting,
            RawAudioState::Reconnecting => Self::Reconnecting,
            RawAudioState::Disconnecting => Self::Disconnecting,
            RawAudioState::DisconnectedNormal => Self::FinishDisconnecting,
            RawAudioState::DisconnectedAbnormal
            | RawAudioState::ServerHungup
            | RawAudioState::FailedToConnect => Self::Fail,
        }
    }

    /// State this action leads to, or `None` for `Unknown`.
    ///
    /// A failure reported with an `Ok` status is recorded as `Unknown` so it
    /// still takes the failure path.
    pub(crate) fn target(self, status: MeetingSessionStatusCode) -> Option<SessionState> {
        let state = match self {
            Self::Unknown => return None,
            Self::Initialize => SessionState::Initialized,
            Self::Connecting => SessionState::Connecting,
            Self::FinishConnecting => SessionState::Connected,
            Self::Reconnecting => SessionState::Reconnecting,
            Self::Disconnecting => SessionState::Disconnecting,
            Self::FinishDisconnecting => SessionState::Disconnected(status),
            Self::Fail if status.is_ok() => {
                SessionState::Disconnected(MeetingSessionStatusCode::Unknown)
            }
            Self::Fail => SessionState::Disconnected(status),
        };
        Some(state)
    }
}

/// Canonical lifecycle of the audio/video session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Uninitialized,
    Initialized,
    Connecting,
    Connected,
    Reconnecting,
    Disconnecting,
    Disconnected(MeetingSessionStatusCode),
}

impl SessionState {
    pub fn can_transition_to(&self, next: &SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Uninitialized, Initialized | Connecting | Disconnected(_))
                | (Initialized, Connecting | Disconnected(_))
                | (Connecting, Connected | Disconnecting | Disconnected(_))
                | (Connected, Reconnecting | Disconnecting | Disconnected(_))
                | (Reconnecting, Connected | Disconnecting | Disconnected(_))
                | (Disconnecting, Disconnected(_))
        )
    }

    pub fn is_disconnected(&self) -> bool {
        matches!(self, Self::Disconnected(_))
    }

    /// Same variant, ignoring the disconnect status.
    pub(crate) fn same_kind(&self, other: &SessionState) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => f.write_str("uninitialized"),
            Self::Initialized => f.write_str("initialized"),
            Self::Connecting => f.write_str("connecting"),
            Self::Connected => f.write_str("connected"),
            Self::Reconnecting => f.write_str("reconnecting"),
            Self::Disconnecting => f.write_str("disconnecting"),
            Self::Disconnected(status) => write!(f, "disconnected({status})"),
        }
    }
}
