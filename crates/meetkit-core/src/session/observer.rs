use crate::status::MeetingSessionStatus;

/// Audio session lifecycle callbacks, delivered on the main context.
///
/// Every method has an empty default so observers only implement what they
/// care about.
pub trait AudioVideoObserver: Send + Sync {
    fn audio_session_did_start_connecting(&self, _reconnecting: bool) {}

    fn audio_session_did_start(&self, _reconnecting: bool) {}

    fn audio_session_did_drop(&self) {}

    fn audio_session_did_stop_with_status(&self, _status: MeetingSessionStatus) {}

    fn audio_session_did_cancel_reconnect(&self) {}

    fn connection_did_recover(&self) {}

    fn connection_did_become_poor(&self) {}
}
