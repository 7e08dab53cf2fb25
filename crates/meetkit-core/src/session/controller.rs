use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex};

use crate::analytics::{EventAnalyticsController, EventAttributeName, EventAttributes, EventName};
use crate::audio_video::AudioClient;
use crate::errors::MeetingError;
use crate::observer::{MainContext, ObserverSet};
use crate::status::{MeetingSessionStatus, MeetingSessionStatusCode};

use super::observer::AudioVideoObserver;
use super::state::{RawAudioState, SessionAction, SessionState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Stopped,
    Started,
}

/// Side effects of one transition, run after the state lock is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Effect {
    DidStart { reconnecting: bool },
    DidDrop,
    DidCancelReconnect,
    DidStop(MeetingSessionStatusCode),
    BecamePoor,
    Recovered,
    StopClient,
}

struct ControllerState {
    state: SessionState,
    lifecycle: Lifecycle,
    last_signal: Option<(SessionAction, MeetingSessionStatusCode)>,
    poor_connection: bool,
}

impl ControllerState {
    fn apply(&mut self, action: SessionAction, status: MeetingSessionStatusCode) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.last_signal == Some((action, status)) {
            return effects;
        }
        let Some(target) = action.target(status) else {
            return effects;
        };
        let from = self.state;

        if from.is_disconnected() {
            tracing::debug!("session disconnected, ignoring {action:?} ({status})");
            return effects;
        }
        if from.same_kind(&target) {
            self.last_signal = Some((action, status));
            if target == SessionState::Connected {
                self.update_poor_connection(status, &mut effects);
            }
            return effects;
        }
        if !from.can_transition_to(&target) {
            tracing::debug!("ignoring transition {from} -> {target}");
            return effects;
        }

        self.last_signal = Some((action, status));
        self.state = target;
        tracing::info!("session state {from} -> {target}");

        match (from, target) {
            (SessionState::Connecting, SessionState::Connected) => {
                effects.push(Effect::DidStart { reconnecting: false });
            }
            (SessionState::Reconnecting, SessionState::Connected) => {
                effects.push(Effect::DidStart { reconnecting: true });
            }
            (SessionState::Connected, SessionState::Reconnecting) => {
                effects.push(Effect::DidDrop);
            }
            (SessionState::Reconnecting, SessionState::Disconnected(code)) => {
                effects.push(Effect::DidCancelReconnect);
                if !code.is_ok() {
                    self.fail(code, &mut effects);
                }
            }
            (_, SessionState::Disconnected(code)) if !code.is_ok() => {
                self.fail(code, &mut effects);
            }
            _ => {}
        }

        if target == SessionState::Connected {
            self.update_poor_connection(status, &mut effects);
        } else if target.is_disconnected() {
            self.poor_connection = false;
        }
        effects
    }

    fn update_poor_connection(&mut self, status: MeetingSessionStatusCode, effects: &mut Vec<Effect>) {
        let poor = status == MeetingSessionStatusCode::NetworkBecamePoor;
        match (self.poor_connection, poor) {
            (false, true) => effects.push(Effect::BecamePoor),
            (true, false) => effects.push(Effect::Recovered),
            _ => {}
        }
        self.poor_connection = poor;
    }

    fn fail(&mut self, code: MeetingSessionStatusCode, effects: &mut Vec<Effect>) {
        if self.lifecycle != Lifecycle::Started {
            tracing::info!("session failed with {code} while stopped, skipping cleanup");
            return;
        }
        self.lifecycle = Lifecycle::Stopped;
        effects.push(Effect::DidStop(code));
        effects.push(Effect::StopClient);
    }
}

/// Turns raw audio client signals into canonical session transitions.
///
/// Each logical transition produces exactly one notification. Signals may
/// arrive from any thread; notifications leave in the order the signals
/// were applied.
pub struct SessionStateController {
    inner: Mutex<ControllerState>,
    dispatch: ReentrantMutex<()>,
    observers: ObserverSet<dyn AudioVideoObserver>,
    audio_client: Arc<dyn AudioClient>,
    analytics: Arc<EventAnalyticsController>,
}

impl SessionStateController {
    pub fn new(
        main: MainContext,
        audio_client: Arc<dyn AudioClient>,
        analytics: Arc<EventAnalyticsController>,
    ) -> Self {
        Self {
            inner: Mutex::new(ControllerState {
                state: SessionState::Uninitialized,
                lifecycle: Lifecycle::Stopped,
                last_signal: None,
                poor_connection: false,
            }),
            dispatch: ReentrantMutex::new(()),
            observers: ObserverSet::new(main),
            audio_client,
            analytics,
        }
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    pub fn is_started(&self) -> bool {
        self.inner.lock().lifecycle == Lifecycle::Started
    }

    pub fn is_connection_poor(&self) -> bool {
        self.inner.lock().poor_connection
    }

    pub fn add_observer(&self, observer: &Arc<dyn AudioVideoObserver>) {
        self.observers.subscribe(observer);
    }

    pub fn remove_observer(&self, observer: &Arc<dyn AudioVideoObserver>) {
        self.observers.unsubscribe(observer);
    }

    /// Arm the controller for a new session. Returns the state it replaced.
    pub fn begin(&self) -> Result<SessionState, MeetingError> {
        let _ordered = self.dispatch.lock();
        let previous = {
            let mut inner = self.inner.lock();
            if inner.lifecycle == Lifecycle::Started {
                return Err(MeetingError::StateConflict(
                    "audio session already started".to_string(),
                ));
            }
            let previous = inner.state;
            inner.lifecycle = Lifecycle::Started;
            inner.state = SessionState::Connecting;
            inner.last_signal = None;
            inner.poor_connection = false;
            previous
        };
        self.analytics.stats().update_meeting_start_connecting_time();
        tracing::info!("session started, {previous} -> connecting");
        Ok(previous)
    }

    /// Undo a `begin` whose platform start failed.
    pub fn cancel_begin(&self, previous: SessionState) {
        let _ordered = self.dispatch.lock();
        let mut inner = self.inner.lock();
        inner.lifecycle = Lifecycle::Stopped;
        inner.state = previous;
    }

    /// Mark the session stopped. Returns whether it was started.
    pub fn end(&self) -> bool {
        let _ordered = self.dispatch.lock();
        let mut inner = self.inner.lock();
        let was_started = inner.lifecycle == Lifecycle::Started;
        inner.lifecycle = Lifecycle::Stopped;
        was_started
    }

    /// Feed one signal from the audio client. Never fails.
    pub fn on_signal(&self, raw: RawAudioState, status: MeetingSessionStatusCode) {
        let action = SessionAction::from_signal(raw, status);
        if action == SessionAction::Unknown {
            tracing::debug!("ignoring unknown audio state {raw:?} ({status})");
            return;
        }

        let _ordered = self.dispatch.lock();
        let effects = self.inner.lock().apply(action, status);
        for effect in effects {
            self.execute(effect);
        }
    }

    /// Dispatch to audio/video observers in order with state notifications.
    pub fn notify<F>(&self, f: F)
    where
        F: Fn(&(dyn AudioVideoObserver + 'static)) + Send + 'static,
    {
        let _ordered = self.dispatch.lock();
        self.observers.notify_all(f);
    }

    fn execute(&self, effect: Effect) {
        let stats = self.analytics.stats();
        match effect {
            Effect::DidStart { reconnecting } => {
                if reconnecting {
                    stats.update_meeting_reconnected_time();
                    self.analytics
                        .publish_event(EventName::MeetingReconnected, EventAttributes::new());
                } else {
                    stats.update_meeting_start_time();
                    self.analytics
                        .publish_event(EventName::MeetingStartSucceeded, EventAttributes::new());
                }
                self.observers
                    .notify_all(move |o| o.audio_session_did_start(reconnecting));
            }
            Effect::DidDrop => {
                stats.increment_retry_count();
                stats.update_meeting_start_reconnecting_time();
                self.observers.notify_all(|o| o.audio_session_did_drop());
            }
            Effect::DidCancelReconnect => {
                self.observers
                    .notify_all(|o| o.audio_session_did_cancel_reconnect());
            }
            Effect::DidStop(code) => {
                let name = if stats.has_started() {
                    EventName::MeetingFailed
                } else {
                    EventName::MeetingStartFailed
                };
                let attributes = EventAttributes::from([
                    (EventAttributeName::MeetingStatus, code.name().into()),
                    (EventAttributeName::MeetingErrorMessage, code.name().into()),
                ]);
                self.analytics.publish_event(name, attributes);
                stats.reset();
                self.observers.notify_all(move |o| {
                    o.audio_session_did_stop_with_status(MeetingSessionStatus::new(code))
                });
            }
            Effect::BecamePoor => {
                stats.increment_poor_connection_count();
                self.observers.notify_all(|o| o.connection_did_become_poor());
            }
            Effect::Recovered => {
                self.observers.notify_all(|o| o.connection_did_recover());
            }
            Effect::StopClient => {
                let client = self.audio_client.clone();
                self.observers
                    .main_context()
                    .post(move || client.stop_session());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::analytics::{EventAnalyticsObserver, MeetingStatsCollector};
    use crate::audio_video::MeetingSessionConfiguration;
    use crate::ingestion::ClientMetadata;

    use MeetingSessionStatusCode as Code;
    use RawAudioState as Raw;

    #[derive(Default)]
    struct RecordingObserver {
        calls: parking_lot::Mutex<Vec<String>>,
    }

    impl RecordingObserver {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }

        fn record(&self, call: impl Into<String>) {
            self.calls.lock().push(call.into());
        }
    }

    impl AudioVideoObserver for RecordingObserver {
        fn audio_session_did_start_connecting(&self, reconnecting: bool) {
            self.record(format!("start_connecting({reconnecting})"));
        }

        fn audio_session_did_start(&self, reconnecting: bool) {
            self.record(format!("start({reconnecting})"));
        }

        fn audio_session_did_drop(&self) {
            self.record("drop");
        }

        fn audio_session_did_stop_with_status(&self, status: MeetingSessionStatus) {
            self.record(format!("stop({})", status.status_code));
        }

        fn audio_session_did_cancel_reconnect(&self) {
            self.record("cancel_reconnect");
        }

        fn connection_did_recover(&self) {
            self.record("recover");
        }

        fn connection_did_become_poor(&self) {
            self.record("poor");
        }
    }

    #[derive(Default)]
    struct FakeAudioClient {
        stops: AtomicUsize,
    }

    impl AudioClient for FakeAudioClient {
        fn start_session(&self, _configuration: &MeetingSessionConfiguration) -> Result<(), MeetingError> {
            Ok(())
        }

        fn stop_session(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }

        fn set_mute(&self, _mute: bool) -> bool {
            true
        }
    }

    #[derive(Default)]
    struct AnalyticsCapture {
        names: parking_lot::Mutex<Vec<EventName>>,
    }

    impl EventAnalyticsObserver for AnalyticsCapture {
        fn event_did_receive(&self, name: EventName, _attributes: &EventAttributes) {
            self.names.lock().push(name);
        }
    }

    struct Fixture {
        controller: SessionStateController,
        main: MainContext,
        observer: Arc<RecordingObserver>,
        client: Arc<FakeAudioClient>,
        analytics: Arc<AnalyticsCapture>,
        _handles: (Arc<dyn AudioVideoObserver>, Arc<dyn EventAnalyticsObserver>),
    }

    impl Fixture {
        fn new() -> Self {
            let main = MainContext::new("session-test").unwrap();
            let analytics_controller = Arc::new(EventAnalyticsController::new(
                main.clone(),
                "meeting-1",
                "attendee-1",
                &ClientMetadata::default(),
                Arc::new(MeetingStatsCollector::new()),
                None,
            ));
            let client = Arc::new(FakeAudioClient::default());
            let controller = SessionStateController::new(main.clone(), client.clone(), analytics_controller.clone());

            let observer = Arc::new(RecordingObserver::default());
            let observer_handle: Arc<dyn AudioVideoObserver> = observer.clone();
            controller.add_observer(&observer_handle);
            let analytics = Arc::new(AnalyticsCapture::default());
            let analytics_handle: Arc<dyn EventAnalyticsObserver> = analytics.clone();
            analytics_controller.add_observer(&analytics_handle);

            Self {
                controller,
                main,
                observer,
                client,
                analytics,
                _handles: (observer_handle, analytics_handle),
            }
        }

        fn signal(&self, raw: RawAudioState, status: MeetingSessionStatusCode) {
            self.controller.on_signal(raw, status);
        }

        fn calls(&self) -> Vec<String> {
            self.main.sync(|| ());
            self.observer.calls()
        }

        fn connected(&self) {
            self.controller.begin().unwrap();
            self.signal(Raw::Connecting, Code::Ok);
            self.signal(Raw::Connected, Code::Ok);
        }
    }

    #[test]
    fn connecting_to_connected_notifies_start_once() {
        let f = Fixture::new();
        f.connected();
        f.signal(Raw::Connected, Code::Ok);

        assert_eq!(f.controller.state(), SessionState::Connected);
        assert_eq!(f.calls(), vec!["start(false)"]);
    }

    #[test]
    fn duplicate_signals_do_not_repeat_notifications() {
        let once = Fixture::new();
        let twice = Fixture::new();
        let sequence = [
            (Raw::Connecting, Code::Ok),
            (Raw::Connected, Code::Ok),
            (Raw::Connected, Code::NetworkBecamePoor),
            (Raw::Reconnecting, Code::Ok),
            (Raw::Connected, Code::Ok),
            (Raw::DisconnectedAbnormal, Code::AudioInternalServerError),
        ];
        once.controller.begin().unwrap();
        twice.controller.begin().unwrap();
        for (raw, status) in sequence {
            once.signal(raw, status);
            twice.signal(raw, status);
            twice.signal(raw, status);
        }

        let calls = twice.calls();
        assert_eq!(calls, once.calls());
        assert_eq!(
            calls,
            vec![
                "start(false)",
                "poor",
                "drop",
                "start(true)",
                "recover",
                "stop(audioInternalServerError)",
            ]
        );
        for pair in calls.windows(2) {
            assert_ne!(pair[0], pair[1]);
        }
    }

    #[test]
    fn authoritative_status_disconnects_from_any_raw_state() {
        let raws = [
            Raw::Unknown,
            Raw::Init,
            Raw::Connecting,
            Raw::Connected,
            Raw::Reconnecting,
            Raw::Disconnecting,
            Raw::DisconnectedNormal,
            Raw::DisconnectedAbnormal,
            Raw::ServerHungup,
            Raw::FailedToConnect,
        ];
        let codes = [
            Code::AudioServerHungup,
            Code::AudioJoinedFromAnotherDevice,
            Code::AudioAuthenticationRejected,
            Code::AudioCallAtCapacity,
            Code::AudioDisconnectAudio,
            Code::AudioCallEnded,
        ];
        for raw in raws {
            for code in codes {
                let f = Fixture::new();
                f.connected();
                f.signal(raw, code);
                assert_eq!(f.controller.state(), SessionState::Disconnected(code));
            }
        }
    }

    #[test]
    fn failure_while_connected_stops_client_once() {
        let f = Fixture::new();
        f.connected();
        f.signal(Raw::Connected, Code::AudioServerHungup);
        f.signal(Raw::Connected, Code::AudioServerHungup);
        f.signal(Raw::ServerHungup, Code::AudioServerHungup);

        assert_eq!(f.calls(), vec!["start(false)", "stop(audioServerHungup)"]);
        assert_eq!(f.client.stops.load(Ordering::SeqCst), 1);
        assert!(!f.controller.is_started());
    }

    #[test]
    fn drop_and_reconnect() {
        let f = Fixture::new();
        f.connected();
        f.signal(Raw::Reconnecting, Code::Ok);
        f.signal(Raw::Connected, Code::Ok);

        assert_eq!(f.calls(), vec!["start(false)", "drop", "start(true)"]);
    }

    #[test]
    fn reconnecting_then_normal_disconnect_cancels_reconnect() {
        let f = Fixture::new();
        f.connected();
        f.signal(Raw::Reconnecting, Code::Ok);
        f.signal(Raw::DisconnectedNormal, Code::Ok);

        assert_eq!(f.calls(), vec!["start(false)", "drop", "cancel_reconnect"]);
        assert_eq!(f.client.stops.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn reconnecting_then_failure_cancels_then_stops() {
        let f = Fixture::new();
        f.connected();
        f.signal(Raw::Reconnecting, Code::Ok);
        f.signal(Raw::DisconnectedAbnormal, Code::AudioDisconnected);

        assert_eq!(
            f.calls(),
            vec!["start(false)", "drop", "cancel_reconnect", "stop(audioDisconnected)"]
        );
    }

    #[test]
    fn normal_disconnect_while_connected_is_silent() {
        let f = Fixture::new();
        f.connected();
        f.signal(Raw::DisconnectedNormal, Code::Ok);

        assert_eq!(f.controller.state(), SessionState::Disconnected(Code::Ok));
        assert_eq!(f.calls(), vec!["start(false)"]);
    }

    #[test]
    fn poor_connection_flag_transitions() {
        let f = Fixture::new();
        f.connected();
        f.signal(Raw::Connected, Code::NetworkBecamePoor);
        assert!(f.controller.is_connection_poor());
        f.signal(Raw::Connected, Code::Ok);
        f.signal(Raw::Connected, Code::NetworkBecamePoor);
        f.signal(Raw::DisconnectedNormal, Code::Ok);

        assert_eq!(f.calls(), vec!["start(false)", "poor", "recover", "poor"]);
        assert!(!f.controller.is_connection_poor());
    }

    #[test]
    fn failure_while_stopped_only_changes_state() {
        let f = Fixture::new();
        f.signal(Raw::Connecting, Code::Ok);
        f.signal(Raw::FailedToConnect, Code::AudioServiceUnavailable);

        assert_eq!(
            f.controller.state(),
            SessionState::Disconnected(Code::AudioServiceUnavailable)
        );
        assert!(f.calls().is_empty());
        assert_eq!(f.client.stops.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn disconnected_is_terminal_until_begin() {
        let f = Fixture::new();
        f.connected();
        f.signal(Raw::DisconnectedAbnormal, Code::AudioInternalServerError);
        f.signal(Raw::Connected, Code::Ok);
        assert_eq!(
            f.controller.state(),
            SessionState::Disconnected(Code::AudioInternalServerError)
        );

        assert_eq!(
            f.controller.begin().unwrap(),
            SessionState::Disconnected(Code::AudioInternalServerError)
        );
        assert_eq!(f.controller.state(), SessionState::Connecting);
        f.signal(Raw::Connected, Code::Ok);
        assert_eq!(f.controller.state(), SessionState::Connected);
    }

    #[test]
    fn uninitialized_cannot_jump_to_connected() {
        let f = Fixture::new();
        f.signal(Raw::Connected, Code::Ok);
        assert_eq!(f.controller.state(), SessionState::Uninitialized);
        assert!(f.calls().is_empty());
    }

    #[test]
    fn unknown_raw_state_is_ignored() {
        let f = Fixture::new();
        f.connected();
        f.signal(Raw::Unknown, Code::Ok);
        assert_eq!(f.controller.state(), SessionState::Connected);
    }

    #[test]
    fn begin_twice_conflicts_and_end_is_idempotent() {
        let f = Fixture::new();
        f.controller.begin().unwrap();
        assert!(matches!(f.controller.begin(), Err(MeetingError::StateConflict(_))));
        assert!(f.controller.end());
        assert!(!f.controller.end());
    }

    #[test]
    fn cancel_begin_restores_previous_state() {
        let f = Fixture::new();
        let previous = f.controller.begin().unwrap();
        f.controller.cancel_begin(previous);
        assert_eq!(f.controller.state(), SessionState::Uninitialized);
        assert!(!f.controller.is_started());
    }

    #[test]
    fn publishes_analytics_for_start_and_failure() {
        let f = Fixture::new();
        f.controller.begin().unwrap();
        f.signal(Raw::FailedToConnect, Code::AudioServiceUnavailable);
        f.controller.begin().unwrap();
        f.signal(Raw::Connected, Code::Ok);
        f.signal(Raw::Reconnecting, Code::Ok);
        f.signal(Raw::Connected, Code::Ok);
        f.signal(Raw::DisconnectedAbnormal, Code::AudioCallAtCapacity);
        f.main.sync(|| ());

        assert_eq!(
            *f.analytics.names.lock(),
            vec![
                EventName::MeetingStartFailed,
                EventName::MeetingStartSucceeded,
                EventName::MeetingReconnected,
                EventName::MeetingFailed,
            ]
        );
    }

    #[test]
    fn signals_from_many_threads_keep_one_notification_per_transition() {
        let f = Arc::new(Fixture::new());
        f.controller.begin().unwrap();
        let threads: Vec<_> = (0..4)
            .map(|_| {
                let f = f.clone();
                std::thread::spawn(move || {
                    f.signal(Raw::Connected, Code::Ok);
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(f.calls(), vec!["start(false)"]);
    }
}
