use std::sync::Arc;

use crate::analytics::{
    AppStateProvider, EventAnalyticsController, EventAnalyticsObserver, EventAttributeName,
    EventAttributes, EventName, MeetingHistoryEvent, MeetingStatsCollector,
};
use crate::errors::MeetingError;
use crate::ingestion::{ClientMetadata, EventReporter, MeetingEventClientConfiguration};
use crate::metrics::{MetricsCollector, MetricsObserver};
use crate::observer::MainContext;
use crate::promotion::{
    MeetingSessionCredentials, PrimaryMeetingClient, PrimaryMeetingCoordinator,
    PrimaryMeetingPromotionObserver,
};
use crate::realtime::{AttendeeUpdate, RealtimeObserver, RealtimeTracker};
use crate::session::{AudioVideoObserver, RawAudioState, SessionState, SessionStateController};
use crate::status::{MeetingSessionStatus, MeetingSessionStatusCode};

/// Platform audio engine driven by the session.
pub trait AudioClient: Send + Sync {
    fn start_session(&self, configuration: &MeetingSessionConfiguration) -> Result<(), MeetingError>;

    fn stop_session(&self);

    /// Returns whether the platform applied the change.
    fn set_mute(&self, mute: bool) -> bool;
}

/// Asks the platform whether media permissions are granted. Never prompts.
pub trait MediaPermissions: Send + Sync {
    fn record_permission_granted(&self) -> bool;
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeetingSessionConfiguration {
    pub meeting_id: String,
    pub external_meeting_id: Option<String>,
    pub attendee_id: String,
    pub external_user_id: String,
    pub join_token: String,
    pub audio_host_url: String,
    pub audio_fallback_url: String,
    pub client_metadata: ClientMetadata,
}

impl MeetingSessionConfiguration {
    pub fn event_client_configuration(&self) -> MeetingEventClientConfiguration {
        MeetingEventClientConfiguration::new(&self.join_token, &self.meeting_id, &self.attendee_id)
    }
}

/// Platform collaborators of one meeting session.
#[derive(Clone)]
pub struct MediaClients {
    pub audio: Arc<dyn AudioClient>,
    pub audio_primary: Arc<dyn PrimaryMeetingClient>,
    pub video_primary: Arc<dyn PrimaryMeetingClient>,
    pub permissions: Arc<dyn MediaPermissions>,
}

/// Public start/stop/mute/promote surface of a meeting session.
pub struct AudioVideoController {
    configuration: MeetingSessionConfiguration,
    audio_client: Arc<dyn AudioClient>,
    permissions: Arc<dyn MediaPermissions>,
    session: SessionStateController,
    realtime: RealtimeTracker,
    promotion: PrimaryMeetingCoordinator,
    analytics: Arc<EventAnalyticsController>,
    metrics: MetricsCollector,
}

impl AudioVideoController {
    pub fn new(
        configuration: MeetingSessionConfiguration,
        main: MainContext,
        clients: MediaClients,
        reporter: Option<Arc<EventReporter>>,
    ) -> Self {
        let analytics = Arc::new(EventAnalyticsController::new(
            main.clone(),
            &configuration.meeting_id,
            &configuration.attendee_id,
            &configuration.client_metadata,
            Arc::new(MeetingStatsCollector::new()),
            reporter,
        ));
        let session = SessionStateController::new(main.clone(), clients.audio.clone(), analytics.clone());
        let realtime = RealtimeTracker::new(main.clone());
        let metrics = MetricsCollector::new(main.clone());
        let promotion = PrimaryMeetingCoordinator::new(main, clients.audio_primary, clients.video_primary);

        Self {
            configuration,
            audio_client: clients.audio,
            permissions: clients.permissions,
            session,
            realtime,
            promotion,
            analytics,
            metrics,
        }
    }

    pub fn configuration(&self) -> &MeetingSessionConfiguration {
        &self.configuration
    }

    /// Start the audio session.
    ///
    /// Fails with `Permission` before touching any state when the microphone
    /// is not granted, and with `StateConflict` when already started.
    pub fn start(&self) -> Result<(), MeetingError> {
        if !self.permissions.record_permission_granted() {
            return Err(MeetingError::Permission(
                "record permission not granted".to_string(),
            ));
        }
        let previous = self.session.begin()?;

        self.session
            .notify(|o| o.audio_session_did_start_connecting(false));
        self.analytics
            .publish_event(EventName::MeetingStartRequested, EventAttributes::new());

        if let Err(e) = self.audio_client.start_session(&self.configuration) {
            tracing::error!("audio client failed to start: {e}");
            self.session.cancel_begin(previous);
            return Err(e);
        }
        if let Some(reporter) = self.analytics.reporter() {
            reporter.start();
        }
        tracing::info!("meeting {} starting", self.configuration.meeting_id);
        Ok(())
    }

    /// Stop the session. Calling it again, or after the session failed, does nothing.
    pub fn stop(&self) {
        if !self.session.end() {
            tracing::debug!("stop ignored, session not started");
            return;
        }
        if self.promotion.is_promoted() {
            self.promotion.demote_from_primary_meeting();
        }
        self.audio_client.stop_session();

        self.session.notify(|o| {
            o.audio_session_did_stop_with_status(MeetingSessionStatus::ok())
        });
        let attributes = EventAttributes::from([(
            EventAttributeName::MeetingStatus,
            MeetingSessionStatusCode::Ok.name().into(),
        )]);
        self.analytics.publish_event(EventName::MeetingEnded, attributes);
        self.analytics.stats().reset();
        tracing::info!("meeting {} stopped", self.configuration.meeting_id);
    }

    pub fn realtime_local_mute(&self) -> bool {
        self.set_mute(true)
    }

    pub fn realtime_local_unmute(&self) -> bool {
        self.set_mute(false)
    }

    fn set_mute(&self, mute: bool) -> bool {
        if !self.session.is_started() {
            return false;
        }
        self.audio_client.set_mute(mute)
    }

    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    pub fn on_signal(&self, raw: RawAudioState, status: MeetingSessionStatusCode) {
        self.session.on_signal(raw, status);
    }

    pub fn on_volume_changed(&self, updates: &[AttendeeUpdate]) {
        self.realtime.volume_changed(updates);
    }

    pub fn on_signal_strength_changed(&self, updates: &[AttendeeUpdate]) {
        self.realtime.signal_strength_changed(updates);
    }

    pub fn on_attendees_presence_changed(&self, updates: &[AttendeeUpdate]) {
        self.realtime.attendees_presence_changed(updates);
    }

    /// Raw `(metric id, value)` pairs reported by the audio client.
    pub fn on_metrics_changed(&self, metrics: &[(i32, f64)]) {
        self.metrics.process_audio_client_metrics(metrics);
    }

    pub fn on_video_tile_count_changed(&self, video_tile_count: u32) {
        self.analytics.stats().update_max_video_tile(video_tile_count);
    }

    pub async fn promote_to_primary_meeting(
        &self,
        credentials: MeetingSessionCredentials,
        observer: Arc<dyn PrimaryMeetingPromotionObserver>,
    ) -> Result<(), MeetingError> {
        self.promotion
            .promote_to_primary_meeting(credentials, observer)
            .await
    }

    pub fn demote_from_primary_meeting(&self) {
        self.promotion.demote_from_primary_meeting();
    }

    pub fn on_audio_demoted(&self, status: MeetingSessionStatusCode) {
        self.promotion.on_audio_demoted(status);
    }

    pub fn on_video_demoted(&self, status: MeetingSessionStatusCode) {
        self.promotion.on_video_demoted(status);
    }

    pub fn add_audio_video_observer(&self, observer: &Arc<dyn AudioVideoObserver>) {
        self.session.add_observer(observer);
    }

    pub fn remove_audio_video_observer(&self, observer: &Arc<dyn AudioVideoObserver>) {
        self.session.remove_observer(observer);
    }

    pub fn add_realtime_observer(&self, observer: &Arc<dyn RealtimeObserver>) {
        self.realtime.add_observer(observer);
    }

    pub fn remove_realtime_observer(&self, observer: &Arc<dyn RealtimeObserver>) {
        self.realtime.remove_observer(observer);
    }

    pub fn add_event_analytics_observer(&self, observer: &Arc<dyn EventAnalyticsObserver>) {
        self.analytics.add_observer(observer);
    }

    pub fn remove_event_analytics_observer(&self, observer: &Arc<dyn EventAnalyticsObserver>) {
        self.analytics.remove_observer(observer);
    }

    pub fn add_metrics_observer(&self, observer: &Arc<dyn MetricsObserver>) {
        self.metrics.add_observer(observer);
    }

    pub fn remove_metrics_observer(&self, observer: &Arc<dyn MetricsObserver>) {
        self.metrics.remove_observer(observer);
    }

    pub fn set_app_state_provider(&self, provider: Option<Arc<dyn AppStateProvider>>) {
        self.analytics.set_app_state_provider(provider);
    }

    pub fn common_event_attributes(&self) -> EventAttributes {
        self.analytics.common_event_attributes()
    }

    pub fn publish_event(&self, name: EventName, attributes: EventAttributes) {
        self.analytics.publish_event(name, attributes);
    }

    pub fn meeting_history(&self) -> Vec<MeetingHistoryEvent> {
        self.analytics.meeting_history()
    }
}
