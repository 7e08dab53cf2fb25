//! UniFFI bindings for meetkit-core.
//!
//! Provides a MeetingClient object that wraps the AudioVideoController and
//! the event reporter into a single FFI-safe interface. Host media engines
//! plug in through callback interfaces; everything the core observes comes
//! back as one flattened MeetingEvent.

use std::path::Path;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use meetkit_core::{
    self, AppAttributes as CoreAppAttributes, AttendeeInfo, AttendeeUpdate, AudioVideoController,
    ClientMetadata, EventAttributes, EventName, EventReporter, IngestionConfigurationBuilder,
    MainContext, MediaClients, MeetingError, MeetingSessionConfiguration,
    MeetingSessionCredentials, MeetingSessionStatus, MeetingSessionStatusCode as CoreStatusCode,
    ObservableMetric as CoreObservableMetric, ObservableMetrics, RawAudioState,
    SessionState as CoreSessionState, SignalStrength as CoreSignalStrength, SignalUpdate,
    VolumeLevel as CoreVolumeLevel, VolumeUpdate,
};
use tokio::sync::oneshot;

uniffi::include_scaffolding!("meetkit");

// ── Namespace functions ──────────────────────────────────────────────

/// Initialize tracing/logging. Call once from the host before using MeetingClient.
fn init_logging() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("meetkit_core=debug,meetkit_ffi=debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .try_init();
    });
}

fn lock<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── FFI-safe type conversions ──────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeetingStatusCode {
    Ok,
    AudioDisconnected,
    ConnectionHealthReconnect,
    VideoServiceUnavailable,
    NetworkBecamePoor,
    AudioServerHungup,
    AudioJoinedFromAnotherDevice,
    AudioInternalServerError,
    AudioAuthenticationRejected,
    AudioCallAtCapacity,
    AudioServiceUnavailable,
    AudioDisconnectAudio,
    AudioCallEnded,
    Unknown,
    VideoAtCapacityViewOnly,
}

impl From<CoreStatusCode> for MeetingStatusCode {
    fn from(c: CoreStatusCode) -> Self {
        match c {
            CoreStatusCode::Ok => Self::Ok,
            CoreStatusCode::AudioDisconnected => Self::AudioDisconnected,
            CoreStatusCode::ConnectionHealthReconnect => Self::ConnectionHealthReconnect,
            CoreStatusCode::VideoServiceUnavailable => Self::VideoServiceUnavailable,
            CoreStatusCode::NetworkBecamePoor => Self::NetworkBecamePoor,
            CoreStatusCode::AudioServerHungup => Self::AudioServerHungup,
            CoreStatusCode::AudioJoinedFromAnotherDevice => Self::AudioJoinedFromAnotherDevice,
            CoreStatusCode::AudioInternalServerError => Self::AudioInternalServerError,
            CoreStatusCode::AudioAuthenticationRejected => Self::AudioAuthenticationRejected,
            CoreStatusCode::AudioCallAtCapacity => Self::AudioCallAtCapacity,
            CoreStatusCode::AudioServiceUnavailable => Self::AudioServiceUnavailable,
            CoreStatusCode::AudioDisconnectAudio => Self::AudioDisconnectAudio,
            CoreStatusCode::AudioCallEnded => Self::AudioCallEnded,
            CoreStatusCode::Unknown => Self::Unknown,
            CoreStatusCode::VideoAtCapacityViewOnly => Self::VideoAtCapacityViewOnly,
        }
    }
}

impl From<MeetingSessionStatus> for MeetingStatusCode {
    fn from(s: MeetingSessionStatus) -> Self {
        s.status_code.into()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Initialized,
    Connecting,
    Connected,
    Reconnecting,
    Disconnecting,
    Disconnected { status: MeetingStatusCode },
}

impl From<CoreSessionState> for SessionState {
    fn from(s: CoreSessionState) -> Self {
        match s {
            CoreSessionState::Uninitialized => Self::Uninitialized,
            CoreSessionState::Initialized => Self::Initialized,
            CoreSessionState::Connecting => Self::Connecting,
            CoreSessionState::Connected => Self::Connected,
            CoreSessionState::Reconnecting => Self::Reconnecting,
            CoreSessionState::Disconnecting => Self::Disconnecting,
            CoreSessionState::Disconnected(code) => Self::Disconnected { status: code.into() },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeLevel {
    Muted,
    NotSpeaking,
    Low,
    Medium,
    High,
}

impl From<CoreVolumeLevel> for VolumeLevel {
    fn from(v: CoreVolumeLevel) -> Self {
        match v {
            CoreVolumeLevel::Muted => Self::Muted,
            CoreVolumeLevel::NotSpeaking => Self::NotSpeaking,
            CoreVolumeLevel::Low => Self::Low,
            CoreVolumeLevel::Medium => Self::Medium,
            CoreVolumeLevel::High => Self::High,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalStrength {
    None,
    Low,
    High,
}

impl From<CoreSignalStrength> for SignalStrength {
    fn from(s: CoreSignalStrength) -> Self {
        match s {
            CoreSignalStrength::None => Self::None,
            CoreSignalStrength::Low => Self::Low,
            CoreSignalStrength::High => Self::High,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct HostMetadata {
    pub os_version: Option<String>,
    pub media_sdk_version: Option<String>,
    pub device_name: Option<String>,
    pub device_manufacturer: Option<String>,
    pub device_model: Option<String>,
}

impl From<HostMetadata> for ClientMetadata {
    fn from(m: HostMetadata) -> Self {
        Self {
            os_version: m.os_version,
            media_sdk_version: m.media_sdk_version,
            device_name: m.device_name,
            device_manufacturer: m.device_manufacturer,
            device_model: m.device_model,
            ..ClientMetadata::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestionSettings {
    pub ingestion_url: String,
    pub data_dir: String,
    pub disabled: bool,
    pub flush_size: i64,
    pub flush_interval_ms: i64,
    pub retry_count_limit: i64,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub meeting_id: String,
    pub external_meeting_id: Option<String>,
    pub attendee_id: String,
    pub external_user_id: String,
    pub join_token: String,
    pub audio_host_url: String,
    pub audio_fallback_url: String,
    pub metadata: HostMetadata,
    pub ingestion: Option<IngestionSettings>,
}

impl From<&SessionConfig> for MeetingSessionConfiguration {
    fn from(c: &SessionConfig) -> Self {
        Self {
            meeting_id: c.meeting_id.clone(),
            external_meeting_id: c.external_meeting_id.clone(),
            attendee_id: c.attendee_id.clone(),
            external_user_id: c.external_user_id.clone(),
            join_token: c.join_token.clone(),
            audio_host_url: c.audio_host_url.clone(),
            audio_fallback_url: c.audio_fallback_url.clone(),
            client_metadata: c.metadata.clone().into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryCredentials {
    pub attendee_id: String,
    pub external_user_id: String,
    pub join_token: String,
}

impl From<PrimaryCredentials> for MeetingSessionCredentials {
    fn from(c: PrimaryCredentials) -> Self {
        Self {
            attendee_id: c.attendee_id,
            external_user_id: c.external_user_id,
            join_token: c.join_token,
        }
    }
}

impl From<&MeetingSessionCredentials> for PrimaryCredentials {
    fn from(c: &MeetingSessionCredentials) -> Self {
        Self {
            attendee_id: c.attendee_id.clone(),
            external_user_id: c.external_user_id.clone(),
            join_token: c.join_token.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AttendeeSignal {
    pub attendee_id: String,
    pub external_user_id: String,
    pub data: i32,
}

impl From<AttendeeSignal> for AttendeeUpdate {
    fn from(s: AttendeeSignal) -> Self {
        Self {
            attendee_id: s.attendee_id,
            external_user_id: s.external_user_id,
            data: s.data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attendee {
    pub attendee_id: String,
    pub external_user_id: String,
}

impl From<&AttendeeInfo> for Attendee {
    fn from(a: &AttendeeInfo) -> Self {
        Self {
            attendee_id: a.attendee_id.clone(),
            external_user_id: a.external_user_id.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendeeVolume {
    pub attendee: Attendee,
    pub volume_level: VolumeLevel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendeeSignalStrength {
    pub attendee: Attendee,
    pub signal_strength: SignalStrength,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub name: String,
    pub timestamp_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioMetric {
    pub id: i32,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservableMetric {
    AudioPacketsReceivedFractionLoss,
    AudioPacketsSentFractionLoss,
}

impl From<CoreObservableMetric> for ObservableMetric {
    fn from(m: CoreObservableMetric) -> Self {
        match m {
            CoreObservableMetric::AudioPacketsReceivedFractionLoss => {
                Self::AudioPacketsReceivedFractionLoss
            }
            CoreObservableMetric::AudioPacketsSentFractionLoss => Self::AudioPacketsSentFractionLoss,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricValue {
    pub metric: ObservableMetric,
    pub value: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppAttributes {
    pub app_state: Option<String>,
    pub battery_state: Option<String>,
    pub battery_level: Option<f64>,
    pub low_power_mode_enabled: Option<bool>,
}

impl From<AppAttributes> for CoreAppAttributes {
    fn from(a: AppAttributes) -> Self {
        Self {
            app_state: a.app_state,
            battery_state: a.battery_state,
            battery_level: a.battery_level,
            low_power_mode_enabled: a.low_power_mode_enabled,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MeetingEvent {
    AudioSessionStartedConnecting { reconnecting: bool },
    AudioSessionStarted { reconnecting: bool },
    AudioSessionDropped,
    AudioSessionStopped { status: MeetingStatusCode },
    AudioSessionCancelledReconnect,
    ConnectionRecovered,
    ConnectionBecamePoor,
    AttendeesJoined { attendees: Vec<Attendee> },
    AttendeesLeft { attendees: Vec<Attendee> },
    AttendeesDropped { attendees: Vec<Attendee> },
    AttendeesMuted { attendees: Vec<Attendee> },
    AttendeesUnmuted { attendees: Vec<Attendee> },
    VolumeChanged { updates: Vec<AttendeeVolume> },
    SignalStrengthChanged { updates: Vec<AttendeeSignalStrength> },
    PromotedToPrimaryMeeting { status: MeetingStatusCode },
    DemotedFromPrimaryMeeting { status: MeetingStatusCode },
    AnalyticsEvent { name: String, attributes_json: String },
    MetricsReceived { metrics: Vec<MetricValue> },
}

fn attendees(list: &[AttendeeInfo]) -> Vec<Attendee> {
    list.iter().map(Attendee::from).collect()
}

// ── Error conversion ──────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum MeetingClientError {
    #[error("Permission denied: {msg}")]
    Permission { msg: String },
    #[error("Invalid state: {msg}")]
    StateConflict { msg: String },
    #[error("Media start failed: {msg}")]
    MediaStart { msg: String },
    #[error("Transport error: {msg}")]
    Transport { msg: String },
    #[error("Serialization error: {msg}")]
    Serialization { msg: String },
    #[error("Storage error: {msg}")]
    Storage { msg: String },
    #[error("Invalid configuration: {msg}")]
    Configuration { msg: String },
}

impl From<MeetingError> for MeetingClientError {
    fn from(e: MeetingError) -> Self {
        tracing::error!("MeetingError: {e}");
        match e {
            MeetingError::Permission(msg) => Self::Permission { msg },
            MeetingError::StateConflict(msg) => Self::StateConflict { msg },
            MeetingError::MediaStart(msg) => Self::MediaStart { msg },
            MeetingError::Transport(msg) => Self::Transport { msg },
            MeetingError::Serialization(e) => Self::Serialization { msg: e.to_string() },
            MeetingError::Storage(msg) => Self::Storage { msg },
            MeetingError::Io(e) => Self::Storage { msg: e.to_string() },
            MeetingError::Configuration(msg) => Self::Configuration { msg },
        }
    }
}

// ── Callback interfaces ───────────────────────────────────────────────

pub trait MeetingEventListener: Send + Sync {
    fn on_event(&self, event: MeetingEvent);
}

/// Platform audio engine. Promotion outcomes are reported back through
/// `MeetingClient::audio_promotion_completed`.
pub trait AudioClientHost: Send + Sync {
    fn start_session(&self, config: SessionConfig) -> bool;
    fn stop_session(&self);
    fn set_mute(&self, mute: bool) -> bool;
    fn record_permission_granted(&self) -> bool;
    fn promote_to_primary_meeting(&self, credentials: PrimaryCredentials);
    fn demote_from_primary_meeting(&self);
}

/// Samples device and application state for analytics events.
pub trait AppStateHost: Send + Sync {
    fn app_attributes(&self) -> AppAttributes;
}

/// Platform video engine. Promotion outcomes are reported back through
/// `MeetingClient::video_promotion_completed`.
pub trait VideoClientHost: Send + Sync {
    fn promote_to_primary_meeting(&self, credentials: PrimaryCredentials);
    fn demote_from_primary_meeting(&self);
}

// ── Bridges: FFI callbacks ↔ core traits ─────────────────────────────

struct BridgeAudioClient {
    host: Arc<dyn AudioClientHost>,
    config: SessionConfig,
}

impl meetkit_core::AudioClient for BridgeAudioClient {
    fn start_session(&self, _configuration: &MeetingSessionConfiguration) -> Result<(), MeetingError> {
        if self.host.start_session(self.config.clone()) {
            Ok(())
        } else {
            Err(MeetingError::MediaStart("audio client refused to start".to_string()))
        }
    }

    fn stop_session(&self) {
        self.host.stop_session();
    }

    fn set_mute(&self, mute: bool) -> bool {
        self.host.set_mute(mute)
    }
}

impl meetkit_core::MediaPermissions for BridgeAudioClient {
    fn record_permission_granted(&self) -> bool {
        self.host.record_permission_granted()
    }
}

struct BridgeAppState(Arc<dyn AppStateHost>);

impl meetkit_core::AppStateProvider for BridgeAppState {
    fn app_attributes(&self) -> CoreAppAttributes {
        self.0.app_attributes().into()
    }
}

enum PrimaryHost {
    Audio(Arc<dyn AudioClientHost>),
    Video(Arc<dyn VideoClientHost>),
}

/// Turns the host's fire-and-forget promote call into an awaitable outcome.
/// The pending sender is completed by `*_promotion_completed`.
struct BridgePrimaryClient {
    host: PrimaryHost,
    pending: Arc<StdMutex<Option<oneshot::Sender<CoreStatusCode>>>>,
}

#[async_trait]
impl meetkit_core::PrimaryMeetingClient for BridgePrimaryClient {
    async fn promote(&self, credentials: &MeetingSessionCredentials) -> CoreStatusCode {
        let (tx, rx) = oneshot::channel();
        if lock(&self.pending).replace(tx).is_some() {
            tracing::warn!("previous promotion never completed, dropping it");
        }
        match &self.host {
            PrimaryHost::Audio(host) => host.promote_to_primary_meeting(credentials.into()),
            PrimaryHost::Video(host) => host.promote_to_primary_meeting(credentials.into()),
        }
        rx.await.unwrap_or(CoreStatusCode::Unknown)
    }

    fn demote(&self) {
        lock(&self.pending).take();
        match &self.host {
            PrimaryHost::Audio(host) => host.demote_from_primary_meeting(),
            PrimaryHost::Video(host) => host.demote_from_primary_meeting(),
        }
    }
}

/// Fans every core observer callback out to the registered FFI listeners.
#[derive(Default)]
struct EventBridge {
    listeners: StdMutex<Vec<Arc<dyn MeetingEventListener>>>,
}

impl EventBridge {
    fn emit(&self, event: MeetingEvent) {
        let listeners = lock(&self.listeners).clone();
        for listener in listeners {
            listener.on_event(event.clone());
        }
    }
}

impl meetkit_core::AudioVideoObserver for EventBridge {
    fn audio_session_did_start_connecting(&self, reconnecting: bool) {
        self.emit(MeetingEvent::AudioSessionStartedConnecting { reconnecting });
    }

    fn audio_session_did_start(&self, reconnecting: bool) {
        self.emit(MeetingEvent::AudioSessionStarted { reconnecting });
    }

    fn audio_session_did_drop(&self) {
        self.emit(MeetingEvent::AudioSessionDropped);
    }

    fn audio_session_did_stop_with_status(&self, status: MeetingSessionStatus) {
        self.emit(MeetingEvent::AudioSessionStopped { status: status.into() });
    }

    fn audio_session_did_cancel_reconnect(&self) {
        self.emit(MeetingEvent::AudioSessionCancelledReconnect);
    }

    fn connection_did_recover(&self) {
        self.emit(MeetingEvent::ConnectionRecovered);
    }

    fn connection_did_become_poor(&self) {
        self.emit(MeetingEvent::ConnectionBecamePoor);
    }
}

impl meetkit_core::RealtimeObserver for EventBridge {
    fn attendees_did_join(&self, list: &[AttendeeInfo]) {
        self.emit(MeetingEvent::AttendeesJoined { attendees: attendees(list) });
    }

    fn attendees_did_leave(&self, list: &[AttendeeInfo]) {
        self.emit(MeetingEvent::AttendeesLeft { attendees: attendees(list) });
    }

    fn attendees_did_drop(&self, list: &[AttendeeInfo]) {
        self.emit(MeetingEvent::AttendeesDropped { attendees: attendees(list) });
    }

    fn attendees_did_mute(&self, list: &[AttendeeInfo]) {
        self.emit(MeetingEvent::AttendeesMuted { attendees: attendees(list) });
    }

    fn attendees_did_unmute(&self, list: &[AttendeeInfo]) {
        self.emit(MeetingEvent::AttendeesUnmuted { attendees: attendees(list) });
    }

    fn volume_did_change(&self, updates: &[VolumeUpdate]) {
        let updates = updates
            .iter()
            .map(|u| AttendeeVolume {
                attendee: (&u.attendee_info).into(),
                volume_level: u.volume_level.into(),
            })
            .collect();
        self.emit(MeetingEvent::VolumeChanged { updates });
    }

    fn signal_strength_did_change(&self, updates: &[SignalUpdate]) {
        let updates = updates
            .iter()
            .map(|u| AttendeeSignalStrength {
                attendee: (&u.attendee_info).into(),
                signal_strength: u.signal_strength.into(),
            })
            .collect();
        self.emit(MeetingEvent::SignalStrengthChanged { updates });
    }
}

impl meetkit_core::EventAnalyticsObserver for EventBridge {
    fn event_did_receive(&self, name: EventName, attributes: &EventAttributes) {
        let attributes_json = serde_json::to_string(attributes).unwrap_or_else(|e| {
            tracing::warn!("failed to encode attributes of {name}: {e}");
            "{}".to_string()
        });
        self.emit(MeetingEvent::AnalyticsEvent {
            name: name.name().to_string(),
            attributes_json,
        });
    }
}

impl meetkit_core::PrimaryMeetingPromotionObserver for EventBridge {
    fn did_promote_to_primary_meeting(&self, status: MeetingSessionStatus) {
        self.emit(MeetingEvent::PromotedToPrimaryMeeting { status: status.into() });
    }

    fn did_demote_from_primary_meeting(&self, status: MeetingSessionStatus) {
        self.emit(MeetingEvent::DemotedFromPrimaryMeeting { status: status.into() });
    }
}

impl meetkit_core::MetricsObserver for EventBridge {
    fn metrics_did_receive(&self, metrics: &ObservableMetrics) {
        let metrics = metrics
            .iter()
            .map(|(metric, value)| MetricValue {
                metric: (*metric).into(),
                value: *value,
            })
            .collect();
        self.emit(MeetingEvent::MetricsReceived { metrics });
    }
}

type PendingPromotion = Arc<StdMutex<Option<oneshot::Sender<CoreStatusCode>>>>;

fn complete_promotion(pending: &PendingPromotion, subsystem: &str, status: u32) {
    let status = CoreStatusCode::from_raw(status);
    match lock(pending).take() {
        Some(tx) => {
            if tx.send(status).is_err() {
                tracing::debug!("{subsystem} promotion already abandoned");
            }
        }
        None => tracing::debug!("{subsystem} promotion completed with nothing pending ({status})"),
    }
}

// ── MeetingClient: main FFI object ────────────────────────────────────

pub struct MeetingClient {
    controller: Arc<AudioVideoController>,
    reporter: Option<Arc<EventReporter>>,
    bridge: Arc<EventBridge>,
    audio_pending: PendingPromotion,
    video_pending: PendingPromotion,
    rt: tokio::runtime::Runtime,
}

impl MeetingClient {
    pub fn new(
        config: SessionConfig,
        audio_client: Box<dyn AudioClientHost>,
        video_client: Box<dyn VideoClientHost>,
    ) -> Result<Self, MeetingClientError> {
        tracing::info!("MeetingClient::new() for meeting {}", config.meeting_id);
        let rt = tokio::runtime::Runtime::new().map_err(MeetingError::from)?;
        let main = MainContext::new("meetkit-main")?;

        let session = MeetingSessionConfiguration::from(&config);
        let reporter = match &config.ingestion {
            Some(settings) => {
                let ingestion = IngestionConfigurationBuilder::new()
                    .flush_size(settings.flush_size)
                    .flush_interval_ms(settings.flush_interval_ms)
                    .retry_count_limit(settings.retry_count_limit)
                    .client_metadata(session.client_metadata.clone())
                    .build(
                        settings.disabled,
                        &settings.ingestion_url,
                        session.event_client_configuration(),
                    )?;
                let reporter = rt.block_on(EventReporter::with_json_storage(
                    ingestion,
                    Path::new(&settings.data_dir),
                    rt.handle().clone(),
                ))?;
                Some(Arc::new(reporter))
            }
            None => None,
        };

        let audio_host: Arc<dyn AudioClientHost> = Arc::from(audio_client);
        let video_host: Arc<dyn VideoClientHost> = Arc::from(video_client);
        let audio_pending = PendingPromotion::default();
        let video_pending = PendingPromotion::default();
        let audio = Arc::new(BridgeAudioClient {
            host: audio_host.clone(),
            config,
        });
        let clients = MediaClients {
            audio: audio.clone(),
            audio_primary: Arc::new(BridgePrimaryClient {
                host: PrimaryHost::Audio(audio_host),
                pending: audio_pending.clone(),
            }),
            video_primary: Arc::new(BridgePrimaryClient {
                host: PrimaryHost::Video(video_host),
                pending: video_pending.clone(),
            }),
            permissions: audio,
        };
        let controller = Arc::new(AudioVideoController::new(session, main, clients, reporter.clone()));

        let bridge = Arc::new(EventBridge::default());
        let observer: Arc<dyn meetkit_core::AudioVideoObserver> = bridge.clone();
        controller.add_audio_video_observer(&observer);
        let observer: Arc<dyn meetkit_core::RealtimeObserver> = bridge.clone();
        controller.add_realtime_observer(&observer);
        let observer: Arc<dyn meetkit_core::EventAnalyticsObserver> = bridge.clone();
        controller.add_event_analytics_observer(&observer);
        let observer: Arc<dyn meetkit_core::MetricsObserver> = bridge.clone();
        controller.add_metrics_observer(&observer);

        Ok(Self {
            controller,
            reporter,
            bridge,
            audio_pending,
            video_pending,
            rt,
        })
    }

    pub fn start(&self) -> Result<(), MeetingClientError> {
        self.controller.start().map_err(MeetingClientError::from)
    }

    pub fn stop(&self) {
        self.controller.stop();
    }

    pub fn mute(&self) -> bool {
        self.controller.realtime_local_mute()
    }

    pub fn unmute(&self) -> bool {
        self.controller.realtime_local_unmute()
    }

    pub fn session_state(&self) -> SessionState {
        self.controller.session_state().into()
    }

    pub fn on_audio_client_state_changed(&self, state: i32, status: u32) {
        self.controller
            .on_signal(RawAudioState::from_raw(state), CoreStatusCode::from_raw(status));
    }

    pub fn on_volume_changed(&self, updates: Vec<AttendeeSignal>) {
        let updates: Vec<AttendeeUpdate> = updates.into_iter().map(Into::into).collect();
        self.controller.on_volume_changed(&updates);
    }

    pub fn on_signal_strength_changed(&self, updates: Vec<AttendeeSignal>) {
        let updates: Vec<AttendeeUpdate> = updates.into_iter().map(Into::into).collect();
        self.controller.on_signal_strength_changed(&updates);
    }

    pub fn on_attendees_presence_changed(&self, updates: Vec<AttendeeSignal>) {
        let updates: Vec<AttendeeUpdate> = updates.into_iter().map(Into::into).collect();
        self.controller.on_attendees_presence_changed(&updates);
    }

    pub fn on_metrics_changed(&self, metrics: Vec<AudioMetric>) {
        let metrics: Vec<(i32, f64)> = metrics.into_iter().map(|m| (m.id, m.value)).collect();
        self.controller.on_metrics_changed(&metrics);
    }

    pub fn update_video_tile_count(&self, count: u32) {
        self.controller.on_video_tile_count_changed(count);
    }

    /// Starts promotion in the background. The outcome arrives as
    /// `MeetingEvent::PromotedToPrimaryMeeting` once both hosts completed.
    pub fn promote_to_primary_meeting(&self, credentials: PrimaryCredentials) {
        let controller = self.controller.clone();
        let observer: Arc<dyn meetkit_core::PrimaryMeetingPromotionObserver> = self.bridge.clone();
        self.rt.spawn(async move {
            if let Err(e) = controller
                .promote_to_primary_meeting(credentials.into(), observer)
                .await
            {
                tracing::warn!("promotion rejected: {e}");
            }
        });
    }

    pub fn demote_from_primary_meeting(&self) {
        self.controller.demote_from_primary_meeting();
    }

    pub fn audio_promotion_completed(&self, status: u32) {
        complete_promotion(&self.audio_pending, "audio", status);
    }

    pub fn video_promotion_completed(&self, status: u32) {
        complete_promotion(&self.video_pending, "video", status);
    }

    pub fn audio_demoted(&self, status: u32) {
        self.controller.on_audio_demoted(CoreStatusCode::from_raw(status));
    }

    pub fn video_demoted(&self, status: u32) {
        self.controller.on_video_demoted(CoreStatusCode::from_raw(status));
    }

    pub fn add_listener(&self, listener: Box<dyn MeetingEventListener>) {
        lock(&self.bridge.listeners).push(Arc::from(listener));
    }

    /// Publish a host-originated event, e.g. `videoInputFailed`.
    /// `attributes_json` is an object keyed by camelCase attribute names; empty means none.
    pub fn report_event(&self, name: String, attributes_json: String) -> Result<(), MeetingClientError> {
        let name: EventName = serde_json::from_value(serde_json::Value::String(name))
            .map_err(MeetingError::from)?;
        let attributes: EventAttributes = if attributes_json.trim().is_empty() {
            EventAttributes::new()
        } else {
            serde_json::from_str(&attributes_json).map_err(MeetingError::from)?
        };
        self.controller.publish_event(name, attributes);
        Ok(())
    }

    pub fn set_app_state_provider(&self, provider: Box<dyn AppStateHost>) {
        let provider: Arc<dyn meetkit_core::AppStateProvider> =
            Arc::new(BridgeAppState(Arc::from(provider)));
        self.controller.set_app_state_provider(Some(provider));
    }

    /// Identity and device attributes attached to every ingested event, as JSON.
    pub fn common_event_attributes(&self) -> String {
        serde_json::to_string(&self.controller.common_event_attributes()).unwrap_or_else(|e| {
            tracing::warn!("failed to encode common attributes: {e}");
            "{}".to_string()
        })
    }

    pub fn flush_events(&self) {
        if let Some(reporter) = &self.reporter {
            self.rt.block_on(reporter.flush());
        }
    }

    pub fn meeting_history(&self) -> Vec<HistoryEntry> {
        self.controller
            .meeting_history()
            .into_iter()
            .map(|e| HistoryEntry {
                name: e.name.name().to_string(),
                timestamp_ms: e.timestamp_ms,
            })
            .collect()
    }
}

impl Drop for MeetingClient {
    fn drop(&mut self) {
        if let Some(reporter) = &self.reporter {
            reporter.stop();
        }
    }
}
