//! Meeting session core.
//!
//! Pure Rust crate with no platform dependencies. Tracks the audio/video
//! session lifecycle, coordinates primary-meeting promotion and ships
//! telemetry to the ingestion service. Consumed by native UI shells via
//! UniFFI bindings.

pub mod analytics;
pub mod audio_video;
pub mod errors;
pub mod ingestion;
pub mod metrics;
pub mod observer;
pub mod promotion;
pub mod realtime;
pub mod session;
pub mod status;

pub use analytics::{
    AppAttributes, AppStateProvider, EventAnalyticsController, EventAnalyticsObserver,
    EventAttributeName, EventAttributes, EventName, MeetingHistoryEvent, MeetingStatsCollector,
    SdkEvent,
};
pub use audio_video::{
    AudioClient, AudioVideoController, MediaClients, MediaPermissions,
    MeetingSessionConfiguration,
};
pub use errors::MeetingError;
pub use ingestion::{
    ClientMetadata, EventBuffer, EventReporter, IngestionConfiguration,
    IngestionConfigurationBuilder, MeetingEventClientConfiguration,
};
pub use metrics::{MetricsCollector, MetricsObserver, ObservableMetric, ObservableMetrics};
pub use observer::{MainContext, ObserverSet};
pub use promotion::{
    MeetingSessionCredentials, PrimaryMeetingClient, PrimaryMeetingCoordinator,
    PrimaryMeetingPromotionObserver,
};
pub use realtime::{
    AttendeeInfo, AttendeeStatus, AttendeeUpdate, RealtimeObserver, RealtimeTracker,
    SignalStrength, SignalUpdate, VolumeLevel, VolumeUpdate,
};
pub use session::{AudioVideoObserver, RawAudioState, SessionState, SessionStateController};
pub use status::{MeetingSessionStatus, MeetingSessionStatusCode};
