//! Telemetry ingestion: durable buffering, batching and HTTP delivery.

mod buffer;
mod config;
mod converter;
mod record;
mod reporter;
mod scheduler;
mod sender;
mod store;

pub use buffer::{DIRTY_EVENT_TTL_MS, EventBuffer};
pub use config::{
    ClientMetadata, IngestionConfiguration, IngestionConfigurationBuilder,
    MeetingEventClientConfiguration,
};
pub use converter::{to_ingestion_meeting_event, to_ingestion_record};
pub use record::{
    DirtyMeetingEventItem, IngestionEvent, IngestionEventAttributes, IngestionMeetingEvent,
    IngestionMetadata, IngestionPayload, IngestionRecord, MeetingEventItem,
};
pub use reporter::EventReporter;
pub use scheduler::{IntervalScheduler, Scheduler};
pub use sender::{EventSender, HttpEventSender, HttpRetryPolicy};
pub use store::{EventTable, JsonFileTable, MemoryTable, StoredEvent};
