//! Meeting analytics: event names, accumulated stats and the publishing controller.

mod controller;
mod events;
mod stats;

pub use controller::{AppAttributes, AppStateProvider, EventAnalyticsController, EventAnalyticsObserver};
pub use events::{EventAttributeName, EventAttributes, EventName, MeetingHistoryEvent, SdkEvent};
pub use stats::MeetingStatsCollector;
