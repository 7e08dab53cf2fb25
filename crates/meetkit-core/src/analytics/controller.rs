use std::sync::Arc;

use parking_lot::Mutex;

use crate::ingestion::{ClientMetadata, EventReporter};
use crate::observer::{MainContext, ObserverSet};

use super::events::{EventAttributeName, EventAttributes, EventName, MeetingHistoryEvent, SdkEvent};
use super::stats::MeetingStatsCollector;

/// Receives every published analytics event on the main context.
pub trait EventAnalyticsObserver: Send + Sync {
    fn event_did_receive(&self, name: EventName, attributes: &EventAttributes);
}

/// Device and application state sampled by the host at publish time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppAttributes {
    pub app_state: Option<String>,
    pub battery_state: Option<String>,
    /// Charge between 0.0 and 1.0.
    pub battery_level: Option<f64>,
    pub low_power_mode_enabled: Option<bool>,
}

impl AppAttributes {
    fn merge_into(self, attributes: &mut EventAttributes) {
        if let Some(state) = self.app_state {
            attributes.insert(EventAttributeName::AppState, state.into());
        }
        if let Some(state) = self.battery_state {
            attributes.insert(EventAttributeName::BatteryState, state.into());
        }
        if let Some(level) = self.battery_level {
            attributes.insert(EventAttributeName::BatteryLevel, level.into());
        }
        if let Some(enabled) = self.low_power_mode_enabled {
            attributes.insert(EventAttributeName::LowPowerModeEnabled, enabled.into());
        }
    }
}

/// Supplies the current [`AppAttributes`]. Called once per published event.
pub trait AppStateProvider: Send + Sync {
    fn app_attributes(&self) -> AppAttributes;
}

pub struct EventAnalyticsController {
    common_attributes: EventAttributes,
    app_state: Mutex<Option<Arc<dyn AppStateProvider>>>,
    stats: Arc<MeetingStatsCollector>,
    reporter: Option<Arc<EventReporter>>,
    observers: ObserverSet<dyn EventAnalyticsObserver>,
}

impl EventAnalyticsController {
    pub fn new(
        main: MainContext,
        meeting_id: &str,
        attendee_id: &str,
        client_metadata: &ClientMetadata,
        stats: Arc<MeetingStatsCollector>,
        reporter: Option<Arc<EventReporter>>,
    ) -> Self {
        Self {
            common_attributes: common_attributes(meeting_id, attendee_id, client_metadata),
            app_state: Mutex::new(None),
            stats,
            reporter,
            observers: ObserverSet::new(main),
        }
    }

    pub fn set_app_state_provider(&self, provider: Option<Arc<dyn AppStateProvider>>) {
        *self.app_state.lock() = provider;
    }

    /// Stamp, enrich and fan out one event to the reporter and observers.
    pub fn publish_event(&self, name: EventName, mut attributes: EventAttributes) {
        let timestamp_ms = chrono::Utc::now().timestamp_millis();
        attributes.insert(EventAttributeName::TimestampMs, timestamp_ms.into());
        let provider = self.app_state.lock().clone();
        if let Some(provider) = provider {
            provider.app_attributes().merge_into(&mut attributes);
        }
        self.stats.add_meeting_history_event(name, timestamp_ms);

        if name.includes_meeting_stats() {
            let mut stats = self.stats.meeting_stats();
            if name != EventName::MeetingReconnected {
                stats.remove(&EventAttributeName::MeetingReconnectDurationMs);
            }
            attributes.extend(stats);
        }

        tracing::debug!("publishing analytics event {name}");
        if let Some(reporter) = &self.reporter {
            reporter.report(SdkEvent::new(name, attributes.clone()));
        }
        self.observers
            .notify_all(move |observer| observer.event_did_receive(name, &attributes));
    }

    pub fn meeting_history(&self) -> Vec<MeetingHistoryEvent> {
        self.stats.meeting_history()
    }

    pub fn common_event_attributes(&self) -> EventAttributes {
        self.common_attributes.clone()
    }

    pub fn add_observer(&self, observer: &Arc<dyn EventAnalyticsObserver>) {
        self.observers.subscribe(observer);
    }

    pub fn remove_observer(&self, observer: &Arc<dyn EventAnalyticsObserver>) {
        self.observers.unsubscribe(observer);
    }

    pub fn stats(&self) -> &Arc<MeetingStatsCollector> {
        &self.stats
    }

    pub fn reporter(&self) -> Option<&Arc<EventReporter>> {
        self.reporter.as_ref()
    }
}

fn common_attributes(meeting_id: &str, attendee_id: &str, metadata: &ClientMetadata) -> EventAttributes {
    let mut attributes = EventAttributes::from([
        (EventAttributeName::MeetingId, meeting_id.into()),
        (EventAttributeName::AttendeeId, attendee_id.into()),
    ]);
    let optional = [
        (EventAttributeName::OsName, &metadata.os_name),
        (EventAttributeName::OsVersion, &metadata.os_version),
        (EventAttributeName::SdkName, &metadata.sdk_name),
        (EventAttributeName::SdkVersion, &metadata.sdk_version),
        (EventAttributeName::MediaSdkVersion, &metadata.media_sdk_version),
        (EventAttributeName::DeviceName, &metadata.device_name),
        (EventAttributeName::DeviceManufacturer, &metadata.device_manufacturer),
        (EventAttributeName::DeviceModel, &metadata.device_model),
    ];
    for (name, value) in optional {
        if let Some(value) = value {
            attributes.insert(name, value.as_str().into());
        }
    }
    attributes
}
