use parking_lot::Mutex;

use super::events::{EventAttributeName, EventAttributes, EventName, MeetingHistoryEvent};

/// Accumulates per-meeting counters and timings reported with analytics events.
#[derive(Default)]
pub struct MeetingStatsCollector {
    inner: Mutex<Stats>,
}

#[derive(Default)]
struct Stats {
    meeting_start_time_ms: i64,
    meeting_start_connecting_time_ms: i64,
    meeting_start_reconnecting_time_ms: i64,
    meeting_reconnected_time_ms: i64,
    retry_count: u32,
    poor_connection_count: u32,
    max_video_tile_count: u32,
    history: Vec<MeetingHistoryEvent>,
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl MeetingStatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn meeting_history(&self) -> Vec<MeetingHistoryEvent> {
        self.inner.lock().history.clone()
    }

    pub fn add_meeting_history_event(&self, name: EventName, timestamp_ms: i64) {
        self.inner.lock().history.push(MeetingHistoryEvent { name, timestamp_ms });
    }

    pub fn increment_retry_count(&self) {
        self.inner.lock().retry_count += 1;
    }

    pub fn increment_poor_connection_count(&self) {
        self.inner.lock().poor_connection_count += 1;
    }

    pub fn update_max_video_tile(&self, video_tile_count: u32) {
        let mut stats = self.inner.lock();
        stats.max_video_tile_count = stats.max_video_tile_count.max(video_tile_count);
    }

    pub fn update_meeting_start_connecting_time(&self) {
        self.inner.lock().meeting_start_connecting_time_ms = now_ms();
    }

    pub fn update_meeting_start_time(&self) {
        self.inner.lock().meeting_start_time_ms = now_ms();
    }

    pub fn update_meeting_start_reconnecting_time(&self) {
        let mut stats = self.inner.lock();
        stats.meeting_start_reconnecting_time_ms = now_ms();
        stats.meeting_reconnected_time_ms = 0;
    }

    pub fn update_meeting_reconnected_time(&self) {
        self.inner.lock().meeting_reconnected_time_ms = now_ms();
    }

    /// Whether the meeting has connected at least once since the last reset.
    pub fn has_started(&self) -> bool {
        self.inner.lock().meeting_start_time_ms != 0
    }

    pub fn meeting_stats(&self) -> EventAttributes {
        let stats = self.inner.lock();
        let now = now_ms();

        let reconnect_duration_ms = if stats.meeting_start_reconnecting_time_ms == 0
            || stats.meeting_reconnected_time_ms == 0
            || stats.meeting_reconnected_time_ms < stats.meeting_start_reconnecting_time_ms
        {
            0
        } else {
            stats.meeting_reconnected_time_ms - stats.meeting_start_reconnecting_time_ms
        };
        let (start_duration_ms, duration_ms) = if stats.meeting_start_time_ms == 0 {
            (0, 0)
        } else {
            (
                stats.meeting_start_time_ms - stats.meeting_start_connecting_time_ms,
                now - stats.meeting_start_time_ms,
            )
        };

        EventAttributes::from([
            (EventAttributeName::MaxVideoTileCount, stats.max_video_tile_count.into()),
            (EventAttributeName::RetryCount, stats.retry_count.into()),
            (EventAttributeName::PoorConnectionCount, stats.poor_connection_count.into()),
            (EventAttributeName::MeetingStartDurationMs, start_duration_ms.into()),
            (EventAttributeName::MeetingDurationMs, duration_ms.into()),
            (EventAttributeName::MeetingReconnectDurationMs, reconnect_duration_ms.into()),
        ])
    }

    /// Clears counters and timings. History is kept for the lifetime of the collector.
    pub fn reset(&self) {
        let mut stats = self.inner.lock();
        let history = std::mem::take(&mut stats.history);
        *stats = Stats {
            history,
            ..Stats::default()
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_collector_reports_zeroes() {
        let stats = MeetingStatsCollector::new().meeting_stats();
        assert_eq!(stats[&EventAttributeName::RetryCount], 0);
        assert_eq!(stats[&EventAttributeName::MeetingDurationMs], 0);
        assert_eq!(stats[&EventAttributeName::MeetingStartDurationMs], 0);
    }

    #[test]
    fn counts_and_max_tile() {
        let collector = MeetingStatsCollector::new();
        collector.increment_retry_count();
        collector.increment_retry_count();
        collector.increment_poor_connection_count();
        collector.update_max_video_tile(3);
        collector.update_max_video_tile(2);

        let stats = collector.meeting_stats();
        assert_eq!(stats[&EventAttributeName::RetryCount], 2);
        assert_eq!(stats[&EventAttributeName::PoorConnectionCount], 1);
        assert_eq!(stats[&EventAttributeName::MaxVideoTileCount], 3);
    }

    #[test]
    fn reset_clears_counters_but_keeps_history() {
        let collector = MeetingStatsCollector::new();
        collector.update_meeting_start_connecting_time();
        collector.update_meeting_start_time();
        collector.increment_retry_count();
        collector.add_meeting_history_event(EventName::MeetingStartSucceeded, 10);
        assert!(collector.has_started());

        collector.reset();

        assert!(!collector.has_started());
        assert_eq!(collector.meeting_stats()[&EventAttributeName::RetryCount], 0);
        assert_eq!(collector.meeting_history().len(), 1);
    }
}
