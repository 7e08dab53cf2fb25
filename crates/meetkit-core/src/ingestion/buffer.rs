use std::sync::Arc;

use crate::analytics::{EventName, SdkEvent};
use crate::status::MeetingSessionStatusCode;

use super::config::IngestionConfiguration;
use super::converter::{to_ingestion_meeting_event, to_ingestion_record};
use super::record::{DirtyMeetingEventItem, MeetingEventItem};
use super::sender::EventSender;
use super::store::EventTable;

/// How long a failed event stays eligible for redelivery.
pub const DIRTY_EVENT_TTL_MS: i64 = 172_800_000;

/// Buffers telemetry events in a durable table and flushes them in batches.
///
/// Failed batches move to the dirty table with an absolute expiry and are
/// retried when the next buffer is opened. Every path that touches the
/// tables or the sender runs under one async lock.
pub struct EventBuffer {
    configuration: IngestionConfiguration,
    events: Arc<dyn EventTable<MeetingEventItem>>,
    dirty_events: Arc<dyn EventTable<DirtyMeetingEventItem>>,
    sender: Arc<dyn EventSender>,
    lock: tokio::sync::Mutex<()>,
}

impl EventBuffer {
    pub fn new(
        configuration: IngestionConfiguration,
        events: Arc<dyn EventTable<MeetingEventItem>>,
        dirty_events: Arc<dyn EventTable<DirtyMeetingEventItem>>,
        sender: Arc<dyn EventSender>,
    ) -> Self {
        Self {
            configuration,
            events,
            dirty_events,
            sender,
            lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Create the buffer and drain dirty events left by earlier sessions.
    pub async fn open(
        configuration: IngestionConfiguration,
        events: Arc<dyn EventTable<MeetingEventItem>>,
        dirty_events: Arc<dyn EventTable<DirtyMeetingEventItem>>,
        sender: Arc<dyn EventSender>,
    ) -> Self {
        let buffer = Self::new(configuration, events, dirty_events, sender);
        buffer.process_dirty_events().await;
        buffer
    }

    /// Persist `event`, then deliver it right away if it is urgent.
    pub async fn add(&self, event: SdkEvent) {
        let item = MeetingEventItem {
            id: uuid::Uuid::new_v4().to_string(),
            data: to_ingestion_meeting_event(&event, &self.configuration),
        };

        {
            let _guard = self.lock.lock().await;
            if let Err(e) = self.events.insert(std::slice::from_ref(&item)) {
                tracing::error!("failed to buffer {} event: {e}", event.name);
            }
        }

        if should_send_immediately(&event) {
            tracing::debug!("sending {} immediately", event.name);
            let _guard = self.lock.lock().await;
            self.send_items(vec![item]).await;
        }
    }

    /// Flush up to `flush_size` buffered events.
    pub async fn process(&self) {
        let _guard = self.lock.lock().await;
        let items = match self.events.query(self.configuration.flush_size) {
            Ok(items) => items,
            Err(e) => {
                tracing::error!("failed to query buffered events: {e}");
                return;
            }
        };
        self.send_items(items).await;
    }

    /// Resend dirty events until the table is empty or a send fails. On
    /// failure only expired rows are dropped.
    pub async fn process_dirty_events(&self) {
        let _guard = self.lock.lock().await;
        loop {
            let dirty = match self.dirty_events.query(self.configuration.flush_size) {
                Ok(dirty) => dirty,
                Err(e) => {
                    tracing::error!("failed to query dirty events: {e}");
                    return;
                }
            };
            let record = to_ingestion_record(&dirty, &self.configuration);
            if record.is_empty() {
                return;
            }

            if self.sender.send_events(&record).await {
                if let Err(e) = self.dirty_events.delete(&record.payload_ids()) {
                    tracing::error!("failed to delete resent dirty events: {e}");
                    return;
                }
            } else {
                let now = now_ms();
                let expired: Vec<String> = dirty
                    .iter()
                    .filter(|item| item.ttl < now)
                    .map(|item| item.id.clone())
                    .collect();
                if !expired.is_empty() {
                    tracing::info!("dropping {} expired dirty events", expired.len());
                    if let Err(e) = self.dirty_events.delete(&expired) {
                        tracing::error!("failed to delete expired dirty events: {e}");
                    }
                }
                return;
            }
        }
    }

    // Caller holds `lock`.
    async fn send_items(&self, items: Vec<MeetingEventItem>) {
        let record = to_ingestion_record(&items, &self.configuration);
        if record.is_empty() {
            return;
        }
        let ids = record.payload_ids();

        if !self.sender.send_events(&record).await {
            tracing::info!("unable to send {} events, moving them to dirty events", ids.len());
            let ttl = now_ms() + DIRTY_EVENT_TTL_MS;
            let dirty: Vec<DirtyMeetingEventItem> = items
                .into_iter()
                .map(|item| DirtyMeetingEventItem::from_item(item, ttl))
                .collect();
            if let Err(e) = self.dirty_events.insert(&dirty) {
                tracing::error!("failed to store dirty events, keeping them buffered: {e}");
                return;
            }
        }

        if let Err(e) = self.events.delete(&ids) {
            tracing::error!("failed to delete flushed events: {e}");
        }
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn should_send_immediately(event: &SdkEvent) -> bool {
    match event.name {
        EventName::MeetingEnded => true,
        EventName::MeetingFailed => matches!(
            event.meeting_status(),
            Some(
                MeetingSessionStatusCode::AudioAuthenticationRejected
                    | MeetingSessionStatusCode::AudioInternalServerError
                    | MeetingSessionStatusCode::AudioServiceUnavailable
                    | MeetingSessionStatusCode::AudioDisconnected
            )
        ),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use crate::analytics::{EventAttributeName, EventAttributes};
    use crate::errors::MeetingError;
    use crate::ingestion::config::{IngestionConfigurationBuilder, MeetingEventClientConfiguration};
    use crate::ingestion::record::{IngestionEventAttributes, IngestionMeetingEvent, IngestionRecord};
    use crate::ingestion::store::MemoryTable;

    /// Replies from a script, then with `fallback`. Records the buffered row
    /// count seen at each send.
    struct ScriptedSender {
        script: Mutex<VecDeque<bool>>,
        fallback: bool,
        buffered: Arc<MemoryTable<MeetingEventItem>>,
        buffered_at_send: Mutex<Vec<usize>>,
        records: Mutex<Vec<IngestionRecord>>,
    }

    impl ScriptedSender {
        fn new(buffered: Arc<MemoryTable<MeetingEventItem>>, script: &[bool], fallback: bool) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.iter().copied().collect()),
                fallback,
                buffered,
                buffered_at_send: Mutex::new(Vec::new()),
                records: Mutex::new(Vec::new()),
            })
        }

        fn sends(&self) -> usize {
            self.records.lock().len()
        }
    }

    #[async_trait]
    impl EventSender for ScriptedSender {
        async fn send_events(&self, record: &IngestionRecord) -> bool {
            self.buffered_at_send.lock().push(self.buffered.len());
            self.records.lock().push(record.clone());
            self.script.lock().pop_front().unwrap_or(self.fallback)
        }
    }

    struct FailingTable;

    impl EventTable<DirtyMeetingEventItem> for FailingTable {
        fn insert(&self, _items: &[DirtyMeetingEventItem]) -> Result<(), MeetingError> {
            Err(MeetingError::Storage("disk full".to_string()))
        }

        fn query(&self, _limit: usize) -> Result<Vec<DirtyMeetingEventItem>, MeetingError> {
            Ok(Vec::new())
        }

        fn delete(&self, _ids: &[String]) -> Result<(), MeetingError> {
            Ok(())
        }
    }

    fn configuration(flush_size: i64) -> IngestionConfiguration {
        IngestionConfigurationBuilder::new()
            .flush_size(flush_size)
            .build(
                false,
                "https://ingest.example.com",
                MeetingEventClientConfiguration::new("token", "meeting-1", "attendee-1"),
            )
            .unwrap()
    }

    fn event(name: EventName, status: Option<MeetingSessionStatusCode>) -> SdkEvent {
        let mut attributes = EventAttributes::new();
        attributes.insert(EventAttributeName::TimestampMs, now_ms().into());
        if let Some(status) = status {
            attributes.insert(
                EventAttributeName::MeetingStatus,
                serde_json::to_value(status).unwrap(),
            );
        }
        SdkEvent::new(name, attributes)
    }

    fn dirty(id: &str, ttl: i64) -> DirtyMeetingEventItem {
        DirtyMeetingEventItem {
            id: id.to_string(),
            data: IngestionMeetingEvent {
                name: "meetingStartSucceeded".to_string(),
                event_attributes: IngestionEventAttributes {
                    meeting_id: Some("meeting-1".to_string()),
                    ..Default::default()
                },
            },
            ttl,
        }
    }

    struct Fixture {
        buffer: EventBuffer,
        events: Arc<MemoryTable<MeetingEventItem>>,
        dirty: Arc<MemoryTable<DirtyMeetingEventItem>>,
        sender: Arc<ScriptedSender>,
    }

    fn fixture(flush_size: i64, script: &[bool], fallback: bool) -> Fixture {
        let events = Arc::new(MemoryTable::new());
        let dirty = Arc::new(MemoryTable::new());
        let sender = ScriptedSender::new(events.clone(), script, fallback);
        let buffer = EventBuffer::new(
            configuration(flush_size),
            events.clone(),
            dirty.clone(),
            sender.clone(),
        );
        Fixture {
            buffer,
            events,
            dirty,
            sender,
        }
    }

    #[test]
    fn test_immediate_send_predicate() {
        assert!(should_send_immediately(&event(EventName::MeetingEnded, None)));
        assert!(should_send_immediately(&event(
            EventName::MeetingFailed,
            Some(MeetingSessionStatusCode::AudioAuthenticationRejected)
        )));
        assert!(should_send_immediately(&event(
            EventName::MeetingFailed,
            Some(MeetingSessionStatusCode::AudioDisconnected)
        )));
        assert!(!should_send_immediately(&event(
            EventName::MeetingFailed,
            Some(MeetingSessionStatusCode::AudioCallEnded)
        )));
        assert!(!should_send_immediately(&event(EventName::MeetingFailed, None)));
        assert!(!should_send_immediately(&event(EventName::MeetingStartSucceeded, None)));
    }

    #[tokio::test]
    async fn test_add_buffers_without_sending() {
        let f = fixture(20, &[], true);
        f.buffer.add(event(EventName::MeetingStartSucceeded, None)).await;

        assert_eq!(f.events.len(), 1);
        assert_eq!(f.sender.sends(), 0);
    }

    #[tokio::test]
    async fn test_immediate_event_is_persisted_before_send() {
        let f = fixture(20, &[false], false);
        f.buffer.add(event(EventName::MeetingEnded, None)).await;

        assert_eq!(*f.sender.buffered_at_send.lock(), vec![1]);
        assert!(f.events.is_empty());
        assert_eq!(f.dirty.len(), 1);
    }

    #[tokio::test]
    async fn test_immediate_event_sent_alone() {
        let f = fixture(20, &[], true);
        f.buffer.add(event(EventName::MeetingStartSucceeded, None)).await;
        f.buffer.add(event(EventName::MeetingEnded, None)).await;

        let records = f.sender.records.lock().clone();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].payload_ids().len(), 1);
        assert_eq!(records[0].events[0].payloads[0].name, "meetingEnded");
        assert_eq!(f.events.len(), 1);
    }

    #[tokio::test]
    async fn test_process_success_deletes_batch() {
        let f = fixture(2, &[], true);
        for _ in 0..3 {
            f.buffer.add(event(EventName::MeetingStartSucceeded, None)).await;
        }

        f.buffer.process().await;

        assert_eq!(f.sender.sends(), 1);
        assert_eq!(f.sender.records.lock()[0].payload_ids().len(), 2);
        assert_eq!(f.events.len(), 1);
        assert!(f.dirty.is_empty());
    }

    #[tokio::test]
    async fn test_process_failure_moves_batch_to_dirty_with_ttl() {
        let f = fixture(20, &[], false);
        for _ in 0..3 {
            f.buffer.add(event(EventName::MeetingReconnected, None)).await;
        }

        let before = now_ms();
        f.buffer.process().await;
        let after = now_ms();

        assert!(f.events.is_empty());
        let dirty = f.dirty.rows();
        assert_eq!(dirty.len(), 3);
        for item in dirty {
            assert!(item.ttl >= before + DIRTY_EVENT_TTL_MS);
            assert!(item.ttl <= after + DIRTY_EVENT_TTL_MS);
        }
    }

    #[tokio::test]
    async fn test_failed_dirty_insert_keeps_buffered_rows() {
        let events = Arc::new(MemoryTable::new());
        let sender = ScriptedSender::new(events.clone(), &[], false);
        let buffer = EventBuffer::new(configuration(20), events.clone(), Arc::new(FailingTable), sender);

        buffer.add(event(EventName::MeetingReconnected, None)).await;
        buffer.process().await;

        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn test_process_with_nothing_buffered_does_not_send() {
        let f = fixture(20, &[], true);
        f.buffer.process().await;
        assert_eq!(f.sender.sends(), 0);
    }

    #[tokio::test]
    async fn test_dirty_drain_loops_until_empty() {
        let f = fixture(2, &[], true);
        let ttl = now_ms() + DIRTY_EVENT_TTL_MS;
        f.dirty
            .insert(&[dirty("a", ttl), dirty("b", ttl), dirty("c", ttl)])
            .unwrap();

        f.buffer.process_dirty_events().await;

        assert_eq!(f.sender.sends(), 2);
        assert!(f.dirty.is_empty());
    }

    #[tokio::test]
    async fn test_failed_dirty_resend_drops_only_expired() {
        let f = fixture(20, &[], false);
        let now = now_ms();
        f.dirty
            .insert(&[dirty("expired", now - 1000), dirty("fresh", now + 60_000)])
            .unwrap();

        f.buffer.process_dirty_events().await;

        assert_eq!(f.sender.sends(), 1);
        let remaining: Vec<String> = f.dirty.rows().into_iter().map(|d| d.id).collect();
        assert_eq!(remaining, vec!["fresh".to_string()]);
    }

    #[tokio::test]
    async fn test_open_drains_dirty_events() {
        let events = Arc::new(MemoryTable::new());
        let dirty_table = Arc::new(MemoryTable::new());
        dirty_table
            .insert(&[dirty("a", now_ms() + DIRTY_EVENT_TTL_MS)])
            .unwrap();
        let sender = ScriptedSender::new(events.clone(), &[], true);

        let _buffer = EventBuffer::open(configuration(20), events, dirty_table.clone(), sender.clone()).await;

        assert_eq!(sender.sends(), 1);
        assert!(sender.records.lock()[0].events[0].payloads[0].ttl.is_some());
        assert!(dirty_table.is_empty());
    }
}
