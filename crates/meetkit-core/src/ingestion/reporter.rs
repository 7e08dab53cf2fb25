use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;

use crate::analytics::SdkEvent;
use crate::errors::MeetingError;

use super::buffer::EventBuffer;
use super::config::IngestionConfiguration;
use super::scheduler::{IntervalScheduler, Scheduler};
use super::sender::HttpEventSender;
use super::store::{DIRTY_MEETING_EVENTS_FILE, JsonFileTable, MEETING_EVENTS_FILE};

/// Front door of the ingestion pipeline.
///
/// Reported events are handed to the buffer in report order by a single
/// worker task; a periodic scheduler flushes the buffer while started.
pub struct EventReporter {
    disabled: bool,
    buffer: Arc<EventBuffer>,
    queue: mpsc::UnboundedSender<SdkEvent>,
    scheduler: Box<dyn Scheduler>,
    started: Mutex<bool>,
}

impl EventReporter {
    /// Reporter flushing every `flush_interval_ms`. Starts immediately.
    pub fn new(configuration: &IngestionConfiguration, buffer: Arc<EventBuffer>, runtime: Handle) -> Self {
        let flush_buffer = buffer.clone();
        let scheduler = IntervalScheduler::new(
            Duration::from_millis(configuration.flush_interval_ms),
            runtime.clone(),
            move || {
                let buffer = flush_buffer.clone();
                Box::pin(async move { buffer.process().await })
            },
        );
        Self::with_scheduler(configuration, buffer, runtime, Box::new(scheduler))
    }

    pub fn with_scheduler(
        configuration: &IngestionConfiguration,
        buffer: Arc<EventBuffer>,
        runtime: Handle,
        scheduler: Box<dyn Scheduler>,
    ) -> Self {
        let (queue, mut events) = mpsc::unbounded_channel::<SdkEvent>();
        let worker_buffer = buffer.clone();
        runtime.spawn(async move {
            while let Some(event) = events.recv().await {
                worker_buffer.add(event).await;
            }
        });

        let reporter = Self {
            disabled: configuration.disabled,
            buffer,
            queue,
            scheduler,
            started: Mutex::new(false),
        };
        reporter.start();
        reporter
    }

    /// Reporter backed by JSON tables under `data_dir` and the HTTP sender.
    /// Dirty events from earlier sessions are drained before returning.
    pub async fn with_json_storage(
        configuration: IngestionConfiguration,
        data_dir: &Path,
        runtime: Handle,
    ) -> Result<Self, MeetingError> {
        let sender = Arc::new(HttpEventSender::new(&configuration)?);
        let events = Arc::new(JsonFileTable::new(data_dir, MEETING_EVENTS_FILE));
        let dirty_events = Arc::new(JsonFileTable::new(data_dir, DIRTY_MEETING_EVENTS_FILE));
        let buffer = EventBuffer::open(configuration.clone(), events, dirty_events, sender).await;
        Ok(Self::new(&configuration, Arc::new(buffer), runtime))
    }

    pub fn report(&self, event: SdkEvent) {
        if self.disabled {
            return;
        }
        if self.queue.send(event).is_err() {
            tracing::warn!("event reporter worker stopped, dropping event");
        }
    }

    pub fn start(&self) {
        let mut started = self.started.lock();
        if *started {
            return;
        }
        *started = true;
        self.scheduler.start();
        tracing::debug!("event reporter started");
    }

    pub fn stop(&self) {
        let mut started = self.started.lock();
        if !*started {
            return;
        }
        *started = false;
        self.scheduler.stop();
        tracing::debug!("event reporter stopped");
    }

    pub fn is_started(&self) -> bool {
        *self.started.lock()
    }

    /// Flush one batch now, outside the periodic schedule.
    pub async fn flush(&self) {
        self.buffer.process().await;
    }
}

impl Drop for EventReporter {
    fn drop(&mut self) {
        self.scheduler.stop();
    }
}
