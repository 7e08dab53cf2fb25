use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::observer::{MainContext, ObserverSet};

/// Minimum spacing between two metric deliveries.
pub const METRICS_EMISSION_INTERVAL: Duration = Duration::from_millis(1000);

/// Media metrics surfaced to observers, each measured over the past second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ObservableMetric {
    /// Percentage of audio packets lost from server to client.
    AudioPacketsReceivedFractionLoss,
    /// Percentage of audio packets lost from client to server.
    AudioPacketsSentFractionLoss,
}

impl ObservableMetric {
    /// Map a native audio client metric id. Ids with no observable
    /// counterpart return `None`.
    pub fn from_audio_metric(id: i32) -> Option<Self> {
        match id {
            // server post-jitter-buffer mic loss over 1s
            3 => Some(Self::AudioPacketsSentFractionLoss),
            // client post-jitter-buffer speaker loss over 1s
            7 => Some(Self::AudioPacketsReceivedFractionLoss),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::AudioPacketsReceivedFractionLoss => "audioPacketsReceivedFractionLoss",
            Self::AudioPacketsSentFractionLoss => "audioPacketsSentFractionLoss",
        }
    }
}

impl fmt::Display for ObservableMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub type ObservableMetrics = BTreeMap<ObservableMetric, f64>;

pub trait MetricsObserver: Send + Sync {
    fn metrics_did_receive(&self, metrics: &ObservableMetrics);
}

struct MetricsState {
    cached: ObservableMetrics,
    last_emitted: Instant,
}

/// Caches observable audio metrics and delivers them at most once per
/// [`METRICS_EMISSION_INTERVAL`].
pub struct MetricsCollector {
    observers: ObserverSet<dyn MetricsObserver>,
    state: Mutex<MetricsState>,
}

impl MetricsCollector {
    pub fn new(main: MainContext) -> Self {
        Self {
            observers: ObserverSet::new(main),
            state: Mutex::new(MetricsState {
                cached: ObservableMetrics::new(),
                last_emitted: Instant::now(),
            }),
        }
    }

    pub fn add_observer(&self, observer: &Arc<dyn MetricsObserver>) {
        self.observers.subscribe(observer);
    }

    pub fn remove_observer(&self, observer: &Arc<dyn MetricsObserver>) {
        self.observers.unsubscribe(observer);
    }

    /// Fold raw `(metric id, value)` pairs from the audio client into the
    /// cache, then deliver the whole cache if the interval has passed.
    pub fn process_audio_client_metrics(&self, metrics: &[(i32, f64)]) {
        let snapshot = {
            let mut state = self.state.lock();
            for &(id, value) in metrics {
                if let Some(metric) = ObservableMetric::from_audio_metric(id) {
                    state.cached.insert(metric, value);
                }
            }
            let now = Instant::now();
            if now.duration_since(state.last_emitted) <= METRICS_EMISSION_INTERVAL {
                return;
            }
            state.last_emitted = now;
            state.cached.clone()
        };

        tracing::trace!("emitting {} observable metrics", snapshot.len());
        self.observers
            .notify_all(move |o| o.metrics_did_receive(&snapshot));
    }

    pub fn cached(&self) -> ObservableMetrics {
        self.state.lock().cached.clone()
    }
}
