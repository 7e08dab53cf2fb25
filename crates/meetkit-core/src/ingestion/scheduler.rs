use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// A cancellable periodic timer.
pub trait Scheduler: Send + Sync {
    fn start(&self);
    fn stop(&self);
}

type Tick = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Runs `callback` every `interval` on a tokio runtime, first after one
/// full interval. A slow callback delays the next tick instead of
/// bursting.
pub struct IntervalScheduler {
    interval: Duration,
    runtime: Handle,
    callback: Tick,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl IntervalScheduler {
    pub fn new<F>(interval: Duration, runtime: Handle, callback: F) -> Self
    where
        F: Fn() -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        Self {
            interval,
            runtime,
            callback: Arc::new(callback),
            task: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.lock().as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Scheduler for IntervalScheduler {
    fn start(&self) {
        let mut task = self.task.lock();
        if task.is_some() {
            return;
        }
        let period = self.interval;
        let callback = self.callback.clone();
        *task = Some(self.runtime.spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                callback().await;
            }
        }));
    }

    fn stop(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}

impl Drop for IntervalScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(count: &Arc<AtomicUsize>) -> impl Fn() -> BoxFuture<'static, ()> + Send + Sync + 'static {
        let count = count.clone();
        move || {
            let count = count.clone();
            Box::pin(async move {
                count.fetch_add(1, Ordering::SeqCst);
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_after_each_interval() {
        let count = Arc::new(AtomicUsize::new(0));
        let scheduler = IntervalScheduler::new(Duration::from_millis(300), Handle::current(), counting(&count));

        scheduler.start();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(800)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_and_start_is_idempotent() {
        let count = Arc::new(AtomicUsize::new(0));
        let scheduler = IntervalScheduler::new(Duration::from_millis(300), Handle::current(), counting(&count));

        scheduler.start();
        scheduler.start();
        assert!(scheduler.is_running());
        tokio::time::sleep(Duration::from_millis(350)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        scheduler.stop();
        scheduler.stop();
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_running());
    }
}
