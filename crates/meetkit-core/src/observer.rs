use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::errors::MeetingError;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Serial execution context on which every observer callback runs.
///
/// Owns a dedicated thread draining a FIFO job queue. Work submitted from
/// other threads is queued; work submitted from the context thread itself
/// runs inline. The thread exits once every handle is dropped.
#[derive(Clone)]
pub struct MainContext {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    sender: mpsc::UnboundedSender<Job>,
    thread_id: ThreadId,
}

impl MainContext {
    pub fn new(name: &str) -> Result<Self, MeetingError> {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Job>();
        let handle = thread::Builder::new().name(name.to_string()).spawn(move || {
            while let Some(job) = receiver.blocking_recv() {
                if catch_unwind(AssertUnwindSafe(job)).is_err() {
                    tracing::error!("observer callback panicked on main context");
                }
            }
            tracing::debug!("main context drained");
        })?;
        let thread_id = handle.thread().id();
        Ok(Self {
            inner: Arc::new(ContextInner { sender, thread_id }),
        })
    }

    /// Whether the calling thread is the context thread.
    pub fn is_current(&self) -> bool {
        thread::current().id() == self.inner.thread_id
    }

    /// Queue `job` behind everything already submitted.
    pub fn post(&self, job: impl FnOnce() + Send + 'static) {
        if self.inner.sender.send(Box::new(job)).is_err() {
            tracing::warn!("main context stopped, dropping callback");
        }
    }

    /// Run `job` inline when already on the context, otherwise queue it.
    pub fn run(&self, job: impl FnOnce() + Send + 'static) {
        if self.is_current() {
            job();
        } else {
            self.post(job);
        }
    }

    /// Run `f` on the context and block until it returns.
    ///
    /// Returns `None` if the context thread is gone.
    pub fn sync<R: Send + 'static>(&self, f: impl FnOnce() -> R + Send + 'static) -> Option<R> {
        if self.is_current() {
            return Some(f());
        }
        let (tx, rx) = std::sync::mpsc::sync_channel(1);
        self.post(move || {
            let _ = tx.send(f());
        });
        rx.recv().ok()
    }
}

struct Entry<T: ?Sized> {
    id: usize,
    observer: Weak<T>,
}

fn identity<T: ?Sized>(observer: &Arc<T>) -> usize {
    Arc::as_ptr(observer).cast::<()>() as usize
}

/// Identity-keyed set of non-owning observer handles.
///
/// Dispatch iterates over a snapshot taken on the main context, so
/// subscribing or unsubscribing from inside a callback is safe.
pub struct ObserverSet<T: ?Sized> {
    main: MainContext,
    entries: Arc<Mutex<Vec<Entry<T>>>>,
}

impl<T: ?Sized> Clone for ObserverSet<T> {
    fn clone(&self) -> Self {
        Self {
            main: self.main.clone(),
            entries: self.entries.clone(),
        }
    }
}

impl<T: ?Sized + Send + Sync + 'static> ObserverSet<T> {
    pub fn new(main: MainContext) -> Self {
        Self {
            main,
            entries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Returns `false` if the observer was already registered.
    pub fn subscribe(&self, observer: &Arc<T>) -> bool {
        let id = identity(observer);
        let mut entries = self.entries.lock();
        entries.retain(|e| e.observer.strong_count() > 0);
        if entries.iter().any(|e| e.id == id) {
            return false;
        }
        entries.push(Entry {
            id,
            observer: Arc::downgrade(observer),
        });
        true
    }

    /// Returns `false` if the observer was not registered.
    pub fn unsubscribe(&self, observer: &Arc<T>) -> bool {
        let id = identity(observer);
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|e| e.id != id);
        entries.len() != before
    }

    /// Number of registered observers that are still alive.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.observer.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dispatch `f` to every live observer on the main context.
    pub fn notify_all<F>(&self, f: F)
    where
        F: Fn(&T) + Send + 'static,
    {
        let entries = self.entries.clone();
        self.main.run(move || {
            for observer in snapshot(&entries) {
                f(&*observer);
            }
        });
    }

    pub fn main_context(&self) -> &MainContext {
        &self.main
    }
}

fn snapshot<T: ?Sized>(entries: &Mutex<Vec<Entry<T>>>) -> Vec<Arc<T>> {
    entries.lock().iter().filter_map(|e| e.observer.upgrade()).collect()
}
