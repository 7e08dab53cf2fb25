use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::errors::MeetingError;

use super::record::{DirtyMeetingEventItem, IngestionMeetingEvent, MeetingEventItem};

/// A row kept in one of the event tables.
pub trait StoredEvent: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    fn id(&self) -> &str;
    fn data(&self) -> &IngestionMeetingEvent;
    fn ttl(&self) -> Option<i64> {
        None
    }
}

impl StoredEvent for MeetingEventItem {
    fn id(&self) -> &str {
        &self.id
    }

    fn data(&self) -> &IngestionMeetingEvent {
        &self.data
    }
}

impl StoredEvent for DirtyMeetingEventItem {
    fn id(&self) -> &str {
        &self.id
    }

    fn data(&self) -> &IngestionMeetingEvent {
        &self.data
    }

    fn ttl(&self) -> Option<i64> {
        Some(self.ttl)
    }
}

/// Persistence for buffered or dirty events. Rows come back in insertion order.
pub trait EventTable<T: StoredEvent>: Send + Sync {
    fn insert(&self, items: &[T]) -> Result<(), MeetingError>;
    fn query(&self, limit: usize) -> Result<Vec<T>, MeetingError>;
    fn delete(&self, ids: &[String]) -> Result<(), MeetingError>;
}

pub struct MemoryTable<T> {
    rows: Mutex<Vec<T>>,
}

impl<T> Default for MemoryTable<T> {
    fn default() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
        }
    }
}

impl<T: StoredEvent> MemoryTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.lock().is_empty()
    }

    pub fn rows(&self) -> Vec<T> {
        self.rows.lock().clone()
    }
}

impl<T: StoredEvent> EventTable<T> for MemoryTable<T> {
    fn insert(&self, items: &[T]) -> Result<(), MeetingError> {
        let mut rows = self.rows.lock();
        for item in items {
            rows.retain(|row| row.id() != item.id());
            rows.push(item.clone());
        }
        Ok(())
    }

    fn query(&self, limit: usize) -> Result<Vec<T>, MeetingError> {
        Ok(self.rows.lock().iter().take(limit).cloned().collect())
    }

    fn delete(&self, ids: &[String]) -> Result<(), MeetingError> {
        self.rows.lock().retain(|row| !ids.iter().any(|id| id == row.id()));
        Ok(())
    }
}

/// Table persisted as a JSON array under a data directory, rewritten on
/// every mutation.
pub struct JsonFileTable<T> {
    rows: Mutex<Vec<T>>,
    file_path: PathBuf,
}

pub const MEETING_EVENTS_FILE: &str = "meeting_events.json";
pub const DIRTY_MEETING_EVENTS_FILE: &str = "dirty_meeting_events.json";

impl<T: StoredEvent> JsonFileTable<T> {
    pub fn new(data_dir: impl AsRef<Path>, file_name: &str) -> Self {
        let file_path = data_dir.as_ref().join(file_name);
        let rows = Self::load(&file_path);
        Self {
            rows: Mutex::new(rows),
            file_path,
        }
    }

    fn load(path: &Path) -> Vec<T> {
        match std::fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("discarding unreadable event table {}: {e}", path.display());
                Vec::new()
            }),
            Err(_) => Vec::new(),
        }
    }

    fn save(&self, rows: &[T]) -> Result<(), MeetingError> {
        if let Some(parent) = self.file_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(rows)?;
        std::fs::write(&self.file_path, json)?;
        Ok(())
    }
}

impl<T: StoredEvent> EventTable<T> for JsonFileTable<T> {
    fn insert(&self, items: &[T]) -> Result<(), MeetingError> {
        let mut rows = self.rows.lock();
        let mut next = rows.clone();
        for item in items {
            next.retain(|row| row.id() != item.id());
            next.push(item.clone());
        }
        self.save(&next)?;
        *rows = next;
        Ok(())
    }

    fn query(&self, limit: usize) -> Result<Vec<T>, MeetingError> {
        Ok(self.rows.lock().iter().take(limit).cloned().collect())
    }

    fn delete(&self, ids: &[String]) -> Result<(), MeetingError> {
        let mut rows = self.rows.lock();
        let next: Vec<T> = rows
            .iter()
            .filter(|row| !ids.iter().any(|id| id == row.id()))
            .cloned()
            .collect();
        if next.len() == rows.len() {
            return Ok(());
        }
        self.save(&next)?;
        *rows = next;
        Ok(())
    }
}
