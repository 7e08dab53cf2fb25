use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex};

use crate::observer::{MainContext, ObserverSet};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AttendeeInfo {
    pub attendee_id: String,
    pub external_user_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VolumeLevel {
    Muted,
    NotSpeaking,
    Low,
    Medium,
    High,
}

impl VolumeLevel {
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            -1 => Some(Self::Muted),
            0 => Some(Self::NotSpeaking),
            1 => Some(Self::Low),
            2 => Some(Self::Medium),
            3 => Some(Self::High),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalStrength {
    None,
    Low,
    High,
}

impl SignalStrength {
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(Self::None),
            1 => Some(Self::Low),
            2 => Some(Self::High),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AttendeeStatus {
    Joined,
    Left,
    Dropped,
}

impl AttendeeStatus {
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            1 => Some(Self::Joined),
            2 => Some(Self::Left),
            3 => Some(Self::Dropped),
            _ => None,
        }
    }
}

/// One per-attendee value pushed by the audio client. `data` is a raw
/// volume level, signal strength or presence status depending on the feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendeeUpdate {
    pub attendee_id: String,
    pub external_user_id: String,
    pub data: i32,
}

impl AttendeeUpdate {
    fn info(&self) -> Option<AttendeeInfo> {
        if self.external_user_id.is_empty() {
            return None;
        }
        Some(AttendeeInfo {
            attendee_id: self.attendee_id.clone(),
            external_user_id: self.external_user_id.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeUpdate {
    pub attendee_info: AttendeeInfo,
    pub volume_level: VolumeLevel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalUpdate {
    pub attendee_info: AttendeeInfo,
    pub signal_strength: SignalStrength,
}

pub trait RealtimeObserver: Send + Sync {
    fn attendees_did_join(&self, _attendees: &[AttendeeInfo]) {}

    fn attendees_did_leave(&self, _attendees: &[AttendeeInfo]) {}

    fn attendees_did_drop(&self, _attendees: &[AttendeeInfo]) {}

    fn attendees_did_mute(&self, _attendees: &[AttendeeInfo]) {}

    fn attendees_did_unmute(&self, _attendees: &[AttendeeInfo]) {}

    fn volume_did_change(&self, _updates: &[VolumeUpdate]) {}

    fn signal_strength_did_change(&self, _updates: &[SignalUpdate]) {}
}

#[derive(Default)]
struct TrackerState {
    attendees: BTreeSet<AttendeeInfo>,
    volumes: BTreeMap<AttendeeInfo, VolumeLevel>,
    signals: BTreeMap<AttendeeInfo, SignalStrength>,
}

/// Entries of `next` whose value differs from `current`.
fn delta<V: Copy + PartialEq>(
    next: &BTreeMap<AttendeeInfo, V>,
    current: &BTreeMap<AttendeeInfo, V>,
) -> Vec<(AttendeeInfo, V)> {
    next.iter()
        .filter(|(info, value)| current.get(*info) != Some(*value))
        .map(|(info, value)| (info.clone(), *value))
        .collect()
}

/// Tracks attendee presence, volume and signal strength, notifying
/// observers only about what changed since the previous update.
pub struct RealtimeTracker {
    state: Mutex<TrackerState>,
    dispatch: ReentrantMutex<()>,
    observers: ObserverSet<dyn RealtimeObserver>,
}

impl RealtimeTracker {
    pub fn new(main: MainContext) -> Self {
        Self {
            state: Mutex::new(TrackerState::default()),
            dispatch: ReentrantMutex::new(()),
            observers: ObserverSet::new(main),
        }
    }

    pub fn add_observer(&self, observer: &Arc<dyn RealtimeObserver>) {
        self.observers.subscribe(observer);
    }

    pub fn remove_observer(&self, observer: &Arc<dyn RealtimeObserver>) {
        self.observers.unsubscribe(observer);
    }

    pub fn volume_changed(&self, updates: &[AttendeeUpdate]) {
        let next: BTreeMap<AttendeeInfo, VolumeLevel> = updates
            .iter()
            .filter_map(|u| Some((u.info()?, VolumeLevel::from_raw(u.data)?)))
            .collect();

        let _ordered = self.dispatch.lock();
        let (changed, muted, unmuted) = {
            let mut state = self.state.lock();
            let changed = delta(&next, &state.volumes);
            let muted: Vec<AttendeeInfo> = changed
                .iter()
                .filter(|(_, level)| *level == VolumeLevel::Muted)
                .map(|(info, _)| info.clone())
                .collect();
            let unmuted: Vec<AttendeeInfo> = changed
                .iter()
                .filter(|(info, _)| state.volumes.get(info) == Some(&VolumeLevel::Muted))
                .map(|(info, _)| info.clone())
                .collect();
            state.volumes = next;
            (changed, muted, unmuted)
        };

        if !muted.is_empty() {
            self.observers.notify_all(move |o| o.attendees_did_mute(&muted));
        }
        if !unmuted.is_empty() {
            self.observers.notify_all(move |o| o.attendees_did_unmute(&unmuted));
        }
        if !changed.is_empty() {
            let updates: Vec<VolumeUpdate> = changed
                .into_iter()
                .map(|(attendee_info, volume_level)| VolumeUpdate {
                    attendee_info,
                    volume_level,
                })
                .collect();
            self.observers.notify_all(move |o| o.volume_did_change(&updates));
        }
    }

    pub fn signal_strength_changed(&self, updates: &[AttendeeUpdate]) {
        let next: BTreeMap<AttendeeInfo, SignalStrength> = updates
            .iter()
            .filter_map(|u| Some((u.info()?, SignalStrength::from_raw(u.data)?)))
            .collect();

        let _ordered = self.dispatch.lock();
        let changed = {
            let mut state = self.state.lock();
            let changed = delta(&next, &state.signals);
            state.signals = next;
            changed
        };

        if !changed.is_empty() {
            let updates: Vec<SignalUpdate> = changed
                .into_iter()
                .map(|(attendee_info, signal_strength)| SignalUpdate {
                    attendee_info,
                    signal_strength,
                })
                .collect();
            self.observers
                .notify_all(move |o| o.signal_strength_did_change(&updates));
        }
    }

    pub fn attendees_presence_changed(&self, updates: &[AttendeeUpdate]) {
        let mut by_status: BTreeMap<AttendeeStatus, BTreeSet<AttendeeInfo>> = BTreeMap::new();
        for update in updates {
            let (Some(info), Some(status)) = (update.info(), AttendeeStatus::from_raw(update.data))
            else {
                continue;
            };
            by_status.entry(status).or_default().insert(info);
        }

        let _ordered = self.dispatch.lock();
        let (joined, left, dropped) = {
            let mut state = self.state.lock();
            let joined: Vec<AttendeeInfo> = by_status
                .remove(&AttendeeStatus::Joined)
                .unwrap_or_default()
                .into_iter()
                .filter(|info| !state.attendees.contains(info))
                .collect();
            state.attendees.extend(joined.iter().cloned());
            let left: Vec<AttendeeInfo> = by_status
                .remove(&AttendeeStatus::Left)
                .unwrap_or_default()
                .into_iter()
                .collect();
            let dropped: Vec<AttendeeInfo> = by_status
                .remove(&AttendeeStatus::Dropped)
                .unwrap_or_default()
                .into_iter()
                .collect();
            for info in left.iter().chain(dropped.iter()) {
                state.attendees.remove(info);
            }
            (joined, left, dropped)
        };

        if !joined.is_empty() {
            self.observers.notify_all(move |o| o.attendees_did_join(&joined));
        }
        if !left.is_empty() {
            self.observers.notify_all(move |o| o.attendees_did_leave(&left));
        }
        if !dropped.is_empty() {
            self.observers.notify_all(move |o| o.attendees_did_drop(&dropped));
        }
    }

    pub fn attendees(&self) -> Vec<AttendeeInfo> {
        self.state.lock().attendees.iter().cloned().collect()
    }
}
