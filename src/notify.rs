use chrono::NaiveDate;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::{Booking, DayKey, Minute, ReservationLock};

const CHANNEL_CAPACITY: usize = 256;

/// Slot-state transition kinds published to viewers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Locked,
    Released,
    Booked,
    Cancelled,
    /// Synthesized for a subscriber that fell behind the channel; tells it to
    /// re-run the availability query rather than patch incrementally.
    Resync,
}

/// One slot-state transition on a staff-day. Serialized as the NOTIFY payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotChange {
    pub change: ChangeKind,
    pub staff_id: Ulid,
    pub date: NaiveDate,
    pub start: Minute,
    pub end: Minute,
    pub id: Option<Ulid>,
}

impl SlotChange {
    pub fn locked(lock: &ReservationLock) -> Self {
        Self {
            change: ChangeKind::Locked,
            staff_id: lock.staff_id,
            date: lock.date,
            start: lock.start_min,
            end: lock.end_min,
            id: Some(lock.id),
        }
    }

    pub fn released(lock: &ReservationLock) -> Self {
        Self {
            change: ChangeKind::Released,
            ..Self::locked(lock)
        }
    }

    pub fn booked(booking: &Booking) -> Self {
        Self {
            change: ChangeKind::Booked,
            staff_id: booking.staff_id,
            date: booking.date,
            start: booking.start_min,
            end: booking.end_min,
            id: Some(booking.id),
        }
    }

    pub fn cancelled(booking: &Booking) -> Self {
        Self {
            change: ChangeKind::Cancelled,
            ..Self::booked(booking)
        }
    }

    pub fn resync(key: DayKey) -> Self {
        Self {
            change: ChangeKind::Resync,
            staff_id: key.staff_id,
            date: key.date,
            start: 0,
            end: 0,
            id: None,
        }
    }
}

/// Broadcast hub: one channel per staff-day. Sends never block and are a
/// no-op with no listeners.
pub struct NotifyHub {
    channels: DashMap<DayKey, broadcast::Sender<SlotChange>>,
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to transitions on one staff-day. Creates the channel if needed.
    pub fn subscribe(&self, key: DayKey) -> broadcast::Receiver<SlotChange> {
        let sender = self
            .channels
            .entry(key)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Publish a transition. No-op if nobody is listening.
    pub fn send(&self, key: DayKey, change: &SlotChange) {
        if let Some(sender) = self.channels.get(&key) {
            let _ = sender.send(change.clone());
        }
    }

    /// Remove a day's channel (retention GC).
    pub fn remove(&self, key: &DayKey) {
        self.channels.remove(key);
    }
}

// ── Channel naming ───────────────────────────────────────────────

/// LISTEN channel name for a staff-day: `day_<staff_ulid>_<YYYYMMDD>`.
pub fn day_channel(key: &DayKey) -> String {
    format!("day_{}_{}", key.staff_id, key.date.format("%Y%m%d"))
}

pub fn parse_day_channel(channel: &str) -> Option<DayKey> {
    let rest = channel.strip_prefix("day_")?;
    let (staff, date) = rest.split_once('_')?;
    let staff_id = Ulid::from_string(staff).ok()?;
    let date = NaiveDate::parse_from_str(date, "%Y%m%d").ok()?;
    Some(DayKey::new(staff_id, date))
}
