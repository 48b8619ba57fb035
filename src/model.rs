use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds — wall-clock instants (lock expiry, `now`).
pub type Ms = i64;

/// Minutes since midnight — slot boundaries and durations.
pub type Minute = i32;

pub const MS_PER_MINUTE: Ms = 60_000;

/// One staff member's calendar day: the unit of locking and notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DayKey {
    pub staff_id: Ulid,
    pub date: NaiveDate,
}

impl DayKey {
    pub fn new(staff_id: Ulid, date: NaiveDate) -> Self {
        Self { staff_id, date }
    }
}

// ── Time helpers ─────────────────────────────────────────────────

/// Midnight of `date` as unix ms. Dates are naive; one timezone per deployment.
pub fn date_start_ms(date: NaiveDate) -> Ms {
    date.and_time(NaiveTime::MIN).and_utc().timestamp_millis()
}

/// Absolute instant of a slot boundary on `date`.
pub fn slot_instant_ms(date: NaiveDate, minute: Minute) -> Ms {
    date_start_ms(date) + minute as Ms * MS_PER_MINUTE
}

pub fn date_of_ms(t: Ms) -> Option<NaiveDate> {
    chrono::DateTime::from_timestamp_millis(t).map(|dt| dt.date_naive())
}

/// `"09:05"` rendering of a minute-of-day. `1440` renders as `"24:00"`.
pub fn fmt_minute(m: Minute) -> String {
    format!("{:02}:{:02}", m / 60, m % 60)
}

/// Parses `"HH:MM"` into minutes since midnight. Accepts `"24:00"` as a close
/// boundary but nothing past it.
pub fn parse_hhmm(s: &str) -> Option<Minute> {
    let (hh, mm) = s.split_once(':')?;
    if hh.len() != 2 || mm.len() != 2 {
        return None;
    }
    let h: Minute = hh.parse().ok()?;
    let m: Minute = mm.parse().ok()?;
    if !(0..60).contains(&m) || !(0..=24).contains(&h) {
        return None;
    }
    let total = h * 60 + m;
    if total > 24 * 60 { None } else { Some(total) }
}

// ── Slot state ───────────────────────────────────────────────────

/// State of a claimed slot. Free slots are never stored — free is the absence
/// of a claim, so regenerating a grid can never corrupt existing claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotState {
    Locked { lock_id: Ulid, expires_at: Ms },
    Booked { booking_id: Ulid },
}

impl SlotState {
    /// Expired locks count as free to every reader, whether or not the sweep
    /// has physically removed them yet.
    pub fn is_free_at(&self, now: Ms) -> bool {
        match self {
            SlotState::Locked { expires_at, .. } => *expires_at <= now,
            SlotState::Booked { .. } => false,
        }
    }
}

// ── Configuration records ────────────────────────────────────────

/// Merchant-wide hours for one date. Immutable once published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessDay {
    pub date: NaiveDate,
    pub open_min: Minute,
    pub close_min: Minute,
    /// `Some(reason)` closes the whole shop for the date.
    pub holiday: Option<String>,
}

/// Resolved view of one staff-day: business hours plus staff-level overrides.
#[derive(Debug, Clone, Default)]
pub struct DaySchedule {
    pub hours: Option<(Minute, Minute)>,
    pub shop_holiday: Option<String>,
    pub staff_holiday: Option<String>,
    pub blocked: BTreeSet<Minute>,
}

impl DaySchedule {
    /// `None` when the day is open for booking at all.
    pub fn closed_reason(&self) -> Option<&'static str> {
        if self.hours.is_none() {
            Some("no business hours published")
        } else if self.shop_holiday.is_some() {
            Some("shop holiday")
        } else if self.staff_holiday.is_some() {
            Some("staff holiday")
        } else {
            None
        }
    }

    /// Open window if the day is bookable.
    pub fn open_window(&self) -> Option<(Minute, Minute)> {
        match self.closed_reason() {
            None => self.hours,
            Some(_) => None,
        }
    }
}

// ── Claims ───────────────────────────────────────────────────────

/// An exclusive, time-bounded claim on a contiguous run of slots, owned by
/// one checkout session. Never shared; travels with the booking attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationLock {
    pub id: Ulid,
    pub staff_id: Ulid,
    pub date: NaiveDate,
    pub start_min: Minute,
    pub end_min: Minute,
    /// Exact covered slot boundaries, ascending. Kept explicit so replay and
    /// release stay correct even if the configured granularity changes.
    pub slots: Vec<Minute>,
    pub duration_min: Minute,
    pub session: String,
    pub created_at: Ms,
    pub expires_at: Ms,
}

impl ReservationLock {
    pub fn is_expired(&self, now: Ms) -> bool {
        self.expires_at <= now
    }
}

/// A confirmed appointment. Cancelled bookings are removed outright, so
/// presence in state means confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    /// Lock that was consumed at finalization (provenance only).
    pub lock_id: Ulid,
    pub staff_id: Ulid,
    pub date: NaiveDate,
    pub start_min: Minute,
    pub end_min: Minute,
    /// Grid minutes covered, captured from the lock at finalization.
    pub slots: Vec<Minute>,
    pub duration_min: Minute,
    /// Opaque service tags supplied by the caller; the engine only ever
    /// receives a total duration.
    pub service_ids: Vec<String>,
}

// ── Per-day state ────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct DayState {
    pub key: DayKey,
    /// `Some(reason)` marks a staff holiday for this date.
    pub staff_holiday: Option<String>,
    /// Slot starts the merchant blocked out (lunch, training).
    pub blocked: BTreeSet<Minute>,
    /// Claimed slots only, keyed by start minute.
    pub slots: BTreeMap<Minute, SlotState>,
    pub locks: HashMap<Ulid, ReservationLock>,
    pub bookings: HashMap<Ulid, Booking>,
}

impl DayState {
    pub fn new(key: DayKey) -> Self {
        Self {
            key,
            staff_holiday: None,
            blocked: BTreeSet::new(),
            slots: BTreeMap::new(),
            locks: HashMap::new(),
            bookings: HashMap::new(),
        }
    }

    /// Whether `minute` carries no live claim at `now`.
    pub fn slot_free_at(&self, minute: Minute, now: Ms) -> bool {
        self.slots.get(&minute).is_none_or(|s| s.is_free_at(now))
    }

    /// Marks every minute in `minutes` with `state`, overwriting whatever was
    /// stored (callers only do this after the free check passed).
    pub fn mark_slots(&mut self, minutes: &[Minute], state: SlotState) {
        for &m in minutes {
            self.slots.insert(m, state);
        }
    }

    /// Removes slot entries in `[start_min, end_min)` that point at `claim`.
    /// Matching by id means a newer claim that took over an expired lock's
    /// slot is never clobbered by the old lock's release.
    pub fn clear_claim(&mut self, claim: Ulid, start_min: Minute, end_min: Minute) {
        let covered: Vec<Minute> = self
            .slots
            .range(start_min..end_min)
            .filter(|(_, s)| match s {
                SlotState::Locked { lock_id, .. } => *lock_id == claim,
                SlotState::Booked { booking_id } => *booking_id == claim,
            })
            .map(|(&m, _)| m)
            .collect();
        for m in covered {
            self.slots.remove(&m);
        }
    }
}

// ── WAL events ───────────────────────────────────────────────────

/// The event types — flat, no nesting. This is the WAL record format; every
/// mutation is exactly one of these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    BusinessDaySet {
        date: NaiveDate,
        open_min: Minute,
        close_min: Minute,
        holiday: Option<String>,
    },
    StaffDaySet {
        staff_id: Ulid,
        date: NaiveDate,
        holiday: Option<String>,
    },
    SlotBlocked {
        staff_id: Ulid,
        date: NaiveDate,
        start_min: Minute,
    },
    SlotUnblocked {
        staff_id: Ulid,
        date: NaiveDate,
        start_min: Minute,
    },
    LockAcquired {
        id: Ulid,
        staff_id: Ulid,
        date: NaiveDate,
        start_min: Minute,
        end_min: Minute,
        slots: Vec<Minute>,
        duration_min: Minute,
        session: String,
        created_at: Ms,
        expires_at: Ms,
    },
    LockReleased {
        id: Ulid,
        staff_id: Ulid,
        date: NaiveDate,
    },
    LockRenewed {
        id: Ulid,
        staff_id: Ulid,
        date: NaiveDate,
        expires_at: Ms,
    },
    /// Finalization consumes the lock and creates the booking in one record,
    /// so the two can never come apart across a crash.
    BookingCreated {
        id: Ulid,
        lock_id: Ulid,
        staff_id: Ulid,
        date: NaiveDate,
        start_min: Minute,
        end_min: Minute,
        slots: Vec<Minute>,
        duration_min: Minute,
        service_ids: Vec<String>,
    },
    BookingCancelled {
        id: Ulid,
        staff_id: Ulid,
        date: NaiveDate,
    },
}

impl Event {
    /// Day the event belongs to; `None` for merchant-wide records.
    pub fn day_key(&self) -> Option<DayKey> {
        match self {
            Event::BusinessDaySet { .. } => None,
            Event::StaffDaySet { staff_id, date, .. }
            | Event::SlotBlocked { staff_id, date, .. }
            | Event::SlotUnblocked { staff_id, date, .. }
            | Event::LockAcquired { staff_id, date, .. }
            | Event::LockReleased { staff_id, date, .. }
            | Event::LockRenewed { staff_id, date, .. }
            | Event::BookingCreated { staff_id, date, .. }
            | Event::BookingCancelled { staff_id, date, .. } => {
                Some(DayKey::new(*staff_id, *date))
            }
        }
    }
}

// ── Query result types ───────────────────────────────────────────

/// Annotated state of one grid slot, as reported to viewers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotView {
    Free,
    Locked { lock_id: Ulid, expires_at: Ms },
    Booked { booking_id: Ulid },
    Blocked,
    Holiday,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotInfo {
    pub start_min: Minute,
    pub end_min: Minute,
    pub view: SlotView,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn minute_formatting() {
        assert_eq!(fmt_minute(0), "00:00");
        assert_eq!(fmt_minute(540), "09:00");
        assert_eq!(fmt_minute(1005), "16:45");
        assert_eq!(fmt_minute(1440), "24:00");
    }

    #[test]
    fn minute_parsing() {
        assert_eq!(parse_hhmm("09:00"), Some(540));
        assert_eq!(parse_hhmm("16:45"), Some(1005));
        assert_eq!(parse_hhmm("24:00"), Some(1440));
        assert_eq!(parse_hhmm("24:01"), None);
        assert_eq!(parse_hhmm("25:00"), None);
        assert_eq!(parse_hhmm("09:60"), None);
        assert_eq!(parse_hhmm("9:00"), None); // two digits required
        assert_eq!(parse_hhmm("0900"), None);
    }

    #[test]
    fn date_instant_roundtrip() {
        let date = d(2097, 3, 2);
        let t = slot_instant_ms(date, 540);
        assert_eq!(t, date_start_ms(date) + 540 * MS_PER_MINUTE);
        assert_eq!(date_of_ms(t), Some(date));
        // last minute of the day still maps back to the same date
        assert_eq!(date_of_ms(slot_instant_ms(date, 1439)), Some(date));
    }

    #[test]
    fn expired_lock_is_free() {
        let s = SlotState::Locked {
            lock_id: Ulid::new(),
            expires_at: 1_000,
        };
        assert!(!s.is_free_at(999));
        assert!(s.is_free_at(1_000)); // boundary: expiry instant counts as free
        assert!(s.is_free_at(1_001));
    }

    #[test]
    fn booked_slot_never_free() {
        let s = SlotState::Booked {
            booking_id: Ulid::new(),
        };
        assert!(!s.is_free_at(0));
        assert!(!s.is_free_at(Ms::MAX));
    }

    #[test]
    fn day_state_mark_and_clear() {
        let mut ds = DayState::new(DayKey::new(Ulid::new(), d(2097, 3, 2)));
        let lock = Ulid::new();
        ds.mark_slots(
            &[600, 615, 630],
            SlotState::Locked {
                lock_id: lock,
                expires_at: 5_000,
            },
        );
        assert!(!ds.slot_free_at(615, 0));
        ds.clear_claim(lock, 600, 645);
        assert!(ds.slot_free_at(600, 0));
        assert!(ds.slot_free_at(615, 0));
        assert!(ds.slot_free_at(630, 0));
    }

    #[test]
    fn clear_claim_leaves_other_claims() {
        // A newer lock took over 600 after the old one expired; releasing the
        // old lock must only clear the minutes still pointing at it.
        let mut ds = DayState::new(DayKey::new(Ulid::new(), d(2097, 3, 2)));
        let old = Ulid::new();
        let new = Ulid::new();
        ds.mark_slots(
            &[600, 615],
            SlotState::Locked {
                lock_id: old,
                expires_at: 1_000,
            },
        );
        ds.mark_slots(
            &[600],
            SlotState::Locked {
                lock_id: new,
                expires_at: 9_000,
            },
        );
        ds.clear_claim(old, 600, 630);
        assert!(!ds.slot_free_at(600, 2_000)); // new lock survives
        assert!(ds.slot_free_at(615, 0));
    }

    #[test]
    fn schedule_closed_reasons() {
        let mut sched = DaySchedule::default();
        assert_eq!(sched.closed_reason(), Some("no business hours published"));
        sched.hours = Some((540, 1020));
        assert_eq!(sched.closed_reason(), None);
        assert_eq!(sched.open_window(), Some((540, 1020)));
        sched.staff_holiday = Some("vacation".into());
        assert_eq!(sched.closed_reason(), Some("staff holiday"));
        sched.shop_holiday = Some("easter".into());
        assert_eq!(sched.closed_reason(), Some("shop holiday"));
        assert_eq!(sched.open_window(), None);
    }

    #[test]
    fn event_day_key() {
        let staff = Ulid::new();
        let date = d(2097, 3, 2);
        let ev = Event::LockReleased {
            id: Ulid::new(),
            staff_id: staff,
            date,
        };
        assert_eq!(ev.day_key(), Some(DayKey::new(staff, date)));
        let ev = Event::BusinessDaySet {
            date,
            open_min: 540,
            close_min: 1020,
            holiday: None,
        };
        assert_eq!(ev.day_key(), None);
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::LockAcquired {
            id: Ulid::new(),
            staff_id: Ulid::new(),
            date: d(2097, 3, 2),
            start_min: 600,
            end_min: 645,
            slots: vec![600, 615, 630],
            duration_min: 45,
            session: "sess-1".into(),
            created_at: 1_000,
            expires_at: 301_000,
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}
