mod availability;
mod booking;
mod error;
mod grid;
mod locks;
mod queries;
mod schedule;

pub use availability::available_starts;
pub use error::EngineError;
pub use grid::day_grid;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Datelike, NaiveDate};
use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock, mpsc, oneshot};
use ulid::Ulid;

use crate::limits;
use crate::model::*;
use crate::notify::{NotifyHub, SlotChange};
use crate::wal::Wal;

pub type SharedDayState = Arc<RwLock<DayState>>;

pub fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as Ms)
        .unwrap_or(0)
}

/// Engine policy. One set per merchant process; every knob has an env
/// override in `main`.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Slot width in minutes.
    pub granularity_min: Minute,
    /// Earliest-bookable buffer ahead of `now`.
    pub lead_time_min: Minute,
    /// Lock lifetime granted at acquire.
    pub lock_ttl_ms: Ms,
    /// Absolute ceiling on `expires_at - created_at` across renewals.
    pub max_lock_lifetime_ms: Ms,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            granularity_min: 15,
            lead_time_min: 30,
            lock_ttl_ms: 5 * 60 * 1_000,
            max_lock_lifetime_ms: 10 * 60 * 1_000,
        }
    }
}

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                // Drain all immediately available appends
                let deferred = loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => break Some(other),
                        Err(_) => break None, // channel empty — flush batch
                    }
                };

                flush_and_respond(&mut wal, &mut batch);
                if let Some(cmd) = deferred {
                    handle_non_append(&mut wal, cmd);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_and_respond(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();

    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush — even on append error — so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = wal.flush_sync().err();
    let result = match append_err.or(flush_err) {
        Some(e) => Err(e),
        None => Ok(()),
    };

    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());

    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

/// One merchant's slot-state store. The per-day `RwLock` write guard is the
/// single serialization point: every read-then-write (acquire, renew,
/// finalize, cancel) runs entirely under one guard.
pub struct Engine {
    pub config: EngineConfig,
    pub days: DashMap<DayKey, SharedDayState>,
    /// Merchant-wide hours by date. Values are immutable once published.
    pub(super) business: DashMap<NaiveDate, BusinessDay>,
    /// Serializes business-day publication (the one mutation not covered by
    /// a day guard).
    pub(super) publish_mu: Mutex<()>,
    /// Checkout session → its single live lock.
    pub(super) sessions: DashMap<String, Ulid>,
    /// Lock/booking id → owning day, for point lookups by id.
    pub(super) entity_days: DashMap<Ulid, DayKey>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
}

/// Apply an event to a day (no locking — caller holds the write guard).
/// Replay and live mutation share this path so they can never diverge.
fn apply_to_day(
    day: &mut DayState,
    event: &Event,
    sessions: &DashMap<String, Ulid>,
    entity_days: &DashMap<Ulid, DayKey>,
) {
    match event {
        Event::StaffDaySet { holiday, .. } => {
            day.staff_holiday = holiday.clone();
        }
        Event::SlotBlocked { start_min, .. } => {
            day.blocked.insert(*start_min);
        }
        Event::SlotUnblocked { start_min, .. } => {
            day.blocked.remove(start_min);
        }
        Event::LockAcquired {
            id,
            staff_id,
            date,
            start_min,
            end_min,
            slots,
            duration_min,
            session,
            created_at,
            expires_at,
        } => {
            let lock = ReservationLock {
                id: *id,
                staff_id: *staff_id,
                date: *date,
                start_min: *start_min,
                end_min: *end_min,
                slots: slots.clone(),
                duration_min: *duration_min,
                session: session.clone(),
                created_at: *created_at,
                expires_at: *expires_at,
            };
            day.mark_slots(
                slots,
                SlotState::Locked {
                    lock_id: *id,
                    expires_at: *expires_at,
                },
            );
            sessions.insert(session.clone(), *id);
            entity_days.insert(*id, day.key);
            day.locks.insert(*id, lock);
        }
        Event::LockReleased { id, .. } => {
            if let Some(lock) = day.locks.remove(id) {
                day.clear_claim(*id, lock.start_min, lock.end_min);
                sessions.remove_if(&lock.session, |_, held| held == id);
                entity_days.remove(id);
            }
        }
        Event::LockRenewed { id, expires_at, .. } => {
            if let Some(lock) = day.locks.get_mut(id) {
                lock.expires_at = *expires_at;
                for (_, s) in day.slots.range_mut(lock.start_min..lock.end_min) {
                    if let SlotState::Locked { lock_id, expires_at: e } = s
                        && lock_id == id
                    {
                        *e = *expires_at;
                    }
                }
            }
        }
        Event::BookingCreated {
            id,
            lock_id,
            staff_id,
            date,
            start_min,
            end_min,
            slots,
            duration_min,
            service_ids,
        } => {
            // Consume the lock. Absent after compaction — that's fine, the
            // explicit slot list below carries everything replay needs.
            if let Some(lock) = day.locks.remove(lock_id) {
                sessions.remove_if(&lock.session, |_, held| held == lock_id);
            }
            entity_days.remove(lock_id);
            let booking = Booking {
                id: *id,
                lock_id: *lock_id,
                staff_id: *staff_id,
                date: *date,
                start_min: *start_min,
                end_min: *end_min,
                slots: slots.clone(),
                duration_min: *duration_min,
                service_ids: service_ids.clone(),
            };
            day.mark_slots(slots, SlotState::Booked { booking_id: *id });
            entity_days.insert(*id, day.key);
            day.bookings.insert(*id, booking);
        }
        Event::BookingCancelled { id, .. } => {
            if let Some(booking) = day.bookings.remove(id) {
                day.clear_claim(*id, booking.start_min, booking.end_min);
                entity_days.remove(id);
            }
        }
        // BusinessDaySet is handled at the map level, not here
        Event::BusinessDaySet { .. } => {}
    }
}

impl Engine {
    pub fn new(
        wal_path: PathBuf,
        notify: Arc<NotifyHub>,
        config: EngineConfig,
    ) -> std::io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            config,
            days: DashMap::new(),
            business: DashMap::new(),
            publish_mu: Mutex::new(()),
            sessions: DashMap::new(),
            entity_days: DashMap::new(),
            wal_tx,
            notify,
        };

        // Replay events — we're the sole owner of these Arcs, so try_write
        // always succeeds instantly (no contention). Never blocking_write
        // here because this may run inside an async context (lazy merchant
        // creation).
        for event in &events {
            match event {
                Event::BusinessDaySet {
                    date,
                    open_min,
                    close_min,
                    holiday,
                } => {
                    engine.business.insert(
                        *date,
                        BusinessDay {
                            date: *date,
                            open_min: *open_min,
                            close_min: *close_min,
                            holiday: holiday.clone(),
                        },
                    );
                }
                other => {
                    if let Some(key) = other.day_key() {
                        let day_arc = engine
                            .days
                            .entry(key)
                            .or_insert_with(|| Arc::new(RwLock::new(DayState::new(key))))
                            .clone();
                        let mut guard =
                            day_arc.try_write().expect("replay: uncontended write");
                        apply_to_day(&mut guard, other, &engine.sessions, &engine.entity_days);
                    }
                }
            }
        }

        Ok(engine)
    }

    /// Write an event to the WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub(super) fn day_arc(&self, key: DayKey) -> Option<SharedDayState> {
        self.days.get(&key).map(|e| e.value().clone())
    }

    pub(super) fn day_arc_or_create(&self, key: DayKey) -> Result<SharedDayState, EngineError> {
        if let Some(day) = self.day_arc(key) {
            return Ok(day);
        }
        if self.days.len() >= limits::MAX_DAYS_PER_MERCHANT {
            return Err(EngineError::LimitExceeded("staff-days per merchant"));
        }
        Ok(self
            .days
            .entry(key)
            .or_insert_with(|| Arc::new(RwLock::new(DayState::new(key))))
            .clone())
    }

    /// Lock/booking id → owning day's write guard. `None` when the id is
    /// unknown (callers decide whether that is an error).
    pub(super) async fn resolve_entity_write(
        &self,
        entity_id: &Ulid,
    ) -> Option<(DayKey, tokio::sync::OwnedRwLockWriteGuard<DayState>)> {
        let key = *self.entity_days.get(entity_id)?;
        let day = self.day_arc(key)?;
        Some((key, day.write_owned().await))
    }

    /// WAL-append + apply + notify in one call, under the caller's guard.
    /// Nothing is applied when the append fails, which is what keeps a lock
    /// intact across a failed finalize.
    pub(super) async fn persist_and_apply(
        &self,
        day: &mut DayState,
        event: &Event,
        change: Option<SlotChange>,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_day(day, event, &self.sessions, &self.entity_days);
        if let Some(change) = change {
            self.notify.send(day.key, &change);
        }
        Ok(())
    }

    // ── Maintenance ──────────────────────────────────────────────

    /// Rewrite the WAL as a minimal snapshot of live state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let events = self.snapshot_events().await;
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact {
                events,
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }

    /// Events that recreate current state on replay, business days first.
    /// Deterministic order keeps compacted logs diffable.
    async fn snapshot_events(&self) -> Vec<Event> {
        let mut events = Vec::new();

        let mut dates: Vec<NaiveDate> = self.business.iter().map(|e| *e.key()).collect();
        dates.sort_unstable();
        for date in dates {
            if let Some(bd) = self.business.get(&date) {
                events.push(Event::BusinessDaySet {
                    date: bd.date,
                    open_min: bd.open_min,
                    close_min: bd.close_min,
                    holiday: bd.holiday.clone(),
                });
            }
        }

        let mut keys: Vec<DayKey> = self.days.iter().map(|e| *e.key()).collect();
        keys.sort_unstable_by_key(|k| (k.staff_id, k.date));
        for key in keys {
            let Some(day) = self.day_arc(key) else { continue };
            let day = day.read().await;
            if let Some(reason) = &day.staff_holiday {
                events.push(Event::StaffDaySet {
                    staff_id: key.staff_id,
                    date: key.date,
                    holiday: Some(reason.clone()),
                });
            }
            for &start_min in &day.blocked {
                events.push(Event::SlotBlocked {
                    staff_id: key.staff_id,
                    date: key.date,
                    start_min,
                });
            }
            let mut locks: Vec<&ReservationLock> = day.locks.values().collect();
            locks.sort_unstable_by_key(|l| l.start_min);
            for lock in locks {
                events.push(Event::LockAcquired {
                    id: lock.id,
                    staff_id: lock.staff_id,
                    date: lock.date,
                    start_min: lock.start_min,
                    end_min: lock.end_min,
                    slots: lock.slots.clone(),
                    duration_min: lock.duration_min,
                    session: lock.session.clone(),
                    created_at: lock.created_at,
                    expires_at: lock.expires_at,
                });
            }
            let mut bookings: Vec<&Booking> = day.bookings.values().collect();
            bookings.sort_unstable_by_key(|b| b.start_min);
            for b in bookings {
                events.push(Event::BookingCreated {
                    id: b.id,
                    lock_id: b.lock_id,
                    staff_id: b.staff_id,
                    date: b.date,
                    start_min: b.start_min,
                    end_min: b.end_min,
                    slots: b.slots.clone(),
                    duration_min: b.duration_min,
                    service_ids: b.service_ids.clone(),
                });
            }
        }
        events
    }

    /// Drop days (and business days) dated before `cutoff` from memory. No
    /// WAL record — the next compaction makes the removal durable; a replay
    /// before then resurrects them and the next sweep drops them again.
    pub async fn gc_stale_days(&self, cutoff: NaiveDate) -> usize {
        let stale: Vec<DayKey> = self
            .days
            .iter()
            .filter(|e| e.key().date < cutoff)
            .map(|e| *e.key())
            .collect();
        let mut removed = 0;
        for key in stale {
            if let Some((_, day)) = self.days.remove(&key) {
                let day = day.read().await;
                for (id, lock) in &day.locks {
                    self.entity_days.remove(id);
                    self.sessions.remove_if(&lock.session, |_, held| held == id);
                }
                for id in day.bookings.keys() {
                    self.entity_days.remove(id);
                }
                self.notify.remove(&key);
                removed += 1;
            }
        }
        self.business.retain(|date, _| *date >= cutoff);
        removed
    }
}

// ── Shared validation ────────────────────────────────────────────

pub(super) fn validate_date(date: NaiveDate) -> Result<(), EngineError> {
    let year = date.year();
    if !(limits::MIN_YEAR..=limits::MAX_YEAR).contains(&year) {
        return Err(EngineError::LimitExceeded("date out of supported range"));
    }
    Ok(())
}

pub(super) fn validate_reason(reason: &Option<String>) -> Result<(), EngineError> {
    if let Some(r) = reason
        && r.len() > limits::MAX_REASON_LEN
    {
        return Err(EngineError::LimitExceeded("holiday reason too long"));
    }
    Ok(())
}
