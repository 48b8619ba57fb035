use chrono::NaiveDate;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::notify::SlotChange;

use super::schedule::schedule_from;
use super::{Engine, EngineError, now_ms, validate_date};

impl Engine {
    /// Claim every slot a service of `duration_min` starting at `start_min`
    /// would cover. All-or-nothing: the whole window is validated under the
    /// day's write guard before any slot is marked, so two overlapping
    /// acquires can never both succeed.
    ///
    /// A session holds at most one lock. Acquiring while one is live releases
    /// it first — even if the new acquire then fails, the old lock is gone,
    /// which is exactly what a customer switching slots expects.
    ///
    /// Lead time is deliberately not enforced here: it shapes what the
    /// availability query offers, not what a checkout that already started
    /// may claim.
    pub async fn acquire_lock(
        &self,
        id: Ulid,
        staff_id: Ulid,
        date: NaiveDate,
        start_min: Minute,
        duration_min: Minute,
        session: &str,
    ) -> Result<ReservationLock, EngineError> {
        validate_date(date)?;
        if session.is_empty() || session.len() > MAX_SESSION_ID_LEN {
            return Err(EngineError::LimitExceeded("session id length"));
        }
        if duration_min <= 0 || duration_min > MAX_DURATION_MIN {
            return Err(EngineError::LimitExceeded("service duration"));
        }
        if self.entity_days.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        if let Some(previous) = self.sessions.get(session).map(|e| *e.value()) {
            self.release_lock(previous).await?;
        }

        let business = self.business.get(&date).map(|e| e.value().clone());
        let key = DayKey::new(staff_id, date);
        let day_arc = self.day_arc_or_create(key)?;
        let mut day = day_arc.write_owned().await;

        // Schedule is read under the guard so a concurrent block/holiday
        // can't slip between validation and commit.
        let schedule = schedule_from(business.as_ref(), Some(&day));
        let Some((open, close)) = schedule.open_window() else {
            return Err(EngineError::Closed(
                schedule.closed_reason().unwrap_or("closed"),
            ));
        };

        let granularity = self.config.granularity_min;
        if start_min < open || start_min >= close {
            return Err(EngineError::OutsideHours(start_min));
        }
        if (start_min - open) % granularity != 0 {
            return Err(EngineError::Misaligned(start_min));
        }
        let slot_count = (duration_min as u32).div_ceil(granularity as u32) as Minute;
        let end_min = start_min + slot_count * granularity;
        if end_min > close {
            return Err(EngineError::OutsideHours(start_min));
        }

        let slots: Vec<Minute> = (0..slot_count)
            .map(|i| start_min + i * granularity)
            .collect();
        for &m in &slots {
            if schedule.blocked.contains(&m) {
                return Err(EngineError::Blocked(m));
            }
        }

        let now = now_ms();
        // First conflicting slot in chronological order, touching nothing.
        for &m in &slots {
            if !day.slot_free_at(m, now) {
                metrics::counter!(crate::observability::LOCK_CONFLICTS_TOTAL).increment(1);
                return Err(EngineError::Conflict(m));
            }
        }

        let lock = ReservationLock {
            id,
            staff_id,
            date,
            start_min,
            end_min,
            slots: slots.clone(),
            duration_min,
            session: session.to_string(),
            created_at: now,
            expires_at: now + self.config.lock_ttl_ms,
        };
        let event = Event::LockAcquired {
            id,
            staff_id,
            date,
            start_min,
            end_min,
            slots,
            duration_min,
            session: session.to_string(),
            created_at: lock.created_at,
            expires_at: lock.expires_at,
        };
        let change = SlotChange::locked(&lock);
        self.persist_and_apply(&mut day, &event, Some(change)).await?;
        Ok(lock)
    }

    /// Idempotent: releasing an unknown or already-released lock succeeds
    /// silently, so customer-side retries and the expiry reaper can never
    /// trip over each other.
    pub async fn release_lock(&self, id: Ulid) -> Result<(), EngineError> {
        let Some((_, mut day)) = self.resolve_entity_write(&id).await else {
            return Ok(());
        };
        let Some(lock) = day.locks.get(&id).cloned() else {
            return Ok(());
        };
        let event = Event::LockReleased {
            id,
            staff_id: lock.staff_id,
            date: lock.date,
        };
        let change = SlotChange::released(&lock);
        self.persist_and_apply(&mut day, &event, Some(change)).await
    }

    /// Extend a live lock's expiry. The extension is clamped to the lock's
    /// lifetime ceiling (`created_at + max_lock_lifetime_ms`); once the
    /// ceiling is reached renewals fail and the customer must re-acquire.
    /// An expired lock cannot be revived — its slots may already be claimed.
    pub async fn renew_lock(
        &self,
        id: Ulid,
        extend_ms: Ms,
    ) -> Result<ReservationLock, EngineError> {
        if extend_ms <= 0 {
            return Err(EngineError::LimitExceeded("extension must be positive"));
        }
        let Some((_, mut day)) = self.resolve_entity_write(&id).await else {
            return Err(EngineError::LockNotFound(id));
        };
        let Some(lock) = day.locks.get(&id).cloned() else {
            return Err(EngineError::LockNotFound(id));
        };
        if lock.is_expired(now_ms()) {
            return Err(EngineError::LockExpired(id));
        }

        let ceiling = lock.created_at + self.config.max_lock_lifetime_ms;
        let new_expiry = (lock.expires_at + extend_ms).min(ceiling);
        if new_expiry <= lock.expires_at {
            return Err(EngineError::LimitExceeded("lock lifetime ceiling"));
        }

        let event = Event::LockRenewed {
            id,
            staff_id: lock.staff_id,
            date: lock.date,
            expires_at: new_expiry,
        };
        // Renewal doesn't change who owns the slot, so nothing is broadcast.
        self.persist_and_apply(&mut day, &event, None).await?;

        let mut renewed = lock;
        renewed.expires_at = new_expiry;
        Ok(renewed)
    }

    /// Lock ids past their expiry, for the reaper to release. Day guards are
    /// taken one at a time; the Arcs are cloned up front so no DashMap shard
    /// stays held across an await.
    pub async fn collect_expired_locks(&self) -> Vec<Ulid> {
        let now = now_ms();
        let days: Vec<super::SharedDayState> =
            self.days.iter().map(|e| e.value().clone()).collect();
        let mut expired = Vec::new();
        for day in days {
            let day = day.read().await;
            expired.extend(
                day.locks
                    .values()
                    .filter(|l| l.is_expired(now))
                    .map(|l| l.id),
            );
        }
        expired
    }
}
