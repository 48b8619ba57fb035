use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::notify::SlotChange;

use super::{Engine, EngineError, now_ms};

impl Engine {
    /// Convert a live lock into a confirmed booking. One WAL record carries
    /// both the lock consumption and the booking, so a crash can never leave
    /// one without the other. If the append fails the lock is untouched and
    /// the caller may retry or release.
    pub async fn finalize_booking(
        &self,
        id: Ulid,
        lock_id: Ulid,
        service_ids: Vec<String>,
    ) -> Result<Booking, EngineError> {
        if service_ids.len() > MAX_SERVICE_IDS {
            return Err(EngineError::LimitExceeded("service list length"));
        }
        if service_ids.iter().any(|s| s.len() > MAX_SERVICE_ID_LEN) {
            return Err(EngineError::LimitExceeded("service id length"));
        }
        if self.entity_days.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        let Some((_, mut day)) = self.resolve_entity_write(&lock_id).await else {
            return Err(EngineError::LockNotFound(lock_id));
        };
        let Some(lock) = day.locks.get(&lock_id).cloned() else {
            return Err(EngineError::LockNotFound(lock_id));
        };
        if lock.is_expired(now_ms()) {
            return Err(EngineError::LockExpired(lock_id));
        }

        let booking = Booking {
            id,
            lock_id,
            staff_id: lock.staff_id,
            date: lock.date,
            start_min: lock.start_min,
            end_min: lock.end_min,
            slots: lock.slots.clone(),
            duration_min: lock.duration_min,
            service_ids: service_ids.clone(),
        };
        let event = Event::BookingCreated {
            id,
            lock_id,
            staff_id: lock.staff_id,
            date: lock.date,
            start_min: lock.start_min,
            end_min: lock.end_min,
            slots: lock.slots.clone(),
            duration_min: lock.duration_min,
            service_ids,
        };
        let change = SlotChange::booked(&booking);
        self.persist_and_apply(&mut day, &event, Some(change)).await?;
        Ok(booking)
    }

    /// Cancel a confirmed booking, freeing its slots for rebooking.
    pub async fn cancel_booking(&self, id: Ulid) -> Result<(), EngineError> {
        let Some((_, mut day)) = self.resolve_entity_write(&id).await else {
            return Err(EngineError::BookingNotFound(id));
        };
        let Some(booking) = day.bookings.get(&id).cloned() else {
            return Err(EngineError::BookingNotFound(id));
        };
        let event = Event::BookingCancelled {
            id,
            staff_id: booking.staff_id,
            date: booking.date,
        };
        let change = SlotChange::cancelled(&booking);
        self.persist_and_apply(&mut day, &event, Some(change)).await
    }
}
