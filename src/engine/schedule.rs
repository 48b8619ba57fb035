//! Calendar configuration: business days, staff holidays, blocked slots.

use chrono::NaiveDate;
use ulid::Ulid;

use super::{Engine, EngineError, validate_date, validate_reason};
use crate::limits;
use crate::model::{BusinessDay, DayKey, DaySchedule, DayState, Event, Minute};

/// Assemble the effective schedule for one staff-day from the merchant-wide
/// business day and the per-day state. Pure so mutation paths can run it
/// against a held write guard.
pub(super) fn schedule_from(business: Option<&BusinessDay>, day: Option<&DayState>) -> DaySchedule {
    let mut schedule = DaySchedule::default();
    if let Some(bd) = business {
        schedule.hours = Some((bd.open_min, bd.close_min));
        schedule.shop_holiday = bd.holiday.clone();
    }
    if let Some(day) = day {
        schedule.staff_holiday = day.staff_holiday.clone();
        schedule.blocked = day.blocked.clone();
    }
    schedule
}

impl Engine {
    /// Publish the working hours (or a holiday closure) for one date.
    /// Published days are immutable; corrections require a new date or a
    /// fresh deployment, which keeps every consumer's view stable.
    pub async fn set_business_day(
        &self,
        date: NaiveDate,
        open_min: Minute,
        close_min: Minute,
        holiday: Option<String>,
    ) -> Result<BusinessDay, EngineError> {
        validate_date(date)?;
        validate_reason(&holiday)?;
        if !(0..1440).contains(&open_min) || !(1..=1440).contains(&close_min) {
            return Err(EngineError::LimitExceeded("hours outside 00:00..24:00"));
        }
        if open_min >= close_min {
            return Err(EngineError::LimitExceeded("open must precede close"));
        }

        // publish_mu serializes the exists-check against the insert; dates
        // collide in practice, unlike ULIDs.
        let _publishing = self.publish_mu.lock().await;
        if self.business.contains_key(&date) {
            return Err(EngineError::AlreadyPublished(date));
        }
        if self.business.len() >= limits::MAX_BUSINESS_DAYS {
            return Err(EngineError::LimitExceeded("business days"));
        }

        let event = Event::BusinessDaySet {
            date,
            open_min,
            close_min,
            holiday: holiday.clone(),
        };
        self.wal_append(&event).await?;
        let day = BusinessDay {
            date,
            open_min,
            close_min,
            holiday,
        };
        self.business.insert(date, day.clone());
        Ok(day)
    }

    /// Set or clear a staff member's holiday for one date. Unlike business
    /// days this is an upsert: staff plans change.
    pub async fn set_staff_day(
        &self,
        staff_id: Ulid,
        date: NaiveDate,
        holiday: Option<String>,
    ) -> Result<(), EngineError> {
        validate_date(date)?;
        validate_reason(&holiday)?;
        let key = DayKey::new(staff_id, date);
        let day_arc = self.day_arc_or_create(key)?;
        let mut day = day_arc.write_owned().await;
        let event = Event::StaffDaySet {
            staff_id,
            date,
            holiday,
        };
        self.persist_and_apply(&mut day, &event, None).await
    }

    /// Block one slot start for maintenance or a manual off-grid appointment.
    /// Blocking an already-blocked slot is a no-op.
    pub async fn block_slot(
        &self,
        staff_id: Ulid,
        date: NaiveDate,
        start_min: Minute,
    ) -> Result<(), EngineError> {
        validate_date(date)?;
        if !(0..1440).contains(&start_min) {
            return Err(EngineError::OutsideHours(start_min));
        }
        let key = DayKey::new(staff_id, date);
        let day_arc = self.day_arc_or_create(key)?;
        let mut day = day_arc.write_owned().await;
        if day.blocked.contains(&start_min) {
            return Ok(());
        }
        let event = Event::SlotBlocked {
            staff_id,
            date,
            start_min,
        };
        self.persist_and_apply(&mut day, &event, None).await
    }

    /// Remove a block. Unblocking a slot that isn't blocked is a no-op.
    pub async fn unblock_slot(
        &self,
        staff_id: Ulid,
        date: NaiveDate,
        start_min: Minute,
    ) -> Result<(), EngineError> {
        validate_date(date)?;
        let key = DayKey::new(staff_id, date);
        let Some(day_arc) = self.day_arc(key) else {
            return Ok(());
        };
        let mut day = day_arc.write_owned().await;
        if !day.blocked.contains(&start_min) {
            return Ok(());
        }
        let event = Event::SlotUnblocked {
            staff_id,
            date,
            start_min,
        };
        self.persist_and_apply(&mut day, &event, None).await
    }

    /// Snapshot of the effective schedule for one staff-day.
    pub async fn resolve_schedule(&self, staff_id: Ulid, date: NaiveDate) -> DaySchedule {
        let business = self.business.get(&date).map(|e| e.value().clone());
        let key = DayKey::new(staff_id, date);
        match self.day_arc(key) {
            Some(day_arc) => {
                let day = day_arc.read().await;
                schedule_from(business.as_ref(), Some(&day))
            }
            None => schedule_from(business.as_ref(), None),
        }
    }
}
