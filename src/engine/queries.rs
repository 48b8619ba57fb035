use std::collections::BTreeMap;

use chrono::NaiveDate;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::availability::available_starts;
use super::grid;
use super::schedule::schedule_from;
use super::{Engine, EngineError, now_ms};

/// Read paths. All of these take a read guard (or none at all), so viewers
/// never contend with each other — only with a writer on the same day.
/// Unknown staff or dates simply yield empty results.
impl Engine {
    /// The full annotated slot grid for one staff-day.
    pub async fn day_grid(&self, staff_id: Ulid, date: NaiveDate) -> Vec<SlotInfo> {
        let business = self.business.get(&date).map(|e| e.value().clone());
        let key = DayKey::new(staff_id, date);
        let now = now_ms();
        match self.day_arc(key) {
            Some(day_arc) => {
                let day = day_arc.read().await;
                let schedule = schedule_from(business.as_ref(), Some(&day));
                grid::day_grid(&schedule, &day.slots, self.config.granularity_min, now)
            }
            None => {
                let schedule = schedule_from(business.as_ref(), None);
                grid::day_grid(
                    &schedule,
                    &BTreeMap::new(),
                    self.config.granularity_min,
                    now,
                )
            }
        }
    }

    /// Start minutes where a service of `duration_min` currently fits.
    /// A closed or fully booked day is an empty list, not an error.
    pub async fn find_available_starts(
        &self,
        staff_id: Ulid,
        date: NaiveDate,
        duration_min: Minute,
    ) -> Result<Vec<Minute>, EngineError> {
        if duration_min <= 0 || duration_min > MAX_DURATION_MIN {
            return Err(EngineError::LimitExceeded("service duration"));
        }
        let business = self.business.get(&date).map(|e| e.value().clone());
        let key = DayKey::new(staff_id, date);
        let now = now_ms();
        let lead = self.config.lead_time_min;
        let granularity = self.config.granularity_min;
        Ok(match self.day_arc(key) {
            Some(day_arc) => {
                let day = day_arc.read().await;
                let schedule = schedule_from(business.as_ref(), Some(&day));
                available_starts(&schedule, &day.slots, granularity, duration_min, date, now, lead)
                    .collect()
            }
            None => {
                let schedule = schedule_from(business.as_ref(), None);
                available_starts(
                    &schedule,
                    &BTreeMap::new(),
                    granularity,
                    duration_min,
                    date,
                    now,
                    lead,
                )
                .collect()
            }
        })
    }

    /// Live (unexpired) locks on one staff-day, in slot order.
    pub async fn locks_for(&self, staff_id: Ulid, date: NaiveDate) -> Vec<ReservationLock> {
        let key = DayKey::new(staff_id, date);
        let Some(day_arc) = self.day_arc(key) else {
            return Vec::new();
        };
        let day = day_arc.read().await;
        let now = now_ms();
        let mut locks: Vec<ReservationLock> = day
            .locks
            .values()
            .filter(|l| !l.is_expired(now))
            .cloned()
            .collect();
        locks.sort_unstable_by_key(|l| l.start_min);
        locks
    }

    /// Confirmed bookings on one staff-day, in slot order.
    pub async fn bookings_for(&self, staff_id: Ulid, date: NaiveDate) -> Vec<Booking> {
        let key = DayKey::new(staff_id, date);
        let Some(day_arc) = self.day_arc(key) else {
            return Vec::new();
        };
        let day = day_arc.read().await;
        let mut bookings: Vec<Booking> = day.bookings.values().cloned().collect();
        bookings.sort_unstable_by_key(|b| b.start_min);
        bookings
    }

    pub fn business_day(&self, date: NaiveDate) -> Option<BusinessDay> {
        self.business.get(&date).map(|e| e.value().clone())
    }

    /// All published business days, date-ordered.
    pub fn business_days(&self) -> Vec<BusinessDay> {
        let mut days: Vec<BusinessDay> = self.business.iter().map(|e| e.value().clone()).collect();
        days.sort_unstable_by_key(|d| d.date);
        days
    }
}
