use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::model::*;

// ── Availability Algorithm ────────────────────────────────────────

/// Candidate start minutes where a service of `duration_min` fits, in
/// chronological order.
///
/// A start qualifies when:
/// - the day is open (hours published, no shop or staff holiday),
/// - every covered slot is free right now (expired locks count as free)
///   and not blocked,
/// - the window ends at or before close,
/// - the slot instant is at least `lead_time_min` ahead of `now`. The
///   comparison is absolute, so past dates drop out without a special case.
///
/// Durations that aren't a slot multiple round up to whole slots. Lazy:
/// callers that only need "is anything free today" stop at the first yield.
pub fn available_starts<'a>(
    schedule: &'a DaySchedule,
    slots: &'a BTreeMap<Minute, SlotState>,
    granularity: Minute,
    duration_min: Minute,
    date: NaiveDate,
    now: Ms,
    lead_time_min: Minute,
) -> impl Iterator<Item = Minute> + 'a {
    let window = schedule.open_window();
    let slot_count = if duration_min > 0 {
        (duration_min as u32).div_ceil(granularity as u32) as Minute
    } else {
        0
    };
    let (open, close) = window.unwrap_or((0, 0));
    let last_start = close - slot_count * granularity;
    let viable = window.is_some() && slot_count > 0;

    let earliest = now + lead_time_min as Ms * MS_PER_MINUTE;
    let day_start = date_start_ms(date);

    (open..)
        .step_by(granularity.max(1) as usize)
        .take_while(move |&start| viable && start <= last_start)
        .filter(move |&start| day_start + start as Ms * MS_PER_MINUTE >= earliest)
        .filter(move |&start| {
            (0..slot_count).all(|i| {
                let m = start + i * granularity;
                !schedule.blocked.contains(&m)
                    && slots.get(&m).is_none_or(|s| s.is_free_at(now))
            })
        })
}
