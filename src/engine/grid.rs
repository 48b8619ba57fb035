use std::collections::BTreeMap;

use crate::model::*;

/// Render one staff-day as an annotated slot grid.
///
/// No published hours means no grid at all. On a holiday the lattice is
/// still produced so a UI can grey it out, and any claim that slipped in
/// before the holiday was set still shows as Locked/Booked rather than
/// being silently hidden.
pub fn day_grid(
    schedule: &DaySchedule,
    slots: &BTreeMap<Minute, SlotState>,
    granularity: Minute,
    now: Ms,
) -> Vec<SlotInfo> {
    let Some((open, close)) = schedule.hours else {
        return Vec::new();
    };
    let holiday = schedule.shop_holiday.is_some() || schedule.staff_holiday.is_some();

    let mut grid = Vec::new();
    let mut start = open;
    while start + granularity <= close {
        let view = match slots.get(&start) {
            Some(SlotState::Booked { booking_id }) => SlotView::Booked {
                booking_id: *booking_id,
            },
            Some(SlotState::Locked { lock_id, expires_at }) if *expires_at > now => {
                SlotView::Locked {
                    lock_id: *lock_id,
                    expires_at: *expires_at,
                }
            }
            // free, or a lock past its expiry
            _ => {
                if holiday {
                    SlotView::Holiday
                } else if schedule.blocked.contains(&start) {
                    SlotView::Blocked
                } else {
                    SlotView::Free
                }
            }
        };
        grid.push(SlotInfo {
            start_min: start,
            end_min: start + granularity,
            view,
        });
        start += granularity;
    }
    grid
}
