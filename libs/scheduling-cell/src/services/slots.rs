use chrono::{Duration, NaiveTime};

use crate::models::AvailabilityWindow;

/// Fixed per-patient service duration.
pub const SLOT_MINUTES: i64 = 10;

/// Approximate clock time for a queue position: the window's start time plus
/// (serial - 1) slots. Overflow past the window's end time is accepted
/// silently; capacity is bounded only by how many serials admission hands out.
pub fn approximate_time(window: Option<&AvailabilityWindow>, serial_number: i32) -> Option<NaiveTime> {
    window.map(|w| slot_time(w.start_time, serial_number))
}

pub fn slot_time(start_time: NaiveTime, serial_number: i32) -> NaiveTime {
    start_time + Duration::minutes((serial_number as i64 - 1) * SLOT_MINUTES)
}
