use chrono::NaiveDate;

use super::{ClockTime, BUFFER_MINUTES, DEFAULT_SERVICE_DURATION_MIN};
use crate::models::{Booking, BookingStatus};

/// A proposed appointment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub date: NaiveDate,
    pub time: ClockTime,
    pub duration_min: u32,
}

/// First non-cancelled booking on the candidate's date whose buffered range
/// overlaps the candidate. Bookings end by closing time, so no booking
/// reaches into the next date.
///
/// Only the existing side is widened by the buffer: `[start - 20, end + 20)`
/// against the candidate's bare `[start, end)`.
pub fn find_conflict<'a>(candidate: &Candidate, existing: &'a [Booking]) -> Option<&'a Booking> {
    let cand_start = candidate.time.minutes() as i64;
    let cand_end = cand_start + candidate.duration_min as i64;
    let buffer = BUFFER_MINUTES as i64;

    existing
        .iter()
        .filter(|b| b.date == candidate.date && b.status != BookingStatus::Cancelled)
        .find(|b| {
            let ex_start = b.time.minutes() as i64;
            let duration = b.service_duration.unwrap_or(DEFAULT_SERVICE_DURATION_MIN) as i64;
            let ex_end = ex_start + duration;
            cand_start < ex_end + buffer && cand_end > ex_start - buffer
        })
}

pub fn has_conflict(candidate: &Candidate, existing: &[Booking]) -> bool {
    find_conflict(candidate, existing).is_some()
}
