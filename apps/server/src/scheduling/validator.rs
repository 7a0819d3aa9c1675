use chrono::NaiveDateTime;
use serde::{Serialize, Serializer};

use super::conflict::{has_conflict, Candidate};
use super::{ClockTime, BUFFER_MINUTES, SLOT_STEP_MINUTES};
use crate::models::{Booking, EffectiveDayStatus};

/// Why a date or a time cannot be booked. `Display` is the text shown to
/// the customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("past date")]
    PastDate,
    #[error("closed")]
    Closed,
    #[error("holiday")]
    Holiday,
    #[error("bookings disabled")]
    BookingsDisabled,
    #[error("too late to book today")]
    TooLateToday,
    #[error("time has already passed")]
    TimeInPast,
    #[error("salon is closed")]
    NoHours,
    #[error("outside salon hours")]
    OutsideHours,
    #[error("service duration exceeds closing time")]
    ExceedsClosing,
}

impl Serialize for Rejection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateCheck {
    pub bookable: bool,
    pub reason: Option<Rejection>,
}

impl DateCheck {
    fn ok() -> Self {
        Self {
            bookable: true,
            reason: None,
        }
    }

    fn rejected(reason: Rejection) -> Self {
        Self {
            bookable: false,
            reason: Some(reason),
        }
    }

    pub fn into_result(self) -> Result<(), Rejection> {
        self.reason.map_or(Ok(()), Err)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SlotCheck {
    pub valid: bool,
    pub reason: Option<Rejection>,
}

impl SlotCheck {
    fn ok() -> Self {
        Self {
            valid: true,
            reason: None,
        }
    }

    fn rejected(reason: Rejection) -> Self {
        Self {
            valid: false,
            reason: Some(reason),
        }
    }

    pub fn into_result(self) -> Result<(), Rejection> {
        self.reason.map_or(Ok(()), Err)
    }
}

/// Whether any appointment can be booked on `status.date` as of `now`.
///
/// First failing rule wins. An open day whose hours are empty or inverted
/// has no bookable time. On the current day the service plus the trailing
/// buffer must still fit before closing.
pub fn is_date_bookable(
    status: &EffectiveDayStatus,
    duration_min: u32,
    now: NaiveDateTime,
) -> DateCheck {
    let today = now.date();
    if status.date < today {
        return DateCheck::rejected(Rejection::PastDate);
    }
    if status.is_holiday {
        return DateCheck::rejected(Rejection::Holiday);
    }
    if status.is_closed {
        return DateCheck::rejected(Rejection::Closed);
    }
    if status.disable_bookings {
        return DateCheck::rejected(Rejection::BookingsDisabled);
    }
    if status.open_time >= status.close_time {
        return DateCheck::rejected(Rejection::NoHours);
    }
    if status.date == today {
        let service_end = ClockTime::from(now.time())
            .minutes()
            .saturating_add(duration_min)
            .saturating_add(BUFFER_MINUTES);
        if service_end > status.close_time.minutes() {
            return DateCheck::rejected(Rejection::TooLateToday);
        }
    }
    DateCheck::ok()
}

/// Whether a service starting at `time` fits inside the day's hours.
///
/// The end of the service is compared with closing time without the
/// trailing buffer.
pub fn is_time_slot_valid(
    status: Option<&EffectiveDayStatus>,
    time: ClockTime,
    duration_min: u32,
) -> SlotCheck {
    let Some(status) = status.filter(|s| !s.is_closed) else {
        return SlotCheck::rejected(Rejection::NoHours);
    };
    if time < status.open_time || time >= status.close_time {
        return SlotCheck::rejected(Rejection::OutsideHours);
    }
    if time.minutes().saturating_add(duration_min) > status.close_time.minutes() {
        return SlotCheck::rejected(Rejection::ExceedsClosing);
    }
    SlotCheck::ok()
}

/// Start times on the 15-minute grid from opening that pass
/// [`is_time_slot_valid`].
pub fn candidate_start_times(status: &EffectiveDayStatus, duration_min: u32) -> Vec<ClockTime> {
    (status.open_time.minutes()..status.close_time.minutes())
        .step_by(SLOT_STEP_MINUTES as usize)
        .filter_map(ClockTime::from_minutes)
        .filter(|t| is_time_slot_valid(Some(status), *t, duration_min).valid)
        .collect()
}

/// Start times a customer can actually pick: in hours, not already past
/// today, and clear of every existing booking's buffered range.
pub fn available_start_times(
    status: &EffectiveDayStatus,
    duration_min: u32,
    bookings: &[Booking],
    now: NaiveDateTime,
) -> Vec<ClockTime> {
    if !is_date_bookable(status, duration_min, now).bookable {
        return Vec::new();
    }
    let is_today = status.date == now.date();
    let now_time = ClockTime::from(now.time());

    candidate_start_times(status, duration_min)
        .into_iter()
        .filter(|t| !is_today || *t >= now_time)
        .filter(|t| {
            let candidate = Candidate {
                date: status.date,
                time: *t,
                duration_min,
            };
            !has_conflict(&candidate, bookings)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BookingStatus;
    use crate::scheduling::resolver::resolve_day;
    use chrono::NaiveDate;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn t(s: &str) -> ClockTime {
        s.parse().unwrap()
    }

    fn at(date: &str, time: &str) -> NaiveDateTime {
        d(date).and_time(t(time).to_naive_time())
    }

    /// Wednesday 2026-03-04 on fallback hours, 08:30–21:00.
    fn wednesday() -> EffectiveDayStatus {
        resolve_day(d("2026-03-04"), None, None)
    }

    fn booking(time: &str, duration: u32, status: BookingStatus) -> Booking {
        Booking {
            id: 1,
            customer_id: "c1".into(),
            service_id: 1,
            date: d("2026-03-04"),
            time: t(time),
            service_duration: Some(duration),
            status,
            created_at: at("2026-03-01", "12:00"),
        }
    }

    // ── is_date_bookable ──

    #[test]
    fn test_past_date_rejected() {
        let check = is_date_bookable(&wednesday(), 60, at("2026-03-05", "09:00"));
        assert_eq!(check.reason, Some(Rejection::PastDate));
        assert!(!check.bookable);
    }

    #[test]
    fn test_future_open_day_bookable() {
        let check = is_date_bookable(&wednesday(), 60, at("2026-03-01", "09:00"));
        assert!(check.bookable);
        assert_eq!(check.reason, None);
    }

    #[test]
    fn test_closed_day_rejected() {
        let tuesday = resolve_day(d("2026-03-03"), None, None);
        let check = is_date_bookable(&tuesday, 60, at("2026-03-01", "09:00"));
        assert_eq!(check.reason, Some(Rejection::Closed));
    }

    #[test]
    fn test_holiday_reported_as_holiday() {
        let mut status = wednesday();
        status.is_holiday = true;
        status.is_closed = true;
        let check = is_date_bookable(&status, 60, at("2026-03-01", "09:00"));
        assert_eq!(check.reason, Some(Rejection::Holiday));
    }

    #[test]
    fn test_bookings_disabled_rejected() {
        let mut status = wednesday();
        status.disable_bookings = true;
        let check = is_date_bookable(&status, 60, at("2026-03-01", "09:00"));
        assert_eq!(check.reason, Some(Rejection::BookingsDisabled));
    }

    #[test]
    fn test_too_late_today() {
        // 20:50 + 30 + 20 = 21:40 > 21:00
        let check = is_date_bookable(&wednesday(), 30, at("2026-03-04", "20:50"));
        assert_eq!(check.reason, Some(Rejection::TooLateToday));
        assert_eq!(check.reason.unwrap().to_string(), "too late to book today");
    }

    #[test]
    fn test_today_exact_fit_allowed() {
        // 20:10 + 30 + 20 = 21:00, not after close
        let check = is_date_bookable(&wednesday(), 30, at("2026-03-04", "20:10"));
        assert!(check.bookable);
    }

    #[test]
    fn test_past_date_wins_over_closed() {
        let tuesday = resolve_day(d("2026-03-03"), None, None);
        let check = is_date_bookable(&tuesday, 30, at("2026-03-04", "09:00"));
        assert_eq!(check.reason, Some(Rejection::PastDate));
    }

    // ── is_time_slot_valid ──

    #[test]
    fn test_service_runs_past_closing() {
        let check = is_time_slot_valid(Some(&wednesday()), t("20:15"), 60);
        assert!(!check.valid);
        assert_eq!(check.reason, Some(Rejection::ExceedsClosing));
        assert_eq!(
            check.reason.unwrap().to_string(),
            "service duration exceeds closing time"
        );
    }

    #[test]
    fn test_evening_slot_fits() {
        assert!(is_time_slot_valid(Some(&wednesday()), t("19:30"), 60).valid);
    }

    #[test]
    fn test_end_exactly_at_close_fits_without_buffer() {
        assert!(is_time_slot_valid(Some(&wednesday()), t("20:00"), 60).valid);
    }

    #[test]
    fn test_before_opening_rejected() {
        let check = is_time_slot_valid(Some(&wednesday()), t("08:15"), 30);
        assert_eq!(check.reason, Some(Rejection::OutsideHours));
    }

    #[test]
    fn test_at_closing_rejected() {
        let check = is_time_slot_valid(Some(&wednesday()), t("21:00"), 0);
        assert_eq!(check.reason, Some(Rejection::OutsideHours));
    }

    #[test]
    fn test_at_opening_accepted() {
        assert!(is_time_slot_valid(Some(&wednesday()), t("08:30"), 30).valid);
    }

    #[test]
    fn test_missing_or_closed_status() {
        assert_eq!(
            is_time_slot_valid(None, t("10:00"), 30).reason,
            Some(Rejection::NoHours)
        );
        let tuesday = resolve_day(d("2026-03-03"), None, None);
        assert_eq!(
            is_time_slot_valid(Some(&tuesday), t("10:00"), 30).reason,
            Some(Rejection::NoHours)
        );
    }

    #[test]
    fn test_every_out_of_hours_time_invalid() {
        let status = wednesday();
        for minutes in (0..24 * 60).step_by(5) {
            let time = ClockTime::from_minutes(minutes).unwrap();
            if time < status.open_time || time >= status.close_time {
                assert!(!is_time_slot_valid(Some(&status), time, 15).valid, "{time}");
            }
        }
    }

    // ── candidate / available start times ──

    #[test]
    fn test_candidates_quarter_hour_grid() {
        let times = candidate_start_times(&wednesday(), 60);
        assert_eq!(times.first(), Some(&t("08:30")));
        assert_eq!(times.get(1), Some(&t("08:45")));
        assert_eq!(times.last(), Some(&t("20:00")));
        assert!(times.iter().all(|x| (x.minutes() - 30) % 15 == 0));
    }

    #[test]
    fn test_candidates_empty_when_closed() {
        let tuesday = resolve_day(d("2026-03-03"), None, None);
        assert!(candidate_start_times(&tuesday, 30).is_empty());
    }

    #[test]
    fn test_candidates_empty_when_service_longer_than_day() {
        assert!(candidate_start_times(&wednesday(), 13 * 60).is_empty());
    }

    #[test]
    fn test_available_skips_buffered_bookings() {
        let existing = vec![booking("10:00", 30, BookingStatus::Accepted)];
        let times = available_start_times(&wednesday(), 30, &existing, at("2026-03-01", "09:00"));
        // buffered zone 09:40–10:50; a 30-min candidate must end by 09:40
        assert!(times.contains(&t("09:00")));
        assert!(!times.contains(&t("09:15")));
        assert!(!times.contains(&t("10:45")));
        assert!(times.contains(&t("11:00")));
    }

    #[test]
    fn test_available_ignores_cancelled() {
        let existing = vec![booking("10:00", 30, BookingStatus::Cancelled)];
        let times = available_start_times(&wednesday(), 30, &existing, at("2026-03-01", "09:00"));
        assert!(times.contains(&t("10:00")));
    }

    #[test]
    fn test_available_today_starts_after_now() {
        let times = available_start_times(&wednesday(), 30, &[], at("2026-03-04", "14:05"));
        assert_eq!(times.first(), Some(&t("14:15")));
    }

    #[test]
    fn test_available_empty_when_date_not_bookable() {
        let times = available_start_times(&wednesday(), 30, &[], at("2026-03-04", "20:50"));
        assert!(times.is_empty());
    }

    #[test]
    fn test_huge_duration_rejected_without_overflow() {
        let status = wednesday();
        assert_eq!(
            is_time_slot_valid(Some(&status), t("10:00"), u32::MAX).reason,
            Some(Rejection::ExceedsClosing)
        );
        assert_eq!(
            is_date_bookable(&status, u32::MAX, at("2026-03-04", "09:00")).reason,
            Some(Rejection::TooLateToday)
        );
        assert!(available_start_times(&status, u32::MAX, &[], at("2026-03-01", "09:00")).is_empty());
    }

    #[test]
    fn test_inverted_hours_not_bookable() {
        let mut status = wednesday();
        status.open_time = t("22:00");
        let check = is_date_bookable(&status, 30, at("2026-03-01", "09:00"));
        assert_eq!(check.reason, Some(Rejection::NoHours));
        assert!(available_start_times(&status, 30, &[], at("2026-03-01", "09:00")).is_empty());

        status.open_time = status.close_time;
        assert_eq!(
            is_date_bookable(&status, 30, at("2026-03-01", "09:00")).reason,
            Some(Rejection::NoHours)
        );
    }

    #[test]
    fn test_rejection_serializes_as_reason_text() {
        let check = DateCheck::rejected(Rejection::BookingsDisabled);
        let json = serde_json::to_value(check).unwrap();
        assert_eq!(json["reason"], "bookings disabled");
        assert_eq!(json["bookable"], false);
    }
}
