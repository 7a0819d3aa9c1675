//! One customer's booking attempt, from date selection to the final write.
//!
//! The only protection against double booking is the re-check right
//! before the write: bookings for the date are fetched again and run
//! through the conflict detector. Two attempts that both re-fetch before
//! either writes can still both succeed; there is no storage-level lock.

use chrono::{NaiveDate, NaiveDateTime};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use super::conflict::{find_conflict, Candidate};
use super::validator::{available_start_times, is_date_bookable, is_time_slot_valid};
use super::{ClockTime, DateCheck, Rejection, SlotCheck};
use crate::models::{Booking, EffectiveDayStatus, NewBooking, ServiceSnapshot};
use crate::store::{BookingStore, Clock};

/// Reads of existing bookings at submit time, including the first one.
const REFETCH_ATTEMPTS: u32 = 2;
const REFETCH_PAUSE: Duration = Duration::from_millis(50);

/// What to do when existing bookings cannot be read at submit time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AvailabilityPolicy {
    /// Proceed as if the date had no bookings.
    #[default]
    FailOpen,
    /// Refuse to write without a successful conflict check.
    FailClosed,
}

impl FromStr for AvailabilityPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fail-open" | "open" => Ok(AvailabilityPolicy::FailOpen),
            "fail-closed" | "closed" => Ok(AvailabilityPolicy::FailClosed),
            other => Err(format!("unknown availability policy {other:?}")),
        }
    }
}

impl fmt::Display for AvailabilityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AvailabilityPolicy::FailOpen => f.write_str("fail-open"),
            AvailabilityPolicy::FailClosed => f.write_str("fail-closed"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("{0}")]
    Validation(Rejection),
    #[error("this time was just booked by someone else, please pick another time")]
    Conflict,
    #[error("could not check availability, please try again: {0}")]
    Infrastructure(String),
    #[error("could not save the booking, please try again: {0}")]
    Write(String),
    #[error("cannot {action} while {state}")]
    InvalidTransition {
        action: &'static str,
        state: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttemptState {
    Idle,
    /// Date chosen. `check` says whether any time may be offered.
    DateSelected {
        status: EffectiveDayStatus,
        check: DateCheck,
    },
    /// A time that fits the day's hours.
    TimeSelected {
        status: EffectiveDayStatus,
        time: ClockTime,
    },
    Submitting {
        status: EffectiveDayStatus,
        time: ClockTime,
    },
    Committed(Booking),
    /// Lost the slot at commit time. The selected time is cleared and
    /// `fresh` holds the bookings read during the failed submit.
    Rejected {
        status: EffectiveDayStatus,
        fresh: Vec<Booking>,
    },
    Failed {
        status: EffectiveDayStatus,
        time: ClockTime,
        error: String,
    },
}

impl AttemptState {
    pub fn name(&self) -> &'static str {
        match self {
            AttemptState::Idle => "idle",
            AttemptState::DateSelected { .. } => "date selected",
            AttemptState::TimeSelected { .. } => "time selected",
            AttemptState::Submitting { .. } => "submitting",
            AttemptState::Committed(_) => "committed",
            AttemptState::Rejected { .. } => "rejected",
            AttemptState::Failed { .. } => "failed",
        }
    }
}

pub struct BookingAttempt {
    customer_id: String,
    service: ServiceSnapshot,
    state: AttemptState,
}

impl BookingAttempt {
    /// The service is frozen for the whole attempt.
    pub fn new(customer_id: impl Into<String>, service: ServiceSnapshot) -> Self {
        Self {
            customer_id: customer_id.into(),
            service,
            state: AttemptState::Idle,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> &AttemptState {
        &self.state
    }

    fn invalid(&self, action: &'static str) -> BookingError {
        BookingError::InvalidTransition {
            action,
            state: self.state.name(),
        }
    }

    /// Pick (or re-pick) a date. The returned check decides whether times
    /// are offered at all.
    pub fn select_date(
        &mut self,
        status: EffectiveDayStatus,
        now: NaiveDateTime,
    ) -> Result<DateCheck, BookingError> {
        if matches!(
            self.state,
            AttemptState::Submitting { .. } | AttemptState::Committed(_)
        ) {
            return Err(self.invalid("select a date"));
        }
        let check = is_date_bookable(&status, self.service.duration_min, now);
        self.state = AttemptState::DateSelected { status, check };
        Ok(check)
    }

    /// Pick a start time on the selected date. An invalid time is reported
    /// through the returned check and leaves the attempt on its date.
    pub fn select_time(
        &mut self,
        time: ClockTime,
        now: NaiveDateTime,
    ) -> Result<SlotCheck, BookingError> {
        let status = match &self.state {
            AttemptState::DateSelected { status, check } => {
                check.into_result().map_err(BookingError::Validation)?;
                status.clone()
            }
            AttemptState::TimeSelected { status, .. }
            | AttemptState::Rejected { status, .. }
            | AttemptState::Failed { status, .. } => status.clone(),
            _ => return Err(self.invalid("select a time")),
        };

        let mut check = is_time_slot_valid(Some(&status), time, self.service.duration_min);
        if check.valid && status.date == now.date() && time < ClockTime::from(now.time()) {
            check = SlotCheck {
                valid: false,
                reason: Some(Rejection::TimeInPast),
            };
        }

        let date_check = is_date_bookable(&status, self.service.duration_min, now);
        self.state = if check.valid {
            AttemptState::TimeSelected { status, time }
        } else {
            AttemptState::DateSelected {
                status,
                check: date_check,
            }
        };
        Ok(check)
    }

    /// Back to a state the customer can continue from after a failure.
    pub fn retry(&mut self, now: NaiveDateTime) -> Result<(), BookingError> {
        let next = match &self.state {
            AttemptState::Failed { status, time, .. } => AttemptState::TimeSelected {
                status: status.clone(),
                time: *time,
            },
            AttemptState::Rejected { status, .. } => AttemptState::DateSelected {
                status: status.clone(),
                check: is_date_bookable(status, self.service.duration_min, now),
            },
            _ => return Err(self.invalid("retry")),
        };
        self.state = next;
        Ok(())
    }

    /// Start times still open after a rejection, computed from the
    /// bookings read during the failed submit.
    pub fn regenerated_times(&self, now: NaiveDateTime) -> Vec<ClockTime> {
        match &self.state {
            AttemptState::Rejected { status, fresh } => {
                available_start_times(status, self.service.duration_min, fresh, now)
            }
            _ => Vec::new(),
        }
    }

    /// Re-read the date's bookings, re-validate, check for conflicts and
    /// write the booking as `pending`.
    pub async fn submit(
        &mut self,
        store: &dyn BookingStore,
        clock: &dyn Clock,
        policy: AvailabilityPolicy,
    ) -> Result<Booking, BookingError> {
        let (status, time) = match &self.state {
            AttemptState::TimeSelected { status, time } => (status.clone(), *time),
            _ => return Err(self.invalid("submit")),
        };
        self.state = AttemptState::Submitting {
            status: status.clone(),
            time,
        };
        let date = status.date;
        let duration = self.service.duration_min;

        let existing = match refetch_bookings(store, date).await {
            Ok(bookings) => bookings,
            Err(e) => match policy {
                AvailabilityPolicy::FailOpen => {
                    tracing::warn!(
                        %date,
                        "existing bookings unavailable, proceeding without conflict check: {e:#}"
                    );
                    Vec::new()
                }
                AvailabilityPolicy::FailClosed => {
                    tracing::error!(%date, "existing bookings unavailable, refusing booking: {e:#}");
                    let error = BookingError::Infrastructure(e.to_string());
                    self.state = AttemptState::Failed {
                        status,
                        time,
                        error: error.to_string(),
                    };
                    return Err(error);
                }
            },
        };

        let now = clock.now();
        let date_check = is_date_bookable(&status, duration, now);
        let slot_check = is_time_slot_valid(Some(&status), time, duration);
        if let Err(reason) = date_check.into_result().and(slot_check.into_result()) {
            tracing::info!(%date, %time, %reason, "booking no longer valid at submit");
            self.state = AttemptState::DateSelected {
                status,
                check: date_check,
            };
            return Err(BookingError::Validation(reason));
        }

        let candidate = Candidate {
            date,
            time,
            duration_min: duration,
        };
        if let Some(taken) = find_conflict(&candidate, &existing) {
            tracing::warn!(
                %date,
                %time,
                conflicting_booking = taken.id,
                "slot taken between selection and submit"
            );
            self.state = AttemptState::Rejected {
                status,
                fresh: existing,
            };
            return Err(BookingError::Conflict);
        }

        let new_booking = NewBooking {
            customer_id: self.customer_id.clone(),
            service_id: self.service.id,
            date,
            time,
            service_duration: duration,
            created_at: now,
        };
        match store.create_booking(new_booking).await {
            Ok(booking) => {
                tracing::info!(
                    booking_id = booking.id,
                    %date,
                    %time,
                    service = %self.service.name,
                    "booking committed"
                );
                self.state = AttemptState::Committed(booking.clone());
                Ok(booking)
            }
            Err(e) => {
                tracing::error!(%date, %time, "booking write failed: {e:#}");
                let error = BookingError::Write(e.to_string());
                self.state = AttemptState::Failed {
                    status,
                    time,
                    error: error.to_string(),
                };
                Err(error)
            }
        }
    }
}

async fn refetch_bookings(
    store: &dyn BookingStore,
    date: NaiveDate,
) -> anyhow::Result<Vec<Booking>> {
    let mut attempt = 1;
    loop {
        match store.get_bookings_for_date(date).await {
            Ok(bookings) => return Ok(bookings),
            Err(e) if attempt < REFETCH_ATTEMPTS => {
                tracing::debug!(%date, attempt, "bookings read failed, retrying: {e:#}");
                tokio::time::sleep(REFETCH_PAUSE).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BookingStatus;
    use crate::scheduling::resolver::resolve_day;
    use crate::store::memory::MemoryBookingStore;
    use crate::store::FixedClock;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn t(s: &str) -> ClockTime {
        s.parse().unwrap()
    }

    fn at(date: &str, time: &str) -> NaiveDateTime {
        d(date).and_time(t(time).to_naive_time())
    }

    fn service(duration_min: u32) -> ServiceSnapshot {
        ServiceSnapshot {
            id: 7,
            name: "Manicure".into(),
            duration_min,
        }
    }

    fn existing(time: &str, duration: u32) -> Booking {
        Booking {
            id: 100,
            customer_id: "other".into(),
            service_id: 1,
            date: d("2026-03-04"),
            time: t(time),
            service_duration: Some(duration),
            status: BookingStatus::Pending,
            created_at: at("2026-03-01", "08:00"),
        }
    }

    /// Wednesday 2026-03-04, checked on Sunday 2026-03-01.
    fn ready_attempt(time: &str) -> BookingAttempt {
        let now = at("2026-03-01", "09:00");
        let mut attempt = BookingAttempt::new("cust-1", service(30));
        let check = attempt
            .select_date(resolve_day(d("2026-03-04"), None, None), now)
            .unwrap();
        assert!(check.bookable);
        let slot = attempt.select_time(t(time), now).unwrap();
        assert!(slot.valid);
        attempt
    }

    fn clock() -> FixedClock {
        FixedClock(at("2026-03-01", "09:00"))
    }

    #[test]
    fn test_unbookable_date_blocks_time_selection() {
        let now = at("2026-03-01", "09:00");
        let mut attempt = BookingAttempt::new("cust-1", service(30));
        let check = attempt
            .select_date(resolve_day(d("2026-03-03"), None, None), now)
            .unwrap();
        assert_eq!(check.reason, Some(Rejection::Closed));
        let err = attempt.select_time(t("10:00"), now).unwrap_err();
        assert!(matches!(err, BookingError::Validation(Rejection::Closed)));
        assert_eq!(attempt.state().name(), "date selected");
    }

    #[test]
    fn test_invalid_time_stays_on_date() {
        let now = at("2026-03-01", "09:00");
        let mut attempt = BookingAttempt::new("cust-1", service(60));
        attempt
            .select_date(resolve_day(d("2026-03-04"), None, None), now)
            .unwrap();
        let check = attempt.select_time(t("20:15"), now).unwrap();
        assert_eq!(check.reason, Some(Rejection::ExceedsClosing));
        assert!(matches!(attempt.state(), AttemptState::DateSelected { .. }));
        // a valid pick afterwards advances
        assert!(attempt.select_time(t("19:30"), now).unwrap().valid);
        assert!(matches!(attempt.state(), AttemptState::TimeSelected { .. }));
    }

    #[test]
    fn test_time_already_passed_today() {
        let now = at("2026-03-04", "12:00");
        let mut attempt = BookingAttempt::new("cust-1", service(30));
        attempt
            .select_date(resolve_day(d("2026-03-04"), None, None), now)
            .unwrap();
        let check = attempt.select_time(t("11:00"), now).unwrap();
        assert_eq!(check.reason, Some(Rejection::TimeInPast));
    }

    #[tokio::test]
    async fn test_submit_requires_time() {
        let mut attempt = BookingAttempt::new("cust-1", service(30));
        let store = MemoryBookingStore::default();
        let err = attempt
            .submit(&store, &clock(), AvailabilityPolicy::FailOpen)
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::InvalidTransition { .. }));
        assert_eq!(err.to_string(), "cannot submit while idle");
    }

    #[tokio::test]
    async fn test_commit_writes_pending_booking() {
        let store = MemoryBookingStore::default();
        let mut attempt = ready_attempt("10:00");
        let booking = attempt
            .submit(&store, &clock(), AvailabilityPolicy::FailOpen)
            .await
            .unwrap();
        assert_eq!(booking.status, BookingStatus::Pending);
        assert_eq!(booking.service_duration, Some(30));
        assert_eq!(booking.customer_id, "cust-1");
        assert_eq!(booking.time, t("10:00"));
        assert!(matches!(attempt.state(), AttemptState::Committed(_)));
        assert_eq!(store.all().len(), 1);
    }

    #[tokio::test]
    async fn test_conflict_at_submit_rejects_and_clears_time() {
        let store = MemoryBookingStore::default();
        let mut attempt = ready_attempt("10:45");
        // someone else books 10:00 after our time was selected
        store.insert(existing("10:00", 30));
        let err = attempt
            .submit(&store, &clock(), AvailabilityPolicy::FailOpen)
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::Conflict));
        assert!(matches!(attempt.state(), AttemptState::Rejected { .. }));
        assert_eq!(store.all().len(), 1);

        let times = attempt.regenerated_times(clock().now());
        assert!(!times.contains(&t("10:45")));
        assert!(times.contains(&t("11:00")));

        attempt.retry(clock().now()).unwrap();
        assert!(matches!(attempt.state(), AttemptState::DateSelected { .. }));
    }

    #[tokio::test]
    async fn test_no_conflict_outside_buffer() {
        let store = MemoryBookingStore::with_bookings(vec![existing("10:00", 30)]);
        let mut attempt = ready_attempt("10:55");
        assert!(attempt
            .submit(&store, &clock(), AvailabilityPolicy::FailOpen)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_cancelled_booking_does_not_block() {
        let mut cancelled = existing("10:00", 30);
        cancelled.status = BookingStatus::Cancelled;
        let store = MemoryBookingStore::with_bookings(vec![cancelled]);
        let mut attempt = ready_attempt("10:00");
        assert!(attempt
            .submit(&store, &clock(), AvailabilityPolicy::FailOpen)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_transient_read_failure_is_retried() {
        let store = MemoryBookingStore::with_bookings(vec![existing("10:00", 30)]);
        store.fail_next_reads(1);
        let mut attempt = ready_attempt("10:15");
        let err = attempt
            .submit(&store, &clock(), AvailabilityPolicy::FailOpen)
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::Conflict));
        assert_eq!(store.read_count(), 2);
    }

    #[tokio::test]
    async fn test_fail_open_skips_conflict_check() {
        let store = MemoryBookingStore::with_bookings(vec![existing("10:00", 30)]);
        store.fail_next_reads(REFETCH_ATTEMPTS as usize);
        let mut attempt = ready_attempt("10:00");
        let booking = attempt
            .submit(&store, &clock(), AvailabilityPolicy::FailOpen)
            .await
            .unwrap();
        assert_eq!(booking.time, t("10:00"));
        assert_eq!(store.all().len(), 2);
    }

    #[tokio::test]
    async fn test_fail_closed_refuses_to_write() {
        let store = MemoryBookingStore::default();
        store.fail_next_reads(REFETCH_ATTEMPTS as usize);
        let mut attempt = ready_attempt("10:00");
        let err = attempt
            .submit(&store, &clock(), AvailabilityPolicy::FailClosed)
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::Infrastructure(_)));
        assert!(matches!(attempt.state(), AttemptState::Failed { .. }));
        assert!(store.all().is_empty());
    }

    #[tokio::test]
    async fn test_write_failure_is_retryable() {
        let store = MemoryBookingStore::default();
        store.fail_writes(true);
        let mut attempt = ready_attempt("10:00");
        let err = attempt
            .submit(&store, &clock(), AvailabilityPolicy::FailOpen)
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::Write(_)));
        assert!(store.all().is_empty());

        store.fail_writes(false);
        attempt.retry(clock().now()).unwrap();
        assert!(matches!(attempt.state(), AttemptState::TimeSelected { .. }));
        assert!(attempt
            .submit(&store, &clock(), AvailabilityPolicy::FailOpen)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_submit_rechecks_same_day_cutoff() {
        // time picked in the morning, submitted too late in the evening
        let morning = at("2026-03-04", "09:00");
        let mut attempt = BookingAttempt::new("cust-1", service(30));
        attempt
            .select_date(resolve_day(d("2026-03-04"), None, None), morning)
            .unwrap();
        assert!(attempt.select_time(t("20:30"), morning).unwrap().valid);

        let store = MemoryBookingStore::default();
        let evening = FixedClock(at("2026-03-04", "20:50"));
        let err = attempt
            .submit(&store, &evening, AvailabilityPolicy::FailOpen)
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::Validation(Rejection::TooLateToday)));
        assert!(store.all().is_empty());
    }

    #[tokio::test]
    async fn test_committed_attempt_cannot_be_resubmitted() {
        let store = MemoryBookingStore::default();
        let mut attempt = ready_attempt("10:00");
        attempt
            .submit(&store, &clock(), AvailabilityPolicy::FailOpen)
            .await
            .unwrap();
        let err = attempt
            .submit(&store, &clock(), AvailabilityPolicy::FailOpen)
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::InvalidTransition { .. }));
        assert!(attempt
            .select_date(resolve_day(d("2026-03-05"), None, None), clock().now())
            .is_err());
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("fail-open".parse(), Ok(AvailabilityPolicy::FailOpen));
        assert_eq!("FAIL-CLOSED".parse(), Ok(AvailabilityPolicy::FailClosed));
        assert!("maybe".parse::<AvailabilityPolicy>().is_err());
        assert_eq!(AvailabilityPolicy::default(), AvailabilityPolicy::FailOpen);
    }
}
