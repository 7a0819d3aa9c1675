use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::scheduling::ClockTime;

// ── Operating hours ──

/// Opening hours for one day of the week.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaySchedule {
    pub open_time: ClockTime,
    pub close_time: ClockTime,
    pub is_closed: bool,
}

impl DaySchedule {
    /// An open day must open before it closes.
    pub fn is_consistent(&self) -> bool {
        self.is_closed || self.open_time < self.close_time
    }
}

/// Default hours indexed by day of week (0 = Sunday .. 6 = Saturday).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklySchedule {
    pub days: [DaySchedule; 7],
}

impl WeeklySchedule {
    pub fn day(&self, day_of_week: u32) -> &DaySchedule {
        &self.days[(day_of_week % 7) as usize]
    }
}

/// Per-date override fields. Every `Some` replaces the weekly default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_time: Option<ClockTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close_time: Option<ClockTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_closed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_holiday: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disable_bookings: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_tuesday_override: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl OverrideFields {
    /// Field-by-field merge: fields present in `newer` win.
    pub fn merged_with(self, newer: OverrideFields) -> OverrideFields {
        OverrideFields {
            open_time: newer.open_time.or(self.open_time),
            close_time: newer.close_time.or(self.close_time),
            is_closed: newer.is_closed.or(self.is_closed),
            is_holiday: newer.is_holiday.or(self.is_holiday),
            disable_bookings: newer.disable_bookings.or(self.disable_bookings),
            is_tuesday_override: newer.is_tuesday_override.or(self.is_tuesday_override),
            notes: newer.notes.or(self.notes),
        }
    }
}

/// An admin-entered override for a single calendar date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateOverride {
    pub date: NaiveDate,
    #[serde(flatten)]
    pub fields: OverrideFields,
}

/// The resolved operating status of one date. Derived, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EffectiveDayStatus {
    pub date: NaiveDate,
    pub day_of_week: u32,
    pub open_time: ClockTime,
    pub close_time: ClockTime,
    pub is_closed: bool,
    pub is_holiday: bool,
    pub disable_bookings: bool,
    pub is_tuesday_override: bool,
    pub notes: String,
    /// `true` when a date override existed for this date.
    pub is_specific: bool,
}

// ── Catalogue ──

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Service {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub price: i64,
    pub duration_min: i64,
    pub is_active: bool,
    pub sort_order: i64,
}

/// The parts of a service a booking attempt freezes at date selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceSnapshot {
    pub id: i64,
    pub name: String,
    pub duration_min: u32,
}

/// Longest service the scheduling rules accept, in minutes.
pub const MAX_SERVICE_DURATION_MIN: i64 = crate::scheduling::clock_time::MINUTES_PER_DAY as i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("service duration must be between 1 and 1440 minutes, got {0}")]
pub struct InvalidServiceDuration(pub i64);

/// Validated service duration in minutes.
pub fn service_duration(minutes: i64) -> Result<u32, InvalidServiceDuration> {
    if !(1..=MAX_SERVICE_DURATION_MIN).contains(&minutes) {
        return Err(InvalidServiceDuration(minutes));
    }
    u32::try_from(minutes).map_err(|_| InvalidServiceDuration(minutes))
}

impl TryFrom<&Service> for ServiceSnapshot {
    type Error = InvalidServiceDuration;

    fn try_from(service: &Service) -> Result<Self, Self::Error> {
        Ok(Self {
            id: service.id,
            name: service.name.clone(),
            duration_min: service_duration(service.duration_min)?,
        })
    }
}

// ── Bookings ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "kebab-case")]
#[sqlx(rename_all = "kebab-case")]
pub enum BookingStatus {
    Pending,
    Accepted,
    Rejected,
    Cancelled,
    Completed,
    InProgress,
}

impl BookingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Accepted => "accepted",
            BookingStatus::Rejected => "rejected",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Completed => "completed",
            BookingStatus::InProgress => "in-progress",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BookingStatus::Pending),
            "accepted" => Ok(BookingStatus::Accepted),
            "rejected" => Ok(BookingStatus::Rejected),
            "cancelled" => Ok(BookingStatus::Cancelled),
            "completed" => Ok(BookingStatus::Completed),
            "in-progress" => Ok(BookingStatus::InProgress),
            other => Err(format!("unknown booking status {other:?}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Booking {
    pub id: i64,
    pub customer_id: String,
    pub service_id: i64,
    pub date: NaiveDate,
    pub time: ClockTime,
    /// Minutes, snapshotted from the service at booking time.
    pub service_duration: Option<u32>,
    pub status: BookingStatus,
    pub created_at: NaiveDateTime,
}

/// What the commit protocol hands to the booking store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBooking {
    pub customer_id: String,
    pub service_id: i64,
    pub date: NaiveDate,
    pub time: ClockTime,
    pub service_duration: u32,
    pub created_at: NaiveDateTime,
}

// ── API request/response types ──

#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    pub customer_id: String,
    pub service_id: i64,
    pub date: NaiveDate,
    pub time: ClockTime,
}

#[derive(Debug, Deserialize)]
pub struct ValidateSlotRequest {
    pub service_id: i64,
    pub date: NaiveDate,
    pub time: ClockTime,
}

#[derive(Debug, Deserialize)]
pub struct DayQuery {
    pub date: NaiveDate,
    pub service_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct AvailableTimesQuery {
    pub date: NaiveDate,
    pub service_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct CustomerBookingsQuery {
    pub customer_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CancelBookingRequest {
    pub customer_id: String,
}

#[derive(Debug, Deserialize)]
pub struct BookingsQuery {
    pub date: Option<NaiveDate>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateBookingStatusRequest {
    pub status: BookingStatus,
}

#[derive(Debug, Deserialize)]
pub struct CreateServiceRequest {
    pub name: String,
    pub description: Option<String>,
    pub price: i64,
    pub duration_min: i64,
    pub sort_order: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateServiceRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<i64>,
    pub duration_min: Option<i64>,
    pub is_active: Option<bool>,
    pub sort_order: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct DayResponse {
    pub status: EffectiveDayStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check: Option<crate::scheduling::DateCheck>,
}

#[derive(Debug, Serialize)]
pub struct AvailableTimesResponse {
    pub date: NaiveDate,
    pub service_duration: u32,
    pub times: Vec<ClockTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub ok: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> ClockTime {
        s.parse().unwrap()
    }

    #[test]
    fn test_merge_newer_fields_win() {
        let old = OverrideFields {
            open_time: Some(t("10:00")),
            notes: Some("short day".into()),
            ..Default::default()
        };
        let newer = OverrideFields {
            open_time: Some(t("11:00")),
            is_holiday: Some(true),
            ..Default::default()
        };
        let merged = old.merged_with(newer);
        assert_eq!(merged.open_time, Some(t("11:00")));
        assert_eq!(merged.is_holiday, Some(true));
        assert_eq!(merged.notes.as_deref(), Some("short day"));
        assert_eq!(merged.close_time, None);
    }

    #[test]
    fn test_override_json_is_flat() {
        let json = r#"{"date":"2026-03-03","open_time":null,"is_tuesday_override":true}"#;
        let o: DateOverride = serde_json::from_str(json).unwrap();
        assert_eq!(o.date, NaiveDate::from_ymd_opt(2026, 3, 3).unwrap());
        assert_eq!(o.fields.is_tuesday_override, Some(true));
        assert_eq!(o.fields.open_time, None);
    }

    #[test]
    fn test_booking_status_round_trips_kebab_case() {
        assert_eq!(
            serde_json::to_string(&BookingStatus::InProgress).unwrap(),
            "\"in-progress\""
        );
        assert_eq!("cancelled".parse::<BookingStatus>(), Ok(BookingStatus::Cancelled));
        assert!("upcoming".parse::<BookingStatus>().is_err());
    }

    #[test]
    fn test_day_schedule_consistency() {
        let open = DaySchedule {
            open_time: t("21:00"),
            close_time: t("08:30"),
            is_closed: false,
        };
        assert!(!open.is_consistent());
        let closed = DaySchedule { is_closed: true, ..open };
        assert!(closed.is_consistent());
    }

    #[test]
    fn test_service_snapshot_rejects_out_of_range_duration() {
        let mut service = Service {
            id: 1,
            name: "Cut".into(),
            description: String::new(),
            price: 100,
            duration_min: 45,
            is_active: true,
            sort_order: 0,
        };
        assert_eq!(ServiceSnapshot::try_from(&service).unwrap().duration_min, 45);

        for bad in [-5, 0, MAX_SERVICE_DURATION_MIN + 1, 4_294_967_326] {
            service.duration_min = bad;
            assert_eq!(
                ServiceSnapshot::try_from(&service),
                Err(InvalidServiceDuration(bad))
            );
        }
    }

    #[test]
    fn test_service_duration_accepts_a_full_day() {
        assert_eq!(service_duration(1), Ok(1));
        assert_eq!(service_duration(24 * 60), Ok(1440));
    }
}
