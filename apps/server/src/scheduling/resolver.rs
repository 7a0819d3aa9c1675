use chrono::{Datelike, NaiveDate};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use super::{ClockTime, CONVENTIONALLY_CLOSED_WEEKDAY};
use crate::models::{DateOverride, DaySchedule, EffectiveDayStatus, WeeklySchedule};
use crate::store::HoursStore;

const fn hm(hour: u16, minute: u16) -> ClockTime {
    match ClockTime::from_hm(hour, minute) {
        Some(t) => t,
        None => ClockTime::MIDNIGHT,
    }
}

const fn open(open_time: ClockTime, close_time: ClockTime) -> DaySchedule {
    DaySchedule {
        open_time,
        close_time,
        is_closed: false,
    }
}

/// Hours used when no weekly schedule can be read. Shared by the single-day
/// and range paths so they cannot drift apart.
pub const FALLBACK_WEEKLY_SCHEDULE: WeeklySchedule = WeeklySchedule {
    days: [
        // Sunday
        open(hm(10, 0), hm(18, 0)),
        // Monday
        open(hm(8, 30), hm(21, 0)),
        // Tuesday: closed, hours kept for explicit reopenings
        DaySchedule {
            open_time: hm(8, 30),
            close_time: hm(21, 0),
            is_closed: true,
        },
        // Wednesday
        open(hm(8, 30), hm(21, 0)),
        // Thursday
        open(hm(8, 30), hm(21, 0)),
        // Friday
        open(hm(8, 30), hm(21, 0)),
        // Saturday
        open(hm(9, 0), hm(20, 0)),
    ],
};

/// 0 = Sunday .. 6 = Saturday.
pub fn day_of_week(date: NaiveDate) -> u32 {
    date.weekday().num_days_from_sunday()
}

/// Resolve the effective operating status of `date`.
///
/// Without a weekly schedule the fallback table applies. Any field present
/// in the override replaces the weekly value. Tuesdays stay closed unless
/// the override gives an opening time or sets `is_tuesday_override`.
pub fn resolve_day(
    date: NaiveDate,
    weekly: Option<&WeeklySchedule>,
    date_override: Option<&DateOverride>,
) -> EffectiveDayStatus {
    let dow = day_of_week(date);
    let base = *weekly.unwrap_or(&FALLBACK_WEEKLY_SCHEDULE).day(dow);

    let mut status = EffectiveDayStatus {
        date,
        day_of_week: dow,
        open_time: base.open_time,
        close_time: base.close_time,
        is_closed: base.is_closed,
        is_holiday: false,
        disable_bookings: false,
        is_tuesday_override: false,
        notes: String::new(),
        is_specific: false,
    };

    let fields = date_override.map(|o| &o.fields);
    if let Some(f) = fields {
        status.is_specific = true;
        if let Some(t) = f.open_time {
            status.open_time = t;
        }
        if let Some(t) = f.close_time {
            status.close_time = t;
        }
        if let Some(closed) = f.is_closed {
            status.is_closed = closed;
        }
        status.is_holiday = f.is_holiday.unwrap_or(false);
        status.disable_bookings = f.disable_bookings.unwrap_or(false);
        status.is_tuesday_override = f.is_tuesday_override.unwrap_or(false);
        if let Some(notes) = &f.notes {
            status.notes = notes.clone();
        }
    }

    if dow == CONVENTIONALLY_CLOSED_WEEKDAY {
        let reopened = fields
            .is_some_and(|f| f.open_time.is_some() || f.is_tuesday_override == Some(true));
        status.is_closed = if reopened {
            fields.and_then(|f| f.is_closed).unwrap_or(false)
        } else {
            true
        };
    }

    status
}

/// Resolve every date in `[start, end]` inclusive. Empty when `start > end`.
pub fn resolve_range(
    start: NaiveDate,
    end: NaiveDate,
    weekly: Option<&WeeklySchedule>,
    overrides_by_date: &HashMap<NaiveDate, DateOverride>,
) -> BTreeMap<NaiveDate, EffectiveDayStatus> {
    start
        .iter_days()
        .take_while(|d| *d <= end)
        .map(|d| (d, resolve_day(d, weekly, overrides_by_date.get(&d))))
        .collect()
}

/// Store-backed resolver. Read failures degrade to defaults instead of
/// blocking the caller.
#[derive(Clone)]
pub struct ScheduleService {
    hours: Arc<dyn HoursStore>,
}

impl ScheduleService {
    pub fn new(hours: Arc<dyn HoursStore>) -> Self {
        Self { hours }
    }

    async fn weekly_or_fallback(&self) -> Option<WeeklySchedule> {
        match self.hours.get_weekly_schedule().await {
            Ok(weekly) => weekly,
            Err(e) => {
                tracing::warn!("weekly schedule unavailable, using fallback hours: {e:#}");
                None
            }
        }
    }

    pub async fn effective_day(&self, date: NaiveDate) -> EffectiveDayStatus {
        let weekly = self.weekly_or_fallback().await;
        let date_override = match self.hours.get_override(date).await {
            Ok(o) => o,
            Err(e) => {
                tracing::warn!(%date, "override lookup failed, using weekly hours: {e:#}");
                None
            }
        };
        resolve_day(date, weekly.as_ref(), date_override.as_ref())
    }

    pub async fn effective_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> BTreeMap<NaiveDate, EffectiveDayStatus> {
        let weekly = self.weekly_or_fallback().await;
        let overrides: HashMap<NaiveDate, DateOverride> =
            match self.hours.get_override_range(start, end).await {
                Ok(list) => list.into_iter().map(|o| (o.date, o)).collect(),
                Err(e) => {
                    tracing::warn!(%start, %end, "override range lookup failed: {e:#}");
                    HashMap::new()
                }
            };
        resolve_range(start, end, weekly.as_ref(), &overrides)
    }
}
