//! Narrow interfaces the scheduling core reads and writes through.

use async_trait::async_trait;
use chrono::{FixedOffset, NaiveDate, NaiveDateTime, Utc};

use crate::models::{Booking, DateOverride, NewBooking, OverrideFields, WeeklySchedule};

#[async_trait]
pub trait HoursStore: Send + Sync {
    async fn get_override(&self, date: NaiveDate) -> anyhow::Result<Option<DateOverride>>;

    async fn get_override_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> anyhow::Result<Vec<DateOverride>>;

    /// `None` when no weekly schedule has been configured.
    async fn get_weekly_schedule(&self) -> anyhow::Result<Option<WeeklySchedule>>;

    /// Merge `fields` into the override for `date`, creating it if needed.
    async fn save_override(
        &self,
        date: NaiveDate,
        fields: OverrideFields,
    ) -> anyhow::Result<DateOverride>;
}

#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Every booking on `date`, cancelled ones included.
    async fn get_bookings_for_date(&self, date: NaiveDate) -> anyhow::Result<Vec<Booking>>;

    async fn create_booking(&self, booking: NewBooking) -> anyhow::Result<Booking>;
}

/// Source of the salon's local wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;

    fn today(&self) -> NaiveDate {
        self.now().date()
    }
}

/// Real time shifted to the salon's fixed UTC offset.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    offset: FixedOffset,
}

impl SystemClock {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Utc::now().with_timezone(&self.offset).naive_local()
    }
}

/// A clock frozen at one instant.
#[cfg(test)]
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

#[cfg(test)]
impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}
