//! Availability and scheduling core.
//!
//! Pure date/time rules (resolver, validator, conflict detector) plus the
//! commit protocol that ties them to the stores right before a write.

pub mod clock_time;
pub mod commit;
pub mod conflict;
pub mod resolver;
pub mod validator;

pub use clock_time::ClockTime;
pub use commit::{AvailabilityPolicy, BookingAttempt, BookingError};
pub use resolver::{resolve_day, ScheduleService, FALLBACK_WEEKLY_SCHEDULE};
pub use validator::{available_start_times, is_date_bookable, DateCheck, Rejection, SlotCheck};

/// Mandatory gap around existing appointments (minutes).
pub const BUFFER_MINUTES: u32 = 20;

/// Step between candidate start times offered to the customer (minutes).
pub const SLOT_STEP_MINUTES: u32 = 15;

/// Duration assumed for stored bookings that lack a duration snapshot.
pub const DEFAULT_SERVICE_DURATION_MIN: u32 = 30;

/// Day of week the salon keeps closed unless explicitly reopened (Tuesday).
pub const CONVENTIONALLY_CLOSED_WEEKDAY: u32 = 2;
