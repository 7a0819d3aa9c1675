use anyhow::Context;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use sqlx::SqlitePool;

use crate::models::*;
use crate::scheduling::ClockTime;
use crate::store::{BookingStore, HoursStore};

/// Named migrations, applied in order and recorded in `_migrations`.
const MIGRATIONS: &[(&str, &str)] = &[
    ("001_init", include_str!("../migrations/001_init.sql")),
    (
        "002_seed_services",
        include_str!("../migrations/002_seed_services.sql"),
    ),
];

pub async fn run_migrations(pool: &SqlitePool) -> anyhow::Result<()> {
    // Enable WAL mode for better concurrent access
    sqlx::query("PRAGMA journal_mode=WAL").execute(pool).await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS _migrations (
            name TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
    )
    .execute(pool)
    .await?;

    for (name, migration_sql) in MIGRATIONS {
        let applied: bool =
            sqlx::query_scalar("SELECT COUNT(*) > 0 FROM _migrations WHERE name = ?")
                .bind(name)
                .fetch_one(pool)
                .await?;
        if applied {
            continue;
        }

        let mut tx = pool.begin().await?;
        for statement in migration_sql.split(';') {
            let trimmed = statement.trim();
            if !trimmed.is_empty() {
                sqlx::query(trimmed)
                    .execute(&mut *tx)
                    .await
                    .with_context(|| format!("migration {name} failed"))?;
            }
        }
        sqlx::query("INSERT INTO _migrations (name) VALUES (?)")
            .bind(name)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        tracing::info!("Applied migration: {}", name);
    }

    tracing::info!("Database migrations up to date");
    Ok(())
}

// ── Row types (times are TEXT "HH:MM" in SQLite) ──

#[derive(Debug, sqlx::FromRow)]
struct BookingRow {
    id: i64,
    customer_id: String,
    service_id: i64,
    date: NaiveDate,
    time: String,
    service_duration: Option<i64>,
    status: BookingStatus,
    created_at: NaiveDateTime,
}

impl TryFrom<BookingRow> for Booking {
    type Error = anyhow::Error;

    fn try_from(row: BookingRow) -> anyhow::Result<Self> {
        Ok(Booking {
            id: row.id,
            customer_id: row.customer_id,
            service_id: row.service_id,
            date: row.date,
            time: row.time.parse()?,
            service_duration: row.service_duration.map(u32::try_from).transpose()?,
            status: row.status,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OverrideRow {
    date: NaiveDate,
    open_time: Option<String>,
    close_time: Option<String>,
    is_closed: Option<bool>,
    is_holiday: Option<bool>,
    disable_bookings: Option<bool>,
    is_tuesday_override: Option<bool>,
    notes: Option<String>,
}

fn parse_opt_time(value: Option<String>) -> anyhow::Result<Option<ClockTime>> {
    value.map(|s| s.parse::<ClockTime>()).transpose().map_err(Into::into)
}

impl TryFrom<OverrideRow> for DateOverride {
    type Error = anyhow::Error;

    fn try_from(row: OverrideRow) -> anyhow::Result<Self> {
        Ok(DateOverride {
            date: row.date,
            fields: OverrideFields {
                open_time: parse_opt_time(row.open_time)?,
                close_time: parse_opt_time(row.close_time)?,
                is_closed: row.is_closed,
                is_holiday: row.is_holiday,
                disable_bookings: row.disable_bookings,
                is_tuesday_override: row.is_tuesday_override,
                notes: row.notes,
            },
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct WeeklyRow {
    day_of_week: i64,
    open_time: String,
    close_time: String,
    is_closed: bool,
}

const BOOKING_SELECT: &str =
    "SELECT id, customer_id, service_id, date, time, service_duration, status, created_at
     FROM bookings";

const OVERRIDE_SELECT: &str =
    "SELECT date, open_time, close_time, is_closed, is_holiday, disable_bookings,
            is_tuesday_override, notes
     FROM date_overrides";

const SERVICE_SELECT: &str =
    "SELECT id, name, description, price, duration_min, is_active, sort_order FROM services";

fn decode_all<R, T>(rows: Vec<R>) -> anyhow::Result<Vec<T>>
where
    T: TryFrom<R, Error = anyhow::Error>,
{
    rows.into_iter().map(T::try_from).collect()
}

/// SQLite-backed hours store, booking store and service catalogue.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn ping(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }

    // ── Hours ──

    pub async fn put_weekly_schedule(&self, weekly: &WeeklySchedule) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        for (dow, day) in weekly.days.iter().enumerate() {
            sqlx::query(
                "INSERT INTO weekly_schedule (day_of_week, open_time, close_time, is_closed)
                 VALUES (?, ?, ?, ?)
                 ON CONFLICT(day_of_week) DO UPDATE SET
                    open_time = excluded.open_time,
                    close_time = excluded.close_time,
                    is_closed = excluded.is_closed",
            )
            .bind(dow as i64)
            .bind(day.open_time.to_string())
            .bind(day.close_time.to_string())
            .bind(day.is_closed)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// `true` if an override existed.
    pub async fn delete_override(&self, date: NaiveDate) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM date_overrides WHERE date = ?")
            .bind(date)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ── Services ──

    pub async fn list_services(&self, active_only: bool) -> anyhow::Result<Vec<Service>> {
        let query = if active_only {
            format!("{SERVICE_SELECT} WHERE is_active = 1 ORDER BY sort_order ASC")
        } else {
            format!("{SERVICE_SELECT} ORDER BY sort_order ASC")
        };
        Ok(sqlx::query_as::<_, Service>(&query)
            .fetch_all(&self.pool)
            .await?)
    }

    pub async fn get_active_service(&self, id: i64) -> anyhow::Result<Option<Service>> {
        Ok(
            sqlx::query_as::<_, Service>(&format!("{SERVICE_SELECT} WHERE id = ? AND is_active = 1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    pub async fn create_service(&self, req: &CreateServiceRequest) -> anyhow::Result<Service> {
        let id = sqlx::query(
            "INSERT INTO services (name, description, price, duration_min, sort_order)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&req.name)
        .bind(req.description.as_deref().unwrap_or(""))
        .bind(req.price)
        .bind(req.duration_min)
        .bind(req.sort_order.unwrap_or(0))
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(sqlx::query_as::<_, Service>(&format!("{SERVICE_SELECT} WHERE id = ?"))
            .bind(id)
            .fetch_one(&self.pool)
            .await?)
    }

    /// `None` if no such service.
    pub async fn update_service(
        &self,
        id: i64,
        req: &UpdateServiceRequest,
    ) -> anyhow::Result<Option<Service>> {
        sqlx::query(
            "UPDATE services SET
                name = COALESCE(?, name),
                description = COALESCE(?, description),
                price = COALESCE(?, price),
                duration_min = COALESCE(?, duration_min),
                is_active = COALESCE(?, is_active),
                sort_order = COALESCE(?, sort_order)
             WHERE id = ?",
        )
        .bind(&req.name)
        .bind(&req.description)
        .bind(req.price)
        .bind(req.duration_min)
        .bind(req.is_active)
        .bind(req.sort_order)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(sqlx::query_as::<_, Service>(&format!("{SERVICE_SELECT} WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    // ── Bookings ──

    pub async fn get_booking(&self, id: i64) -> anyhow::Result<Option<Booking>> {
        sqlx::query_as::<_, BookingRow>(&format!("{BOOKING_SELECT} WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Booking::try_from)
            .transpose()
    }

    pub async fn bookings_for_customer(&self, customer_id: &str) -> anyhow::Result<Vec<Booking>> {
        let rows = sqlx::query_as::<_, BookingRow>(&format!(
            "{BOOKING_SELECT} WHERE customer_id = ? ORDER BY date ASC, time ASC"
        ))
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await?;
        decode_all(rows)
    }

    /// Non-cancelled bookings in `[from, to]`.
    pub async fn bookings_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> anyhow::Result<Vec<Booking>> {
        let rows = sqlx::query_as::<_, BookingRow>(&format!(
            "{BOOKING_SELECT} WHERE date BETWEEN ? AND ? AND status != 'cancelled'
             ORDER BY date ASC, time ASC"
        ))
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        decode_all(rows)
    }

    /// `None` if no such booking.
    pub async fn update_booking_status(
        &self,
        id: i64,
        status: BookingStatus,
    ) -> anyhow::Result<Option<Booking>> {
        let result = sqlx::query("UPDATE bookings SET status = ? WHERE id = ?")
            .bind(status)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_booking(id).await
    }
}

#[async_trait]
impl HoursStore for SqliteStore {
    async fn get_override(&self, date: NaiveDate) -> anyhow::Result<Option<DateOverride>> {
        sqlx::query_as::<_, OverrideRow>(&format!("{OVERRIDE_SELECT} WHERE date = ?"))
            .bind(date)
            .fetch_optional(&self.pool)
            .await?
            .map(DateOverride::try_from)
            .transpose()
    }

    async fn get_override_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> anyhow::Result<Vec<DateOverride>> {
        let rows = sqlx::query_as::<_, OverrideRow>(&format!(
            "{OVERRIDE_SELECT} WHERE date BETWEEN ? AND ? ORDER BY date ASC"
        ))
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;
        decode_all(rows)
    }

    async fn get_weekly_schedule(&self) -> anyhow::Result<Option<WeeklySchedule>> {
        let rows = sqlx::query_as::<_, WeeklyRow>(
            "SELECT day_of_week, open_time, close_time, is_closed
             FROM weekly_schedule ORDER BY day_of_week ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        // A partial table is treated as not configured.
        if rows.len() != 7 {
            return Ok(None);
        }
        let mut days = [DaySchedule {
            open_time: ClockTime::MIDNIGHT,
            close_time: ClockTime::MIDNIGHT,
            is_closed: true,
        }; 7];
        for row in rows {
            let slot = days
                .get_mut(row.day_of_week as usize)
                .with_context(|| format!("bad day_of_week {}", row.day_of_week))?;
            *slot = DaySchedule {
                open_time: row.open_time.parse()?,
                close_time: row.close_time.parse()?,
                is_closed: row.is_closed,
            };
        }
        Ok(Some(WeeklySchedule { days }))
    }

    async fn save_override(
        &self,
        date: NaiveDate,
        fields: OverrideFields,
    ) -> anyhow::Result<DateOverride> {
        let mut tx = self.pool.begin().await?;
        let existing = sqlx::query_as::<_, OverrideRow>(&format!("{OVERRIDE_SELECT} WHERE date = ?"))
            .bind(date)
            .fetch_optional(&mut *tx)
            .await?
            .map(DateOverride::try_from)
            .transpose()?;

        let merged = existing
            .map(|o| o.fields)
            .unwrap_or_default()
            .merged_with(fields);

        sqlx::query(
            "INSERT INTO date_overrides
                (date, open_time, close_time, is_closed, is_holiday, disable_bookings,
                 is_tuesday_override, notes, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, datetime('now'))
             ON CONFLICT(date) DO UPDATE SET
                open_time = excluded.open_time,
                close_time = excluded.close_time,
                is_closed = excluded.is_closed,
                is_holiday = excluded.is_holiday,
                disable_bookings = excluded.disable_bookings,
                is_tuesday_override = excluded.is_tuesday_override,
                notes = excluded.notes,
                updated_at = excluded.updated_at",
        )
        .bind(date)
        .bind(merged.open_time.map(|t| t.to_string()))
        .bind(merged.close_time.map(|t| t.to_string()))
        .bind(merged.is_closed)
        .bind(merged.is_holiday)
        .bind(merged.disable_bookings)
        .bind(merged.is_tuesday_override)
        .bind(&merged.notes)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(DateOverride {
            date,
            fields: merged,
        })
    }
}

#[async_trait]
impl BookingStore for SqliteStore {
    async fn get_bookings_for_date(&self, date: NaiveDate) -> anyhow::Result<Vec<Booking>> {
        let rows = sqlx::query_as::<_, BookingRow>(&format!(
            "{BOOKING_SELECT} WHERE date = ? ORDER BY time ASC"
        ))
        .bind(date)
        .fetch_all(&self.pool)
        .await?;
        decode_all(rows)
    }

    async fn create_booking(&self, booking: NewBooking) -> anyhow::Result<Booking> {
        let id = sqlx::query(
            "INSERT INTO bookings (customer_id, service_id, date, time, service_duration, status, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&booking.customer_id)
        .bind(booking.service_id)
        .bind(booking.date)
        .bind(booking.time.to_string())
        .bind(i64::from(booking.service_duration))
        .bind(BookingStatus::Pending)
        .bind(booking.created_at)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        self.get_booking(id)
            .await?
            .with_context(|| format!("booking {id} missing right after insert"))
    }
}
