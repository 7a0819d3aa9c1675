use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::NaiveDate;
use std::sync::Arc;

use super::{check_duration, check_range};
use crate::error::AppError;
use crate::models::*;
use crate::scheduling::{resolve_day, FALLBACK_WEEKLY_SCHEDULE};
use crate::store::{BookingStore, HoursStore};
use crate::AppState;

// ── Operating hours ──

/// GET /api/admin/weekly-schedule: configured hours, or the built-in
/// defaults when none have been saved yet.
pub async fn get_weekly_schedule(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<WeeklySchedule>>, AppError> {
    let weekly = state
        .store
        .get_weekly_schedule()
        .await?
        .unwrap_or(FALLBACK_WEEKLY_SCHEDULE);
    Ok(Json(ApiResponse::success(weekly)))
}

/// PUT /api/admin/weekly-schedule: replace all seven days at once.
pub async fn put_weekly_schedule(
    State(state): State<Arc<AppState>>,
    Json(body): Json<WeeklySchedule>,
) -> Result<Json<ApiResponse<WeeklySchedule>>, AppError> {
    if let Some(dow) = body.days.iter().position(|d| !d.is_consistent()) {
        return Err(AppError::BadRequest(format!(
            "day {} opens at or after it closes",
            dow
        )));
    }

    state.store.put_weekly_schedule(&body).await?;
    tracing::info!("weekly schedule updated");
    Ok(Json(ApiResponse::success(body)))
}

/// GET /api/admin/overrides?from=&to=
pub async fn list_overrides(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RangeQuery>,
) -> Result<Json<ApiResponse<Vec<DateOverride>>>, AppError> {
    check_range(query.from, query.to)?;
    let overrides = state.store.get_override_range(query.from, query.to).await?;
    Ok(Json(ApiResponse::success(overrides)))
}

/// PUT /api/admin/overrides/{date}: merge the given fields into the
/// date's override. Fields left out keep their stored value.
///
/// The merged override, laid over the weekly hours, must leave an open day
/// with `open_time` before `close_time`.
pub async fn put_override(
    State(state): State<Arc<AppState>>,
    Path(date): Path<NaiveDate>,
    Json(body): Json<OverrideFields>,
) -> Result<Json<ApiResponse<DateOverride>>, AppError> {
    let stored = state.store.get_override(date).await?;
    let weekly = state.store.get_weekly_schedule().await?;
    let merged = DateOverride {
        date,
        fields: stored
            .map(|o| o.fields)
            .unwrap_or_default()
            .merged_with(body.clone()),
    };
    let status = resolve_day(date, weekly.as_ref(), Some(&merged));
    if !status.is_closed && status.open_time >= status.close_time {
        return Err(AppError::BadRequest(format!(
            "open_time {} must be before close_time {}",
            status.open_time, status.close_time
        )));
    }

    let saved = state.store.save_override(date, body).await?;
    tracing::info!(%date, "date override saved");
    Ok(Json(ApiResponse::success(saved)))
}

/// DELETE /api/admin/overrides/{date}: back to weekly hours.
pub async fn delete_override(
    State(state): State<Arc<AppState>>,
    Path(date): Path<NaiveDate>,
) -> Result<Json<ApiResponse<()>>, AppError> {
    if !state.store.delete_override(date).await? {
        return Err(AppError::NotFound("No override for this date".into()));
    }
    tracing::info!(%date, "date override removed");
    Ok(Json(ApiResponse::success(())))
}

// ── Services ──

/// GET /api/admin/services: all services, inactive included.
pub async fn list_all_services(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<Service>>>, AppError> {
    let services = state.store.list_services(false).await?;
    Ok(Json(ApiResponse::success(services)))
}

pub async fn create_service(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateServiceRequest>,
) -> Result<Json<ApiResponse<Service>>, AppError> {
    if body.name.trim().is_empty() {
        return Err(AppError::BadRequest("name is required".into()));
    }
    check_duration(body.duration_min)?;

    let service = state.store.create_service(&body).await?;
    Ok(Json(ApiResponse::success(service)))
}

/// PUT /api/admin/services/{id}: partial update. Existing bookings keep
/// the duration they were made with.
pub async fn update_service(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateServiceRequest>,
) -> Result<Json<ApiResponse<Service>>, AppError> {
    if let Some(minutes) = body.duration_min {
        check_duration(minutes)?;
    }

    let service = state
        .store
        .update_service(id, &body)
        .await?
        .ok_or_else(|| AppError::NotFound("Service not found".into()))?;
    Ok(Json(ApiResponse::success(service)))
}

// ── Bookings ──

/// GET /api/admin/bookings?date= | ?from=&to=
///
/// A single date lists every booking, cancelled ones included. A range
/// lists only bookings still holding their slot.
pub async fn list_bookings(
    State(state): State<Arc<AppState>>,
    Query(query): Query<BookingsQuery>,
) -> Result<Json<ApiResponse<Vec<Booking>>>, AppError> {
    let bookings = match (query.date, query.from, query.to) {
        (Some(date), None, None) => state.store.get_bookings_for_date(date).await?,
        (None, Some(from), Some(to)) => {
            check_range(from, to)?;
            state.store.bookings_between(from, to).await?
        }
        _ => {
            return Err(AppError::BadRequest(
                "pass either 'date' or both 'from' and 'to'".into(),
            ))
        }
    };
    Ok(Json(ApiResponse::success(bookings)))
}

/// POST /api/admin/bookings/{id}/status
pub async fn update_booking_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateBookingStatusRequest>,
) -> Result<Json<ApiResponse<Booking>>, AppError> {
    let booking = state
        .store
        .update_booking_status(id, body.status)
        .await?
        .ok_or_else(|| AppError::NotFound("Booking not found".into()))?;

    tracing::info!(booking_id = id, status = %booking.status, "booking status changed by admin");
    Ok(Json(ApiResponse::success(booking)))
}
