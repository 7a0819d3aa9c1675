use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::{active_service, check_range};
use crate::error::AppError;
use crate::models::*;
use crate::scheduling::{
    available_start_times, is_date_bookable, BookingAttempt, BookingError, SlotCheck,
};
use crate::store::BookingStore;
use crate::AppState;

// ── Catalogue & schedule ──

/// GET /api/services: active services in display order.
pub async fn list_services(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<Service>>>, AppError> {
    let services = state.store.list_services(true).await?;
    Ok(Json(ApiResponse::success(services)))
}

/// GET /api/schedule/day?date=YYYY-MM-DD[&service_id=N]: effective hours,
/// plus whether the date is bookable for the service when one is given.
pub async fn schedule_day(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DayQuery>,
) -> Result<Json<ApiResponse<DayResponse>>, AppError> {
    let status = state.schedule.effective_day(query.date).await;

    let check = match query.service_id {
        Some(service_id) => {
            let snapshot = active_service(&state, service_id).await?;
            Some(is_date_bookable(
                &status,
                snapshot.duration_min,
                state.clock.now(),
            ))
        }
        None => None,
    };

    Ok(Json(ApiResponse::success(DayResponse { status, check })))
}

/// GET /api/schedule/range?from=&to=: effective hours for every date in
/// the inclusive range.
pub async fn schedule_range(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RangeQuery>,
) -> Result<Json<ApiResponse<BTreeMap<NaiveDate, EffectiveDayStatus>>>, AppError> {
    check_range(query.from, query.to)?;
    let days = state.schedule.effective_range(query.from, query.to).await;
    Ok(Json(ApiResponse::success(days)))
}

/// GET /api/available-times?date=&service_id=: start times a customer can
/// pick right now.
pub async fn available_times(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AvailableTimesQuery>,
) -> Result<Json<ApiResponse<AvailableTimesResponse>>, AppError> {
    let duration = active_service(&state, query.service_id).await?.duration_min;
    let status = state.schedule.effective_day(query.date).await;
    let now = state.clock.now();

    let check = is_date_bookable(&status, duration, now);
    if let Some(reason) = check.reason {
        return Ok(Json(ApiResponse::success(AvailableTimesResponse {
            date: query.date,
            service_duration: duration,
            times: vec![],
            reason: Some(reason.to_string()),
        })));
    }

    // Display only; the commit path re-reads and re-checks before writing.
    let bookings = state
        .store
        .get_bookings_for_date(query.date)
        .await
        .unwrap_or_else(|e| {
            tracing::warn!(date = %query.date, "available_times: bookings unavailable: {:#}", e);
            vec![]
        });

    Ok(Json(ApiResponse::success(AvailableTimesResponse {
        date: query.date,
        service_duration: duration,
        times: available_start_times(&status, duration, &bookings, now),
        reason: None,
    })))
}

/// POST /api/slots/validate: whether a start time fits the date's hours.
/// Does not look at existing bookings.
pub async fn validate_slot(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ValidateSlotRequest>,
) -> Result<Json<ApiResponse<SlotCheck>>, AppError> {
    let service = active_service(&state, body.service_id).await?;
    let status = state.schedule.effective_day(body.date).await;
    let now = state.clock.now();

    let mut attempt = BookingAttempt::new(String::new(), service);
    attempt.select_date(status, now)?;
    let check = match attempt.select_time(body.time, now) {
        Ok(check) => check,
        Err(BookingError::Validation(reason)) => SlotCheck {
            valid: false,
            reason: Some(reason),
        },
        Err(e) => return Err(e.into()),
    };

    Ok(Json(ApiResponse::success(check)))
}

// ── Bookings ──

/// POST /api/bookings: run one booking attempt end to end.
pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Booking>>), AppError> {
    let customer_id = body.customer_id.trim();
    if customer_id.is_empty() {
        return Err(AppError::BadRequest("customer_id is required".into()));
    }

    let service = active_service(&state, body.service_id).await?;
    let status = state.schedule.effective_day(body.date).await;
    let now = state.clock.now();

    let mut attempt = BookingAttempt::new(customer_id, service);
    attempt
        .select_date(status, now)?
        .into_result()
        .map_err(AppError::Rejected)?;
    attempt
        .select_time(body.time, now)?
        .into_result()
        .map_err(AppError::Rejected)?;

    let mut result = attempt
        .submit(&state.store, state.clock.as_ref(), state.policy)
        .await;
    if let Err(BookingError::Write(_)) = &result {
        // One more try for a failed write; the re-fetch and checks run again.
        attempt.retry(state.clock.now())?;
        result = attempt
            .submit(&state.store, state.clock.as_ref(), state.policy)
            .await;
    }

    match result {
        Ok(booking) => Ok((StatusCode::CREATED, Json(ApiResponse::success(booking)))),
        Err(e @ BookingError::Conflict) => Err(AppError::SlotTaken {
            message: e.to_string(),
            available_times: attempt.regenerated_times(state.clock.now()),
        }),
        Err(e) => Err(e.into()),
    }
}

/// GET /api/bookings?customer_id=: one customer's bookings, oldest first.
pub async fn my_bookings(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CustomerBookingsQuery>,
) -> Result<Json<ApiResponse<Vec<Booking>>>, AppError> {
    let bookings = state.store.bookings_for_customer(&query.customer_id).await?;
    Ok(Json(ApiResponse::success(bookings)))
}

/// POST /api/bookings/{id}/cancel: customer cancels their own booking.
pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<CancelBookingRequest>,
) -> Result<Json<ApiResponse<Booking>>, AppError> {
    let booking = state
        .store
        .get_booking(id)
        .await?
        .filter(|b| b.customer_id == body.customer_id)
        .ok_or_else(|| AppError::NotFound("Booking not found".into()))?;

    if matches!(
        booking.status,
        BookingStatus::Cancelled | BookingStatus::Completed
    ) {
        return Err(AppError::BadRequest(format!(
            "Booking is already {}",
            booking.status
        )));
    }

    let cancelled = state
        .store
        .update_booking_status(id, BookingStatus::Cancelled)
        .await?
        .ok_or_else(|| AppError::NotFound("Booking not found".into()))?;

    tracing::info!(booking_id = id, date = %cancelled.date, time = %cancelled.time, "booking cancelled by customer");
    Ok(Json(ApiResponse::success(cancelled)))
}
