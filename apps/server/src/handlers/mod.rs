pub mod admin;
pub mod client;
pub mod health;

use chrono::NaiveDate;

use crate::error::AppError;
use crate::models::{service_duration, ServiceSnapshot};
use crate::AppState;

/// Longest date range a single schedule or override query may span.
pub const MAX_RANGE_DAYS: i64 = 92;

/// Reject inverted or oversized `[from, to]` ranges.
pub(crate) fn check_range(from: NaiveDate, to: NaiveDate) -> Result<(), AppError> {
    if to < from {
        return Err(AppError::BadRequest("'to' must not be before 'from'".into()));
    }
    if (to - from).num_days() + 1 > MAX_RANGE_DAYS {
        return Err(AppError::BadRequest(format!(
            "date range may span at most {} days",
            MAX_RANGE_DAYS
        )));
    }
    Ok(())
}

/// The active service `id`, frozen for one booking attempt.
pub(crate) async fn active_service(state: &AppState, id: i64) -> Result<ServiceSnapshot, AppError> {
    let service = state
        .store
        .get_active_service(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Service not found".into()))?;
    ServiceSnapshot::try_from(&service).map_err(|e| {
        tracing::error!(service_id = id, "stored service is unusable: {}", e);
        AppError::Internal(e.to_string())
    })
}

/// Reject durations the scheduling rules cannot represent.
pub(crate) fn check_duration(minutes: i64) -> Result<(), AppError> {
    service_duration(minutes)
        .map(|_| ())
        .map_err(|e| AppError::BadRequest(e.to_string()))
}
