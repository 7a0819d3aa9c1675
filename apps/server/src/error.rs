use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::models::ApiResponse;
use crate::scheduling::{BookingError, ClockTime, Rejection};

/// Errors returned by HTTP handlers, rendered as the `ApiResponse` envelope.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    /// The date or time fails the scheduling rules.
    #[error("{0}")]
    Rejected(Rejection),
    /// Someone else got the slot first. Carries the start times still open.
    #[error("{message}")]
    SlotTaken {
        message: String,
        available_times: Vec<ClockTime>,
    },
    #[error("{0}")]
    Unavailable(String),
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Rejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::SlotTaken { .. } => StatusCode::CONFLICT,
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        tracing::error!("database error: {}", e);
        AppError::Internal("DB error".into())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(e: anyhow::Error) -> Self {
        tracing::error!("store error: {:#}", e);
        AppError::Internal("DB error".into())
    }
}

impl From<BookingError> for AppError {
    fn from(e: BookingError) -> Self {
        match e {
            BookingError::Validation(reason) => AppError::Rejected(reason),
            BookingError::Conflict => AppError::SlotTaken {
                message: e.to_string(),
                available_times: Vec::new(),
            },
            BookingError::Infrastructure(_) => AppError::Unavailable(e.to_string()),
            BookingError::Write(_) => AppError::Internal(e.to_string()),
            BookingError::InvalidTransition { .. } => {
                tracing::error!("booking attempt misuse: {}", e);
                AppError::Internal(e.to_string())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            AppError::SlotTaken {
                message,
                available_times,
            } => {
                let body = ApiResponse {
                    ok: false,
                    data: Some(available_times),
                    error: Some(message),
                };
                (status, Json(body)).into_response()
            }
            other => (status, Json(ApiResponse::<()>::error(other.to_string()))).into_response(),
        }
    }
}
