use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use shared::responses::ApiResponse;
use shared::types::{Assignment, Availability, ReplacementStatus};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

/// The existing record a rejected write collided with. Returned to the caller
/// untouched so they can decide to skip, replace or merge.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(tag = "kind", content = "existing", rename_all = "snake_case")]
pub enum ConflictingRecord {
    Availability(Box<Availability>),
    Assignment(Box<Assignment>),
}

impl fmt::Display for ConflictingRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Availability(a) => write!(
                f,
                "overlaps {:?} availability {} on {}",
                a.status, a.id, a.date
            ),
            Self::Assignment(a) => write!(
                f,
                "overlaps assignment {} on {} ({}-{})",
                a.id, a.date, a.start_time, a.end_time
            ),
        }
    }
}

/// Application-level errors for the guard service.
///
/// Each variant maps to an HTTP status code via the [`IntoResponse`] implementation.
#[derive(Debug, Error)]
pub enum GuardServiceError {
    /// Requested resource was not found.
    #[error("Not Found: {0}")]
    NotFound(String),

    /// Client sent an invalid request.
    #[error("Bad Request: {0}")]
    BadRequest(String),

    /// Write overlaps an existing availability or assignment.
    #[error("Conflict: {0}")]
    Conflict(ConflictingRecord),

    /// Another attribution run holds an overlapping range for this tenant.
    #[error("Attribution already running for tenant {tenant_id} over {from}..={to}")]
    RunLockHeld {
        tenant_id: Uuid,
        from: chrono::NaiveDate,
        to: chrono::NaiveDate,
    },

    /// Transition requested on a request that already moved on.
    #[error("Replacement request {request_id} is {status:?}: {detail}")]
    StaleStateTransition {
        request_id: Uuid,
        status: ReplacementStatus,
        detail: String,
    },

    /// Unexpected internal failure.
    #[error("Internal Server Error: {0}")]
    Internal(String),

    /// Database query or connection error.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    /// Roster service returned a non-success response.
    #[error("Roster Service Error: {0}")]
    Roster(String),

    /// Roster service is unreachable after retries (connection-level failure).
    #[error("Roster Service unavailable: {0}")]
    RosterUnavailable(String),

    /// Circuit breaker is open; upstream calls are being fast-failed.
    #[error("Circuit breaker is open - {0} unavailable")]
    CircuitOpen(&'static str),

    /// Notification dispatcher refused or could not take the offer.
    #[error("Notification Error: {0}")]
    Notification(String),
}

impl GuardServiceError {
    /// Connectivity failures that should not be treated as a bad request or a
    /// broken record.
    pub fn is_upstream_outage(&self) -> bool {
        matches!(self, Self::CircuitOpen(_) | Self::RosterUnavailable(_))
    }
}

impl IntoResponse for GuardServiceError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) | Self::RunLockHeld { .. } | Self::StaleStateTransition { .. } => {
                StatusCode::CONFLICT
            }
            Self::Internal(_) | Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Roster(_) | Self::RosterUnavailable(_) | Self::Notification(_) => {
                StatusCode::BAD_GATEWAY
            }
            Self::CircuitOpen(_) => StatusCode::SERVICE_UNAVAILABLE,
        };

        if status.is_server_error() {
            tracing::error!(error = %self, %status, "Server error");
        } else {
            tracing::warn!(error = %self, %status, "Client error");
        }

        let message = match self {
            Self::Conflict(record) => {
                let message = format!("Conflict: {record}");
                let body = ApiResponse::err_with(record, message);
                return (status, axum::Json(body)).into_response();
            }
            Self::Database(_) => {
                "Oof, Something went wrong while accessing the database.".to_owned()
            }
            Self::CircuitOpen(upstream) => {
                format!("{upstream} is currently unavailable, please try again later")
            }
            other => other.to_string(),
        };

        let body = ApiResponse::<()>::err(message);
        (status, axum::Json(body)).into_response()
    }
}
