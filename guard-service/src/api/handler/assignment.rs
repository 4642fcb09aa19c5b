use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use shared::responses::ApiResponse;
use shared::types::{Assignment, ReplacementRequest};
use utoipa::IntoParams;
use uuid::Uuid;

use crate::{
    api::state::GuardAppState,
    domain::assignment::{CancelAssignment, CreateManualAssignment},
    error::GuardServiceError,
};

#[derive(Debug, Deserialize, IntoParams)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

#[utoipa::path(
    get,
    path = "/api/v1/tenants/{tenant_id}/assignments",
    tag = "Assignments",
    operation_id = "list_assignments",
    params(
        ("tenant_id" = Uuid, Path, description = "Tenant (fire station) ID"),
        DateRange
    ),
    responses(
        (
            status = 200,
            description = "Assignments in the range",
            body = ApiResponse<Vec<Assignment>>
        )
    )
)]
#[tracing::instrument(skip(state))]
pub async fn list(
    State(state): State<Arc<GuardAppState>>,
    Path(tenant_id): Path<Uuid>,
    Query(range): Query<DateRange>,
) -> Result<Json<ApiResponse<Vec<Assignment>>>, GuardServiceError> {
    let assignments = state
        .guard_service
        .list_assignments(tenant_id, range.from, range.to)
        .await?;

    Ok(Json(ApiResponse::ok(assignments)))
}

#[utoipa::path(
    post,
    path = "/api/v1/tenants/{tenant_id}/assignments",
    tag = "Assignments",
    operation_id = "create_manual_assignment",
    params(
        ("tenant_id" = Uuid, Path, description = "Tenant (fire station) ID")
    ),
    request_body = CreateManualAssignment,
    responses(
        (status = 200, description = "Assignment created", body = ApiResponse<Assignment>),
        (status = 404, description = "Unknown member or guard type"),
        (status = 409, description = "Member already holds an overlapping guard")
    )
)]
#[tracing::instrument(skip(state))]
pub async fn create(
    State(state): State<Arc<GuardAppState>>,
    Path(tenant_id): Path<Uuid>,
    Json(req): Json<CreateManualAssignment>,
) -> Result<Json<ApiResponse<Assignment>>, GuardServiceError> {
    let assignment = state
        .guard_service
        .create_manual_assignment(tenant_id, req)
        .await?;

    Ok(Json(ApiResponse::ok(assignment)))
}

#[utoipa::path(
    post,
    path = "/api/v1/tenants/{tenant_id}/assignments/{id}/cancel",
    tag = "Assignments",
    operation_id = "cancel_assignment",
    params(
        ("tenant_id" = Uuid, Path, description = "Tenant (fire station) ID"),
        ("id" = Uuid, Path, description = "Assignment ID")
    ),
    request_body = CancelAssignment,
    responses(
        (
            status = 200,
            description = "Assignment released, with the replacement request if one opened",
            body = ApiResponse<Option<ReplacementRequest>>
        ),
        (status = 404, description = "Assignment not found")
    )
)]
#[tracing::instrument(skip(state))]
pub async fn cancel(
    State(state): State<Arc<GuardAppState>>,
    Path((tenant_id, id)): Path<(Uuid, Uuid)>,
    Json(req): Json<CancelAssignment>,
) -> Result<Json<ApiResponse<Option<ReplacementRequest>>>, GuardServiceError> {
    let request = state
        .guard_service
        .cancel_assignment(tenant_id, id, req.reason, req.find_replacement, Utc::now())
        .await?;

    Ok(Json(ApiResponse::ok(request)))
}
