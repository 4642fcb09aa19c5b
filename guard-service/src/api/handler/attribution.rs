use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
};
use chrono::Utc;
use shared::responses::ApiResponse;
use uuid::Uuid;

use crate::{
    api::state::GuardAppState,
    domain::attribution::{AttributionReport, RunAttribution},
    error::GuardServiceError,
};

#[utoipa::path(
    post,
    path = "/api/v1/tenants/{tenant_id}/attribution-runs",
    tag = "Attribution",
    operation_id = "run_attribution",
    params(
        ("tenant_id" = Uuid, Path, description = "Tenant (fire station) ID")
    ),
    request_body = RunAttribution,
    responses(
        (
            status = 200,
            description = "Run completed, or skipped when attribution is disabled",
            body = ApiResponse<AttributionReport>
        ),
        (status = 400, description = "Invalid date range"),
        (status = 409, description = "Another run holds an overlapping range"),
        (status = 502, description = "Roster service failure")
    )
)]
#[tracing::instrument(skip(state))]
pub async fn run_attribution(
    State(state): State<Arc<GuardAppState>>,
    Path(tenant_id): Path<Uuid>,
    Json(req): Json<RunAttribution>,
) -> Result<Json<ApiResponse<AttributionReport>>, GuardServiceError> {
    let report = state
        .guard_service
        .run_attribution(tenant_id, req, Utc::now())
        .await?;

    Ok(Json(ApiResponse::ok(report)))
}
