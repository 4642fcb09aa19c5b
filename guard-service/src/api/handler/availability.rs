use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Serialize;
use shared::responses::ApiResponse;
use shared::types::Availability;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    api::state::GuardAppState,
    domain::availability::{
        BulkGenerateAvailability, BulkGenerationOutcome, DeclareAvailability, ResetAvailability,
    },
    error::GuardServiceError,
};

#[derive(Debug, Serialize, ToSchema)]
pub struct ResetOutcome {
    pub removed: u64,
}

#[utoipa::path(
    post,
    path = "/api/v1/tenants/{tenant_id}/members/{member_id}/availabilities",
    tag = "Availability",
    operation_id = "declare_availability",
    params(
        ("tenant_id" = Uuid, Path, description = "Tenant (fire station) ID"),
        ("member_id" = Uuid, Path, description = "Member ID")
    ),
    request_body = DeclareAvailability,
    responses(
        (status = 200, description = "Availability recorded", body = ApiResponse<Availability>),
        (status = 409, description = "Contradicts an existing entry, returned in `data`")
    )
)]
#[tracing::instrument(skip(state))]
pub async fn declare(
    State(state): State<Arc<GuardAppState>>,
    Path((tenant_id, member_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<DeclareAvailability>,
) -> Result<Json<ApiResponse<Availability>>, GuardServiceError> {
    let availability = state
        .guard_service
        .declare_availability(tenant_id, member_id, req)
        .await?;

    Ok(Json(ApiResponse::ok(availability)))
}

#[utoipa::path(
    post,
    path = "/api/v1/tenants/{tenant_id}/members/{member_id}/availabilities/generate",
    tag = "Availability",
    operation_id = "bulk_generate_availability",
    params(
        ("tenant_id" = Uuid, Path, description = "Tenant (fire station) ID"),
        ("member_id" = Uuid, Path, description = "Member ID")
    ),
    request_body = BulkGenerateAvailability,
    responses(
        (status = 200, description = "Pattern applied", body = ApiResponse<BulkGenerationOutcome>),
        (status = 409, description = "fail_fast policy hit a conflict; nothing was written")
    )
)]
#[tracing::instrument(skip(state))]
pub async fn generate(
    State(state): State<Arc<GuardAppState>>,
    Path((tenant_id, member_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<BulkGenerateAvailability>,
) -> Result<Json<ApiResponse<BulkGenerationOutcome>>, GuardServiceError> {
    let outcome = state
        .guard_service
        .bulk_generate_availability(tenant_id, member_id, req)
        .await?;

    Ok(Json(ApiResponse::ok(outcome)))
}

#[utoipa::path(
    post,
    path = "/api/v1/tenants/{tenant_id}/members/{member_id}/availabilities/reset",
    tag = "Availability",
    operation_id = "reset_availability",
    params(
        ("tenant_id" = Uuid, Path, description = "Tenant (fire station) ID"),
        ("member_id" = Uuid, Path, description = "Member ID")
    ),
    request_body = ResetAvailability,
    responses(
        (status = 200, description = "Matching entries removed", body = ApiResponse<ResetOutcome>)
    )
)]
#[tracing::instrument(skip(state))]
pub async fn reset(
    State(state): State<Arc<GuardAppState>>,
    Path((tenant_id, member_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<ResetAvailability>,
) -> Result<Json<ApiResponse<ResetOutcome>>, GuardServiceError> {
    let removed = state
        .guard_service
        .reset_availability(tenant_id, member_id, req)
        .await?;

    Ok(Json(ApiResponse::ok(ResetOutcome { removed })))
}
