use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use shared::responses::ApiResponse;
use serde::Deserialize;
use shared::types::{ReplacementRequest, ReplacementStatus};
use utoipa::IntoParams;
use uuid::Uuid;

use crate::{
    api::state::GuardAppState,
    domain::replacement::{CandidateAnswer, FlagGap},
    error::GuardServiceError,
};

#[derive(Debug, Deserialize, IntoParams)]
pub struct ReplacementFilter {
    /// Only requests in this status, e.g. `expired` for the ones waiting on
    /// manual resolution. Defaults to the open requests.
    pub status: Option<ReplacementStatus>,
}

#[utoipa::path(
    post,
    path = "/api/v1/tenants/{tenant_id}/replacements",
    tag = "Replacements",
    operation_id = "flag_gap",
    params(
        ("tenant_id" = Uuid, Path, description = "Tenant (fire station) ID")
    ),
    request_body = FlagGap,
    responses(
        (
            status = 202,
            description = "Request opened; candidates are contacted in the background",
            body = ApiResponse<ReplacementRequest>
        ),
        (status = 404, description = "Unknown guard type")
    )
)]
#[tracing::instrument(skip(state))]
pub async fn flag_gap(
    State(state): State<Arc<GuardAppState>>,
    Path(tenant_id): Path<Uuid>,
    Json(req): Json<FlagGap>,
) -> Result<impl IntoResponse, GuardServiceError> {
    let request = state.escalation.flag_gap(tenant_id, req, Utc::now()).await?;

    Ok((StatusCode::ACCEPTED, Json(ApiResponse::ok(request))))
}

#[utoipa::path(
    get,
    path = "/api/v1/tenants/{tenant_id}/replacements",
    tag = "Replacements",
    operation_id = "list_replacements",
    params(
        ("tenant_id" = Uuid, Path, description = "Tenant (fire station) ID"),
        ReplacementFilter
    ),
    responses(
        (
            status = 200,
            description = "Requests in the given status, open ones by default",
            body = ApiResponse<Vec<ReplacementRequest>>
        )
    )
)]
#[tracing::instrument(skip(state))]
pub async fn list(
    State(state): State<Arc<GuardAppState>>,
    Path(tenant_id): Path<Uuid>,
    Query(filter): Query<ReplacementFilter>,
) -> Result<Json<ApiResponse<Vec<ReplacementRequest>>>, GuardServiceError> {
    let requests = state.escalation.list(tenant_id, filter.status).await?;

    Ok(Json(ApiResponse::ok(requests)))
}

#[utoipa::path(
    get,
    path = "/api/v1/tenants/{tenant_id}/replacements/{id}",
    tag = "Replacements",
    operation_id = "get_replacement",
    params(
        ("tenant_id" = Uuid, Path, description = "Tenant (fire station) ID"),
        ("id" = Uuid, Path, description = "Replacement request ID")
    ),
    responses(
        (status = 200, description = "Replacement request", body = ApiResponse<ReplacementRequest>),
        (status = 404, description = "Replacement request not found")
    )
)]
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<GuardAppState>>,
    Path((tenant_id, id)): Path<(Uuid, Uuid)>,
) -> Result<Json<ApiResponse<ReplacementRequest>>, GuardServiceError> {
    let request = state.escalation.get(tenant_id, id).await?;

    Ok(Json(ApiResponse::ok(request)))
}

#[utoipa::path(
    post,
    path = "/api/v1/tenants/{tenant_id}/replacements/{id}/accept",
    tag = "Replacements",
    operation_id = "accept_replacement",
    params(
        ("tenant_id" = Uuid, Path, description = "Tenant (fire station) ID"),
        ("id" = Uuid, Path, description = "Replacement request ID")
    ),
    request_body = CandidateAnswer,
    responses(
        (
            status = 200,
            description = "Offer accepted and guard booked",
            body = ApiResponse<ReplacementRequest>
        ),
        (
            status = 409,
            description = "Request already closed, no outstanding offer or a double booking"
        )
    )
)]
#[tracing::instrument(skip(state))]
pub async fn accept(
    State(state): State<Arc<GuardAppState>>,
    Path((tenant_id, id)): Path<(Uuid, Uuid)>,
    Json(req): Json<CandidateAnswer>,
) -> Result<Json<ApiResponse<ReplacementRequest>>, GuardServiceError> {
    let request = state
        .escalation
        .accept(tenant_id, id, req.member_id, Utc::now())
        .await?;

    Ok(Json(ApiResponse::ok(request)))
}

#[utoipa::path(
    post,
    path = "/api/v1/tenants/{tenant_id}/replacements/{id}/decline",
    tag = "Replacements",
    operation_id = "decline_replacement",
    params(
        ("tenant_id" = Uuid, Path, description = "Tenant (fire station) ID"),
        ("id" = Uuid, Path, description = "Replacement request ID")
    ),
    request_body = CandidateAnswer,
    responses(
        (
            status = 200,
            description = "Refusal recorded; the freed offer moves to the next candidate",
            body = ApiResponse<ReplacementRequest>
        ),
        (status = 409, description = "Request already closed or no outstanding offer")
    )
)]
#[tracing::instrument(skip(state))]
pub async fn decline(
    State(state): State<Arc<GuardAppState>>,
    Path((tenant_id, id)): Path<(Uuid, Uuid)>,
    Json(req): Json<CandidateAnswer>,
) -> Result<Json<ApiResponse<ReplacementRequest>>, GuardServiceError> {
    let request = state
        .escalation
        .decline(tenant_id, id, req.member_id, Utc::now())
        .await?;

    Ok(Json(ApiResponse::ok(request)))
}

#[utoipa::path(
    post,
    path = "/api/v1/tenants/{tenant_id}/replacements/{id}/expire",
    tag = "Replacements",
    operation_id = "expire_replacement",
    params(
        ("tenant_id" = Uuid, Path, description = "Tenant (fire station) ID"),
        ("id" = Uuid, Path, description = "Replacement request ID")
    ),
    responses(
        (status = 200, description = "Request expired", body = ApiResponse<ReplacementRequest>),
        (status = 409, description = "Request already closed")
    )
)]
#[tracing::instrument(skip(state))]
pub async fn expire(
    State(state): State<Arc<GuardAppState>>,
    Path((tenant_id, id)): Path<(Uuid, Uuid)>,
) -> Result<Json<ApiResponse<ReplacementRequest>>, GuardServiceError> {
    let request = state
        .escalation
        .force_expire(tenant_id, id, Utc::now())
        .await?;

    Ok(Json(ApiResponse::ok(request)))
}

#[utoipa::path(
    post,
    path = "/api/v1/tenants/{tenant_id}/replacements/{id}/cancel",
    tag = "Replacements",
    operation_id = "cancel_replacement",
    params(
        ("tenant_id" = Uuid, Path, description = "Tenant (fire station) ID"),
        ("id" = Uuid, Path, description = "Replacement request ID")
    ),
    responses(
        (status = 200, description = "Request cancelled", body = ApiResponse<ReplacementRequest>),
        (status = 409, description = "Request already closed")
    )
)]
#[tracing::instrument(skip(state))]
pub async fn cancel(
    State(state): State<Arc<GuardAppState>>,
    Path((tenant_id, id)): Path<(Uuid, Uuid)>,
) -> Result<Json<ApiResponse<ReplacementRequest>>, GuardServiceError> {
    let request = state.escalation.cancel(tenant_id, id, Utc::now()).await?;

    Ok(Json(ApiResponse::ok(request)))
}
