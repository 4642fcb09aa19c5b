use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
};
use shared::responses::ApiResponse;
use shared::types::AttributionParameters;
use uuid::Uuid;

use crate::{api::state::GuardAppState, error::GuardServiceError};

#[utoipa::path(
    get,
    path = "/api/v1/tenants/{tenant_id}/parameters",
    tag = "Parameters",
    operation_id = "get_parameters",
    params(
        ("tenant_id" = Uuid, Path, description = "Tenant (fire station) ID")
    ),
    responses(
        (
            status = 200,
            description = "Tenant parameters",
            body = ApiResponse<AttributionParameters>
        ),
        (status = 404, description = "Tenant has no parameters; automatic attribution is disabled")
    )
)]
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<GuardAppState>>,
    Path(tenant_id): Path<Uuid>,
) -> Result<Json<ApiResponse<AttributionParameters>>, GuardServiceError> {
    let params = state.guard_service.get_parameters(tenant_id).await?;

    Ok(Json(ApiResponse::ok(params)))
}

#[utoipa::path(
    put,
    path = "/api/v1/tenants/{tenant_id}/parameters",
    tag = "Parameters",
    operation_id = "put_parameters",
    params(
        ("tenant_id" = Uuid, Path, description = "Tenant (fire station) ID")
    ),
    request_body = AttributionParameters,
    responses(
        (status = 200, description = "Parameters saved", body = ApiResponse<AttributionParameters>),
        (status = 400, description = "Invalid parameters")
    )
)]
#[tracing::instrument(skip(state))]
pub async fn put(
    State(state): State<Arc<GuardAppState>>,
    Path(tenant_id): Path<Uuid>,
    Json(req): Json<AttributionParameters>,
) -> Result<Json<ApiResponse<AttributionParameters>>, GuardServiceError> {
    let params = state.guard_service.put_parameters(tenant_id, req).await?;

    Ok(Json(ApiResponse::ok(params)))
}
