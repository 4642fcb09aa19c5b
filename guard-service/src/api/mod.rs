use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};

use crate::api::handler::{assignment, attribution, availability, parameters, replacement};
use crate::api::state::GuardAppState;

pub mod handler;
pub mod state;

/// Versioned API routes. Middleware, docs and the health route are added by
/// the binary.
pub fn routes(state: Arc<GuardAppState>) -> Router {
    Router::new()
        .route(
            "/api/v1/tenants/{tenant_id}/attribution-runs",
            post(attribution::run_attribution),
        )
        .route(
            "/api/v1/tenants/{tenant_id}/assignments",
            get(assignment::list).post(assignment::create),
        )
        .route(
            "/api/v1/tenants/{tenant_id}/assignments/{id}/cancel",
            post(assignment::cancel),
        )
        .route(
            "/api/v1/tenants/{tenant_id}/members/{member_id}/availabilities",
            post(availability::declare),
        )
        .route(
            "/api/v1/tenants/{tenant_id}/members/{member_id}/availabilities/generate",
            post(availability::generate),
        )
        .route(
            "/api/v1/tenants/{tenant_id}/members/{member_id}/availabilities/reset",
            post(availability::reset),
        )
        .route(
            "/api/v1/tenants/{tenant_id}/replacements",
            get(replacement::list).post(replacement::flag_gap),
        )
        .route(
            "/api/v1/tenants/{tenant_id}/replacements/{id}",
            get(replacement::get),
        )
        .route(
            "/api/v1/tenants/{tenant_id}/replacements/{id}/accept",
            post(replacement::accept),
        )
        .route(
            "/api/v1/tenants/{tenant_id}/replacements/{id}/decline",
            post(replacement::decline),
        )
        .route(
            "/api/v1/tenants/{tenant_id}/replacements/{id}/expire",
            post(replacement::expire),
        )
        .route(
            "/api/v1/tenants/{tenant_id}/replacements/{id}/cancel",
            post(replacement::cancel),
        )
        .route(
            "/api/v1/tenants/{tenant_id}/parameters",
            get(parameters::get).put(parameters::put),
        )
        .with_state(state)
}
