//! # System API
//!
//! Health check and specialist discovery.

use axum::{extract::State, Json};
use pharos_core::specialists::SpecialistKind;
use serde::Serialize;
use utoipa::ToSchema;

use super::SharedState;

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SpecialistInfo {
    /// Stable id used in `status` events
    pub id: String,
    pub name: String,
    /// Effective per-call deadline
    pub timeout_secs: u64,
    /// Model the specialist's reasoning runs on
    pub model: String,
}

/// Liveness check
#[utoipa::path(
    get,
    path = "/api/v1/health",
    tag = "system",
    responses(
        (status = 200, description = "Server is up", body = HealthResponse)
    )
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// List the specialists the planner can choose from
#[utoipa::path(
    get,
    path = "/api/v1/specialists",
    tag = "system",
    responses(
        (status = 200, description = "Specialists in canonical order", body = Vec<SpecialistInfo>)
    )
)]
pub async fn list_specialists(State(state): State<SharedState>) -> Json<Vec<SpecialistInfo>> {
    let specialists = SpecialistKind::all()
        .into_iter()
        .map(|kind| SpecialistInfo {
            id: kind.id().to_string(),
            name: kind.display_name().to_string(),
            timeout_secs: state.config.timeout_for(kind).as_secs(),
            model: state.config.model_config_for(kind).model,
        })
        .collect();
    Json(specialists)
}
