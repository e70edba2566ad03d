//! # HTTP API
//!
//! Axum routes over the [`Coordinator`]. Streaming answers go out as SSE;
//! everything else is plain JSON.

pub mod agent;
pub mod system;

use axum::{
    body::Body,
    http::{header, Response, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use pharos_core::{Coordinator, OrchestratorConfig};
use std::sync::Arc;
use utoipa::OpenApi;

use crate::error::ApiError;

/// Application state
pub struct AppState {
    pub coordinator: Coordinator,
    pub config: OrchestratorConfig,
}

pub type SharedState = Arc<AppState>;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Pharos API",
        version = "1.0.0",
        description = "Plans specialist lookups for a question and streams one synthesized answer"
    ),
    paths(
        agent::stream_answer,
        agent::chat,
        system::health,
        system::list_specialists
    ),
    components(
        schemas(
            agent::AgentRequest,
            agent::ChatResponse,
            system::HealthResponse,
            system::SpecialistInfo,
            ApiError
        )
    ),
    tags(
        (name = "agent", description = "Question answering"),
        (name = "system", description = "Health and discovery")
    )
)]
pub struct ApiDoc;

async fn serve_openapi() -> impl IntoResponse {
    match ApiDoc::openapi().to_json() {
        Ok(doc) => Response::builder()
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(doc))
            .unwrap_or_default(),
        Err(e) => {
            tracing::error!(error = %e, "failed to render OpenAPI document");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Build the full router.
pub fn router(state: SharedState) -> Router {
    let agent_routes = Router::new()
        .route("/stream", post(agent::stream_answer))
        .route("/chat", post(agent::chat));

    Router::new()
        .nest("/api/v1/agent", agent_routes)
        .route("/api/v1/health", get(system::health))
        .route("/api/v1/specialists", get(system::list_specialists))
        .route("/api/v1/openapi.json", get(serve_openapi))
        .with_state(state)
}
