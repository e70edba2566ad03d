//! # Agent API
//!
//! Streaming and non-streaming question answering.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::stream::{Stream, StreamExt};
use pharos_core::swarm::{AnswerReport, ErrorPayload, StatusEntry};
use pharos_core::Query;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use utoipa::ToSchema;

use super::SharedState;
use crate::error::{ApiError, AppError};

#[derive(Debug, Deserialize, ToSchema)]
pub struct AgentRequest {
    /// The question to answer
    pub query: String,
    /// Opaque id echoed into logs
    #[serde(default)]
    pub conversation_id: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ChatResponse {
    /// Assembled answer text, partial when `error` is set
    pub response: String,
    /// Last known state of each dispatched specialist
    #[schema(value_type = Vec<Object>)]
    pub statuses: Vec<StatusEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub error: Option<ErrorPayload>,
}

impl From<AnswerReport> for ChatResponse {
    fn from(report: AnswerReport) -> Self {
        Self {
            response: report.text,
            statuses: report.statuses,
            error: report.error,
        }
    }
}

/// Stream an answer as server-sent events
///
/// Each event's data is one JSON object with a `type` of `chunk`, `status`,
/// `error`, or `done`. Closing the connection cancels the request.
#[utoipa::path(
    post,
    path = "/api/v1/agent/stream",
    tag = "agent",
    request_body = AgentRequest,
    responses(
        (status = 200, description = "Event stream", content_type = "text/event-stream", body = String),
        (status = 400, description = "Malformed or empty query", body = ApiError)
    )
)]
pub async fn stream_answer(
    State(state): State<SharedState>,
    payload: Result<Json<AgentRequest>, JsonRejection>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let Json(request) = payload?;
    let stream = state
        .coordinator
        .stream_text(&request.query, request.conversation_id)?;

    let events = stream.map(|event| {
        let json = serde_json::to_string(&event).unwrap_or_default();
        Ok(Event::default().data(json))
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

/// Answer a question in one response
#[utoipa::path(
    post,
    path = "/api/v1/agent/chat",
    tag = "agent",
    request_body = AgentRequest,
    responses(
        (status = 200, description = "Completed answer", body = ChatResponse),
        (status = 400, description = "Malformed or empty query", body = ApiError),
        (status = 500, description = "The request failed; partial text is included", body = ChatResponse)
    )
)]
pub async fn chat(
    State(state): State<SharedState>,
    payload: Result<Json<AgentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ChatResponse>), AppError> {
    let Json(request) = payload?;
    let query = Query::new(request.query)?.with_conversation(request.conversation_id);

    let report = state.coordinator.answer(query).await;
    let status = if report.is_success() {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    Ok((status, Json(report.into())))
}

#[cfg(test)]
mod tests {
    use super::super::testing::app;
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn post(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_chat_returns_assembled_answer() {
        let response = app(vec!["Market ", "is growing."], false)
            .oneshot(post(
                "/api/v1/agent/chat",
                json!({"query": "What is the market size for metformin?"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["response"], "Market is growing.");
        assert!(body.get("error").is_none());
        let statuses = body["statuses"].as_array().unwrap();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0]["specialist"], "market_intelligence");
        assert_eq!(statuses[0]["state"], "succeeded");
    }

    #[tokio::test]
    async fn test_chat_failure_keeps_partial_text() {
        let response = app(vec!["Partial"], true)
            .oneshot(post(
                "/api/v1/agent/chat",
                json!({"query": "Patent expiry for metformin"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_json(response).await;
        assert_eq!(body["response"], "Partial");
        assert_eq!(body["error"]["kind"], "SynthesisFailure");
    }

    #[tokio::test]
    async fn test_empty_query_is_rejected() {
        let response = app(vec!["unused"], false)
            .oneshot(post("/api/v1/agent/chat", json!({"query": "   "})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        assert_eq!(body["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn test_malformed_json_is_rejected() {
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/agent/stream")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{\"query\":"))
            .unwrap();
        let response = app(vec!["unused"], false).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_stream_rejects_invalid_query_before_opening() {
        let response = app(vec!["unused"], false)
            .oneshot(post("/api/v1/agent/stream", json!({"query": ""})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_ne!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/event-stream"
        );
    }

    #[tokio::test]
    async fn test_stream_emits_events_then_done() {
        let response = app(vec!["Trials ", "are recruiting."], false)
            .oneshot(post(
                "/api/v1/agent/stream",
                json!({"query": "Which phase 3 trials are recruiting?"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/event-stream"
        );

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        let events: Vec<Value> = text
            .lines()
            .filter_map(|line| line.strip_prefix("data: "))
            .map(|data| serde_json::from_str(data).unwrap())
            .collect();

        let types: Vec<&str> = events.iter().map(|e| e["type"].as_str().unwrap()).collect();
        assert_eq!(types, vec!["status", "status", "chunk", "chunk", "done"]);
        assert_eq!(events[0]["specialist"], "clinical_trials");
        assert_eq!(events[0]["state"], "started");
        assert_eq!(events[2]["text"], "Trials ");
    }
}
