//! HTTP surface.
//!
//! # Endpoints
//!
//! - `POST /call` - Run the tutoring pipeline, streams `text/plain`
//! - `GET /sessions/:id` - Session with all of its exchanges
//! - `GET /messages/:id` - One message with its analysis and response
//! - `GET /health` - Liveness probe
//!
//! The resolved session id is returned in the `X-Session-ID` header of
//! every `/call` response so a client without one learns the new id.

use crate::error::TutorError;
use crate::models::{Exchange, Session};
use crate::pipeline::{Orchestrator, TutorRequest};
use axum::{
    body::Body,
    extract::{rejection::JsonRejection, Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, error};

/// Header carrying the resolved session id.
pub const SESSION_HEADER: &str = "x-session-id";

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

/// Request body for `POST /call`.
#[derive(Debug, Clone, Deserialize)]
pub struct CallRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    /// Only used when a new session is created.
    #[serde(default)]
    pub student_id: Option<i64>,
    pub question: String,
    pub code: String,
}

/// Response body for `GET /sessions/:id`.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionHistory {
    pub session: Session,
    pub exchanges: Vec<Exchange>,
}

/// Error body returned on failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
}

#[derive(Debug)]
enum ApiError {
    /// Body could not be parsed into a [`CallRequest`].
    Malformed(String),
    Pipeline(TutorError),
}

impl From<TutorError> for ApiError {
    fn from(e: TutorError) -> Self {
        ApiError::Pipeline(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            ApiError::Malformed(detail) => (StatusCode::UNPROCESSABLE_ENTITY, detail),
            ApiError::Pipeline(e) => (e.status_code(), e.to_string()),
        };

        (status, Json(ErrorResponse { detail })).into_response()
    }
}

/// Creates the HTTP router with all endpoints.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/call", post(call))
        .route("/sessions/:id", get(session_history))
        .route("/messages/:id", get(message_exchange))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn call(
    State(state): State<AppState>,
    body: Result<Json<CallRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = body.map_err(|e| ApiError::Malformed(e.body_text()))?;
    debug!(
        "POST /call (session: {})",
        body.session_id.as_deref().unwrap_or("new")
    );

    let reply = state
        .orchestrator
        .handle_request(TutorRequest {
            session_id: body.session_id,
            student_id: body.student_id,
            code: body.code,
            question: body.question,
        })
        .await?;
    debug!(
        "Streaming reply to message {} (session: {})",
        reply.message_id, reply.session_id
    );

    let session_header = HeaderValue::from_str(&reply.session_id)
        .map_err(|e| TutorError::Store(format!("session id is not a valid header: {}", e)))?;

    let delivery = reply.delivery;
    tokio::spawn(async move {
        if let Err(e) = delivery.await {
            error!("Delivery task panicked: {}", e);
        }
    });

    let mut response = Response::new(Body::from_stream(reply.body));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    headers.insert(SESSION_HEADER, session_header);

    Ok(response)
}

async fn session_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionHistory>, ApiError> {
    let store = state.orchestrator.store();
    let session = store.get_session(&id).await?;
    let exchanges = store.history(&id).await?;
    Ok(Json(SessionHistory { session, exchanges }))
}

async fn message_exchange(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Exchange>, ApiError> {
    let exchange = state.orchestrator.store().exchange(id).await?;
    Ok(Json(exchange))
}

async fn health() -> &'static str {
    "ok"
}
