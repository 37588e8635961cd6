use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

use crate::client::JSON_CONTENT_TYPE;
use crate::runtime::ForwardError;
use crate::server::state::ManagerState;

const REQUEST_ID_HEADER: &str = "x-request-id";
const MAX_REQUEST_ID_LEN: usize = 128;

/// Error body returned when a walk fails
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<usize>,
}

/// Health check endpoint
pub async fn health() -> impl IntoResponse {
    StatusCode::OK
}

/// Forward the inbound body through the whole chain
pub async fn forward(
    State(state): State<ManagerState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    // Keep the caller's request ID if it is usable, otherwise generate one
    let request_id = headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty() && s.len() <= MAX_REQUEST_ID_LEN)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let result = state
        .forwarder
        .forward(body, &request_id, state.shutdown.clone())
        .await;

    let mut response = match result {
        Ok(payload) => {
            info!("[{}] forwarded through {} stages", request_id, state.chain().len());
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, JSON_CONTENT_TYPE)],
                payload,
            )
                .into_response()
        }
        Err(e) => {
            warn!("[{}] {}", request_id, e);
            error_response(&e)
        }
    };

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Map a forwarding failure to a status and JSON error body
pub fn error_response(err: &ForwardError) -> Response {
    let status = match err {
        ForwardError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::BAD_GATEWAY,
    };
    let body = ErrorBody {
        error: err.to_string(),
        kind: err.kind(),
        stage: err.stage(),
    };
    (status, Json(body)).into_response()
}

/// Create the manager router
pub fn create_router(state: ManagerState) -> Router {
    let limit = state.max_payload_bytes;
    Router::new()
        .route("/", post(forward))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
