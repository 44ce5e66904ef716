//! RefAI relay
//!
//! One endpoint: accept a conversation, prepend the rules system prompt,
//! forward it to the AI gateway with streaming on, and pipe the SSE body back
//! untouched. The relay keeps no state between requests and performs no
//! authorization of its own.

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{header, HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use refai_core::{ChatRequest, ErrorBody, GatewayClient, RelayError, RELAY_PATH};
use std::sync::Arc;
use tracing::{error, info};

const CORS_ALLOW_HEADERS: &str = "authorization, x-client-info, apikey, content-type";

/// Shared by every request
pub struct RelayState {
    pub gateway: GatewayClient,
}

pub fn router(state: RelayState) -> Router {
    Router::new()
        .route(RELAY_PATH, post(basketball_chat).options(preflight))
        .route("/health", get(|| async { "ok" }))
        .with_state(Arc::new(state))
}

fn cors_headers() -> [(HeaderName, &'static str); 2] {
    [
        (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
        (header::ACCESS_CONTROL_ALLOW_HEADERS, CORS_ALLOW_HEADERS),
    ]
}

async fn preflight() -> impl IntoResponse {
    (StatusCode::OK, cors_headers())
}

fn error_response(err: &RelayError) -> Response {
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = ErrorBody {
        error: err.public_message(),
    };
    (status, cors_headers(), Json(body)).into_response()
}

async fn basketball_chat(State(state): State<Arc<RelayState>>, body: Bytes) -> Response {
    let request: ChatRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            error!("Basketball chat error: {}", e);
            return error_response(&RelayError::InvalidRequest(e.to_string()));
        }
    };

    info!("Relaying conversation of {} messages", request.messages.len());
    let upstream = match state.gateway.stream_chat(&request.messages).await {
        Ok(upstream) => upstream,
        Err(e) => {
            // Gateway status errors are logged with their body by the client
            if matches!(e, RelayError::MissingCredential(_) | RelayError::Transport(_)) {
                error!("Basketball chat error: {}", e);
            }
            return error_response(&e);
        }
    };

    let mut response = (
        StatusCode::OK,
        cors_headers(),
        Body::from_stream(upstream.bytes_stream()),
    )
        .into_response();
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("text/event-stream"),
    );
    response
}
