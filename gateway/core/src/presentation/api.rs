// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{
        sse::{Event, KeepAlive},
        IntoResponse, Response, Sse,
    },
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tokio_stream::StreamExt;

use crate::application::session_service::{HandshakeError, SessionHub};
use crate::domain::credential::AuthenticationError;
use crate::domain::gateway_config::HttpConfig;
use crate::domain::session::{CloseReason, SessionId, TransportError};
use crate::infrastructure::jsonrpc;

pub struct AppState {
    pub hub: Arc<SessionHub>,
    pub messages_path: String,
}

/// SSE session transport:
///
/// - `GET {sse_path}` performs the handshake and streams replies. The first
///   event is `endpoint`, whose data is the URL to POST messages to.
/// - `POST {messages_path}?session_id=` submits one JSON-RPC frame (202).
/// - `DELETE {messages_path}?session_id=` closes the session (204).
pub fn app(hub: Arc<SessionHub>, http: &HttpConfig) -> Router {
    let state = Arc::new(AppState {
        hub,
        messages_path: http.messages_path.clone(),
    });

    let mut router = Router::new()
        .route(&http.sse_path, get(open_stream))
        .route(&http.messages_path, post(post_message).delete(close_session));

    let trimmed = http.messages_path.trim_end_matches('/');
    if !trimmed.is_empty() && trimmed != http.messages_path {
        router = router.route(trimmed, post(post_message).delete(close_session));
    }

    router.with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    pub session_id: Option<String>,
}

async fn open_stream(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let opened = match state.hub.handshake(authorization(&headers)) {
        Ok(opened) => opened,
        Err(HandshakeError::Authentication(e)) => return ApiError::Unauthorized(e).into_response(),
        Err(HandshakeError::ShuttingDown) => return ApiError::Unavailable.into_response(),
        Err(HandshakeError::Transport(e)) => return ApiError::from(e).into_response(),
    };

    let endpoint = format!("{}?session_id={}", state.messages_path, opened.id);

    // The session lives as long as the stream; a dropped connection closes it.
    let messages = opened.into_stream().map(|reply| {
        Ok::<_, Infallible>(
            Event::default()
                .event("message")
                .data(jsonrpc::encode(&reply).to_string()),
        )
    });

    let stream = tokio_stream::once(Ok::<_, Infallible>(
        Event::default().event("endpoint").data(endpoint),
    ))
    .chain(messages);

    Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
}

async fn post_message(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SessionQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let credential = state
        .hub
        .authenticate(authorization(&headers))
        .map_err(ApiError::Unauthorized)?;
    let session_id = parse_session_id(&query)?;

    match jsonrpc::decode(&body) {
        Ok(message) => {
            state.hub.submit(session_id, &credential.id, message).await?;
            Ok(StatusCode::ACCEPTED)
        }
        Err(TransportError::ProtocolViolation(detail)) => {
            state
                .hub
                .close(
                    session_id,
                    &credential.id,
                    CloseReason::ProtocolViolation(detail.clone()),
                )
                .await?;
            Err(ApiError::ProtocolViolation(detail))
        }
        Err(e) => Err(e.into()),
    }
}

async fn close_session(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SessionQuery>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let credential = state
        .hub
        .authenticate(authorization(&headers))
        .map_err(ApiError::Unauthorized)?;
    let session_id = parse_session_id(&query)?;

    state
        .hub
        .close(session_id, &credential.id, CloseReason::ClientRequested)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

fn authorization(headers: &HeaderMap) -> Option<&str> {
    headers.get(AUTHORIZATION).and_then(|value| value.to_str().ok())
}

fn parse_session_id(query: &SessionQuery) -> Result<SessionId, ApiError> {
    let raw = query
        .session_id
        .as_deref()
        .ok_or_else(|| ApiError::BadRequest("session_id is required".to_string()))?;
    SessionId::parse(raw).ok_or_else(|| ApiError::BadRequest("Invalid session ID".to_string()))
}

#[derive(Debug)]
pub enum ApiError {
    Unauthorized(AuthenticationError),
    BadRequest(String),
    SessionNotFound,
    SessionClosed,
    ProtocolViolation(String),
    Unavailable,
    Internal(String),
}

impl From<TransportError> for ApiError {
    fn from(error: TransportError) -> Self {
        match error {
            TransportError::SessionNotFound => Self::SessionNotFound,
            TransportError::StreamClosed => Self::SessionClosed,
            TransportError::ProtocolViolation(detail) => Self::ProtocolViolation(detail),
            other @ TransportError::InvalidTransition { .. } => Self::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Unauthorized(AuthenticationError::Unknown) => {
                (StatusCode::UNAUTHORIZED, "Invalid API key".to_string())
            }
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            Self::SessionNotFound => (StatusCode::NOT_FOUND, "Session not found".to_string()),
            Self::SessionClosed => (StatusCode::GONE, "Session closed".to_string()),
            Self::ProtocolViolation(detail) => {
                (StatusCode::BAD_REQUEST, format!("Protocol violation: {detail}"))
            }
            Self::Unavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Server is shutting down".to_string(),
            ),
            Self::Internal(detail) => {
                tracing::error!("Internal transport error: {}", detail);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal error".to_string())
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
