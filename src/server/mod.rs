//! Inbound HTTP endpoint: one agent loop run per request, streamed back as
//! newline-delimited JSON frames.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::{info, warn};

use crate::agent_loop::{AgentLoop, ChatRequest};
use crate::downstream;
use crate::error::Result;
use crate::types::{ConversationTurn, GenerationSettings};

/// Header carrying the already-authenticated caller identity.
pub const CALLER_ID_HEADER: &str = "x-caller-id";

pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

const FRAME_BUFFER: usize = 64;

/// Body of `POST /v1/chat`.
#[derive(Debug, Deserialize)]
pub struct ChatPayload {
    pub conversation_id: String,
    pub messages: Vec<ConversationTurn>,
    #[serde(default)]
    pub settings: Option<GenerationSettings>,
}

#[derive(Clone)]
pub struct AppState {
    agent: AgentLoop,
}

impl AppState {
    pub fn new(agent: AgentLoop) -> Self {
        Self { agent }
    }
}

pub fn router(agent: AgentLoop) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/chat", post(chat))
        .with_state(AppState::new(agent))
}

/// Bind `addr` and serve until the process is stopped.
pub async fn serve(agent: AgentLoop, addr: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "listening");
    axum::serve(listener, router(agent)).await?;
    Ok(())
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ChatPayload>,
) -> std::result::Result<Response, AppError> {
    if payload.messages.is_empty() {
        return Err(AppError::BadRequest("messages must not be empty".into()));
    }
    if payload.conversation_id.trim().is_empty() {
        return Err(AppError::BadRequest("conversation_id must not be empty".into()));
    }

    let mut request = ChatRequest::new(payload.conversation_id, payload.messages);
    if let Some(caller) = headers
        .get(CALLER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
    {
        request = request.with_caller(caller);
    }
    if let Some(settings) = payload.settings {
        request = request.with_settings(settings);
    }

    let (sink, frames) = downstream::channel(FRAME_BUFFER);
    let agent = state.agent.clone();
    tokio::spawn(async move {
        agent.run(request, sink).await;
    });

    let body = ReceiverStream::new(frames).map(|frame| Ok::<_, Infallible>(frame.to_line()));
    Ok((
        [(header::CONTENT_TYPE, NDJSON_CONTENT_TYPE)],
        Body::from_stream(body),
    )
        .into_response())
}

#[derive(Debug)]
enum AppError {
    BadRequest(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::BadRequest(message) => {
                warn!(error = %message, "rejected chat request");
                (
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({ "error": message })),
                )
                    .into_response()
            }
        }
    }
}
