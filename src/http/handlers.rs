use super::state::AppState;
use crate::completion::prompts;
use crate::relay::serve_socket;
use axum::{
    body::Body,
    extract::{ws::WebSocketUpgrade, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

// ============================================================================
// Request/Response Types
// ============================================================================

/// Body of every text endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct TextRequest {
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AskAiResponse {
    pub answer: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn internal_error(message: String) -> Response {
    error!("{}", message);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse { error: message }),
    )
        .into_response()
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/v1/ws
/// Upgrade to the live audio relay socket
pub async fn relay_socket(
    State(state): State<AppState>,
    upgrade: WebSocketUpgrade,
) -> impl IntoResponse {
    let connector = state.connector.clone();
    let settings = state.relay.clone();
    upgrade.on_upgrade(move |socket| serve_socket(socket, connector, settings))
}

/// POST /api/v1/readability
/// Stream a readability rewrite of the text
pub async fn enhance_readability(
    State(state): State<AppState>,
    Json(req): Json<TextRequest>,
) -> Response {
    let model = state.completion.readability_model.clone();
    stream_completion(&state, req, prompts::READABILITY_ENHANCE, &model).await
}

/// POST /api/v1/correctness
/// Stream a fact check of the text
pub async fn check_correctness(
    State(state): State<AppState>,
    Json(req): Json<TextRequest>,
) -> Response {
    let model = state.completion.correctness_model.clone();
    stream_completion(&state, req, prompts::CORRECTNESS_CHECK, &model).await
}

async fn stream_completion(state: &AppState, req: TextRequest, prompt: &str, model: &str) -> Response {
    info!("Streaming completion with {} ({} chars)", model, req.text.len());

    match state.completer.complete_stream(&req.text, prompt, model).await {
        Ok(stream) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            Body::from_stream(stream),
        )
            .into_response(),
        Err(e) => internal_error(format!("Completion failed: {}", e)),
    }
}

/// POST /api/v1/ask_ai
/// One-shot answer to the text
pub async fn ask_ai(State(state): State<AppState>, Json(req): Json<TextRequest>) -> Response {
    let model = &state.completion.ask_model;
    info!("Asking {} ({} chars)", model, req.text.len());

    match state
        .completer
        .complete(&req.text, prompts::ASK_AI, model)
        .await
    {
        Ok(answer) => (StatusCode::OK, Json(AskAiResponse { answer })).into_response(),
        Err(e) => internal_error(format!("Ask AI failed: {}", e)),
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}
