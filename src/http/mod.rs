//! HTTP API server for the browser recorder
//!
//! This module provides:
//! - GET /api/v1/ws - WebSocket for live audio relay
//! - POST /api/v1/readability - Streamed readability rewrite
//! - POST /api/v1/correctness - Streamed fact check
//! - POST /api/v1/ask_ai - One-shot answer
//! - GET /health - Health check
//! - / - Static recorder page

mod handlers;
mod routes;
mod state;

pub use handlers::{AskAiResponse, ErrorResponse, TextRequest};
pub use routes::create_router;
pub use state::AppState;
