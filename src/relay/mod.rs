//! Per-client relay sessions
//!
//! This module provides the `RelaySession` state machine that manages:
//! - Recording lifecycle (start/stop control messages from the browser)
//! - Resampling client audio and forwarding it upstream in arrival order
//! - Tracking in-flight audio sends so commit never overtakes audio
//! - Fanning upstream response events back to the client
//!
//! `connection::serve_socket` wires one accepted WebSocket to one session.

mod config;
pub mod connection;
pub mod messages;
mod pending;
mod session;
mod state;

pub use config::RelaySettings;
pub use connection::serve_socket;
pub use messages::{ClientMessage, RecorderStatus, ServerEvent};
pub use pending::{FlushOutcome, PendingAudioOps, PendingTicket};
pub use session::{AudioDisposition, RelaySession};
pub use state::ConnectionState;
