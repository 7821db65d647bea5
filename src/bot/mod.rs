/// Bot commands and `/relay` argument validation
pub mod command;
/// Dispatcher endpoints
pub mod handlers;
/// Telegram API calls with retry
pub mod resilient;
/// Shared state handed to the endpoints
pub mod state;
/// Batch status message rendering
pub mod status;

pub use command::{parse_relay_request, Command, Rejection};
pub use state::{AcceptedRelay, AppState, BatchRunner, RelayDecision};
