//! Event parser for raw provider payloads

use serde::Deserialize;

use super::events::{ProviderEvent, StatusEvent};
use crate::error::ProviderError;

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RawEvent {
    Delta { text: String },
    Status { event: StatusEvent },
    TurnComplete,
    Error { message: String },
}

/// Parse a JSON value into a typed provider event
///
/// Accepts `{"type":"delta","text":..}`, `{"type":"turn_complete"}`,
/// `{"type":"error","message":..}`, `{"type":"status","event":{..}}`, and
/// status events given directly (`{"type":"tool_started","name":..}`).
///
/// # Errors
/// Returns `ProviderError::Protocol` if the value matches none of the shapes
pub fn parse_event(data: serde_json::Value) -> Result<ProviderEvent, ProviderError> {
    match RawEvent::deserialize(&data) {
        Ok(RawEvent::Delta { text }) => return Ok(ProviderEvent::Delta(text)),
        Ok(RawEvent::Status { event }) => return Ok(ProviderEvent::Status(event)),
        Ok(RawEvent::TurnComplete) => return Ok(ProviderEvent::TurnComplete),
        Ok(RawEvent::Error { message }) => return Ok(ProviderEvent::Error(message)),
        Err(_) => {}
    }

    StatusEvent::deserialize(&data)
        .map(ProviderEvent::Status)
        .map_err(|e| ProviderError::protocol(format!("Failed to parse provider event: {e}: {data}")))
}
