//! Streaming Message Types
//!
//! Wire types exchanged over an open streaming connection: the event frames
//! written to the client and the control frames read from it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use super::topic::{is_status_timeline, topic_key};

/// An event delivered to the client.
///
/// Produced by the hub and written to the connection unmodified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundEvent {
    /// Type of event (e.g. `update`, `notification`, `delete`)
    pub event: String,
    /// Event payload, usually a JSON document encoded as a string
    pub payload: String,
    /// Topic keys this event belongs to
    pub stream: Vec<String>,
}

impl OutboundEvent {
    pub fn new(event: impl Into<String>, payload: impl Into<String>, stream: Vec<String>) -> Self {
        Self {
            event: event.into(),
            payload: payload.into(),
            stream,
        }
    }
}

/// What a control frame asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    Subscribe,
    Unsubscribe,
}

/// A parsed and validated control frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlMessage {
    pub action: ControlAction,
    /// Topic key, including the `list` qualifier when one was given
    pub topic: String,
}

impl ControlMessage {
    /// Parse a control frame of the form
    /// `{"type": "subscribe"|"unsubscribe", "stream": <timeline>, "list": <id>}`.
    ///
    /// Only timelines from the status vocabulary are accepted.
    pub fn parse(text: &str) -> Result<Self, ControlError> {
        let fields: HashMap<String, String> = serde_json::from_str(text)?;

        let kind = fields.get("type").ok_or(ControlError::MissingType)?;
        let stream = fields.get("stream").ok_or(ControlError::MissingStream)?;

        if !is_status_timeline(stream) {
            return Err(ControlError::UnknownStream(stream.clone()));
        }

        let topic = topic_key(stream, fields.get("list").map(String::as_str));

        let action = match kind.as_str() {
            "subscribe" => ControlAction::Subscribe,
            "unsubscribe" => ControlAction::Unsubscribe,
            other => return Err(ControlError::UnknownType(other.to_string())),
        };

        Ok(Self { action, topic })
    }
}

/// Reasons a control frame is ignored
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("control frame is not a JSON object of strings: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("'type' field not provided")]
    MissingType,

    #[error("'stream' field not provided")]
    MissingStream,

    #[error("unknown 'stream' field: {0}")]
    UnknownStream(String),

    #[error("invalid 'type' field: {0}")]
    UnknownType(String),
}
