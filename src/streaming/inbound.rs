//! Inbound Control Pump
//!
//! Reads control frames from the client and updates the session's topic
//! set. Frames are handled strictly one at a time. Only a failed read ends
//! the pump; bad control frames are logged and skipped.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::messages::{ControlAction, ControlMessage};
use super::session::Session;
use super::transport::{FrameSource, InboundFrame, ReadError};

/// Why the inbound pump stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundExit {
    /// The shared scope was cancelled
    Cancelled,
    /// The client closed the connection normally
    PeerClosed,
    /// The connection failed unexpectedly
    Failed(ReadError),
}

/// Read frames until the scope is cancelled or a read fails.
pub async fn run_inbound<S: FrameSource>(
    mut source: S,
    session: Arc<Session>,
    cancel: CancellationToken,
) -> InboundExit {
    let exit = loop {
        let frame = tokio::select! {
            biased;
            _ = cancel.cancelled() => break InboundExit::Cancelled,
            frame = source.read_frame() => frame,
        };

        let text = match frame {
            Ok(InboundFrame::Text(text)) => text,
            Ok(InboundFrame::Binary(data)) => match String::from_utf8(data) {
                Ok(text) => text,
                Err(_) => {
                    tracing::warn!("ignoring non-UTF-8 binary frame");
                    continue;
                }
            },
            Ok(InboundFrame::Control) => continue,
            Err(e) if e.is_expected_close() => break InboundExit::PeerClosed,
            Err(e) => {
                tracing::error!(error = %e, "error reading from websocket");
                break InboundExit::Failed(e);
            }
        };

        // Client messages are rare and usually interesting.
        tracing::info!(message = %text, "received message from websocket");
        apply_control(&session, &text);
    };

    tracing::debug!(?exit, "finished reading from websocket connection");
    exit
}

/// Apply one control frame to the session's topic set.
///
/// Returns the applied message, or `None` if the frame was ignored.
pub fn apply_control(session: &Session, text: &str) -> Option<ControlMessage> {
    let msg = match ControlMessage::parse(text) {
        Ok(msg) => msg,
        Err(e) => {
            tracing::warn!(error = %e, message = %text, "ignoring control frame");
            return None;
        }
    };

    match msg.action {
        ControlAction::Subscribe => {
            session.subscribe(&msg.topic);
        }
        ControlAction::Unsubscribe => {
            session.unsubscribe(&msg.topic);
        }
    }

    tracing::debug!(topic = %msg.topic, action = ?msg.action, "updated subscriptions");
    Some(msg)
}
