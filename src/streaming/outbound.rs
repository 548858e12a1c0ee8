//! Outbound Event Pump
//!
//! Drains the session's outbound queue into the connection and keeps the
//! connection alive with ping frames while it is idle.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::messages::OutboundEvent;
use super::transport::{FrameSink, OutboundFrame};

/// Why the outbound pump stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboundExit {
    /// The shared scope was cancelled
    Cancelled,
    /// The producer side of the queue went away
    QueueClosed,
    /// Writing an event or a ping failed
    WriteFailed,
}

/// Write queued events and keepalive pings until cancelled or a write
/// fails. Hands the sink back so the caller can close it.
///
/// Every successful event write pushes the next ping a full `keepalive`
/// interval into the future.
pub async fn run_outbound<K: FrameSink>(
    mut sink: K,
    mut queue: mpsc::Receiver<OutboundEvent>,
    keepalive: Duration,
    cancel: CancellationToken,
) -> (K, OutboundExit) {
    let mut pinger = time::interval_at(Instant::now() + keepalive, keepalive);
    pinger.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let exit = loop {
        let frame = tokio::select! {
            biased;
            _ = cancel.cancelled() => break OutboundExit::Cancelled,
            event = queue.recv() => match event {
                Some(event) => {
                    tracing::trace!(event = %event.event, "writing message to websocket");
                    match serde_json::to_string(&event) {
                        Ok(text) => OutboundFrame::Text(text),
                        Err(e) => {
                            tracing::warn!(error = %e, "failed to encode event, skipping");
                            continue;
                        }
                    }
                }
                None => break OutboundExit::QueueClosed,
            },
            _ = pinger.tick() => {
                tracing::trace!("writing ping control message to websocket");
                OutboundFrame::Ping
            }
        };

        let is_ping = frame == OutboundFrame::Ping;

        // A stalled peer must not hold the pump past cancellation.
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => break OutboundExit::Cancelled,
            result = sink.write_frame(frame) => result,
        };

        match result {
            Ok(()) if !is_ping => pinger.reset(),
            Ok(()) => {}
            Err(e) => {
                if is_ping {
                    tracing::debug!(error = %e, "error writing ping to websocket");
                } else {
                    tracing::debug!(error = %e, "error writing json to websocket");
                }
                break OutboundExit::WriteFailed;
            }
        }
    };

    tracing::debug!(?exit, "finished writing to websocket connection");
    (sink, exit)
}
