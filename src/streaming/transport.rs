//! Duplex Transport Boundary
//!
//! The coordinator and pumps see an established connection only as a
//! message-oriented duplex channel: a [`FrameSource`] for the read half and a
//! [`FrameSink`] for the write half. [`WsTransport`] adapts an upgraded axum
//! websocket to that boundary.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;

/// Normal closure
pub const CLOSE_NORMAL: u16 = 1000;
/// Endpoint going away (browser tab closed, server restart)
pub const CLOSE_GOING_AWAY: u16 = 1001;
/// Close frame carried no status code
pub const CLOSE_NO_STATUS: u16 = 1005;

/// Close codes treated as a graceful disconnect (RFC 6455 section 11.7).
pub const EXPECTED_CLOSE_CODES: &[u16] = &[CLOSE_NORMAL, CLOSE_GOING_AWAY, CLOSE_NO_STATUS];

/// A data frame read from the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    Text(String),
    Binary(Vec<u8>),
    /// Ping or pong; answered by the transport itself
    Control,
}

/// A frame written to the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    Text(String),
    /// Keepalive ping with an empty payload
    Ping,
}

/// Read half of a connection
#[async_trait]
pub trait FrameSource: Send + 'static {
    /// Wait for the next frame. A close frame from the peer is reported as
    /// [`ReadError::Closed`].
    async fn read_frame(&mut self) -> Result<InboundFrame, ReadError>;
}

/// Write half of a connection
#[async_trait]
pub trait FrameSink: Send + 'static {
    async fn write_frame(&mut self, frame: OutboundFrame) -> Result<(), WriteError>;

    /// Close the underlying connection.
    async fn close(&mut self) -> Result<(), WriteError>;
}

/// An established duplex connection
pub trait Transport: Send + 'static {
    type Source: FrameSource;
    type Sink: FrameSink;

    fn split(self) -> (Self::Source, Self::Sink);
}

/// Failure reading from the connection
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReadError {
    #[error("connection closed by peer (code {code}): {reason}")]
    Closed { code: u16, reason: String },

    #[error("connection ended without a close frame")]
    Eof,

    #[error("transport read failed: {0}")]
    Transport(String),
}

impl ReadError {
    /// Whether this failure is an ordinary client departure.
    pub fn is_expected_close(&self) -> bool {
        matches!(self, ReadError::Closed { code, .. } if EXPECTED_CLOSE_CODES.contains(code))
    }
}

/// Failure writing to the connection
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("connection is closed")]
    Closed,

    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("transport write failed: {0}")]
    Transport(String),
}

/// Upgraded axum websocket
pub struct WsTransport(pub WebSocket);

impl Transport for WsTransport {
    type Source = WsSource;
    type Sink = WsSink;

    fn split(self) -> (WsSource, WsSink) {
        let (sink, stream) = self.0.split();
        (WsSource(stream), WsSink(sink))
    }
}

pub struct WsSource(SplitStream<WebSocket>);

pub struct WsSink(SplitSink<WebSocket, Message>);

#[async_trait]
impl FrameSource for WsSource {
    async fn read_frame(&mut self) -> Result<InboundFrame, ReadError> {
        match self.0.next().await {
            None => Err(ReadError::Eof),
            Some(Err(e)) => Err(ReadError::Transport(e.to_string())),
            Some(Ok(Message::Text(text))) => Ok(InboundFrame::Text(text)),
            Some(Ok(Message::Binary(data))) => Ok(InboundFrame::Binary(data)),
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => Ok(InboundFrame::Control),
            Some(Ok(Message::Close(frame))) => Err(match frame {
                Some(frame) => ReadError::Closed {
                    code: frame.code,
                    reason: frame.reason.into_owned(),
                },
                None => ReadError::Closed {
                    code: CLOSE_NO_STATUS,
                    reason: String::new(),
                },
            }),
        }
    }
}

#[async_trait]
impl FrameSink for WsSink {
    async fn write_frame(&mut self, frame: OutboundFrame) -> Result<(), WriteError> {
        let message = match frame {
            OutboundFrame::Text(text) => Message::Text(text),
            OutboundFrame::Ping => Message::Ping(Vec::new()),
        };
        self.0
            .send(message)
            .await
            .map_err(|e| WriteError::Transport(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), WriteError> {
        self.0
            .close()
            .await
            .map_err(|e| WriteError::Transport(e.to_string()))
    }
}

/// In-memory transport for driving pumps in tests
#[cfg(test)]
pub(crate) mod memory {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct Flags {
        fail_writes: AtomicBool,
        fail_close: AtomicBool,
        closes: AtomicUsize,
    }

    pub struct MemoryTransport {
        inbound: mpsc::UnboundedReceiver<Result<InboundFrame, ReadError>>,
        outbound: mpsc::UnboundedSender<OutboundFrame>,
        flags: Arc<Flags>,
    }

    /// The client's end of a [`MemoryTransport`]
    pub struct Peer {
        inbound: mpsc::UnboundedSender<Result<InboundFrame, ReadError>>,
        pub outbound: mpsc::UnboundedReceiver<OutboundFrame>,
        flags: Arc<Flags>,
    }

    pub fn pair() -> (MemoryTransport, Peer) {
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let flags = Arc::new(Flags::default());

        (
            MemoryTransport {
                inbound: in_rx,
                outbound: out_tx,
                flags: Arc::clone(&flags),
            },
            Peer {
                inbound: in_tx,
                outbound: out_rx,
                flags,
            },
        )
    }

    impl Peer {
        pub fn send_text(&self, text: &str) {
            self.push(Ok(InboundFrame::Text(text.to_string())));
        }

        pub fn push(&self, frame: Result<InboundFrame, ReadError>) {
            let _ = self.inbound.send(frame);
        }

        /// Send a close frame with `code`.
        pub fn close_with(&self, code: u16) {
            self.push(Err(ReadError::Closed {
                code,
                reason: String::new(),
            }));
        }

        /// Make every following write fail.
        pub fn fail_writes(&self) {
            self.flags.fail_writes.store(true, Ordering::SeqCst);
        }

        pub fn fail_close(&self) {
            self.flags.fail_close.store(true, Ordering::SeqCst);
        }

        /// Number of times the server closed the transport.
        pub fn closes(&self) -> usize {
            self.flags.closes.load(Ordering::SeqCst)
        }

        /// Drain every frame written so far.
        pub fn written(&mut self) -> Vec<OutboundFrame> {
            let mut frames = Vec::new();
            while let Ok(frame) = self.outbound.try_recv() {
                frames.push(frame);
            }
            frames
        }
    }

    pub struct MemorySource {
        inbound: mpsc::UnboundedReceiver<Result<InboundFrame, ReadError>>,
    }

    pub struct MemorySink {
        outbound: mpsc::UnboundedSender<OutboundFrame>,
        flags: Arc<Flags>,
    }

    impl Transport for MemoryTransport {
        type Source = MemorySource;
        type Sink = MemorySink;

        fn split(self) -> (MemorySource, MemorySink) {
            (
                MemorySource {
                    inbound: self.inbound,
                },
                MemorySink {
                    outbound: self.outbound,
                    flags: self.flags,
                },
            )
        }
    }

    #[async_trait]
    impl FrameSource for MemorySource {
        async fn read_frame(&mut self) -> Result<InboundFrame, ReadError> {
            self.inbound.recv().await.unwrap_or(Err(ReadError::Eof))
        }
    }

    #[async_trait]
    impl FrameSink for MemorySink {
        async fn write_frame(&mut self, frame: OutboundFrame) -> Result<(), WriteError> {
            if self.flags.fail_writes.load(Ordering::SeqCst) {
                return Err(WriteError::Closed);
            }
            self.outbound.send(frame).map_err(|_| WriteError::Closed)
        }

        async fn close(&mut self) -> Result<(), WriteError> {
            self.flags.closes.fetch_add(1, Ordering::SeqCst);
            if self.flags.fail_close.load(Ordering::SeqCst) {
                return Err(WriteError::Transport("close failed".to_string()));
            }
            Ok(())
        }
    }
}
