//! Live Event Streaming
//!
//! Delivers a live stream of events to one client over an upgraded
//! websocket, while the client adjusts its subscriptions in-band.
//!
//! ## Architecture
//!
//! - **Session**: per-connection state (topic set, outbound queue, hangup)
//! - **Hub**: opens sessions and feeds their outbound queues
//! - **Coordinator**: runs the inbound and outbound pumps of one connection
//!   under a shared cancellation scope and tears everything down
//! - **Messages**: event frames and control frames
//!
//! ## Control protocol
//!
//! Once connected, a client may send:
//!
//! ```json
//! {"type": "subscribe", "stream": "list", "list": "01H3YF48G8B7KTPQFS8D2QBVG8"}
//! {"type": "unsubscribe", "stream": "public:local"}
//! ```
//!
//! The server writes events as `{"event": ..., "payload": ..., "stream": [...]}`
//! and pings the client after every idle keepalive interval.

mod coordinator;
mod hub;
mod inbound;
mod messages;
mod outbound;
mod request;
mod session;
mod topic;
mod transport;

pub use coordinator::{Coordinator, Teardown};
pub use hub::{Hub, HubConfig, HubError, MemoryHub};
pub use inbound::{apply_control, run_inbound, InboundExit};
pub use messages::{ControlAction, ControlError, ControlMessage, OutboundEvent};
pub use outbound::{run_outbound, OutboundExit};
pub use request::{RequestError, StreamQuery, ACCESS_TOKEN_QUERY_KEY};
pub use session::{EnqueueError, Hangup, OverflowPolicy, QueueConfig, Session, SessionId};
pub use topic::{is_status_timeline, topic_key, Timeline, STATUS_TIMELINES};
pub use transport::{
    FrameSink, FrameSource, InboundFrame, OutboundFrame, ReadError, Transport, WriteError,
    WsSink, WsSource, WsTransport, EXPECTED_CLOSE_CODES,
};
