//! Connection Lifecycle Coordinator
//!
//! Runs one streaming connection from upgrade to teardown:
//!
//! 1. Creates a cancellation scope for the connection, as a child of the
//!    session's eviction token
//! 2. Spawns the inbound and outbound pumps; each holds a drop guard that
//!    cancels the scope when the pump returns or unwinds
//! 3. Waits for the scope to be cancelled, then joins both pumps
//! 4. Closes the transport and finally the session's hangup
//!
//! Nothing that happens after the upgrade escapes the session; every
//! failure resolves into teardown.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::inbound::{run_inbound, InboundExit};
use super::outbound::{run_outbound, OutboundExit};
use super::session::Session;
use super::transport::{FrameSink, Transport};
use crate::auth::Account;

/// Upper bound on the close handshake during teardown.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Shortest keepalive interval accepted.
const MIN_KEEPALIVE: Duration = Duration::from_millis(10);

/// How a connection ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Teardown {
    /// `None` if the inbound pump panicked
    pub inbound: Option<InboundExit>,
    /// `None` if the outbound pump panicked
    pub outbound: Option<OutboundExit>,
    /// Whether this teardown was the one that closed the hangup
    pub hangup_closed: bool,
}

/// Drives streaming connections
#[derive(Debug, Clone)]
pub struct Coordinator {
    keepalive: Duration,
}

impl Coordinator {
    /// Create a coordinator pinging idle connections every `keepalive`.
    pub fn new(keepalive: Duration) -> Self {
        Self {
            keepalive: keepalive.max(MIN_KEEPALIVE),
        }
    }

    pub fn keepalive(&self) -> Duration {
        self.keepalive
    }

    /// Run a connection until either side stops. Resolves only once the
    /// transport is closed and the hangup is signalled.
    pub async fn run<T: Transport>(
        &self,
        account: &Account,
        transport: T,
        session: Arc<Session>,
    ) -> Teardown {
        let span = tracing::info_span!(
            "stream",
            username = %account.username,
            stream_id = %session.id()
        );
        self.run_connection(transport, session).instrument(span).await
    }

    /// Release a session whose connection never got established, so the
    /// hub stops enqueueing for it.
    pub fn abandon(&self, session: &Session) -> bool {
        let closed = session.hangup().close();
        if closed {
            tracing::info!(stream_id = %session.id(), "abandoned stream before upgrade");
        }
        closed
    }

    async fn run_connection<T: Transport>(&self, transport: T, session: Arc<Session>) -> Teardown {
        let Some(queue) = session.take_receiver() else {
            tracing::error!("stream session is already attached to a connection");
            return Teardown {
                inbound: None,
                outbound: None,
                hangup_closed: false,
            };
        };

        let scope = session.eviction_token().child_token();
        let (source, sink) = transport.split();

        tracing::info!("opened websocket connection");

        let inbound = {
            let guard = scope.clone().drop_guard();
            let session = Arc::clone(&session);
            let cancel = scope.clone();
            tokio::spawn(
                async move {
                    let _guard = guard;
                    run_inbound(source, session, cancel).await
                }
                .in_current_span(),
            )
        };

        let outbound = {
            let guard = scope.clone().drop_guard();
            let keepalive = self.keepalive;
            let cancel = scope.clone();
            tokio::spawn(
                async move {
                    let _guard = guard;
                    run_outbound(sink, queue, keepalive, cancel).await
                }
                .in_current_span(),
            )
        };

        // Either pump exiting (or the hub evicting us) lands here.
        scope.cancelled().await;
        if session.is_evicted() {
            tracing::info!("stream evicted by hub");
        }

        let inbound = match inbound.await {
            Ok(exit) => Some(exit),
            Err(e) => {
                tracing::error!(error = %e, "inbound pump panicked");
                None
            }
        };

        let (sink, outbound) = match outbound.await {
            Ok((sink, exit)) => (Some(sink), Some(exit)),
            Err(e) => {
                tracing::error!(error = %e, "outbound pump panicked");
                (None, None)
            }
        };

        if let Some(sink) = sink {
            close_sink(sink).await;
        }

        // Tell the hub to stop sending us messages.
        let hangup_closed = session.hangup().close();
        if !hangup_closed {
            tracing::warn!("hangup was already closed");
        }

        tracing::info!(
            ?inbound,
            ?outbound,
            opened_at = %session.opened_at(),
            connected_secs = session.connected_secs(),
            "closed websocket connection"
        );

        Teardown {
            inbound,
            outbound,
            hangup_closed,
        }
    }
}

async fn close_sink<K: FrameSink>(mut sink: K) {
    match tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(error = %e, "error closing websocket connection"),
        Err(_) => tracing::debug!("timed out closing websocket connection"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::messages::OutboundEvent;
    use crate::streaming::session::{EnqueueError, QueueConfig};
    use crate::streaming::transport::memory;
    use crate::streaming::transport::{OutboundFrame, ReadError, CLOSE_NORMAL};

    const KEEPALIVE: Duration = Duration::from_secs(30);

    fn account() -> Account {
        Account::new("01ACC", "alice")
    }

    fn session() -> Arc<Session> {
        Arc::new(Session::new(account(), "public", QueueConfig::default()))
    }

    fn event(n: usize) -> OutboundEvent {
        OutboundEvent::new("update", n.to_string(), vec!["public".to_string()])
    }

    async fn run_bounded(
        coordinator: &Coordinator,
        transport: memory::MemoryTransport,
        session: Arc<Session>,
    ) -> Teardown {
        tokio::time::timeout(
            Duration::from_secs(5),
            coordinator.run(&account(), transport, session),
        )
        .await
        .expect("coordinator did not tear down")
    }

    #[tokio::test]
    async fn test_peer_close_tears_down() {
        let coordinator = Coordinator::new(KEEPALIVE);
        let (transport, peer) = memory::pair();
        let s = session();

        peer.send_text(r#"{"type": "subscribe", "stream": "direct"}"#);
        peer.close_with(CLOSE_NORMAL);

        let teardown = run_bounded(&coordinator, transport, Arc::clone(&s)).await;

        assert_eq!(teardown.inbound, Some(InboundExit::PeerClosed));
        assert_eq!(teardown.outbound, Some(OutboundExit::Cancelled));
        assert!(teardown.hangup_closed);
        assert!(s.hangup().is_closed());
        assert!(s.is_subscribed("direct"));
        assert_eq!(peer.closes(), 1);
        assert_eq!(s.enqueue(event(1)), Err(EnqueueError::HungUp));
    }

    #[tokio::test]
    async fn test_write_failure_cancels_blocked_reader() {
        let coordinator = Coordinator::new(KEEPALIVE);
        let (transport, peer) = memory::pair();
        let s = session();

        peer.fail_writes();
        s.enqueue(event(1)).unwrap();

        let teardown = run_bounded(&coordinator, transport, Arc::clone(&s)).await;

        assert_eq!(teardown.outbound, Some(OutboundExit::WriteFailed));
        assert_eq!(teardown.inbound, Some(InboundExit::Cancelled));
        assert!(s.hangup().is_closed());
        assert_eq!(peer.closes(), 1);
    }

    #[tokio::test]
    async fn test_unexpected_read_failure_tears_down() {
        let coordinator = Coordinator::new(KEEPALIVE);
        let (transport, peer) = memory::pair();
        let s = session();

        peer.push(Err(ReadError::Transport("connection reset".to_string())));

        let teardown = run_bounded(&coordinator, transport, Arc::clone(&s)).await;
        assert!(matches!(teardown.inbound, Some(InboundExit::Failed(_))));
        assert_eq!(teardown.outbound, Some(OutboundExit::Cancelled));
        assert!(s.hangup().is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_ping_tears_down() {
        let coordinator = Coordinator::new(KEEPALIVE);
        let (transport, peer) = memory::pair();
        let s = session();

        peer.fail_writes();
        let teardown = coordinator.run(&account(), transport, Arc::clone(&s)).await;

        assert_eq!(teardown.outbound, Some(OutboundExit::WriteFailed));
        assert_eq!(teardown.inbound, Some(InboundExit::Cancelled));
        assert!(s.hangup().is_closed());
    }

    #[tokio::test]
    async fn test_eviction_tears_down() {
        let coordinator = Coordinator::new(KEEPALIVE);
        let (transport, peer) = memory::pair();
        let s = session();

        let handle = {
            let coordinator = coordinator.clone();
            let s = Arc::clone(&s);
            tokio::spawn(async move { coordinator.run(&account(), transport, s).await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        s.evict();

        let teardown = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("coordinator did not tear down")
            .unwrap();
        assert_eq!(teardown.inbound, Some(InboundExit::Cancelled));
        assert_eq!(teardown.outbound, Some(OutboundExit::Cancelled));
        assert!(s.hangup().is_closed());
        assert_eq!(peer.closes(), 1);
    }

    #[tokio::test]
    async fn test_events_delivered_before_close() {
        let coordinator = Coordinator::new(KEEPALIVE);
        let (transport, mut peer) = memory::pair();
        let s = session();

        let handle = {
            let coordinator = coordinator.clone();
            let s = Arc::clone(&s);
            tokio::spawn(async move { coordinator.run(&account(), transport, s).await })
        };

        s.enqueue(event(1)).unwrap();
        s.enqueue(event(2)).unwrap();

        let first = peer.outbound.recv().await.unwrap();
        let second = peer.outbound.recv().await.unwrap();
        assert!(matches!(first, OutboundFrame::Text(ref t) if t.contains("\"payload\":\"1\"")));
        assert!(matches!(second, OutboundFrame::Text(ref t) if t.contains("\"payload\":\"2\"")));

        peer.close_with(CLOSE_NORMAL);
        handle.await.unwrap();
        assert!(s.hangup().is_closed());
    }

    #[tokio::test]
    async fn test_close_failure_still_hangs_up() {
        let coordinator = Coordinator::new(KEEPALIVE);
        let (transport, peer) = memory::pair();
        let s = session();

        peer.fail_close();
        peer.close_with(CLOSE_NORMAL);

        let teardown = run_bounded(&coordinator, transport, Arc::clone(&s)).await;
        assert!(teardown.hangup_closed);
        assert_eq!(peer.closes(), 1);
    }

    #[tokio::test]
    async fn test_session_runs_once() {
        let coordinator = Coordinator::new(KEEPALIVE);
        let s = session();

        let (first, peer) = memory::pair();
        peer.close_with(CLOSE_NORMAL);
        let teardown = run_bounded(&coordinator, first, Arc::clone(&s)).await;
        assert!(teardown.hangup_closed);

        let (second, second_peer) = memory::pair();
        let teardown = run_bounded(&coordinator, second, Arc::clone(&s)).await;
        assert!(!teardown.hangup_closed);
        assert!(teardown.inbound.is_none());
        assert_eq!(second_peer.closes(), 0);
    }

    #[test]
    fn test_abandon_closes_once() {
        let coordinator = Coordinator::new(KEEPALIVE);
        let s = session();
        assert!(coordinator.abandon(&s));
        assert!(!coordinator.abandon(&s));
        assert!(s.hangup().is_closed());
    }

    #[test]
    fn test_keepalive_floor() {
        assert_eq!(Coordinator::new(Duration::ZERO).keepalive(), MIN_KEEPALIVE);
        assert_eq!(Coordinator::new(KEEPALIVE).keepalive(), KEEPALIVE);
    }
}
