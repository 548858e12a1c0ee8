//! Stream Session
//!
//! Per-connection state shared between the hub (producer side) and the
//! lifecycle coordinator (consumer side).

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::messages::OutboundEvent;
use crate::auth::Account;

/// Unique identifier for a stream session
pub type SessionId = String;

/// What to do when a session's outbound queue is full
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Refuse the new event; the session keeps what it already has queued
    #[default]
    DropNewest,
    /// Evict the session; the client is expected to reconnect
    Disconnect,
}

/// Outbound queue settings
#[derive(Debug, Clone, Copy)]
pub struct QueueConfig {
    /// Maximum number of events waiting to be written
    pub capacity: usize,
    /// Behaviour once `capacity` is reached
    pub overflow: OverflowPolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 512,
            overflow: OverflowPolicy::DropNewest,
        }
    }
}

/// One-shot signal telling the hub to stop enqueueing for a session.
///
/// Starts open; [`Hangup::close`] flips it exactly once.
#[derive(Debug)]
pub struct Hangup {
    tx: watch::Sender<bool>,
}

impl Hangup {
    fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    pub fn is_closed(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait until the hangup is closed.
    pub async fn closed(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }

    /// Close the hangup. Returns `false` if it was already closed, in which
    /// case watchers are not notified again.
    pub(crate) fn close(&self) -> bool {
        self.tx.send_if_modified(|closed| {
            if *closed {
                false
            } else {
                *closed = true;
                true
            }
        })
    }
}

/// Per-connection streaming state
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    account: Account,
    opened_at: DateTime<Utc>,
    /// Subscribed topic keys
    topics: Mutex<HashSet<String>>,
    sender: mpsc::Sender<OutboundEvent>,
    /// Taken once by the coordinator
    receiver: Mutex<Option<mpsc::Receiver<OutboundEvent>>>,
    overflow: OverflowPolicy,
    hangup: Hangup,
    /// Cancelled when the hub evicts this session
    evicted: CancellationToken,
}

impl Session {
    /// Create a session subscribed to `initial_topic`.
    pub fn new(account: Account, initial_topic: impl Into<String>, queue: QueueConfig) -> Self {
        let (sender, receiver) = mpsc::channel(queue.capacity.max(1));

        let mut topics = HashSet::new();
        topics.insert(initial_topic.into());

        Self {
            id: Uuid::new_v4().to_string(),
            account,
            opened_at: Utc::now(),
            topics: Mutex::new(topics),
            sender,
            receiver: Mutex::new(Some(receiver)),
            overflow: queue.overflow,
            hangup: Hangup::new(),
            evicted: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn account(&self) -> &Account {
        &self.account
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    /// Whole seconds since the session was opened.
    pub fn connected_secs(&self) -> i64 {
        (Utc::now() - self.opened_at).num_seconds().max(0)
    }

    pub fn hangup(&self) -> &Hangup {
        &self.hangup
    }

    fn lock_topics(&self) -> MutexGuard<'_, HashSet<String>> {
        self.topics.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a topic key. Returns `true` if it was not already present.
    pub fn subscribe(&self, topic: &str) -> bool {
        self.lock_topics().insert(topic.to_string())
    }

    /// Remove a topic key. Returns `true` if it was present.
    pub fn unsubscribe(&self, topic: &str) -> bool {
        self.lock_topics().remove(topic)
    }

    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.lock_topics().contains(topic)
    }

    /// Check whether any of `streams` is in the topic set.
    pub fn wants(&self, streams: &[String]) -> bool {
        let topics = self.lock_topics();
        streams.iter().any(|s| topics.contains(s))
    }

    /// Snapshot of the topic set, sorted.
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.lock_topics().iter().cloned().collect();
        topics.sort();
        topics
    }

    /// Queue an event for delivery.
    ///
    /// Fails once the session has hung up. When the queue is full the
    /// session's [`OverflowPolicy`] decides between refusing the event and
    /// evicting the session.
    pub fn enqueue(&self, event: OutboundEvent) -> Result<(), EnqueueError> {
        if self.hangup.is_closed() {
            return Err(EnqueueError::HungUp);
        }

        match self.sender.try_send(event) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(EnqueueError::HungUp),
            Err(mpsc::error::TrySendError::Full(_)) => {
                match self.overflow {
                    OverflowPolicy::DropNewest => {
                        tracing::warn!(stream_id = %self.id, "outbound queue full, dropping event");
                    }
                    OverflowPolicy::Disconnect => {
                        tracing::warn!(stream_id = %self.id, "outbound queue full, evicting session");
                        self.evict();
                    }
                }
                Err(EnqueueError::QueueFull)
            }
        }
    }

    /// Ask the coordinator to tear this session down.
    pub fn evict(&self) {
        self.evicted.cancel();
    }

    pub fn is_evicted(&self) -> bool {
        self.evicted.is_cancelled()
    }

    pub(crate) fn eviction_token(&self) -> &CancellationToken {
        &self.evicted
    }

    /// Take the consuming end of the outbound queue. Only the first call
    /// gets it.
    pub(crate) fn take_receiver(&self) -> Option<mpsc::Receiver<OutboundEvent>> {
        self.receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

/// Errors returned to the producer when queueing an event
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnqueueError {
    #[error("session has hung up")]
    HungUp,

    #[error("outbound queue is full")]
    QueueFull,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(queue: QueueConfig) -> Session {
        Session::new(Account::new("01ACC", "alice"), "public", queue)
    }

    fn event(n: usize) -> OutboundEvent {
        OutboundEvent::new("update", n.to_string(), vec!["public".to_string()])
    }

    #[test]
    fn test_initial_topic() {
        let s = session(QueueConfig::default());
        assert_eq!(s.topics(), vec!["public"]);
        assert!(!s.id().is_empty());
        assert_eq!(s.account().username, "alice");
    }

    #[test]
    fn test_opened_at() {
        let before = Utc::now();
        let s = session(QueueConfig::default());
        assert!(s.opened_at() >= before);
        assert!(s.opened_at() <= Utc::now());
        assert_eq!(s.connected_secs(), 0);
    }

    #[test]
    fn test_unique_ids() {
        let a = session(QueueConfig::default());
        let b = session(QueueConfig::default());
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_subscribe_is_idempotent() {
        let s = session(QueueConfig::default());
        assert!(s.subscribe("hashtag:rust"));
        assert!(!s.subscribe("hashtag:rust"));
        assert_eq!(s.topics(), vec!["hashtag:rust", "public"]);
    }

    #[test]
    fn test_subscribe_unsubscribe_round_trip() {
        let s = session(QueueConfig::default());
        s.subscribe("list:01H3");
        assert!(s.unsubscribe("list:01H3"));
        assert!(!s.unsubscribe("list:01H3"));
        assert!(!s.is_subscribed("list:01H3"));
    }

    #[test]
    fn test_wants() {
        let s = session(QueueConfig::default());
        assert!(s.wants(&["user".to_string(), "public".to_string()]));
        assert!(!s.wants(&["user".to_string()]));
        assert!(!s.wants(&[]));
    }

    #[test]
    fn test_hangup_closes_once() {
        let s = session(QueueConfig::default());
        let mut rx = s.hangup.tx.subscribe();

        assert!(!s.hangup().is_closed());
        assert!(s.hangup().close());
        assert!(s.hangup().is_closed());
        assert!(rx.has_changed().unwrap());
        let _ = rx.borrow_and_update();

        assert!(!s.hangup().close());
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_hangup_closed_wakes_waiter() {
        let s = std::sync::Arc::new(session(QueueConfig::default()));
        let waiter = {
            let s = std::sync::Arc::clone(&s);
            tokio::spawn(async move { s.hangup().closed().await })
        };

        tokio::task::yield_now().await;
        s.hangup().close();
        waiter.await.unwrap();
    }

    #[test]
    fn test_enqueue_after_hangup() {
        let s = session(QueueConfig::default());
        s.hangup().close();
        assert_eq!(s.enqueue(event(1)), Err(EnqueueError::HungUp));
    }

    #[test]
    fn test_enqueue_after_receiver_dropped() {
        let s = session(QueueConfig::default());
        drop(s.take_receiver());
        assert_eq!(s.enqueue(event(1)), Err(EnqueueError::HungUp));
    }

    #[test]
    fn test_take_receiver_once() {
        let s = session(QueueConfig::default());
        assert!(s.take_receiver().is_some());
        assert!(s.take_receiver().is_none());
    }

    #[test]
    fn test_overflow_drop_newest() {
        let s = session(QueueConfig {
            capacity: 2,
            overflow: OverflowPolicy::DropNewest,
        });
        let mut rx = s.take_receiver().unwrap();

        assert!(s.enqueue(event(1)).is_ok());
        assert!(s.enqueue(event(2)).is_ok());
        assert_eq!(s.enqueue(event(3)), Err(EnqueueError::QueueFull));
        assert!(!s.is_evicted());

        assert_eq!(rx.try_recv().unwrap().payload, "1");
        assert_eq!(rx.try_recv().unwrap().payload, "2");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_overflow_disconnect() {
        let s = session(QueueConfig {
            capacity: 1,
            overflow: OverflowPolicy::Disconnect,
        });
        let _rx = s.take_receiver().unwrap();

        assert!(s.enqueue(event(1)).is_ok());
        assert_eq!(s.enqueue(event(2)), Err(EnqueueError::QueueFull));
        assert!(s.is_evicted());
    }

    #[test]
    fn test_overflow_policy_deserialize() {
        #[derive(Deserialize)]
        struct Wrapper {
            policy: OverflowPolicy,
        }
        let w: Wrapper = toml::from_str(r#"policy = "disconnect""#).unwrap();
        assert_eq!(w.policy, OverflowPolicy::Disconnect);
    }
}
