//! Stream Hub
//!
//! The [`Hub`] opens sessions for authenticated accounts. [`MemoryHub`]
//! keeps them in memory and hands events to every live session subscribed
//! to one of the event's topics.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

use super::messages::OutboundEvent;
use super::session::{EnqueueError, QueueConfig, Session, SessionId};
use crate::auth::Account;

/// Opens stream sessions
#[async_trait]
pub trait Hub: Send + Sync {
    /// Open a session for `account`, subscribed to `topic`.
    async fn open(&self, account: &Account, topic: &str) -> Result<Arc<Session>, HubError>;

    /// Number of sessions that have not hung up yet.
    async fn session_count(&self) -> usize;
}

/// Configuration for the in-memory hub
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Maximum number of concurrent sessions
    pub max_sessions: usize,
    /// Outbound queue settings for new sessions
    pub queue: QueueConfig,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            max_sessions: 1000,
            queue: QueueConfig::default(),
        }
    }
}

/// In-memory session registry
pub struct MemoryHub {
    /// Live sessions: SessionId → Session
    sessions: Arc<RwLock<HashMap<SessionId, Arc<Session>>>>,
    config: HubConfig,
}

impl MemoryHub {
    pub fn new(config: HubConfig) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    /// Look up a live session
    pub async fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Queue `event` on every session subscribed to one of its topics.
    ///
    /// Returns the number of sessions that accepted the event.
    pub async fn publish(&self, event: &OutboundEvent) -> usize {
        let sessions = self.sessions.read().await;

        let mut delivered = 0;
        for session in sessions.values() {
            if !session.wants(&event.stream) {
                continue;
            }
            match session.enqueue(event.clone()) {
                Ok(()) => delivered += 1,
                Err(EnqueueError::HungUp) => {}
                Err(EnqueueError::QueueFull) => {
                    tracing::debug!(stream_id = %session.id(), "event not delivered, queue full");
                }
            }
        }

        if delivered > 0 {
            tracing::trace!(
                event = %event.event,
                topics = ?event.stream,
                sessions = delivered,
                "published event"
            );
        }

        delivered
    }

    /// Drop sessions whose hangup has closed
    pub async fn prune(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| !s.hangup().is_closed());
        before - sessions.len()
    }

    /// Remove a session once it hangs up.
    fn watch_hangup(&self, session: Arc<Session>) {
        let sessions = Arc::clone(&self.sessions);
        tokio::spawn(async move {
            session.hangup().closed().await;
            sessions.write().await.remove(session.id());
            tracing::debug!(stream_id = %session.id(), "stream session removed");
        });
    }
}

#[async_trait]
impl Hub for MemoryHub {
    async fn open(&self, account: &Account, topic: &str) -> Result<Arc<Session>, HubError> {
        self.prune().await;

        let mut sessions = self.sessions.write().await;
        if sessions.len() >= self.config.max_sessions {
            return Err(HubError::TooManySessions {
                limit: self.config.max_sessions,
            });
        }

        let session = Arc::new(Session::new(account.clone(), topic, self.config.queue));
        sessions.insert(session.id().to_string(), Arc::clone(&session));
        drop(sessions);

        self.watch_hangup(Arc::clone(&session));

        tracing::info!(
            username = %account.username,
            stream_id = %session.id(),
            topic = %topic,
            "stream session opened"
        );
        Ok(session)
    }

    async fn session_count(&self) -> usize {
        self.sessions
            .read()
            .await
            .values()
            .filter(|s| !s.hangup().is_closed())
            .count()
    }
}

/// Errors that can occur when opening a session
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HubError {
    #[error("too many open streams (limit: {limit})")]
    TooManySessions { limit: usize },
}
