//! Application State
//!
//! Shared state accessible by all API handlers.
//! Wrapped in Arc for thread-safe sharing across async tasks.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::auth::Authorizer;
use crate::streaming::{Coordinator, Hub};

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// Resolves access tokens into accounts
    pub authorizer: Arc<dyn Authorizer>,
    /// Opens stream sessions
    pub hub: Arc<dyn Hub>,
    /// Runs upgraded connections
    pub coordinator: Arc<Coordinator>,
    /// Session limit, for readiness reporting
    pub max_sessions: usize,
    /// Server start time for uptime tracking
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        authorizer: Arc<dyn Authorizer>,
        hub: Arc<dyn Hub>,
        keepalive: Duration,
        max_sessions: usize,
    ) -> Self {
        Self {
            authorizer,
            hub,
            coordinator: Arc::new(Coordinator::new(keepalive)),
            max_sessions,
            start_time: Instant::now(),
        }
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Number of open streams
    pub async fn session_count(&self) -> usize {
        self.hub.session_count().await
    }
}
