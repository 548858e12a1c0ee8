//! Data Transfer Objects
//!
//! Response types for the HTTP endpoints.

use serde::{Deserialize, Serialize};

/// Full health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Overall status: healthy or saturated
    pub status: String,
    /// Streams currently open
    pub sessions: usize,
    /// Server uptime in seconds
    pub uptime_seconds: u64,
    /// Application version
    pub version: String,
}
