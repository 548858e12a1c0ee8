//! # Streamgate
//!
//! Authenticated websocket streaming of live timeline events. Each
//! connection carries events out to one client while the client adjusts
//! its subscriptions with inline control frames.
//!
//! ## Modules
//!
//! - [`streaming`]: Sessions, pumps and the connection lifecycle coordinator
//! - [`auth`]: Access token resolution
//! - [`api`]: HTTP router with Axum
//! - [`config`]: TOML configuration with environment overrides
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use streamgate::streaming::{Hub, HubConfig, MemoryHub, OutboundEvent};
//! use streamgate::auth::Account;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let hub = MemoryHub::new(HubConfig::default());
//!
//!     // Opened by the upgrade handler for every new connection
//!     let session = hub.open(&Account::new("01ACC", "alice"), "hashtag:rust").await?;
//!
//!     // Producers publish; subscribed sessions queue the event
//!     let event = OutboundEvent::new("update", "{}", vec!["hashtag:rust".to_string()]);
//!     let delivered = hub.publish(&event).await;
//!
//!     println!("Delivered to {} of 1 session ({})", delivered, session.id());
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod streaming;

pub use api::{build_router, serve, ApiError, AppState};

pub use auth::{Account, AuthError, Authorizer, TokenTable};

pub use config::{ApiConfig, Config, ConfigError, LoggingConfig, StreamingConfig};

pub use streaming::{
    Coordinator, Hub, HubConfig, HubError, MemoryHub, OutboundEvent, OverflowPolicy, Session,
    StreamQuery,
};
