//! Stream Authorization
//!
//! Resolves the account behind a streaming request. Token validation itself
//! lives behind the [`Authorizer`] trait; [`TokenTable`] is a static table
//! loaded from configuration.
//!
//! Token lookup order for a streaming request:
//! 1. `access_token` query parameter
//! 2. `Sec-WebSocket-Protocol` header (browsers cannot set headers on
//!    websocket requests, so clients smuggle the token here)
//! 3. Ambient request authorization (`Authorization: Bearer <token>`)

use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::config::TokenEntry;

/// Header some clients use to carry the access token.
pub const ACCESS_TOKEN_HEADER: &str = "sec-websocket-protocol";

/// The authenticated owner of a stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Account identifier
    pub id: String,
    /// Account username
    pub username: String,
}

impl Account {
    pub fn new(id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
        }
    }
}

/// Resolves credentials into an [`Account`].
#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Authorize an explicitly supplied bearer token.
    async fn authorize(&self, token: &str) -> Result<Account, AuthError>;

    /// Authorize a request that supplied no explicit token.
    ///
    /// The default looks for an `Authorization: Bearer` header.
    async fn authorize_request(&self, headers: &HeaderMap) -> Result<Account, AuthError> {
        let token = bearer_token(headers).ok_or(AuthError::MissingCredentials)?;
        self.authorize(token).await
    }
}

/// Authorize a streaming request, trying the explicit token first.
pub async fn authorize_stream(
    authorizer: &dyn Authorizer,
    query_token: Option<&str>,
    headers: &HeaderMap,
) -> Result<Account, AuthError> {
    let token = query_token
        .filter(|t| !t.is_empty())
        .or_else(|| header_token(headers));

    match token {
        Some(token) => authorizer.authorize(token).await,
        None => authorizer.authorize_request(headers).await,
    }
}

fn header_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(ACCESS_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Static token → account table
#[derive(Debug, Clone, Default)]
pub struct TokenTable {
    tokens: HashMap<String, Account>,
}

impl TokenTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from configured token entries
    pub fn from_entries(entries: &[TokenEntry]) -> Self {
        let mut table = Self::new();
        for entry in entries {
            table.insert(
                entry.token.clone(),
                Account::new(entry.account_id.clone(), entry.username.clone()),
            );
        }
        table
    }

    pub fn insert(&mut self, token: impl Into<String>, account: Account) {
        self.tokens.insert(token.into(), account);
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl Authorizer for TokenTable {
    async fn authorize(&self, token: &str) -> Result<Account, AuthError> {
        self.tokens
            .get(token)
            .cloned()
            .ok_or(AuthError::InvalidToken)
    }
}

/// Authentication failures, surfaced before any upgrade
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("no access token provided")]
    MissingCredentials,

    #[error("access token is invalid or expired")]
    InvalidToken,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn table() -> TokenTable {
        let mut table = TokenTable::new();
        table.insert("secret", Account::new("01ACC", "alice"));
        table.insert("other", Account::new("02ACC", "bob"));
        table
    }

    #[tokio::test]
    async fn test_query_token() {
        let account = authorize_stream(&table(), Some("secret"), &HeaderMap::new())
            .await
            .unwrap();
        assert_eq!(account.username, "alice");
    }

    #[tokio::test]
    async fn test_query_token_wins_over_header() {
        let mut headers = HeaderMap::new();
        headers.insert(ACCESS_TOKEN_HEADER, HeaderValue::from_static("other"));

        let account = authorize_stream(&table(), Some("secret"), &headers)
            .await
            .unwrap();
        assert_eq!(account.username, "alice");
    }

    #[tokio::test]
    async fn test_protocol_header_token() {
        let mut headers = HeaderMap::new();
        headers.insert(ACCESS_TOKEN_HEADER, HeaderValue::from_static("other"));

        let account = authorize_stream(&table(), None, &headers).await.unwrap();
        assert_eq!(account.username, "bob");
    }

    #[tokio::test]
    async fn test_bearer_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer secret"));

        let account = authorize_stream(&table(), Some(""), &headers).await.unwrap();
        assert_eq!(account.id, "01ACC");
    }

    #[tokio::test]
    async fn test_failures() {
        assert_eq!(
            authorize_stream(&table(), Some("nope"), &HeaderMap::new()).await,
            Err(AuthError::InvalidToken)
        );
        assert_eq!(
            authorize_stream(&table(), None, &HeaderMap::new()).await,
            Err(AuthError::MissingCredentials)
        );
    }

    #[test]
    fn test_from_entries() {
        let table = TokenTable::from_entries(&[TokenEntry {
            token: "t".to_string(),
            account_id: "01".to_string(),
            username: "carol".to_string(),
        }]);
        assert_eq!(table.len(), 1);
        assert!(!table.is_empty());
    }
}
