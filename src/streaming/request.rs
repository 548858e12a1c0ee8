//! Stream Request Parsing
//!
//! Builds the initial topic key of a streaming connection from the query
//! parameters of the upgrade request.

use serde::Deserialize;
use thiserror::Error;

use super::topic::topic_key;

/// Query parameter carrying the access token.
pub const ACCESS_TOKEN_QUERY_KEY: &str = "access_token";

/// Query parameters accepted by the streaming endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamQuery {
    /// Access token for the requesting account
    #[serde(default)]
    pub access_token: Option<String>,
    /// Type of stream to open (e.g. `public`, `hashtag`, `list`)
    #[serde(default)]
    pub stream: Option<String>,
    /// List ID, used with `stream=list`
    #[serde(default)]
    pub list: Option<String>,
    /// Tag name, used with `stream=hashtag` or `stream=hashtag:local`
    #[serde(default)]
    pub tag: Option<String>,
}

impl StreamQuery {
    /// Build the composite topic key for this request.
    ///
    /// `list` takes precedence over `tag`; empty qualifiers are ignored.
    pub fn topic_key(&self) -> Result<String, RequestError> {
        let stream = match self.stream.as_deref() {
            Some(s) if !s.is_empty() => s,
            _ => return Err(RequestError::MissingStream),
        };

        let qualifier = self
            .list
            .as_deref()
            .filter(|l| !l.is_empty())
            .or_else(|| self.tag.as_deref().filter(|t| !t.is_empty()));

        Ok(topic_key(stream, qualifier))
    }
}

/// Errors in the streaming request, surfaced before any upgrade
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("missing or empty 'stream' parameter")]
    MissingStream,
}
