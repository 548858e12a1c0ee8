//! Streaming Route
//!
//! GET /api/v1/streaming - authenticate, open a stream session and upgrade
//! the request to a websocket.
//!
//! Query parameters: `access_token`, `stream` (required), `list`, `tag`.
//!
//! - 101: upgraded; events follow until either side disconnects
//! - 400: missing or empty `stream`
//! - 401: missing or invalid credentials
//! - 503: too many open streams

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderMap,
    response::Response,
};
use std::sync::Arc;

use crate::api::error::ApiResult;
use crate::api::state::AppState;
use crate::auth::{authorize_stream, ACCESS_TOKEN_HEADER};
use crate::streaming::{StreamQuery, WsTransport};

/// GET /api/v1/streaming
pub async fn stream_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StreamQuery>,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> ApiResult<Response> {
    let account = authorize_stream(
        state.authorizer.as_ref(),
        query.access_token.as_deref(),
        &headers,
    )
    .await?;

    let topic = query.topic_key()?;
    let mut ws = ws?;

    // Clients that pass the token as a subprotocol expect it echoed back.
    if query.access_token.is_none() {
        if let Some(token) = headers
            .get(ACCESS_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            ws = ws.protocols([token.trim().to_string()]);
        }
    }

    let session = state.hub.open(&account, &topic).await?;

    let failed = {
        let coordinator = Arc::clone(&state.coordinator);
        let session = Arc::clone(&session);
        move |e: axum::Error| {
            tracing::error!(
                stream_id = %session.id(),
                error = %e,
                "error upgrading websocket connection"
            );
            coordinator.abandon(&session);
        }
    };

    let coordinator = Arc::clone(&state.coordinator);
    Ok(ws.on_failed_upgrade(failed).on_upgrade(move |socket| async move {
        coordinator
            .run(&account, WsTransport(socket), session)
            .await;
    }))
}
