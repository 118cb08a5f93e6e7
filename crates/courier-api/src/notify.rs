use std::sync::Arc;

use axum::Extension;
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::IntoResponse;

use courier_gateway::WsConnection;
use courier_types::models::AccessToken;

use crate::auth::{Capability, authorize_token};
use crate::error::ApiError;
use crate::state::AppState;

/// Upgrades to a WebSocket that receives a notification for every message
/// other tokens write to the channel.
pub async fn subscribe(
    State(state): State<AppState>,
    Path(channel): Path<String>,
    Extension(token): Extension<AccessToken>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, ApiError> {
    let channel = authorize_token(&state, &token, &channel, Capability::Read).await?;

    let dispatcher = state.dispatcher.clone();
    Ok(ws.on_upgrade(move |socket| async move {
        let connection = Arc::new(WsConnection::new(socket));
        dispatcher.subscribe(channel.id, token.id, connection).await;
    }))
}
