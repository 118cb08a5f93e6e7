use axum::body::Bytes;
use axum::extract::rejection::{BytesRejection, JsonRejection};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::IntoResponse;
use axum::{Extension, Json};
use serde::Deserialize;

use courier_gateway::sink::notify_all;
use courier_types::api::{MarkMessageRequest, MessageResponse};
use courier_types::error::ErrorKind;
use courier_types::events::NotificationEvent;
use courier_types::models::AccessToken;

use crate::auth::{Capability, authorize_token};
use crate::error::{ApiError, run_db};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub unread: bool,
}

#[derive(Debug, Deserialize)]
pub struct MarkQuery {
    #[serde(default)]
    pub older: bool,
}

fn etag(value: i64) -> [(header::HeaderName, HeaderValue); 1] {
    [(header::ETAG, HeaderValue::from(value))]
}

pub async fn head_sequence(
    State(state): State<AppState>,
    Path(channel): Path<String>,
    Extension(token): Extension<AccessToken>,
) -> Result<impl IntoResponse, ApiError> {
    authorize_token(&state, &token, &channel, Capability::Read).await?;

    let head = run_db(&state.db, move |db| db.head_sequence(token.id, &channel)).await?;
    Ok((StatusCode::OK, etag(head)))
}

pub async fn list_messages(
    State(state): State<AppState>,
    Path(channel): Path<String>,
    Query(query): Query<ListQuery>,
    Extension(token): Extension<AccessToken>,
) -> Result<impl IntoResponse, ApiError> {
    authorize_token(&state, &token, &channel, Capability::Read).await?;

    let list = run_db(&state.db, move |db| db.list_messages(token.id, query.unread)).await?;

    let mut headers = HeaderMap::new();
    if let Some(cursor) = list.cursor {
        headers.insert(header::ETAG, HeaderValue::from(cursor));
    }
    let messages: Vec<MessageResponse> = list.messages.into_iter().map(MessageResponse::from).collect();
    Ok((headers, Json(messages)))
}

pub async fn get_message(
    State(state): State<AppState>,
    Path((channel, seq)): Path<(String, i64)>,
    Extension(token): Extension<AccessToken>,
) -> Result<impl IntoResponse, ApiError> {
    authorize_token(&state, &token, &channel, Capability::Read).await?;

    let message = run_db(&state.db, move |db| db.get_message(&channel, seq))
        .await?
        .ok_or(ApiError(ErrorKind::NotFound))?;
    Ok(Json(MessageResponse::from(message)))
}

/// Stores the request body as a message, then notifies subscribers in the background.
pub async fn write_message(
    State(state): State<AppState>,
    Path(channel): Path<String>,
    Extension(token): Extension<AccessToken>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let channel = authorize_token(&state, &token, &channel, Capability::Write).await?;
    let body = body?;

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let channel_id = channel.id;
    let author = token.id;
    let message =
        run_db(&state.db, move |db| db.write_message(channel_id, author, &content_type, &body)).await?;

    let event = NotificationEvent {
        channel: channel.id,
        channel_id: channel.external_id,
        sequence: message.sequence,
        received: message.received_at,
        notification: state.notification_text.clone(),
    };
    let notify_state = state.clone();
    tokio::spawn(async move {
        notify_all(&notify_state.sinks, author, &event).await;
    });

    Ok(Json(MessageResponse::from(message)))
}

pub async fn mark_message(
    State(state): State<AppState>,
    Path((channel, seq)): Path<(String, i64)>,
    Query(query): Query<MarkQuery>,
    Extension(token): Extension<AccessToken>,
    req: Result<Json<MarkMessageRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = req?;
    authorize_token(&state, &token, &channel, Capability::Read).await?;

    run_db(&state.db, move |db| db.mark_messages(&channel, token.id, seq, query.older, req.read)).await?;
    Ok(StatusCode::OK)
}

/// Deleting requires write access and a token issued to the channel owner.
pub async fn delete_message(
    State(state): State<AppState>,
    Path((channel, seq)): Path<(String, i64)>,
    Extension(token): Extension<AccessToken>,
) -> Result<impl IntoResponse, ApiError> {
    authorize_token(&state, &token, &channel, Capability::Write).await?;

    let account = token.account;
    run_db(&state.db, move |db| {
        if !db.is_channel_owner(account, &channel)? {
            return Err(courier_db::Error::Forbidden);
        }
        db.delete_message(&channel, seq)
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}
