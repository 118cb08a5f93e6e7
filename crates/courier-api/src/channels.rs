use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use serde::Deserialize;
use tracing::info;

use courier_types::api::{
    AmendChannelRequest, ChannelListResponse, ChannelResponse, CreateChannelRequest, CreateTokenRequest,
    TokenResponse,
};
use courier_types::error::ErrorKind;
use courier_types::models::{Channel, ChannelAmendment, NewChannel, NewToken};

use crate::auth::{Account, ensure_account, ensure_owner};
use crate::error::{ApiError, run_db};
use crate::state::AppState;

fn channel_view(channel: Channel) -> ChannelResponse {
    let href = format!("/api/v1/channel/{}", channel.external_id);
    ChannelResponse::new(channel, href)
}

pub async fn list_channels(
    State(state): State<AppState>,
    Path(account): Path<i64>,
    Extension(auth): Extension<Account>,
) -> Result<impl IntoResponse, ApiError> {
    ensure_account(auth, account)?;

    let channels = run_db(&state.db, move |db| db.list_channels(account)).await?;
    Ok(Json(ChannelListResponse { channels: channels.into_iter().map(channel_view).collect() }))
}

pub async fn create_channel(
    State(state): State<AppState>,
    Path(account): Path<i64>,
    Extension(auth): Extension<Account>,
    req: Result<Json<CreateChannelRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = req?;
    ensure_account(auth, account)?;

    let new = NewChannel {
        public_read: req.public_read,
        public_write: req.public_write,
        sequenced: req.sequenced,
        retention: req.retention,
    };
    let channel = run_db(&state.db, move |db| db.create_channel(account, new)).await?;
    Ok((StatusCode::CREATED, Json(channel_view(channel))))
}

pub async fn get_channel(
    State(state): State<AppState>,
    Path((account, channel)): Path<(i64, String)>,
    Extension(auth): Extension<Account>,
) -> Result<impl IntoResponse, ApiError> {
    ensure_account(auth, account)?;
    ensure_owner(&state, account, &channel).await?;

    let channel = run_db(&state.db, move |db| db.get_channel_by_external_id(&channel))
        .await?
        .ok_or(ApiError(ErrorKind::NotFound))?;
    Ok(Json(channel_view(channel)))
}

pub async fn amend_channel(
    State(state): State<AppState>,
    Path((account, channel)): Path<(i64, String)>,
    Extension(auth): Extension<Account>,
    req: Result<Json<AmendChannelRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = req?;
    ensure_account(auth, account)?;
    ensure_owner(&state, account, &channel).await?;

    let amendment = ChannelAmendment {
        public_read: req.public_read,
        public_write: req.public_write,
        locked: req.locked,
    };
    let channel = run_db(&state.db, move |db| db.amend_channel(&channel, amendment)).await?;
    Ok(Json(channel_view(channel)))
}

pub async fn delete_channel(
    State(state): State<AppState>,
    Path((account, channel)): Path<(i64, String)>,
    Extension(auth): Extension<Account>,
) -> Result<impl IntoResponse, ApiError> {
    ensure_account(auth, account)?;
    ensure_owner(&state, account, &channel).await?;

    run_db(&state.db, move |db| db.delete_channel(&channel)).await?;
    Ok(StatusCode::NO_CONTENT)
}

// -- Tokens --

#[derive(Debug, Deserialize)]
pub struct TokenFilter {
    pub token: Option<String>,
}

pub async fn list_tokens(
    State(state): State<AppState>,
    Path((account, channel)): Path<(i64, String)>,
    Query(filter): Query<TokenFilter>,
    Extension(auth): Extension<Account>,
) -> Result<impl IntoResponse, ApiError> {
    ensure_account(auth, account)?;
    ensure_owner(&state, account, &channel).await?;

    let tokens = run_db(&state.db, move |db| db.list_tokens(&channel, filter.token.as_deref())).await?;
    Ok(Json(tokens.into_iter().map(TokenResponse::from).collect::<Vec<_>>()))
}

pub async fn create_token(
    State(state): State<AppState>,
    Path((account, channel)): Path<(i64, String)>,
    Extension(auth): Extension<Account>,
    req: Result<Json<CreateTokenRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = req?;
    ensure_account(auth, account)?;
    ensure_owner(&state, account, &channel).await?;

    let new = NewToken { description: req.description, can_read: req.can_read, can_write: req.can_write };
    let token = run_db(&state.db, move |db| db.create_token(account, &channel, new)).await?;
    Ok((StatusCode::CREATED, Json(TokenResponse::from(token))))
}

pub async fn get_token(
    State(state): State<AppState>,
    Path((account, channel, token)): Path<(i64, String, i64)>,
    Extension(auth): Extension<Account>,
) -> Result<impl IntoResponse, ApiError> {
    ensure_account(auth, account)?;
    ensure_owner(&state, account, &channel).await?;

    let token = run_db(&state.db, move |db| db.get_token(&channel, token))
        .await?
        .ok_or(ApiError(ErrorKind::NotFound))?;
    Ok(Json(TokenResponse::from(token)))
}

pub async fn revoke_token(
    State(state): State<AppState>,
    Path((account, channel, token)): Path<(i64, String, i64)>,
    Extension(auth): Extension<Account>,
) -> Result<impl IntoResponse, ApiError> {
    ensure_account(auth, account)?;
    ensure_owner(&state, account, &channel).await?;

    run_db(&state.db, move |db| match db.get_token(&channel, token)? {
        Some(_) => db.revoke_token(token),
        None => Err(courier_db::Error::NotFound("token")),
    })
    .await?;

    info!("Account {account} revoked token {token}");
    Ok(StatusCode::NO_CONTENT)
}
