use axum::extract::{Query, Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;
use axum_extra::headers::authorization::Basic;
use axum_extra::headers::{Authorization, HeaderMapExt};
use serde::Deserialize;

use courier_types::error::ErrorKind;
use courier_types::models::{AccessToken, Channel};

use crate::error::{ApiError, run_db};
use crate::state::AppState;

/// Account resolved from the Basic credential.
#[derive(Debug, Clone, Copy)]
pub struct Account(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Read,
    Write,
}

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// Resolves the Basic credential into an [`Account`] extension.
pub async fn require_account(State(state): State<AppState>, mut req: Request, next: Next) -> Result<Response, ApiError> {
    let basic = req
        .headers()
        .typed_get::<Authorization<Basic>>()
        .ok_or(ApiError(ErrorKind::Unauthorized))?;
    let credential = format!("{}:{}", basic.username(), basic.password());

    let account = run_db(&state.db, move |db| db.authenticate("Basic", &credential))
        .await?
        .ok_or(ApiError(ErrorKind::Unauthorized))?;

    req.extensions_mut().insert(Account(account));
    Ok(next.run(req).await)
}

/// Resolves the bearer token into an [`AccessToken`] extension. The token may
/// also arrive as a `token` query parameter, for clients that cannot set
/// headers on a WebSocket upgrade.
pub async fn require_token(State(state): State<AppState>, mut req: Request, next: Next) -> Result<Response, ApiError> {
    let from_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string);
    let secret = match from_header {
        Some(secret) => secret,
        None => Query::<TokenQuery>::try_from_uri(req.uri())
            .ok()
            .and_then(|q| q.0.token)
            .ok_or(ApiError(ErrorKind::Unauthorized))?,
    };

    let token = run_db(&state.db, move |db| db.resolve_token(&secret))
        .await?
        .ok_or(ApiError(ErrorKind::Unauthorized))?;

    req.extensions_mut().insert(token);
    Ok(next.run(req).await)
}

/// The path's account must be the authenticated one.
pub fn ensure_account(auth: Account, account: i64) -> Result<(), ApiError> {
    if auth.0 == account { Ok(()) } else { Err(ApiError(ErrorKind::Forbidden)) }
}

/// Checks that `account` owns `channel`, distinguishing a foreign channel from a missing one.
pub async fn ensure_owner(state: &AppState, account: i64, channel: &str) -> Result<(), ApiError> {
    let channel = channel.to_string();
    run_db(&state.db, move |db| {
        if db.is_channel_owner(account, &channel)? {
            return Ok(Ok(()));
        }
        match db.get_channel_by_external_id(&channel)? {
            Some(_) => Ok(Err(ApiError(ErrorKind::Forbidden))),
            None => Ok(Err(ApiError(ErrorKind::NotFound))),
        }
    })
    .await?
}

/// Loads `channel` and checks that `token` belongs to it and may perform `capability`.
/// Public channels grant the matching capability to every token on them.
pub async fn authorize_token(
    state: &AppState,
    token: &AccessToken,
    channel: &str,
    capability: Capability,
) -> Result<Channel, ApiError> {
    let channel = channel.to_string();
    let token_id = token.id;
    let loaded = run_db(&state.db, move |db| {
        if !db.is_token_authorized(None, &channel, token_id)? {
            return Ok(Err(ApiError(ErrorKind::Forbidden)));
        }
        Ok(db.get_channel_by_external_id(&channel)?.ok_or(ApiError(ErrorKind::NotFound)))
    })
    .await??;

    let allowed = match capability {
        Capability::Read => token.can_read || loaded.public_read,
        Capability::Write => token.can_write || loaded.public_write,
    };
    if !allowed {
        return Err(ApiError(ErrorKind::Unauthorized));
    }
    Ok(loaded)
}
