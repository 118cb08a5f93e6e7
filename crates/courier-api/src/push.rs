use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use serde::Deserialize;

use courier_types::api::PushRegistrationRequest;
use courier_types::error::ErrorKind;
use courier_types::models::AccessToken;

use crate::error::{ApiError, run_db};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct DeleteQuery {
    pub channel_id: Option<String>,
}

pub async fn register(
    State(state): State<AppState>,
    Extension(token): Extension<AccessToken>,
    req: Result<Json<PushRegistrationRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = req?;
    if req.token.trim().is_empty() {
        return Err(ApiError(ErrorKind::Validation));
    }
    run_db(&state.db, move |db| db.register_push(token.id, &req.token)).await?;
    Ok(StatusCode::CREATED)
}

/// Replaces a rotated device token on the registrations of the caller's account.
pub async fn update(
    State(state): State<AppState>,
    Path(device): Path<String>,
    Extension(token): Extension<AccessToken>,
    req: Result<Json<PushRegistrationRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = req?;
    if req.token.trim().is_empty() {
        return Err(ApiError(ErrorKind::Validation));
    }
    let updated = run_db(&state.db, move |db| db.update_push(token.account, &device, &req.token)).await?;
    if updated == 0 {
        return Err(ApiError(ErrorKind::NotFound));
    }
    Ok(StatusCode::OK)
}

pub async fn delete(
    State(state): State<AppState>,
    Path(device): Path<String>,
    Query(query): Query<DeleteQuery>,
    Extension(token): Extension<AccessToken>,
) -> Result<impl IntoResponse, ApiError> {
    let removed =
        run_db(&state.db, move |db| db.delete_push(token.account, &device, query.channel_id.as_deref())).await?;
    if removed == 0 {
        return Err(ApiError(ErrorKind::NotFound));
    }
    Ok(StatusCode::NO_CONTENT)
}
