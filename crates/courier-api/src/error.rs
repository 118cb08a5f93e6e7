use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{BytesRejection, JsonRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::{debug, error};

use courier_db::Database;
use courier_types::api::ProblemResponse;
use courier_types::error::ErrorKind;

/// Rejection rendered as a problem body with the matching status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiError(pub ErrorKind);

impl From<ErrorKind> for ApiError {
    fn from(kind: ErrorKind) -> Self {
        Self(kind)
    }
}

impl From<courier_db::Error> for ApiError {
    fn from(e: courier_db::Error) -> Self {
        let kind = e.kind();
        if kind == ErrorKind::Internal {
            error!("Storage error: {e}");
        } else {
            debug!("Request rejected: {e}");
        }
        Self(kind)
    }
}

impl From<BytesRejection> for ApiError {
    fn from(rejection: BytesRejection) -> Self {
        body_rejected(rejection.status(), &rejection.body_text())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        body_rejected(rejection.status(), &rejection.body_text())
    }
}

/// Request bodies axum refuses to extract still answer with a problem body.
fn body_rejected(status: StatusCode, detail: &str) -> ApiError {
    debug!("Request body rejected ({status}): {detail}");
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError(ErrorKind::PayloadTooLarge)
    } else {
        ApiError(ErrorKind::Validation)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(ProblemResponse::new(self.0))).into_response()
    }
}

/// Runs a blocking storage call off the async runtime.
pub(crate) async fn run_db<F, T>(db: &Arc<Database>, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> courier_db::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let db = db.clone();
    tokio::task::spawn_blocking(move || f(&db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError(ErrorKind::Internal)
        })?
        .map_err(ApiError::from)
}
