pub mod auth;
pub mod channels;
pub mod error;
pub mod messages;
pub mod notify;
pub mod push;
pub mod state;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post, put};

pub use error::ApiError;
pub use state::{AppState, AppStateInner};

/// Builds the REST + WebSocket surface. `max_body` caps request bodies.
pub fn router(state: AppState, max_body: usize) -> Router {
    let account_routes = Router::new()
        .route("/api/v1/account/{account}/channel/list", get(channels::list_channels))
        .route("/api/v1/account/{account}/channel", post(channels::create_channel))
        .route(
            "/api/v1/account/{account}/channel/{channel}",
            get(channels::get_channel).post(channels::amend_channel).delete(channels::delete_channel),
        )
        .route(
            "/api/v1/account/{account}/channel/{channel}/api-token",
            get(channels::list_tokens).post(channels::create_token),
        )
        .route(
            "/api/v1/account/{account}/channel/{channel}/api-token/{token}",
            get(channels::get_token).delete(channels::revoke_token),
        )
        .layer(middleware::from_fn_with_state(state.clone(), auth::require_account));

    let token_routes = Router::new()
        .route(
            "/api/v1/channel/{channel}",
            get(messages::list_messages).head(messages::head_sequence).post(messages::write_message),
        )
        .route("/api/v1/channel/{channel}/notify", get(notify::subscribe))
        .route(
            "/api/v1/channel/{channel}/{seq}",
            get(messages::get_message).post(messages::mark_message).delete(messages::delete_message),
        )
        .route("/api/v1/pushnotifications", post(push::register))
        .route("/api/v1/pushnotifications/{device}", put(push::update).delete(push::delete))
        .layer(middleware::from_fn_with_state(state.clone(), auth::require_token));

    Router::new()
        .merge(account_routes)
        .merge(token_routes)
        .layer(DefaultBodyLimit::max(max_body))
        .with_state(state)
}
