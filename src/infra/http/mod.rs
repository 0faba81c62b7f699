mod auth;
mod feed;
mod middleware;
mod ws;

pub use auth::{VERIFIED_USER_HEADER, VerifiedUser};
pub use ws::WebSocketTransport;

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    middleware as axum_middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Serialize;

use crate::application::error::ErrorReport;
use crate::application::feed::FeedService;
use crate::infra::db::PostgresRepositories;
use crate::realtime::Hub;

use self::middleware::{log_responses, set_request_context};

#[derive(Clone)]
pub struct HttpState {
    pub hub: Hub,
    pub feed: Arc<FeedService>,
    /// Present when a database is configured; probed by the health endpoint.
    pub db: Option<Arc<PostgresRepositories>>,
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/api/v1/feed", get(feed::get_feed))
        .route("/health", get(health))
        .with_state(state)
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}

#[derive(Debug, Serialize)]
struct HealthBody {
    status: &'static str,
    connections: usize,
}

async fn health(State(state): State<HttpState>) -> Response {
    let connections = state.hub.connection_count();

    if let Some(db) = state.db.as_ref()
        && let Err(err) = db.health_check().await
    {
        let mut response = (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthBody {
                status: "degraded",
                connections,
            }),
        )
            .into_response();
        ErrorReport::from_error(
            "infra::http::health",
            StatusCode::SERVICE_UNAVAILABLE,
            &err,
        )
        .attach(&mut response);
        return response;
    }

    Json(HealthBody {
        status: "ok",
        connections,
    })
    .into_response()
}
