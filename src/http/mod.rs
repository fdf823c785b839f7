use axum::extract::DefaultBodyLimit;
use axum::Router;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::AppState;

mod body;
mod error;
mod gateway;
mod handlers;
mod routes;

pub use error::AppError;
pub use gateway::PaymentGateway;

pub fn router(state: AppState) -> Router {
    let body_limit = state.request_body_limit;

    Router::new()
        .merge(routes::health())
        .merge(routes::regions())
        .merge(routes::reports())
        .merge(routes::campaigns())
        .merge(routes::donations())
        .merge(routes::uploads(&state.media_public_prefix))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}
