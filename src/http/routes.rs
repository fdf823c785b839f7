use axum::{routing::get, routing::post, Router};

use crate::http::handlers;
use crate::AppState;

pub fn health() -> Router<AppState> {
    Router::new().route("/health", get(handlers::health))
}

pub fn regions() -> Router<AppState> {
    Router::new()
        .route("/regions", get(handlers::list_regions))
        .route("/regions/:id", get(handlers::get_region))
}

pub fn reports() -> Router<AppState> {
    Router::new()
        .route(
            "/reports",
            get(handlers::list_reports).post(handlers::create_report),
        )
        .route(
            "/reports/:id",
            get(handlers::get_report)
                .put(handlers::update_report)
                .delete(handlers::delete_report),
        )
}

pub fn campaigns() -> Router<AppState> {
    Router::new()
        .route(
            "/campaigns",
            get(handlers::list_campaigns).post(handlers::create_campaign),
        )
        .route(
            "/campaigns/:id",
            get(handlers::get_campaign)
                .put(handlers::update_campaign)
                .delete(handlers::delete_campaign),
        )
}

pub fn donations() -> Router<AppState> {
    Router::new()
        .route(
            "/donations",
            get(handlers::list_donations).post(handlers::create_donation),
        )
        .route("/donations/:id", get(handlers::get_donation))
        .route("/donations/:id/confirm", post(handlers::confirm_donation))
}

pub fn uploads(public_prefix: &str) -> Router<AppState> {
    Router::new()
        .route("/uploads", post(handlers::upload_images))
        .route(&format!("{}/*key", public_prefix), get(handlers::serve_media))
}
