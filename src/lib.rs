pub mod app;
pub mod config;
pub mod domain;
pub mod http;
pub mod infra;
pub mod jobs;

use crate::app::media::{MediaAssetStore, MediaSettings};
use crate::config::AppConfig;
use crate::infra::repo::Repositories;

#[derive(Clone)]
pub struct AppState {
    pub repos: Repositories,
    pub media: MediaAssetStore,
    pub media_public_prefix: String,
    pub request_body_limit: usize,
    pub payment_base_url: String,
    pub payment_webhook_token: Option<String>,
}

impl AppState {
    pub fn new(config: &AppConfig, repos: Repositories) -> Self {
        Self {
            repos,
            media: MediaAssetStore::new(MediaSettings::from_config(config)),
            media_public_prefix: config.media_public_prefix.clone(),
            request_body_limit: config.request_body_limit(),
            payment_base_url: config.payment_base_url.clone(),
            payment_webhook_token: config.payment_webhook_token.clone(),
        }
    }
}
