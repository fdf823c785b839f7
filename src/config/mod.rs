use anyhow::{anyhow, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "postgres" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            other => Err(anyhow!("unknown STORE_BACKEND: {}", other)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub http_addr: String,
    pub app_mode: String,
    pub store_backend: StoreBackend,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub db_connect_timeout_seconds: u64,
    pub db_idle_timeout_seconds: u64,
    pub db_max_lifetime_seconds: u64,
    pub upload_dir: PathBuf,
    pub media_public_prefix: String,
    pub upload_max_bytes: usize,
    pub upload_max_files: usize,
    pub image_max_width: u32,
    pub image_max_height: u32,
    pub image_jpeg_quality: u8,
    pub payment_base_url: String,
    pub payment_webhook_token: Option<String>,
    pub orphan_sweep_interval_seconds: u64,
    pub orphan_grace_seconds: u64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup so tests can avoid
    /// touching the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };

        let http_addr = env.or("HTTP_ADDR", "0.0.0.0:8080");
        let _parsed_http_addr = SocketAddr::from_str(&http_addr)
            .map_err(|err| anyhow!("invalid HTTP_ADDR: {}", err))?;
        let app_mode = env.or("APP_MODE", "api");

        let store_backend: StoreBackend = env.or_parse("STORE_BACKEND", "postgres")?;
        let database_url = match store_backend {
            StoreBackend::Postgres => Some(env.or_err("DATABASE_URL")?),
            StoreBackend::Memory => env.get("DATABASE_URL"),
        };

        let media_public_prefix = normalize_prefix(&env.or("MEDIA_PUBLIC_PREFIX", "/uploads"))?;

        let image_jpeg_quality: u8 = env.or_parse("IMAGE_JPEG_QUALITY", "80")?;
        if !(1..=100).contains(&image_jpeg_quality) {
            return Err(anyhow!("invalid IMAGE_JPEG_QUALITY: must be between 1 and 100"));
        }

        let upload_max_files: usize = env.or_parse("UPLOAD_MAX_FILES", "5")?;
        if upload_max_files == 0 {
            return Err(anyhow!("invalid UPLOAD_MAX_FILES: must be at least 1"));
        }

        Ok(Self {
            http_addr,
            app_mode,
            store_backend,
            database_url,
            db_max_connections: env.or_parse("DB_MAX_CONNECTIONS", "25")?,
            db_connect_timeout_seconds: env.or_parse("DB_CONNECT_TIMEOUT_SECONDS", "5")?,
            db_idle_timeout_seconds: env.or_parse("DB_IDLE_TIMEOUT_SECONDS", "300")?,
            db_max_lifetime_seconds: env.or_parse("DB_MAX_LIFETIME_SECONDS", "1800")?,
            upload_dir: PathBuf::from(env.or("UPLOAD_DIR", "public/uploads")),
            media_public_prefix,
            upload_max_bytes: env.or_parse("UPLOAD_MAX_BYTES", "5242880")?,
            upload_max_files,
            image_max_width: env.or_parse("IMAGE_MAX_WIDTH", "800")?,
            image_max_height: env.or_parse("IMAGE_MAX_HEIGHT", "600")?,
            image_jpeg_quality,
            payment_base_url: env.or("PAYMENT_BASE_URL", "/payment"),
            payment_webhook_token: env.get("PAYMENT_WEBHOOK_TOKEN").filter(|t| !t.is_empty()),
            orphan_sweep_interval_seconds: env.or_parse("ORPHAN_SWEEP_INTERVAL_SECONDS", "3600")?,
            orphan_grace_seconds: env.or_parse("ORPHAN_GRACE_SECONDS", "3600")?,
        })
    }

    /// Upper bound for a whole request body: every allowed file at full size
    /// plus room for the text fields and multipart framing.
    pub fn request_body_limit(&self) -> usize {
        self.upload_max_bytes
            .saturating_mul(self.upload_max_files)
            .saturating_add(1024 * 1024)
    }
}

struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
    }

    fn or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn or_err(&self, key: &str) -> Result<String> {
        self.get(key)
            .ok_or_else(|| anyhow!("missing required env var: {}", key))
    }

    fn or_parse<T>(&self, key: &str, default: &str) -> Result<T>
    where
        T: FromStr,
        <T as FromStr>::Err: std::fmt::Display,
    {
        let value = self.or(key, default);
        value
            .parse::<T>()
            .map_err(|err| anyhow!("invalid {}: {}", key, err))
    }
}

fn normalize_prefix(prefix: &str) -> Result<String> {
    let trimmed = prefix.trim().trim_end_matches('/');
    if !trimmed.starts_with('/') || trimmed.len() < 2 {
        return Err(anyhow!("invalid MEDIA_PUBLIC_PREFIX: must be an absolute path like /uploads"));
    }
    Ok(trimmed.to_string())
}
