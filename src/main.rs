use anyhow::anyhow;
use std::net::SocketAddr;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use eduaid::config::{AppConfig, StoreBackend};
use eduaid::infra::{db::Db, memory::MemoryStore, repo::Repositories};
use eduaid::{http, jobs, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "eduaid=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    let repos = match config.store_backend {
        StoreBackend::Postgres => Repositories::postgres(Db::connect(&config).await?),
        StoreBackend::Memory => {
            tracing::warn!("using the in-memory store; data is lost on restart");
            Repositories::in_memory(MemoryStore::seeded()?)
        }
    };

    let state = AppState::new(&config, repos);

    match config.app_mode.as_str() {
        "api" => {
            tokio::fs::create_dir_all(&config.upload_dir).await?;
            let app = http::router(state);
            let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
            tracing::info!("listening on {}", config.http_addr);

            let app = app.into_make_service_with_connect_info::<SocketAddr>();

            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }
        "sweeper" => {
            tracing::info!("starting orphan sweeper mode");
            tokio::select! {
                result = jobs::orphan_sweeper::run(
                    state.repos.clone(),
                    state.media.clone(),
                    Duration::from_secs(config.orphan_sweep_interval_seconds),
                    Duration::from_secs(config.orphan_grace_seconds),
                ) => {
                    result?;
                }
                _ = shutdown_signal() => {}
            }
        }
        other => return Err(anyhow!("unknown APP_MODE: {}", other)),
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
