//! Storefront API server

use anyhow::Context;
use std::sync::Arc;
use storefront_api::{
    auth::{MemorySessionBackend, RedisSessionBackend, SessionBackend},
    routes::create_router,
    AppState, Config,
};
use storefront_shared::{create_pool, run_migrations, PgStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = Config::from_env().context("Failed to load configuration")?;

    let pool = create_pool(&config.database_url, config.database_max_connections)
        .await
        .context("Failed to connect to database")?;
    run_migrations(&pool).await.context("Failed to run migrations")?;
    tracing::info!("Database ready");

    let store = Arc::new(PgStore::new(pool));

    let session_backend: Arc<dyn SessionBackend> = match &config.redis_url {
        Some(url) => Arc::new(
            RedisSessionBackend::connect(url)
                .await
                .context("Failed to connect to Redis")?,
        ),
        None => {
            tracing::warn!("REDIS_URL not set, sessions are kept in process memory");
            Arc::new(MemorySessionBackend::new())
        }
    };

    let hub = storefront_api::websocket::NotificationHub::new();
    let dispatcher = hub.spawn_dispatcher().await;

    let bind_address = config.bind_address.clone();
    let state = AppState::new(config, store.clone(), store, session_backend, hub.clone())
        .context("Invalid encryption key")?;
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {bind_address}"))?;
    tracing::info!(address = %bind_address, "Storefront API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    hub.shutdown().await;
    if let Some(dispatcher) = dispatcher {
        let _ = dispatcher.await;
    }
    tracing::info!("Shutdown complete");
    Ok(())
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "storefront_api=info,tower_http=info".into());

    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
