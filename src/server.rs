use anyhow::Result;
use axum::{routing::get, Router};
use std::{net::SocketAddr, sync::Arc};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{
    config::Config,
    handlers::{self, AppState},
    retention,
    store::SqliteLogStore,
    stream::SessionManager,
};

/// Start the Logboard server
///
/// This function:
/// 1. Opens the SQLite store and runs migrations
/// 2. Creates the stream session manager
/// 3. Spawns the retention task when enabled
/// 4. Binds to the configured address
/// 5. Serves requests with graceful shutdown on ctrl-c
pub async fn start_server(config: Config) -> Result<()> {
    let store = Arc::new(SqliteLogStore::connect(&config.database.path).await?);
    info!(path = %config.database.path, "database ready");

    let sessions = Arc::new(SessionManager::new(
        store.clone(),
        config.stream.max_consecutive_failures,
    ));

    if config.retention.enabled {
        info!(
            days = config.retention.days,
            cleanup_hour = config.retention.cleanup_hour,
            "retention task enabled"
        );
        let _cleanup = retention::start_retention_task(store.pool().clone(), config.retention.clone());
    }

    let addr = SocketAddr::from((
        config.server.host.parse::<std::net::IpAddr>()?,
        config.server.port,
    ));

    let state = AppState {
        config: Arc::new(config),
        store,
        sessions,
    };
    let app = create_router(state);

    info!("Starting Logboard on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received, draining connections...");
        })
        .await?;

    info!("Server stopped gracefully");
    Ok(())
}

/// Create the Axum router with all routes and middleware
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/logs", get(handlers::logs::list_logs))
        .route("/logs/export", get(handlers::logs::export_logs))
        .route("/logs/:id", get(handlers::logs::get_log))
        .route(
            "/analytics/aggregated",
            get(handlers::analytics::get_aggregated),
        )
        .route("/analytics/trend", get(handlers::analytics::get_trend))
        .route(
            "/analytics/distribution",
            get(handlers::analytics::get_distribution),
        )
        .route("/sse/logs/count", get(handlers::sse::stream_logs_count))
        .route(
            "/sse/analytics/aggregated",
            get(handlers::sse::stream_aggregated),
        )
        .route("/sse/analytics/trend", get(handlers::sse::stream_trend))
        .route(
            "/sse/analytics/distribution",
            get(handlers::sse::stream_distribution),
        );

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .nest("/api", api_routes)
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    #[tokio::test]
    async fn test_create_router() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();

        let store = Arc::new(SqliteLogStore::new(pool));
        let sessions = Arc::new(SessionManager::new(store.clone(), 3));
        let state = AppState {
            config: Arc::new(Config::default()),
            store,
            sessions,
        };

        let _app = create_router(state);
        // Router created successfully - no panic
    }
}
