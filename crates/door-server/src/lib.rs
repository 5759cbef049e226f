//! Offline resource cache for the door scanner.
//!
//! A small caching proxy: static assets are answered from the active cache
//! generation, check-in API calls always reach the origin.

pub mod error;
pub mod lifecycle;
pub mod proxy;
pub mod routes;
pub mod state;

use std::path::Path;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use door_core::cache::CacheDb;
use door_core::config::Config;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Path of the cache status endpoint; never proxied.
pub const STATUS_PATH: &str = "/__door/cache";

/// Build the axum Router with the status route and the proxy fallback.
/// Used by `serve()` and available for integration testing.
pub fn build_router(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(STATUS_PATH, get(routes::cache::get_status))
        .fallback(proxy::proxy_handler)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}

/// Open the cache store under `root`, run the install/activate startup
/// sequence, and return state ready for [`build_router`].
pub async fn prepare(root: &Path, config: &Config) -> anyhow::Result<AppState> {
    let db_path = door_core::paths::cache_db_path(root);
    let cache = tokio::task::spawn_blocking(move || CacheDb::open(&db_path)).await??;
    let state = AppState::new(Arc::new(cache), config)?;
    lifecycle::prepare(&state.cache, &state.http_client, &state.upstream, &config.cache).await;
    Ok(state)
}

/// Start the caching proxy on `port`.
pub async fn serve(root: &Path, config: &Config, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    serve_on(root, config, listener).await
}

/// Start the caching proxy on a pre-bound listener.
///
/// Unlike `serve`, this accepts a `TcpListener` that was already bound so the
/// caller can read the actual port before starting (useful when `port = 0` and
/// the OS picks a free port).
pub async fn serve_on(
    root: &Path,
    config: &Config,
    listener: tokio::net::TcpListener,
) -> anyhow::Result<()> {
    let actual_port = listener.local_addr()?.port();
    let app = build_router(prepare(root, config).await?);

    tracing::info!(
        upstream = %config.server.base_url,
        "door cache proxy listening on http://localhost:{actual_port}"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "could not install ctrl-c handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
