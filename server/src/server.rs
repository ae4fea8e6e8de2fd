//! Wiring: relay loop task, HTTP router and the listener.

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

use crate::config::ServerConfig;
use crate::relay_loop::{run_relay_loop, RelayCommand};
use crate::ws::{root_handler, ws_handler, AppState};

/// Start the relay loop and return the state its connection handlers share.
/// Each call creates an independent registry.
pub fn spawn_relay(config: &ServerConfig) -> AppState {
    let (relay_tx, relay_rx) = mpsc::channel::<RelayCommand>(config.command_capacity);
    let loop_config = config.clone();
    tokio::spawn(async move {
        run_relay_loop(relay_rx, loop_config).await;
    });

    let static_dir = config.static_dir.clone().filter(|dir| {
        let exists = dir.is_dir();
        if !exists {
            tracing::info!("Static dir {} not found, serving WebSocket only", dir.display());
        }
        exists
    });

    AppState {
        relay_tx,
        outbox_capacity: config.outbox_capacity,
        static_dir,
    }
}

pub fn build_router(app_state: AppState) -> Router {
    let mut app = Router::new()
        .route("/", get(root_handler))
        .route("/ws", get(ws_handler));
    if let Some(dir) = &app_state.static_dir {
        app = app.fallback_service(ServeDir::new(dir));
    }
    app.layer(CorsLayer::permissive()).with_state(app_state)
}

/// Serve on an already bound listener until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    config: &ServerConfig,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let app = build_router(spawn_relay(config));
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}

/// Bind the configured address and serve until Ctrl-C.
pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
    let listener = TcpListener::bind(&config.listen_addr)
        .await
        .map_err(|e| anyhow::anyhow!("failed to bind {}: {}", config.listen_addr, e))?;
    tracing::info!("Duck basketball relay listening on {}", listener.local_addr()?);

    serve(listener, &config, shutdown_signal()).await?;
    tracing::info!("Relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
