use std::future::Future;
use std::net::SocketAddr;

use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::errors::{CampeiroError, Error};

/// Bind the configured address and serve `router` until ctrl-c
pub async fn start_api_server(config: &ServerConfig, router: Router) -> crate::Result<()> {
    let addr: SocketAddr = config
        .bind_address()
        .parse()
        .map_err(|e| Error::config(format!("Invalid API address: {}", e)))?;

    let listener = TcpListener::bind(addr).await.map_err(|e| CampeiroError::Io {
        source: e,
        context: format!("Failed to bind API server to {}", addr),
    })?;

    info!(address = %addr, "Starting HTTP API server");
    run_http_server(listener, router, shutdown_signal()).await?;
    info!("API server shutdown completed");
    Ok(())
}

/// Serve on an already bound listener until `shutdown` resolves
pub async fn run_http_server<F>(listener: TcpListener, router: Router, shutdown: F) -> crate::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| CampeiroError::Io { source: e, context: "API server error".to_string() })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "API server shutdown listener failed");
    }
}
