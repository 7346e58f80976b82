//! HTTP server setup and lifecycle.

use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::signal;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::info;

use super::{
    handlers::AppState,
    middleware::{create_cors_layer, request_id_middleware},
    routes::create_router,
};
use crate::config::ApiConfig;
use crate::errors::{EngineError, EngineResult};

pub struct ApiServer {
    config: ApiConfig,
    state: Arc<AppState>,
}

impl ApiServer {
    pub fn new(config: ApiConfig, state: Arc<AppState>) -> Self {
        Self { config, state }
    }

    pub async fn run(self) -> EngineResult<()> {
        let app = self.create_app();
        let addr = self.socket_addr()?;

        info!("starting fairgrid API server on http://{}", addr);
        info!("  cors origins: {:?}", self.config.cors_origins);
        info!("  request timeout: {}s", self.config.request_timeout_secs);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| EngineError::Persistence(format!("failed to bind {}: {}", addr, e)))?;

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| EngineError::Persistence(format!("server error: {}", e)))?;

        info!("API server stopped");
        Ok(())
    }

    fn create_app(&self) -> axum::Router {
        create_router(self.state.clone())
            .layer(axum::middleware::from_fn(request_id_middleware))
            // CORS before timeout so preflight requests are always answered.
            .layer(create_cors_layer(&self.config.cors_origins))
            .layer(TimeoutLayer::new(Duration::from_secs(
                self.config.request_timeout_secs,
            )))
            .layer(TraceLayer::new_for_http())
    }

    fn socket_addr(&self) -> EngineResult<SocketAddr> {
        let ip = self
            .config
            .listen_address
            .parse::<std::net::IpAddr>()
            .map_err(|e| {
                EngineError::Validation(format!(
                    "invalid listen address {}: {}",
                    self.config.listen_address, e
                ))
            })?;
        Ok(SocketAddr::from((ip, self.config.port)))
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => tracing::error!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C"),
        _ = terminate => info!("received terminate signal"),
    }
}
