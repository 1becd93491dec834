//! HTTP server: router assembly, startup and graceful shutdown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tokio::signal;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use vc_core::{RuntimeConfig, ServerConfig, VcError, VcResult};

use runtime::{ReferenceFactory, SynthesisPipeline, VcMetrics, warm};

use crate::service::{
    AppState, audio_models_handler, health_handler, info_handler, metrics_handler, models_handler,
    speech_handler, voices_handler,
};

/// Build the router over `state`.
pub fn router(state: Arc<AppState>, max_body_size: usize) -> Router {
    Router::new()
        .route("/", get(info_handler))
        .route("/health", get(health_handler))
        .route("/v1/models", get(models_handler))
        .route("/v1/audio/models", get(audio_models_handler))
        .route("/v1/audio/voices", get(voices_handler))
        .route("/v1/audio/speech", post(speech_handler))
        .route("/metrics", get(metrics_handler))
        .layer(DefaultBodyLimit::max(max_body_size))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// The speech server.
pub struct VcServer {
    config: ServerConfig,
    state: Arc<AppState>,
}

impl VcServer {
    /// Create a server backed by the reference engines.
    ///
    /// Installs the Prometheus recorder when metrics are enabled.
    pub fn from_config(config: ServerConfig, runtime: RuntimeConfig) -> VcResult<Self> {
        let metrics = if runtime.metrics.enabled {
            let (_, handle) = VcMetrics::install()?;
            Some(handle)
        } else {
            None
        };

        let factory = Arc::new(ReferenceFactory::from_config(&runtime));
        let pipeline = Arc::new(SynthesisPipeline::from_config(&runtime, factory));
        Ok(Self::with_pipeline(config, runtime, pipeline, metrics))
    }

    /// Create a server around an existing pipeline.
    pub fn with_pipeline(
        config: ServerConfig,
        runtime: RuntimeConfig,
        pipeline: Arc<SynthesisPipeline>,
        metrics: Option<metrics_exporter_prometheus::PrometheusHandle>,
    ) -> Self {
        Self {
            config,
            state: Arc::new(AppState::new(pipeline, runtime, metrics)),
        }
    }

    pub fn router(&self) -> Router {
        router(Arc::clone(&self.state), self.config.max_body_size)
    }

    /// Run until SIGINT/SIGTERM, then drain in-flight requests.
    pub async fn run(self) -> VcResult<()> {
        if self.state.config.preload {
            let pipeline = Arc::clone(&self.state.pipeline);
            tokio::task::spawn_blocking(move || warm::warm_engine_cache(&pipeline))
                .await
                .map_err(|e| VcError::internal(format!("preload task failed: {e}")))??;
        }

        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .map_err(|e| VcError::config(format!("invalid listen address: {e}")))?;
        let listener = tokio::net::TcpListener::bind(addr).await?;

        info!(
            addr = %addr,
            voices_root = %self.state.config.voices_root.display(),
            device = %self.state.config.device,
            "ChatterVC server started"
        );

        let app = self.router();
        let mut server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await
        });

        // Once the signal fires, axum stops accepting and drains in-flight
        // requests; bound that drain by the configured timeout.
        let timeout = Duration::from_secs(self.config.shutdown_timeout_secs);
        tokio::select! {
            result = &mut server => {
                result
                    .map_err(|e| VcError::internal(format!("server task failed: {e}")))??;
            }
            _ = async {
                shutdown_signal().await;
                tokio::time::sleep(timeout).await;
            } => {
                warn!("Shutdown timeout, forcing exit");
                server.abort();
            }
        }

        info!("Server stopped");
        Ok(())
    }
}

/// Wait for shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {e}");
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
}
