//! HTTP Server configuration and startup.

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use settlement_types::{LedgerStore, PaymentGateway};

use super::handlers::{self, AppState};
use crate::SettlementService;

/// HTTP Server for the Settlement API.
pub struct HttpServer<L: LedgerStore, G: PaymentGateway> {
    state: Arc<AppState<L, G>>,
}

impl<L: LedgerStore, G: PaymentGateway> HttpServer<L, G> {
    /// Creates a new HTTP server over a shared service.
    pub fn new(service: Arc<SettlementService<L, G>>) -> Self {
        Self {
            state: Arc::new(AppState { service }),
        }
    }

    /// Builds the Axum router with all routes.
    pub fn router(&self) -> Router {
        // Build HTTP metrics layer (uses globally set MeterProvider)
        let metrics = axum_otel_metrics::HttpMetricsLayerBuilder::new().build();

        Router::new()
            .route("/health", get(handlers::health))
            .route("/api/batches", post(handlers::admit_batch::<L, G>))
            .route("/api/batches/{id}", get(handlers::get_batch::<L, G>))
            .route(
                "/api/batches/by-external/{external_id}",
                get(handlers::get_batch_by_external_id::<L, G>),
            )
            .route(
                "/api/batches/{id}/resume",
                post(handlers::resume_batch::<L, G>),
            )
            .route("/api/deposits", post(handlers::record_deposit::<L, G>))
            .route("/api/deposits/{id}", get(handlers::get_deposit::<L, G>))
            .route(
                "/api/deposits/{id}/refund",
                post(handlers::refund_deposit::<L, G>),
            )
            .route(
                "/api/deposits/{id}/claim",
                post(handlers::claim_deposit::<L, G>),
            )
            .route("/api/settlements", post(handlers::settle_merchant::<L, G>))
            .route(
                "/api/merchants/{id}/dividend-pool",
                get(handlers::dividend_pool::<L, G>),
            )
            .route("/api/reconciliation", get(handlers::reconcile::<L, G>))
            .route(
                "/api/reconciliation/{payment_id}/cancel",
                post(handlers::cancel_incomplete::<L, G>),
            )
            .layer(metrics)
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Runs the server on the given address with graceful shutdown.
    pub async fn run(self, addr: &str) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Server listening on {}", listener.local_addr()?);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
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
                tracing::error!("failed to install signal handler: {}", e);
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

    tracing::info!("Shutdown signal received, starting graceful shutdown...");
}
