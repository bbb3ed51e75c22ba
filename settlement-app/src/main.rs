//! # Settlement Application
//!
//! Binary that wires together all the components:
//! - Load configuration from environment
//! - Initialize the ledger adapter and the payment network client
//! - Start the background dispatch worker
//! - Start the HTTP server

mod config;

use std::sync::Arc;

use opentelemetry::global;
use opentelemetry_sdk::{propagation::TraceContextPropagator, trace as sdktrace};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use settlement_gateway::{GatewayConfig, HttpGateway};
use settlement_hex::{SettlementService, inbound::HttpServer};
use settlement_repo::build_repo;

fn init_tracer() -> anyhow::Result<(sdktrace::Tracer, sdktrace::SdkTracerProvider)> {
    global::set_text_map_propagator(TraceContextPropagator::new());

    // gRPC exporter with batch processing (non-blocking)
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .build()?;

    let provider = sdktrace::SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .build();

    global::set_tracer_provider(provider.clone());

    use opentelemetry::trace::TracerProvider as _;
    Ok((provider.tracer("settlement-service"), provider))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let (otel_tracer, otel_provider) = init_tracer()?;
    let telemetry = tracing_opentelemetry::layer().with_tracer(otel_tracer);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,settlement_app=debug,settlement_hex=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(telemetry)
        .init();

    let config = config::Config::from_env()?;

    tracing::info!("Starting settlement server on port {}", config.port);
    tracing::info!("Using database: {}", config.database_url);
    tracing::info!("Using payment network: {}", config.gateway_base_url);

    // Build repository (handles connection and migration)
    let repo = build_repo(&config.database_url).await?;

    let gateway = HttpGateway::new(GatewayConfig {
        base_url: config.gateway_base_url.clone(),
        api_key: config.gateway_api_key.clone(),
        timeout: config.gateway_timeout,
    })?;

    let service = Arc::new(
        SettlementService::new(Arc::new(repo), Arc::new(gateway), config.ratios)
            .with_resume_stale_after(config.resume_stale_after),
    );

    // Pending tasks left by a previous process are picked up on the first poll.
    let worker = tokio::spawn(service.worker(config.dispatch_poll_interval).run());

    let server = HttpServer::new(service);
    let addr = format!("0.0.0.0:{}", config.port);

    server.run(&addr).await?;

    worker.abort();
    // Ensure traces are flushed before exit
    let _ = otel_provider.shutdown();
    Ok(())
}
