//! x402 Facilitator HTTP entrypoint.
//!
//! This binary launches an Axum-based HTTP server that exposes the x402 protocol
//! interface for payment verification and settlement over a Stellar-family ledger.
//!
//! Endpoints:
//! - `POST /verify` – Verify a payment payload against requirements
//! - `POST /settle` – Settle an accepted payment payload on-chain
//! - `GET /supported` – List supported payment kinds (version/scheme/network)
//! - `GET /discovery/resources`, `POST`, `DELETE` – Resource discovery catalog
//! - `GET /healthz` – Liveness probe
//!
//! This server includes:
//! - OpenTelemetry tracing via `TraceLayer` (feature `telemetry`)
//! - CORS support for cross-origin clients
//! - A Horizon/Soroban RPC-backed ledger adapter for the configured network
//!
//! Environment:
//! - `.env` values loaded at startup
//! - `HOST`, `PORT`, `NETWORK` control binding address and target ledger
//! - `OTEL_*` variables enable tracing to systems like Honeycomb

use axum::Router;
use axum::http::Method;
use dotenvy::dotenv;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors;

use stellar_x402_facilitator_local::discovery::InMemoryDiscoveryCatalog;
use stellar_x402_facilitator_local::handlers::{self, FacilitatorState};
use stellar_x402_facilitator_local::ledger::HorizonLedgerAdapter;
use stellar_x402_facilitator_local::replay_store::InMemoryReplayStore;
use stellar_x402_facilitator_local::util::SigDown;
use stellar_x402_facilitator_local::FacilitatorLocal;

#[cfg(feature = "telemetry")]
use stellar_x402_facilitator_local::util::Telemetry;

use crate::config::Config;

/// Initializes the x402 facilitator server.
///
/// - Loads `.env` variables.
/// - Initializes OpenTelemetry tracing (feature `telemetry`).
/// - Constructs a [`HorizonLedgerAdapter`] for the configured network.
/// - Starts an Axum HTTP server with the x402 protocol handlers.
///
/// Binds to the address specified by the `HOST` and `PORT` env vars (or the config
/// file's `host`/`port` fields).
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    rustls::crypto::CryptoProvider::install_default(rustls::crypto::ring::default_provider())
        .expect("failed to initialize rustls crypto provider");

    dotenv().ok();

    #[cfg(feature = "telemetry")]
    let telemetry_layer = {
        let telemetry = Telemetry::new()
            .with_name(env!("CARGO_PKG_NAME"))
            .with_version(env!("CARGO_PKG_VERSION"))
            .register();
        telemetry.http_tracing()
    };

    let config = Config::load()?;

    let ledger = HorizonLedgerAdapter::new(config.network(), reqwest::Client::new());
    let replay_store = InMemoryReplayStore::new();
    let facilitator = FacilitatorLocal::new(ledger, replay_store);
    let discovery = InMemoryDiscoveryCatalog::new();

    let state = FacilitatorState {
        facilitator: Arc::new(facilitator),
        discovery: Arc::new(discovery),
    };

    let http_endpoints = Router::new().merge(handlers::routes().with_state(state));
    #[cfg(feature = "telemetry")]
    let http_endpoints = http_endpoints.layer(telemetry_layer);
    let http_endpoints = http_endpoints.layer(
        cors::CorsLayer::new()
            .allow_origin(cors::Any)
            .allow_methods([Method::GET, Method::POST, Method::DELETE])
            .allow_headers(cors::Any),
    );

    let addr = SocketAddr::new(config.host(), config.port());
    #[cfg(feature = "telemetry")]
    tracing::info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await;
    #[cfg(feature = "telemetry")]
    let listener = listener.inspect_err(|e| tracing::error!("Failed to bind to {}: {}", addr, e));
    let listener = listener?;

    let sig_down = SigDown::try_new()?;
    let axum_cancellation_token = sig_down.cancellation_token();
    let axum_graceful_shutdown = async move { axum_cancellation_token.cancelled().await };
    axum::serve(listener, http_endpoints)
        .with_graceful_shutdown(axum_graceful_shutdown)
        .await?;

    Ok(())
}
