//! x402 Facilitator HTTP entrypoint.
//!
//! This binary launches an Axum-based HTTP server that exposes the x402 protocol
//! interface for payment verification and settlement over a Stellar-family ledger.
//!
//! Endpoints:
//! - `POST /verify` – Verify a payment payload against requirements
//! - `POST /settle` – Settle an accepted payment payload on-chain
//! - `GET /supported` – List supported payment kinds (version/scheme/network)
//!
//! This server includes:
//! - OpenTelemetry tracing via `TraceLayer`
//! - CORS support for cross-origin clients
//! - A Horizon/Soroban RPC-backed ledger adapter
//!
//! Environment:
//! - `.env` values loaded at startup
//! - `HOST`, `PORT`, `NETWORK` control binding address and target ledger
//! - `OTEL_*` variables enable tracing to systems like Honeycomb

mod config;
mod run;

use std::process;

use crate::run::run;

#[tokio::main]
async fn main() {
    let result = run().await;
    if let Err(e) = result {
        println!("{e}");
        process::exit(1)
    }
}
