//! x402 Facilitator Server
//!
//! A production-ready HTTP server implementing the [x402](https://www.x402.org) payment
//! protocol over Stellar-family ledgers.
//!
//! This crate provides a complete, runnable facilitator that verifies and settles
//! `exact`-scheme payments against Horizon and Soroban RPC.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`config`] | Configuration types and loading |
//! | [`run`] | Main server initialization and runtime |
//!
//! # Running the Server
//!
//! ```bash
//! # Run with default configuration (Stellar testnet)
//! cargo run --package stellar-x402-facilitator
//!
//! # Run with telemetry
//! cargo run --package stellar-x402-facilitator --features telemetry
//!
//! # Run with custom config
//! cargo run --package stellar-x402-facilitator -- --config /path/to/config.json
//! ```

pub mod config;
pub mod run;

pub use run::run;
