#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! [x402](https://www.x402.org) payments over Stellar-family ledgers.
//!
//! This crate is a thin facade over the workspace's individual pieces, so that a
//! consumer who just wants "x402, Stellar, exact scheme" can depend on one crate
//! instead of wiring the pieces together by hand:
//!
//! - [`stellar_x402_types`] — the wire types (`PaymentRequirements`, `PaymentPayload`,
//!   `VerifyResult`, `SettleResult`, ...) and the [`stellar_x402_types::facilitator::Facilitator`]
//!   trait every facilitator implementation (local or remote) satisfies.
//! - [`stellar_x402_facilitator_local`] (feature `facilitator-local`, default) — an
//!   in-process `Facilitator` that talks to Horizon/Soroban RPC directly, for
//!   embedding a facilitator inside your own service rather than running the
//!   standalone `facilitator` binary.
//! - [`stellar_x402_axum`] (feature `axum`) — the gate middleware for Axum
//!   applications that charge for routes.
//! - [`stellar_x402_client`] (feature `client`) — reqwest middleware that pays 402
//!   responses automatically.
//!
//! Enable `telemetry` to turn on `tracing` instrumentation across whichever of the
//! above are enabled.

pub use stellar_x402_types as types;

#[cfg(feature = "facilitator-local")]
pub use stellar_x402_facilitator_local as facilitator_local;

#[cfg(feature = "axum")]
pub use stellar_x402_axum as axum;

#[cfg(feature = "client")]
pub use stellar_x402_client as client;
