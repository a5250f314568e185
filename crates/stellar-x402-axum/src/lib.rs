#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Axum middleware for enforcing [x402](https://www.x402.org) payments on protected routes
//! over Stellar-family ledgers.
//!
//! This middleware validates incoming `X-Payment` headers using a configured x402
//! facilitator, and settles valid payments after request execution. Returns a `402
//! Payment Required` response if the request lacks a valid payment.
//!
//! ## Example
//!
//! ```no_run
//! use axum::{Router, routing::get};
//! use axum::response::IntoResponse;
//! use http::StatusCode;
//! use stellar_x402_axum::X402Middleware;
//! use stellar_x402_axum::price::PriceSpec;
//! use stellar_x402_types::network::Network;
//! use stellar_x402_types::proto::Asset;
//!
//! let x402 = X402Middleware::new("https://facilitator.example.com").with_route(
//!     "/premium/[id]",
//!     PriceSpec::new(Network::Stellar, Asset::Native, "10000000", "GPAYTO..."),
//! );
//!
//! let app: Router = Router::new()
//!     .route("/premium/{id}", get(my_handler))
//!     .layer(x402);
//!
//! async fn my_handler() -> impl IntoResponse {
//!     (StatusCode::OK, "This is premium content!")
//! }
//! ```
//!
//! ## Route rules
//!
//! A single [`X402Middleware`] can be layered over an entire router and charge
//! different prices per route: [`X402Middleware::with_route`] accepts a glob-like path
//! pattern (`*` matches any (possibly multi-segment) suffix, `[name]` matches exactly
//! one path segment) and, when two rules match the same request, the most specific one
//! wins. Routes with no matching rule pass straight through — this middleware does not
//! require every route behind it to be priced.
//!
//! ## Settlement timing
//!
//! Settlement always happens **after** the inner handler runs and only if it returned
//! a non-error response — a failing handler never costs the caller anything. There is
//! no fire-and-forget mode.

pub mod facilitator_client;
pub mod layer;
pub mod paygate;
pub mod price;
pub mod route_rules;

pub use layer::X402Middleware;
pub use price::PriceSpec;
