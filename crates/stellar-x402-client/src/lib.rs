#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Reqwest middleware for automatic [x402](https://www.x402.org) payment handling over
//! Stellar-family ledgers.
//!
//! This crate provides [`X402Client`], `reqwest` middleware that watches for `402
//! Payment Required` responses, signs a transfer transaction via a [`PaymentSigner`],
//! and retries the original request with the signed payload attached as an
//! `X-Payment` header.
//!
//! ## Quickstart
//!
//! ```rust,no_run
//! use stellar_x402_client::{ReqwestWithPayments, ReqwestWithPaymentsBuild, X402Client};
//! use stellar_x402_client::local_signer::LocalKeySigner;
//! use stellar_x402_types::network::Network;
//! use reqwest::Client;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let signer = LocalKeySigner::new("GABCDEF...".to_string(), [0u8; 32], Network::StellarTestnet);
//! let x402_client = X402Client::new(signer);
//!
//! let http_client = Client::new().with_payments(x402_client).build();
//!
//! let response = http_client
//!     .get("https://api.example.com/protected")
//!     .send()
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Signers
//!
//! [`X402Client`] is generic over anything implementing [`PaymentSigner`]. This crate
//! ships [`local_signer::LocalKeySigner`], which signs with an in-memory ed25519 key.
//! An interactive-wallet signer (browser extension, hardware device) can implement the
//! same trait without this crate needing to know about it.

mod builder;
mod client;
pub mod local_signer;
pub mod signer;

pub use builder::*;
pub use client::*;
pub use signer::{PaymentSigner, SignerError};
