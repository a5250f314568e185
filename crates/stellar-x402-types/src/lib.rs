#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Core types for the x402 payment protocol over Stellar-family ledgers.
//!
//! This crate provides the foundational types used throughout the x402 ecosystem for
//! implementing HTTP 402 Payment Required flows: payment requirements ("challenges"),
//! signed payment payloads, verification and settlement results, and the
//! [`facilitator::Facilitator`] trait a facilitator service implements.
//!
//! # Modules
//!
//! - [`facilitator`] — the [`facilitator::Facilitator`] trait for payment verification
//!   and settlement.
//! - [`proto`] — wire format types for protocol messages.
//! - [`network`] — the [`network::Network`] enum and its static registry of
//!   passphrases and RPC endpoints.
//! - [`ledger_sequence`] — [`ledger_sequence::LedgerSequence`], the expiry unit for
//!   payment authorizations.
//! - [`timestamp`] — [`timestamp::UnixTimestamp`], used for discovery bookkeeping.
//! - [`util`] — base64 envelope and human-readable amount parsing helpers.

pub mod facilitator;
pub mod ledger_sequence;
pub mod network;
pub mod proto;
pub mod timestamp;
pub mod util;
