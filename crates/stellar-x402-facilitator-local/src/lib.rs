#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! In-process facilitator for x402 payments over Stellar-family ledgers.
//!
//! This crate provides [`FacilitatorLocal`], a
//! [`Facilitator`](stellar_x402_types::facilitator::Facilitator) implementation that
//! validates payment payloads against a [`LedgerAdapter`](ledger::LedgerAdapter) and
//! settles them on the ledger, guarded by a
//! [`ReplayStore`](replay_store::ReplayStore) for at-most-once settlement.
//!
//! # Modules
//!
//! - [`facilitator_local`] — the concrete `verify`/`settle`/`supported` pipeline.
//! - [`ledger`] — the narrow ledger adapter trait and its production implementation.
//! - [`replay_store`] — keyed settlement-outcome persistence for replay protection.
//! - [`discovery`] — the resource discovery catalog backing `GET /discovery/resources`.
//! - [`handlers`] — HTTP endpoints wiring the above onto an Axum router.
//! - [`util`] — graceful shutdown and telemetry setup.

pub mod discovery;
pub mod facilitator_local;
pub mod handlers;
pub mod ledger;
pub mod replay_store;
pub mod util;

pub use facilitator_local::{FacilitatorLocal, FacilitatorLocalError};
