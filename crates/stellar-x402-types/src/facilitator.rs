//! The [`Facilitator`] trait: the contract a payment facilitator implements.
//!
//! A facilitator is a trusted but unprivileged service that verifies payment payloads
//! against payment requirements and, on request, submits them to the ledger. This
//! trait is implemented both by [`crate`]-external local (in-process) facilitators and
//! by thin HTTP clients that delegate to a remote facilitator over the wire.

use crate::proto::{SettleRequest, SettleResult, SupportedResponse, VerifyRequest, VerifyResult};
use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;

/// Core capability exposed by a facilitator: stateless verification, ledger
/// settlement, and capability discovery.
///
/// Implementors are expected to be cheap to clone (typically an `Arc`-wrapped client
/// or an `Arc`-wrapped in-process facilitator) since the gate middleware holds one per
/// configured route.
pub trait Facilitator {
    /// Error type returned when the facilitator itself cannot be reached or fails
    /// unexpectedly. Protocol-level rejections are carried inside [`VerifyResult`] and
    /// [`SettleResult`], not through this error type.
    type Error: Debug + std::fmt::Display;

    /// Verifies a payment payload against payment requirements. Performs no ledger
    /// mutation and is safe to call repeatedly.
    fn verify(
        &self,
        request: &VerifyRequest,
    ) -> impl Future<Output = Result<VerifyResult, Self::Error>> + Send;

    /// Submits a verified payment payload to the ledger. Idempotent on the payload's
    /// transaction hash.
    fn settle(
        &self,
        request: &SettleRequest,
    ) -> impl Future<Output = Result<SettleResult, Self::Error>> + Send;

    /// Returns the set of `(scheme, network)` pairs this facilitator handles.
    fn supported(&self) -> impl Future<Output = Result<SupportedResponse, Self::Error>> + Send;
}

impl<T> Facilitator for Arc<T>
where
    T: Facilitator + Send + Sync,
{
    type Error = T::Error;

    fn verify(
        &self,
        request: &VerifyRequest,
    ) -> impl Future<Output = Result<VerifyResult, Self::Error>> + Send {
        T::verify(self, request)
    }

    fn settle(
        &self,
        request: &SettleRequest,
    ) -> impl Future<Output = Result<SettleResult, Self::Error>> + Send {
        T::settle(self, request)
    }

    fn supported(&self) -> impl Future<Output = Result<SupportedResponse, Self::Error>> + Send {
        T::supported(self)
    }
}
