//! Abstraction over how a client obtains a signed payment transaction.
//!
//! A buyer either holds a secret key directly ([`LocalKeySigner`]) and can sign
//! offline, or delegates to an interactive wallet (a browser extension, a hardware
//! device) that prompts a human and returns an already-signed envelope. Both shapes
//! implement [`PaymentSigner`]; [`crate::client::X402Client`] only depends on the
//! trait, never on which kind backs it.

use async_trait::async_trait;
use stellar_x402_types::proto::PaymentRequirements;

/// A transfer transaction signed for one payment, ready to go out on the wire.
pub struct SignedPayment {
    /// Base64-encoded signed transaction envelope (XDR).
    pub signed_tx_xdr: String,
    /// The absolute ledger sequence number the transaction's ledger bounds expire at
    /// — this is what must be echoed into `PaymentPayload::valid_until_ledger`, since
    /// the facilitator compares that field directly against the current ledger, not
    /// against the transaction's own bounds.
    pub valid_until_ledger: u32,
}

/// Produces a signed transaction envelope (base64 XDR) authorizing one payment.
#[async_trait]
pub trait PaymentSigner: Send + Sync {
    /// The paying account — a Stellar `G...` address (or `C...` contract id, for a
    /// contract-controlled account).
    fn source_account(&self) -> &str;

    /// Builds and signs the transfer transaction `requirements` describes, expiring
    /// `max_timeout_seconds` from now. Signers with ledger access compute the
    /// absolute expiry ledger themselves (current ledger + timeout / close time).
    async fn sign_payment(
        &self,
        requirements: &PaymentRequirements,
        max_timeout_seconds: u32,
    ) -> Result<SignedPayment, SignerError>;
}

/// Errors building or signing a payment transaction.
#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    #[error("failed to build transaction: {0}")]
    Build(String),
    #[error("failed to sign transaction: {0}")]
    Sign(String),
    #[error("this signer cannot pay in the requested asset")]
    UnsupportedAsset,
}
