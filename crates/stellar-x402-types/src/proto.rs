//! Wire types for the x402 payment protocol over Stellar-family ledgers.
//!
//! This module defines the JSON shapes exchanged between a resource caller, a gate
//! middleware, and a facilitator service: the `Challenge` ([`PaymentRequirements`]) a
//! seller hands out in a 402 response, the `Payload` ([`PaymentPayload`]) a buyer signs
//! and sends back in the `X-Payment` header, and the `VerifyResult`/`SettleResult`
//! pair a facilitator returns.
//!
//! All amounts are carried as non-negative decimal strings, never as JSON numbers, to
//! avoid floating-point precision loss on either end of the wire.

use crate::network::Network;
use crate::timestamp::UnixTimestamp;
use crate::util::Base64Bytes;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::fmt::Display;

/// Version marker for x402 protocol version 1. Serializes as the integer `1`.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct X402Version1;

impl X402Version1 {
    pub const VALUE: u8 = 1;
}

impl Serialize for X402Version1 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(Self::VALUE)
    }
}

impl<'de> Deserialize<'de> for X402Version1 {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let num = u8::deserialize(deserializer)?;
        if num == Self::VALUE {
            Ok(X402Version1)
        } else {
            Err(serde::de::Error::custom(format!(
                "expected x402Version {}, got {num}",
                Self::VALUE
            )))
        }
    }
}

/// The payment scheme. Only `exact` exists today; kept as an enum (rather than a bare
/// string) so that adding a scheme later does not change the wire shape of this field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scheme {
    Exact,
}

impl Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "exact")
    }
}

/// Sentinel string identifying the ledger's built-in asset on the wire.
pub const NATIVE_ASSET_SENTINEL: &str = "native";

/// A Stellar-family payment asset: either the ledger's native asset, or a token
/// exposed through a contract implementing `transfer(from, to, amount: i128)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Asset {
    /// The native asset (XLM / stroops).
    Native,
    /// A Soroban contract id for a token contract.
    Contract(String),
}

impl Asset {
    pub fn contract_id(&self) -> Option<&str> {
        match self {
            Asset::Native => None,
            Asset::Contract(id) => Some(id),
        }
    }

    pub fn is_native(&self) -> bool {
        matches!(self, Asset::Native)
    }
}

impl Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Asset::Native => write!(f, "{NATIVE_ASSET_SENTINEL}"),
            Asset::Contract(id) => write!(f, "{id}"),
        }
    }
}

impl Serialize for Asset {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Asset {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(if s == NATIVE_ASSET_SENTINEL {
            Asset::Native
        } else {
            Asset::Contract(s)
        })
    }
}

/// Payment requirements — the structured "Challenge" a seller emits in a 402 body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    pub scheme: Scheme,
    pub network: Network,
    /// Non-negative integer amount, in the asset's smallest unit, as a decimal string.
    pub max_amount_required: String,
    pub resource: String,
    pub description: String,
    pub mime_type: String,
    pub pay_to: String,
    pub max_timeout_seconds: u32,
    pub asset: Asset,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

/// Errors constructing a [`PaymentRequirements`] from raw inputs (used by the gate's
/// route-rule price resolution).
#[derive(Debug, thiserror::Error)]
pub enum PaymentRequirementsError {
    #[error("maxAmountRequired must be at least 1")]
    ZeroAmount,
    #[error("payTo must not be empty")]
    EmptyPayTo,
}

impl PaymentRequirements {
    pub fn validate(&self) -> Result<(), PaymentRequirementsError> {
        if self.max_amount_required == "0" {
            return Err(PaymentRequirementsError::ZeroAmount);
        }
        if self.pay_to.is_empty() {
            return Err(PaymentRequirementsError::EmptyPayTo);
        }
        Ok(())
    }
}

/// The signed payload a buyer sends back in the `X-Payment` header.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload {
    pub x402_version: X402Version1,
    pub scheme: Scheme,
    pub network: Network,
    /// Base64-encoded signed transaction envelope (XDR).
    pub signed_tx_xdr: String,
    pub source_account: String,
    /// Non-negative integer amount, in the asset's smallest unit, as a decimal string.
    pub amount: String,
    pub destination: String,
    pub asset: Asset,
    pub valid_until_ledger: String,
    /// Carried for wire compatibility and logging only; replay protection is enforced
    /// solely by the transaction hash in the replay store, never by this field.
    pub nonce: String,
}

impl PaymentPayload {
    /// Encodes this payload as the base64 JSON value carried in the `X-Payment` header.
    pub fn to_header_value(&self) -> Result<String, serde_json::Error> {
        let json = serde_json::to_vec(self)?;
        Ok(Base64Bytes::encode(json).to_string())
    }

    /// Decodes a `X-Payment` header value back into a [`PaymentPayload`].
    pub fn from_header_value(value: &str) -> Result<Self, HeaderDecodeError> {
        let b64 = Base64Bytes::from(value.as_bytes());
        let decoded = b64.decode().map_err(HeaderDecodeError::Base64)?;
        let payload = serde_json::from_slice(&decoded).map_err(HeaderDecodeError::Json)?;
        Ok(payload)
    }
}

/// Errors decoding a `X-Payment` header value.
#[derive(Debug, thiserror::Error)]
pub enum HeaderDecodeError {
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("invalid payload JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// The closed error taxonomy surfaced as `invalidReason` / `errorReason` strings.
///
/// The `Display` impl is derived mechanically by round-tripping through serde rather
/// than hand-writing each arm's wire string, so the two representations can never
/// drift apart. Generic reasons rely on the enum's blanket `snake_case` renaming;
/// payload- and settlement-specific reasons carry an explicit `invalid_` prefix via
/// `#[serde(rename = "...")]` since the enum's own naming convention does not start
/// with "invalid" for those variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidReason {
    InsufficientFunds,
    InvalidNetwork,
    InvalidPayload,
    InvalidPaymentRequirements,
    InvalidScheme,
    InvalidPayment,
    PaymentExpired,
    UnsupportedScheme,
    InvalidX402Version,
    InvalidTransactionState,
    UnexpectedVerifyError,
    UnexpectedSettleError,
    #[serde(rename = "invalid_exact_stellar_payload_missing_signed_tx")]
    ExactStellarPayloadMissingSignedTx,
    #[serde(rename = "invalid_exact_stellar_payload_invalid_xdr")]
    ExactStellarPayloadInvalidXdr,
    #[serde(rename = "invalid_exact_stellar_payload_source_account_not_found")]
    ExactStellarPayloadSourceAccountNotFound,
    #[serde(rename = "invalid_exact_stellar_payload_insufficient_balance")]
    ExactStellarPayloadInsufficientBalance,
    #[serde(rename = "invalid_exact_stellar_payload_amount_mismatch")]
    ExactStellarPayloadAmountMismatch,
    #[serde(rename = "invalid_exact_stellar_payload_destination_mismatch")]
    ExactStellarPayloadDestinationMismatch,
    #[serde(rename = "invalid_exact_stellar_payload_asset_mismatch")]
    ExactStellarPayloadAssetMismatch,
    #[serde(rename = "invalid_exact_stellar_payload_network_mismatch")]
    ExactStellarPayloadNetworkMismatch,
    #[serde(rename = "invalid_exact_stellar_payload_missing_required_fields")]
    ExactStellarPayloadMissingRequiredFields,
    #[serde(rename = "invalid_exact_stellar_payload_transaction_expired")]
    ExactStellarPayloadTransactionExpired,
    #[serde(rename = "invalid_exact_stellar_payload_transaction_already_used")]
    ExactStellarPayloadTransactionAlreadyUsed,
    #[serde(rename = "invalid_exact_stellar_settlement_transaction_failed")]
    ExactStellarSettlementTransactionFailed,
    #[serde(rename = "invalid_exact_stellar_settlement_fee_bump_failed")]
    ExactStellarSettlementFeeBumpFailed,
}

impl Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(self).unwrap_or_default();
        write!(f, "{}", json.trim_matches('"'))
    }
}

/// Result of a `verify` call: either the payload matches the requirements, or it
/// failed for an enumerated reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResult {
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invalid_reason: Option<InvalidReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payer: Option<String>,
}

impl VerifyResult {
    pub fn valid(payer: String) -> Self {
        Self {
            is_valid: true,
            invalid_reason: None,
            payer: Some(payer),
        }
    }

    pub fn invalid(reason: InvalidReason, payer: Option<String>) -> Self {
        Self {
            is_valid: false,
            invalid_reason: Some(reason),
            payer,
        }
    }
}

/// Result of a `settle` call: either the ledger submission succeeded (and carries the
/// accepted transaction hash), or it failed for an enumerated reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<InvalidReason>,
    pub payer: String,
    /// Ledger transaction hash (hex), or empty when `success` is false.
    pub transaction: String,
    pub network: Network,
}

impl SettleResult {
    pub fn success(payer: String, transaction: String, network: Network) -> Self {
        Self {
            success: true,
            error_reason: None,
            payer,
            transaction,
            network,
        }
    }

    pub fn failure(reason: InvalidReason, payer: String, network: Network) -> Self {
        Self {
            success: false,
            error_reason: Some(reason),
            payer,
            transaction: String::new(),
            network,
        }
    }
}

/// HTTP 402 response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequired {
    pub x402_version: X402Version1,
    pub error: String,
    pub accepts: Vec<PaymentRequirements>,
}

impl PaymentRequired {
    pub fn new(error: impl Into<String>, accepts: Vec<PaymentRequirements>) -> Self {
        Self {
            x402_version: X402Version1,
            error: error.into(),
            accepts,
        }
    }
}

/// The base64-encoded `X-Payment-Response` header payload, present on any `2xx`
/// response of a protected route.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResponseHeader {
    pub success: bool,
    pub transaction: String,
    pub network: Network,
    pub payer: String,
}

impl From<&SettleResult> for PaymentResponseHeader {
    fn from(result: &SettleResult) -> Self {
        Self {
            success: result.success,
            transaction: result.transaction.clone(),
            network: result.network,
            payer: result.payer.clone(),
        }
    }
}

impl PaymentResponseHeader {
    pub fn to_header_value(&self) -> Result<String, serde_json::Error> {
        let json = serde_json::to_vec(self)?;
        Ok(Base64Bytes::encode(json).to_string())
    }
}

/// One `(scheme, network)` pair a facilitator supports, with declared extras.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedKind {
    pub scheme: Scheme,
    pub network: Network,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

/// Response from the facilitator's `GET /supported` endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SupportedResponse {
    pub kinds: Vec<SupportedKind>,
}

/// A registered resource in the discovery catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryEntry {
    pub resource: String,
    #[serde(rename = "type")]
    pub entry_type: String,
    pub accepts: Vec<PaymentRequirements>,
    pub last_updated: UnixTimestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Request body shared by `POST /verify` and `POST /settle`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub x402_version: X402Version1,
    pub payment_payload: PaymentPayload,
    pub payment_requirements: PaymentRequirements,
}

/// [`VerifyRequest`] and [`SettleRequest`] share the identical wire shape.
pub type SettleRequest = VerifyRequest;

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_requirements() -> PaymentRequirements {
        PaymentRequirements {
            scheme: Scheme::Exact,
            network: Network::StellarTestnet,
            max_amount_required: "10000000".to_string(),
            resource: "https://example.com/premium".to_string(),
            description: "premium content".to_string(),
            mime_type: "application/json".to_string(),
            pay_to: "GABC...X".to_string(),
            max_timeout_seconds: 300,
            asset: Asset::Native,
            extra: None,
        }
    }

    fn sample_payload() -> PaymentPayload {
        PaymentPayload {
            x402_version: X402Version1,
            scheme: Scheme::Exact,
            network: Network::StellarTestnet,
            signed_tx_xdr: "AAAAAgAAAAA=".to_string(),
            source_account: "GSOURCE...".to_string(),
            amount: "10000000".to_string(),
            destination: "GABC...X".to_string(),
            asset: Asset::Native,
            valid_until_ledger: "160".to_string(),
            nonce: "c1f1f4b2-0000-0000-0000-000000000000".to_string(),
        }
    }

    #[test]
    fn native_asset_round_trips_through_sentinel_string() {
        let json = serde_json::to_string(&Asset::Native).unwrap();
        assert_eq!(json, "\"native\"");
        let back: Asset = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Asset::Native);
    }

    #[test]
    fn header_round_trip_is_identity() {
        let payload = sample_payload();
        let header = payload.to_header_value().unwrap();
        let decoded = PaymentPayload::from_header_value(&header).unwrap();
        assert_eq!(decoded.amount, payload.amount);
        assert_eq!(decoded.signed_tx_xdr, payload.signed_tx_xdr);
        assert_eq!(decoded.nonce, payload.nonce);
    }

    #[test]
    fn single_bit_flip_is_detected() {
        let payload = sample_payload();
        let header = payload.to_header_value().unwrap();
        let mut bytes = header.into_bytes();
        let mid = bytes.len() / 2;
        bytes[mid] ^= 0x01;
        let flipped = String::from_utf8(bytes).unwrap();
        assert!(PaymentPayload::from_header_value(&flipped).is_err());
    }

    #[test]
    fn requirements_reject_zero_amount() {
        let mut requirements = sample_requirements();
        requirements.max_amount_required = "0".to_string();
        assert!(matches!(
            requirements.validate(),
            Err(PaymentRequirementsError::ZeroAmount)
        ));
    }

    #[test]
    fn invalid_reason_display_matches_wire_string() {
        assert_eq!(
            InvalidReason::ExactStellarPayloadAmountMismatch.to_string(),
            "invalid_exact_stellar_payload_amount_mismatch"
        );
        assert_eq!(
            InvalidReason::ExactStellarPayloadInvalidXdr.to_string(),
            "invalid_exact_stellar_payload_invalid_xdr"
        );
        assert_eq!(
            InvalidReason::ExactStellarSettlementFeeBumpFailed.to_string(),
            "invalid_exact_stellar_settlement_fee_bump_failed"
        );
    }

    #[test]
    fn payment_required_serializes_expected_shape() {
        let required = PaymentRequired::new("Payment Required", vec![sample_requirements()]);
        let value = serde_json::to_value(&required).unwrap();
        assert_eq!(value["x402Version"], 1);
        assert_eq!(value["error"], "Payment Required");
        assert!(value["accepts"].is_array());
    }
}
