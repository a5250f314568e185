//! Client-side x402 payment handling for reqwest.
//!
//! [`X402Client`] is [`reqwest_middleware`] middleware: it watches for `402 Payment
//! Required` responses, picks a requirement it can satisfy, asks a [`PaymentSigner`]
//! to sign the transfer, and retries the original request with the resulting
//! `X-Payment` header attached.

use http::{Extensions, HeaderMap, StatusCode};
use reqwest::{Request, Response};
use reqwest_middleware as rqm;
use std::sync::Arc;

use stellar_x402_types::proto::{PaymentPayload, PaymentRequired, PaymentRequirements, Scheme};

#[cfg(feature = "telemetry")]
use tracing::{debug, info, instrument, trace};

use crate::signer::{PaymentSigner, SignerError};

/// Errors picking or applying a payment for a 402 response.
#[derive(Debug, thiserror::Error)]
pub enum X402Error {
    #[error("could not parse 402 response: {0}")]
    ParseError(String),
    #[error("no accepted payment requirement matches this signer's network or asset")]
    NoMatchingPaymentOption,
    #[error("request body could not be cloned for retry")]
    RequestNotCloneable,
    #[error("failed to sign payment: {0}")]
    Signer(#[from] SignerError),
    #[error("failed to encode payment header: {0}")]
    Encode(#[from] serde_json::Error),
}

/// The x402 client middleware for reqwest.
///
/// ```rust,no_run
/// use stellar_x402_client::X402Client;
/// use stellar_x402_client::local_signer::LocalKeySigner;
/// use stellar_x402_types::network::Network;
///
/// let signer = LocalKeySigner::new(
///     "GABCDEF...".to_string(),
///     [0u8; 32],
///     Network::StellarTestnet,
/// );
/// let client = X402Client::new(signer);
/// ```
pub struct X402Client<S> {
    signer: Arc<S>,
}

impl<S: PaymentSigner> X402Client<S> {
    /// Wraps `signer` as reqwest middleware.
    pub fn new(signer: S) -> Self {
        Self {
            signer: Arc::new(signer),
        }
    }

    /// Picks the first accepted requirement whose `payTo` this signer can sign for,
    /// since a Stellar-family signer is tied to a single source account regardless of
    /// network.
    fn select<'a>(&self, accepts: &'a [PaymentRequirements]) -> Option<&'a PaymentRequirements> {
        accepts
            .iter()
            .find(|requirements| requirements.scheme == Scheme::Exact)
    }

    /// Builds the `X-Payment` header value for a 402 response, if this client can
    /// satisfy one of its accepted payment requirements.
    #[cfg_attr(feature = "telemetry", instrument(name = "x402.client.make_payment_header", skip_all, err))]
    pub async fn make_payment_header(&self, res: Response) -> Result<HeaderMap, X402Error> {
        let payment_required = parse_payment_required(res)
            .await
            .ok_or_else(|| X402Error::ParseError("response body is not a valid 402 payload".to_string()))?;

        let requirements = self
            .select(&payment_required.accepts)
            .ok_or(X402Error::NoMatchingPaymentOption)?;

        #[cfg(feature = "telemetry")]
        debug!(network = %requirements.network, asset = %requirements.asset, "selected payment requirement");

        let signed = self
            .signer
            .sign_payment(requirements, requirements.max_timeout_seconds)
            .await?;

        let payload = PaymentPayload {
            x402_version: payment_required.x402_version,
            scheme: requirements.scheme,
            network: requirements.network,
            signed_tx_xdr: signed.signed_tx_xdr,
            source_account: self.signer.source_account().to_string(),
            amount: requirements.max_amount_required.clone(),
            destination: requirements.pay_to.clone(),
            asset: requirements.asset.clone(),
            valid_until_ledger: signed.valid_until_ledger.to_string(),
            nonce: uuid_like_nonce(),
        };

        let header_value = payload.to_header_value()?;
        let mut headers = HeaderMap::new();
        headers.insert(
            "X-Payment",
            header_value
                .parse()
                .map_err(|_| X402Error::ParseError("payment header is not valid ASCII".to_string()))?,
        );
        Ok(headers)
    }
}

/// A nonce unique enough for wire-level diagnostics; replay protection itself is
/// enforced by the facilitator's transaction-hash store, not by this value.
fn uuid_like_nonce() -> String {
    let bytes: [u8; 16] = rand::random();
    hex::encode(bytes)
}

#[async_trait::async_trait]
impl<S> rqm::Middleware for X402Client<S>
where
    S: PaymentSigner + Send + Sync + 'static,
{
    #[cfg_attr(feature = "telemetry", instrument(name = "x402.client.handle", skip_all, err))]
    async fn handle(
        &self,
        req: Request,
        extensions: &mut Extensions,
        next: rqm::Next<'_>,
    ) -> rqm::Result<Response> {
        let retry_req = req.try_clone();
        let res = next.clone().run(req, extensions).await?;

        if res.status() != StatusCode::PAYMENT_REQUIRED {
            #[cfg(feature = "telemetry")]
            trace!(status = ?res.status(), "no payment required");
            return Ok(res);
        }

        #[cfg(feature = "telemetry")]
        info!(url = ?res.url(), "received 402, attempting payment");

        let headers = self
            .make_payment_header(res)
            .await
            .map_err(|e| rqm::Error::Middleware(e.into()))?;

        let mut retry = retry_req.ok_or(rqm::Error::Middleware(X402Error::RequestNotCloneable.into()))?;
        retry.headers_mut().extend(headers);

        #[cfg(feature = "telemetry")]
        trace!(url = ?retry.url(), "retrying request with payment header");

        next.run(retry, extensions).await
    }
}

/// Parses a `402` response body into a [`PaymentRequired`].
#[cfg_attr(feature = "telemetry", instrument(name = "x402.client.parse_payment_required", skip(response)))]
pub async fn parse_payment_required(response: Response) -> Option<PaymentRequired> {
    let bytes = response.bytes().await.ok()?;
    serde_json::from_slice::<PaymentRequired>(&bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer::SignedPayment;
    use stellar_x402_types::network::Network;
    use stellar_x402_types::proto::Asset;

    struct StubSigner;

    #[async_trait::async_trait]
    impl PaymentSigner for StubSigner {
        fn source_account(&self) -> &str {
            "GPAYER"
        }

        async fn sign_payment(
            &self,
            _requirements: &PaymentRequirements,
            _max_timeout_seconds: u32,
        ) -> Result<SignedPayment, SignerError> {
            Ok(SignedPayment {
                signed_tx_xdr: "AAAAstub".to_string(),
                valid_until_ledger: 12345,
            })
        }
    }

    fn sample_requirements() -> PaymentRequirements {
        PaymentRequirements {
            scheme: Scheme::Exact,
            network: Network::StellarTestnet,
            max_amount_required: "10000000".to_string(),
            resource: "https://example.com/premium".to_string(),
            description: "premium content".to_string(),
            mime_type: "application/json".to_string(),
            pay_to: "GPAYTO".to_string(),
            max_timeout_seconds: 300,
            asset: Asset::Native,
            extra: None,
        }
    }

    #[test]
    fn select_picks_first_exact_scheme_requirement() {
        let client = X402Client::new(StubSigner);
        let accepts = vec![sample_requirements()];
        let selected = client.select(&accepts).unwrap();
        assert_eq!(selected.pay_to, "GPAYTO");
    }

    #[tokio::test]
    async fn make_payment_header_encodes_signed_payload() {
        let client = X402Client::new(StubSigner);
        let body = PaymentRequired::new("payment required", vec![sample_requirements()]);
        let response: Response = http::Response::builder()
            .status(StatusCode::PAYMENT_REQUIRED)
            .body(serde_json::to_vec(&body).unwrap())
            .unwrap()
            .into();
        let headers = client.make_payment_header(response).await.unwrap();
        let header_value = headers.get("X-Payment").unwrap().to_str().unwrap();
        let payload = PaymentPayload::from_header_value(header_value).unwrap();
        assert_eq!(payload.signed_tx_xdr, "AAAAstub");
        assert_eq!(payload.valid_until_ledger, "12345");
        assert_eq!(payload.source_account, "GPAYER");
    }

    #[tokio::test]
    async fn parse_payment_required_rejects_non_json_body() {
        let response: Response = http::Response::builder()
            .status(StatusCode::PAYMENT_REQUIRED)
            .body(b"not json".to_vec())
            .unwrap()
            .into();
        assert!(parse_payment_required(response).await.is_none());
    }
}
