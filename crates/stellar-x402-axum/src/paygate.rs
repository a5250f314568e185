//! Core payment-gate state machine shared by [`crate::layer::X402Middleware`].
//!
//! A request moves through: extract the `X-Payment` header, verify it against the
//! route's [`PaymentRequirements`], run the inner handler, and — only if the handler
//! itself succeeded — settle on-chain and attach `X-Payment-Response`. Settlement
//! never runs ahead of a successful handler response: a handler that errors out must
//! not cost the caller anything, so there is no fire-and-forget mode, not even behind
//! a flag.

use axum_core::body::Body;
use axum_core::response::{IntoResponse, Response};
use http::{HeaderMap, HeaderValue, StatusCode};
use serde_json::json;
use std::convert::Infallible;
use stellar_x402_types::facilitator::Facilitator;
use stellar_x402_types::proto::{
    PaymentPayload, PaymentRequired, PaymentRequirements, PaymentResponseHeader, VerifyRequest,
};
use tower::Service;

#[cfg(feature = "telemetry")]
use tracing::Instrument;

pub const PAYMENT_HEADER_NAME: &str = "X-Payment";

/// Errors that stop a request before the inner handler runs.
#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    #[error("{0} header is required")]
    PaymentHeaderRequired(&'static str),
    #[error("invalid or malformed payment header")]
    InvalidPaymentHeader,
    #[error("verification failed: {0}")]
    VerificationFailed(String),
}

/// Errors raised after the inner handler already ran successfully.
#[derive(Debug, thiserror::Error)]
pub enum PaygateError {
    #[error(transparent)]
    Verification(#[from] VerificationError),
    #[error("settlement failed: {0}")]
    Settlement(String),
}

/// Drives one request through the verify/handle/settle sequence for a single,
/// already-resolved [`PaymentRequirements`].
pub struct Paygate<TFacilitator> {
    pub facilitator: TFacilitator,
    pub requirements: PaymentRequirements,
}

impl<TFacilitator> Paygate<TFacilitator>
where
    TFacilitator: Facilitator,
{
    /// Handles the request, turning any [`PaygateError`] into a `402`/error response
    /// instead of propagating it — this is the method the tower [`Service`] calls.
    pub async fn handle_request<
        ReqBody,
        ResBody,
        S: Service<http::Request<ReqBody>, Response = http::Response<ResBody>>,
    >(
        &self,
        inner: S,
        req: http::Request<ReqBody>,
    ) -> Result<Response, Infallible>
    where
        S::Response: IntoResponse,
        S::Error: IntoResponse,
        S::Future: Send,
    {
        match self.handle_request_fallible(inner, req).await {
            Ok(response) => Ok(response),
            Err(err) => Ok(self.error_into_response(err)),
        }
    }

    /// Fallible core of [`Paygate::handle_request`].
    pub async fn handle_request_fallible<
        ReqBody,
        ResBody,
        S: Service<http::Request<ReqBody>, Response = http::Response<ResBody>>,
    >(
        &self,
        inner: S,
        req: http::Request<ReqBody>,
    ) -> Result<Response, PaygateError>
    where
        S::Response: IntoResponse,
        S::Error: IntoResponse,
        S::Future: Send,
    {
        let header = extract_payment_header(req.headers())
            .ok_or(VerificationError::PaymentHeaderRequired(PAYMENT_HEADER_NAME))?;
        let payment_payload =
            PaymentPayload::from_header_value(header).map_err(|_| VerificationError::InvalidPaymentHeader)?;

        let verify_request = VerifyRequest {
            x402_version: payment_payload.x402_version,
            payment_payload,
            payment_requirements: self.requirements.clone(),
        };

        let verify_result = self.verify_payment(&verify_request).await?;
        if !verify_result.is_valid {
            let reason = verify_result
                .invalid_reason
                .map(|r| r.to_string())
                .unwrap_or_else(|| "invalid payment".to_string());
            return Err(VerificationError::VerificationFailed(reason).into());
        }

        let response = match Self::call_inner(inner, req).await {
            Ok(response) => response.into_response(),
            Err(err) => return Ok(err.into_response()),
        };
        if response.status().is_client_error() || response.status().is_server_error() {
            return Ok(response);
        }

        let settlement = self.settle_payment(&verify_request).await?;
        let header_value = settlement_to_header(&settlement)?;
        Ok(attach_header(response, header_value))
    }

    async fn call_inner<
        ReqBody,
        ResBody,
        S: Service<http::Request<ReqBody>, Response = http::Response<ResBody>>,
    >(
        mut inner: S,
        req: http::Request<ReqBody>,
    ) -> Result<S::Response, S::Error>
    where
        S::Future: Send,
    {
        #[cfg(feature = "telemetry")]
        {
            inner.call(req).instrument(tracing::info_span!("inner")).await
        }
        #[cfg(not(feature = "telemetry"))]
        {
            inner.call(req).await
        }
    }

    async fn verify_payment(
        &self,
        request: &VerifyRequest,
    ) -> Result<stellar_x402_types::proto::VerifyResult, VerificationError> {
        self.facilitator
            .verify(request)
            .await
            .map_err(|e| VerificationError::VerificationFailed(e.to_string()))
    }

    async fn settle_payment(
        &self,
        request: &VerifyRequest,
    ) -> Result<stellar_x402_types::proto::SettleResult, PaygateError> {
        self.facilitator
            .settle(request)
            .await
            .map_err(|e| PaygateError::Settlement(e.to_string()))
    }

    fn error_into_response(&self, err: PaygateError) -> Response {
        match err {
            PaygateError::Verification(err) => {
                let body = PaymentRequired::new(err.to_string(), vec![self.requirements.clone()]);
                let bytes = serde_json::to_vec(&body).expect("serialization of PaymentRequired cannot fail");
                Response::builder()
                    .status(StatusCode::PAYMENT_REQUIRED)
                    .header("Content-Type", "application/json")
                    .body(Body::from(bytes))
                    .expect("response construction cannot fail")
            }
            PaygateError::Settlement(detail) => {
                let body = json!({ "error": "settlement failed", "details": detail }).to_string();
                Response::builder()
                    .status(StatusCode::PAYMENT_REQUIRED)
                    .header("Content-Type", "application/json")
                    .body(Body::from(body))
                    .expect("response construction cannot fail")
            }
        }
    }
}

fn attach_header(mut response: Response, header_value: HeaderValue) -> Response {
    response
        .headers_mut()
        .insert("X-Payment-Response", header_value);
    response
}

fn extract_payment_header(headers: &HeaderMap) -> Option<&str> {
    headers.get(PAYMENT_HEADER_NAME)?.to_str().ok()
}

fn settlement_to_header(
    result: &stellar_x402_types::proto::SettleResult,
) -> Result<HeaderValue, PaygateError> {
    let header = PaymentResponseHeader::from(result);
    let value = header
        .to_header_value()
        .map_err(|e| PaygateError::Settlement(e.to_string()))?;
    HeaderValue::from_str(&value).map_err(|e| PaygateError::Settlement(e.to_string()))
}

/// Resolves a resource URL for the challenge body: the configured `base_url` joined
/// with the request's path and query, or just the path and query if no base is set.
pub fn resolve_resource_url(base_url: Option<&url::Url>, uri: &http::Uri) -> String {
    match base_url {
        Some(base) => {
            let mut url = base.clone();
            url.set_path(uri.path());
            url.set_query(uri.query());
            url.to_string()
        }
        None => uri
            .path_and_query()
            .map(|pq| pq.to_string())
            .unwrap_or_else(|| uri.path().to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Request;
    use std::convert::Infallible;
    use stellar_x402_types::network::Network;
    use stellar_x402_types::proto::{Asset, Scheme, SettleResult, SupportedResponse, VerifyResult};
    use tower::service_fn;

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

    fn sample_payload_header() -> String {
        let payload = PaymentPayload {
            x402_version: stellar_x402_types::proto::X402Version1,
            scheme: Scheme::Exact,
            network: Network::StellarTestnet,
            signed_tx_xdr: "AAAA".to_string(),
            source_account: "GPAYER".to_string(),
            amount: "10000000".to_string(),
            destination: "GPAYTO".to_string(),
            asset: Asset::Native,
            valid_until_ledger: "1000".to_string(),
            nonce: "abc".to_string(),
        };
        payload.to_header_value().unwrap()
    }

    struct FakeFacilitator {
        verify_result: VerifyResult,
        settle_result: SettleResult,
    }

    impl Facilitator for FakeFacilitator {
        type Error = std::convert::Infallible;

        async fn verify(&self, _request: &VerifyRequest) -> Result<VerifyResult, Self::Error> {
            Ok(self.verify_result.clone())
        }

        async fn settle(&self, _request: &VerifyRequest) -> Result<SettleResult, Self::Error> {
            Ok(self.settle_result.clone())
        }

        async fn supported(&self) -> Result<SupportedResponse, Self::Error> {
            Ok(SupportedResponse::default())
        }
    }

    fn request_with_header(header: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri("/premium");
        if let Some(value) = header {
            builder = builder.header(PAYMENT_HEADER_NAME, value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn missing_payment_header_returns_402() {
        let gate = Paygate {
            facilitator: FakeFacilitator {
                verify_result: VerifyResult::valid("GPAYER".to_string()),
                settle_result: SettleResult::success("GPAYER".to_string(), "deadbeef".to_string(), Network::StellarTestnet),
            },
            requirements: sample_requirements(),
        };
        let inner = service_fn(|_req: Request<Body>| async {
            Ok::<_, Infallible>(http::Response::new(Body::empty()))
        });
        let response = gate.handle_request(inner, request_with_header(None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    }

    #[tokio::test]
    async fn invalid_verify_result_returns_402_without_calling_settle() {
        let gate = Paygate {
            facilitator: FakeFacilitator {
                verify_result: VerifyResult::invalid(
                    stellar_x402_types::proto::InvalidReason::InvalidPayment,
                    None,
                ),
                settle_result: SettleResult::success("GPAYER".to_string(), "deadbeef".to_string(), Network::StellarTestnet),
            },
            requirements: sample_requirements(),
        };
        let inner = service_fn(|_req: Request<Body>| async {
            Ok::<_, Infallible>(http::Response::new(Body::empty()))
        });
        let header = sample_payload_header();
        let response = gate.handle_request(inner, request_with_header(Some(&header))).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    }

    #[tokio::test]
    async fn valid_payment_settles_after_handler_and_attaches_header() {
        let gate = Paygate {
            facilitator: FakeFacilitator {
                verify_result: VerifyResult::valid("GPAYER".to_string()),
                settle_result: SettleResult::success("GPAYER".to_string(), "deadbeef".to_string(), Network::StellarTestnet),
            },
            requirements: sample_requirements(),
        };
        let inner = service_fn(|_req: Request<Body>| async {
            Ok::<_, Infallible>(http::Response::new(Body::from("ok")))
        });
        let header = sample_payload_header();
        let response = gate.handle_request(inner, request_with_header(Some(&header))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get("X-Payment-Response").is_some());
    }

    #[tokio::test]
    async fn handler_error_response_skips_settlement() {
        let gate = Paygate {
            facilitator: FakeFacilitator {
                verify_result: VerifyResult::valid("GPAYER".to_string()),
                settle_result: SettleResult::failure(
                    stellar_x402_types::proto::InvalidReason::ExactStellarSettlementTransactionFailed,
                    "GPAYER".to_string(),
                    Network::StellarTestnet,
                ),
            },
            requirements: sample_requirements(),
        };
        let inner = service_fn(|_req: Request<Body>| async {
            Ok::<_, Infallible>(
                http::Response::builder()
                    .status(StatusCode::INTERNAL_SERVER_ERROR)
                    .body(Body::empty())
                    .unwrap(),
            )
        });
        let header = sample_payload_header();
        let response = gate.handle_request(inner, request_with_header(Some(&header))).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.headers().get("X-Payment-Response").is_none());
    }

    #[test]
    fn resolve_resource_url_joins_base_and_path() {
        let base = url::Url::parse("https://api.example.com").unwrap();
        let uri: http::Uri = "/premium/1?x=1".parse().unwrap();
        assert_eq!(
            resolve_resource_url(Some(&base), &uri),
            "https://api.example.com/premium/1?x=1"
        );
    }

    #[test]
    fn resolve_resource_url_falls_back_to_path_and_query() {
        let uri: http::Uri = "/premium/1?x=1".parse().unwrap();
        assert_eq!(resolve_resource_url(None, &uri), "/premium/1?x=1");
    }
}
