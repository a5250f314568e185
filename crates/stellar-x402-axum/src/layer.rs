//! [`X402Middleware`]: a tower [`Layer`] that gates requests behind x402 payments
//! according to a [`RouteTable`] of `(method, path pattern) -> price` rules.
//!
//! Unlike attaching a single price tag per `.layer()` call, one middleware instance can
//! sit in front of an entire router and charge different amounts for different routes,
//! with the most specific matching rule winning. A route with no matching rule is
//! passed straight through to the inner service.

use axum_core::response::IntoResponse;
use http::Request;
use std::sync::Arc;
use std::task::{Context, Poll};
use stellar_x402_types::facilitator::Facilitator;
use tower::{Layer, Service};
use url::Url;

use crate::facilitator_client::FacilitatorClient;
use crate::paygate::{Paygate, resolve_resource_url};
use crate::price::PriceSpec;
use crate::route_rules::RouteTable;

/// Builder for [`X402Middleware`].
pub struct X402Middleware<TFacilitator = FacilitatorClient> {
    facilitator: TFacilitator,
    routes: RouteTable,
    base_url: Option<Url>,
}

impl X402Middleware<FacilitatorClient> {
    /// Creates a middleware that talks to a remote facilitator at `facilitator_url`.
    pub fn new(facilitator_url: &str) -> Self {
        let facilitator =
            FacilitatorClient::try_from(facilitator_url).expect("invalid facilitator URL");
        Self::with_facilitator(facilitator)
    }
}

impl<TFacilitator> X402Middleware<TFacilitator> {
    /// Creates a middleware around an arbitrary [`Facilitator`] implementation — a
    /// remote [`FacilitatorClient`], or an in-process facilitator.
    pub fn with_facilitator(facilitator: TFacilitator) -> Self {
        Self {
            facilitator,
            routes: RouteTable::new(),
            base_url: None,
        }
    }

    /// Registers a price for any request matching `pattern`, regardless of method.
    pub fn with_route(mut self, pattern: &str, price: PriceSpec) -> Self {
        self.routes
            .add_rule(None, pattern, price)
            .unwrap_or_else(|e| panic!("{e}"));
        self
    }

    /// Registers a price for requests matching `method` and `pattern`.
    pub fn with_method_route(
        mut self,
        method: http::Method,
        pattern: &str,
        price: PriceSpec,
    ) -> Self {
        self.routes
            .add_rule(Some(method), pattern, price)
            .unwrap_or_else(|e| panic!("{e}"));
        self
    }

    /// Sets the base URL used to build the `resource` field of challenge bodies.
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = Some(base_url);
        self
    }
}

impl<TFacilitator: Clone> Clone for X402Middleware<TFacilitator> {
    fn clone(&self) -> Self {
        Self {
            facilitator: self.facilitator.clone(),
            routes: self.routes.clone(),
            base_url: self.base_url.clone(),
        }
    }
}

impl<S, TFacilitator: Clone> Layer<S> for X402Middleware<TFacilitator> {
    type Service = X402Service<S, TFacilitator>;

    fn layer(&self, inner: S) -> Self::Service {
        X402Service {
            inner,
            middleware: Arc::new(self.clone()),
        }
    }
}

/// The tower [`Service`] produced by [`X402Middleware`].
#[derive(Clone)]
pub struct X402Service<S, TFacilitator> {
    inner: S,
    middleware: Arc<X402Middleware<TFacilitator>>,
}

impl<S, TFacilitator, ReqBody, ResBody> Service<Request<ReqBody>> for X402Service<S, TFacilitator>
where
    S: Service<Request<ReqBody>, Response = http::Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    S::Response: IntoResponse + Send,
    S::Error: IntoResponse + Send,
    TFacilitator: Facilitator + Clone + Send + Sync + 'static,
    ReqBody: Send + 'static,
    ResBody: Send + 'static,
{
    type Response = axum_core::response::Response;
    type Error = std::convert::Infallible;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(|_| unreachable!())
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let middleware = self.middleware.clone();
        let clone = self.inner.clone();
        let inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let normalized_path = normalize_path(req.uri().path());
            let price = middleware
                .routes
                .resolve(req.method(), &normalized_path)
                .cloned();

            let Some(price) = price else {
                // No rule protects this path: pass the request straight through.
                return match inner_call(inner, req).await {
                    Ok(response) => Ok(response.into_response()),
                    Err(err) => Ok(err.into_response()),
                };
            };

            let resource = resolve_resource_url(middleware.base_url.as_ref(), req.uri());
            let requirements = price.into_requirements(resource);
            let paygate = Paygate {
                facilitator: middleware.facilitator.clone(),
                requirements,
            };
            paygate.handle_request(inner, req).await
        })
    }
}

/// Collapses repeated `/` and strips a trailing `/` so `/x//y/`, `/x/y`, and `/x/y?q=1`
/// (the query string is never part of `Uri::path()`) all resolve against the same rule.
fn normalize_path(path: &str) -> String {
    let mut normalized = String::with_capacity(path.len());
    let mut prev_was_slash = false;
    for c in path.chars() {
        if c == '/' {
            if prev_was_slash {
                continue;
            }
            prev_was_slash = true;
        } else {
            prev_was_slash = false;
        }
        normalized.push(c);
    }
    if normalized.len() > 1 && normalized.ends_with('/') {
        normalized.pop();
    }
    normalized
}

async fn inner_call<S, ReqBody, ResBody>(
    mut inner: S,
    req: Request<ReqBody>,
) -> Result<S::Response, S::Error>
where
    S: Service<Request<ReqBody>, Response = http::Response<ResBody>>,
{
    inner.call(req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::body::Body;
    use axum::routing::get;
    use stellar_x402_types::network::Network;
    use stellar_x402_types::proto::{Asset, SettleRequest, SettleResult, SupportedResponse, VerifyRequest, VerifyResult};
    use tower::ServiceExt;

    #[derive(Clone)]
    struct FakeFacilitator;

    impl Facilitator for FakeFacilitator {
        type Error = std::convert::Infallible;

        async fn verify(&self, _request: &VerifyRequest) -> Result<VerifyResult, Self::Error> {
            Ok(VerifyResult::valid("GPAYER".to_string()))
        }

        async fn settle(&self, _request: &SettleRequest) -> Result<SettleResult, Self::Error> {
            Ok(SettleResult::success(
                "GPAYER".to_string(),
                "deadbeef".to_string(),
                Network::StellarTestnet,
            ))
        }

        async fn supported(&self) -> Result<SupportedResponse, Self::Error> {
            Ok(SupportedResponse::default())
        }
    }

    fn app() -> Router {
        let x402 = X402Middleware::with_facilitator(FakeFacilitator).with_route(
            "/premium",
            PriceSpec::new(Network::StellarTestnet, Asset::Native, "10000000", "GPAYTO"),
        );
        Router::new()
            .route("/premium", get(|| async { "secret" }))
            .route("/free", get(|| async { "public" }))
            .layer(x402)
    }

    #[tokio::test]
    async fn unprotected_route_passes_through() {
        let response = app()
            .oneshot(Request::builder().uri("/free").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), http::StatusCode::OK);
    }

    #[tokio::test]
    async fn protected_route_without_payment_returns_402() {
        let response = app()
            .oneshot(Request::builder().uri("/premium").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), http::StatusCode::PAYMENT_REQUIRED);
    }

    #[tokio::test]
    async fn double_slash_and_trailing_slash_match_same_rule() {
        for uri in ["/premium//", "/premium/", "/premium?q=1"] {
            let response = app()
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(
                response.status(),
                http::StatusCode::PAYMENT_REQUIRED,
                "uri {uri} did not match the /premium rule"
            );
        }
    }

    #[test]
    fn normalize_path_collapses_slashes_and_strips_trailing() {
        assert_eq!(normalize_path("/x//y/"), "/x/y");
        assert_eq!(normalize_path("/x/y"), "/x/y");
        assert_eq!(normalize_path("/"), "/");
    }
}
