//! HTTP endpoints exposed by a facilitator: `/verify`, `/settle`, `/supported`,
//! `/discovery/resources`, and `/healthz`.
//!
//! These handlers are deliberately thin: they decode the request body, delegate to
//! [`Facilitator`]/[`DiscoveryCatalog`], and encode the result. Every response is
//! `200 OK` with a JSON body carrying `isValid`/`success: false` on the inner result
//! — a facilitator only returns a non-2xx status when the request itself was
//! malformed (bad JSON, wrong method), never when a payment fails validation.

use crate::discovery::{DiscoveryCatalog, ListQuery};
use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use std::sync::Arc;
use stellar_x402_types::facilitator::Facilitator;
use stellar_x402_types::proto::{DiscoveryEntry, SettleRequest, VerifyRequest};

/// Shared state for the facilitator's HTTP surface: the payment facilitator itself
/// plus the discovery catalog it advertises resources through.
pub struct FacilitatorState<F, D> {
    pub facilitator: Arc<F>,
    pub discovery: Arc<D>,
}

impl<F, D> Clone for FacilitatorState<F, D> {
    fn clone(&self) -> Self {
        Self {
            facilitator: self.facilitator.clone(),
            discovery: self.discovery.clone(),
        }
    }
}

pub fn routes<F, D>() -> Router<FacilitatorState<F, D>>
where
    F: Facilitator + Send + Sync + 'static,
    D: DiscoveryCatalog + Send + Sync + 'static,
{
    Router::new()
        .route("/healthz", get(healthz))
        .route("/verify", post(verify::<F, D>))
        .route("/settle", post(settle::<F, D>))
        .route("/supported", get(supported::<F, D>))
        .route(
            "/discovery/resources",
            get(list_resources::<F, D>)
                .post(register_resource::<F, D>)
                .delete(unregister_resource::<F, D>),
        )
}

async fn healthz() -> impl IntoResponse {
    StatusCode::OK
}

async fn verify<F, D>(
    State(state): State<FacilitatorState<F, D>>,
    Json(request): Json<VerifyRequest>,
) -> impl IntoResponse
where
    F: Facilitator,
{
    match state.facilitator.verify(&request).await {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}

async fn settle<F, D>(
    State(state): State<FacilitatorState<F, D>>,
    Json(request): Json<SettleRequest>,
) -> impl IntoResponse
where
    F: Facilitator,
{
    match state.facilitator.settle(&request).await {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}

async fn supported<F, D>(State(state): State<FacilitatorState<F, D>>) -> impl IntoResponse
where
    F: Facilitator,
{
    match state.facilitator.supported().await {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct ListResourcesQuery {
    #[serde(rename = "type")]
    entry_type: Option<String>,
    limit: Option<usize>,
    #[serde(default)]
    offset: usize,
}

async fn list_resources<F, D>(
    State(state): State<FacilitatorState<F, D>>,
    Query(query): Query<ListResourcesQuery>,
) -> impl IntoResponse
where
    D: DiscoveryCatalog,
{
    let list_query = ListQuery {
        entry_type: query.entry_type.as_deref(),
        limit: query.limit,
        offset: query.offset,
    };
    match state.discovery.list(list_query).await {
        Ok(entries) => (StatusCode::OK, Json(entries)).into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}

async fn register_resource<F, D>(
    State(state): State<FacilitatorState<F, D>>,
    Json(entry): Json<DiscoveryEntry>,
) -> impl IntoResponse
where
    D: DiscoveryCatalog,
{
    match state.discovery.register(entry).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct UnregisterBody {
    resource: String,
}

async fn unregister_resource<F, D>(
    State(state): State<FacilitatorState<F, D>>,
    Json(body): Json<UnregisterBody>,
) -> impl IntoResponse
where
    D: DiscoveryCatalog,
{
    match state.discovery.unregister(&body.resource).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}
