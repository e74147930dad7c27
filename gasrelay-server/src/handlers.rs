//! Axum route handlers for the relay and drip endpoints.
//!
//! Each handler only decodes the body and delegates to a gateway; all
//! validation and chain interaction lives in `gasrelay-evm`.

use std::sync::Arc;

use alloy_primitives::TxHash;
use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::routing::{get, post};
use gasrelay::action::RelayRequestBody;
use gasrelay::error::{RelayError, ValidationError};
use gasrelay::store::{MemoryRateLimitStore, RateLimitStore};
use gasrelay_evm::{DripGateway, DripReceipt, RelayGateway, RelayerProvider};
use serde::{Deserialize, Serialize};
use tokio_util::task::TaskTracker;

use crate::error::ApiError;

/// Shared application state: both gateways over one chain connection.
///
/// `S` is the drip's rate-limit backend.
#[allow(missing_debug_implementations)] // TaskTracker doesn't impl Debug
pub struct RelayState<P, S = MemoryRateLimitStore> {
    /// Escrow meta-transaction relay.
    pub relay: Arc<RelayGateway<P>>,
    /// Onboarding drip.
    pub drip: Arc<DripGateway<P, S>>,
    /// Detached drip tasks, drained on shutdown.
    pub tasks: TaskTracker,
}

impl<P, S> Clone for RelayState<P, S> {
    fn clone(&self) -> Self {
        Self {
            relay: Arc::clone(&self.relay),
            drip: Arc::clone(&self.drip),
            tasks: self.tasks.clone(),
        }
    }
}

impl<P, S> RelayState<P, S> {
    /// Wraps the two gateways. Drip tasks are spawned on `tasks`.
    pub fn new(relay: RelayGateway<P>, drip: DripGateway<P, S>, tasks: TaskTracker) -> Self {
        Self {
            relay: Arc::new(relay),
            drip: Arc::new(drip),
            tasks,
        }
    }
}

/// Successful `POST /relay` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayResponse {
    /// Hash of the submitted transaction.
    pub tx_hash: TxHash,
}

/// `POST /drip` body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DripRequestBody {
    /// Recipient address.
    #[serde(default)]
    pub address: Option<String>,
}

/// `POST /relay`: Forwards a signed escrow action.
///
/// # Errors
///
/// Returns 400 on a malformed request, 500 on configuration or chain failure.
pub async fn post_relay<P, S>(
    State(state): State<RelayState<P, S>>,
    body: Result<Json<RelayRequestBody>, JsonRejection>,
) -> Result<Json<RelayResponse>, ApiError>
where
    P: RelayerProvider + 'static,
    S: RateLimitStore + 'static,
{
    let Json(body) = body.map_err(|e| ApiError::InvalidBody(e.body_text()))?;
    let tx_hash = state.relay.handle_body(body).await?;
    Ok(Json(RelayResponse { tx_hash }))
}

/// `POST /drip`: Funds a first-time address.
///
/// The gateway runs on its own task so a dropped connection cannot cancel it
/// between claiming the address and releasing a failed claim.
///
/// # Errors
///
/// Returns 400 for an invalid or already funded address, 429 if already
/// served, 503 if the relayer is underfunded, 500 otherwise.
pub async fn post_drip<P, S>(
    State(state): State<RelayState<P, S>>,
    body: Result<Json<DripRequestBody>, JsonRejection>,
) -> Result<Json<DripReceipt>, ApiError>
where
    P: RelayerProvider + 'static,
    S: RateLimitStore + 'static,
{
    let Json(body) = body.map_err(|e| ApiError::InvalidBody(e.body_text()))?;
    let address = body
        .address
        .filter(|a| !a.trim().is_empty())
        .ok_or_else(|| RelayError::from(ValidationError::MissingFields(vec!["address"])))?;
    let drip = Arc::clone(&state.drip);
    let receipt = state
        .tasks
        .spawn(async move { drip.handle(&address).await })
        .await
        .map_err(|e| ApiError::Aborted(e.to_string()))??;
    Ok(Json(receipt))
}

/// `OPTIONS` on the POST routes for clients that probe without CORS headers.
pub async fn options() -> StatusCode {
    StatusCode::NO_CONTENT
}

/// `GET /health`: Liveness plus the EIP-55 relayer address, if configured.
pub async fn get_health<P, S>(State(state): State<RelayState<P, S>>) -> Json<serde_json::Value>
where
    P: RelayerProvider + 'static,
    S: RateLimitStore + 'static,
{
    let relayer = state
        .relay
        .provider()
        .relayer_address()
        .ok()
        .map(|address| address.to_checksum(None));
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "relayer": relayer,
    }))
}

/// Creates an Axum [`axum::Router`] with all relay endpoints.
///
/// Endpoints:
/// - `POST /relay`: forward a signed escrow action
/// - `POST /drip`: fund a first-time address
/// - `GET /health`: liveness and relayer address
pub fn relay_router<P, S>(state: RelayState<P, S>) -> axum::Router
where
    P: RelayerProvider + 'static,
    S: RateLimitStore + 'static,
{
    axum::Router::new()
        .route("/relay", post(post_relay::<P, S>).options(options))
        .route("/drip", post(post_drip::<P, S>).options(options))
        .route("/health", get(get_health::<P, S>))
        .with_state(state)
}
