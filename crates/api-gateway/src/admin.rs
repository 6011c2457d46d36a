//! Admin router (localhost only by default).
//!
//! - `POST /admin/register` `{ "entity": "<base64 material>", "permissions": {..} }`
//!   -> `{ "key", "vk" }`
//! - `DELETE /admin/keys/{key}` -> 204, or 404 for an unknown key
//! - `GET /admin/entities`
//! - `GET /admin/metrics`
//! - `GET /health`
//!
//! Registration goes through the running gateway, so keys can be issued
//! while the proxy holds the registry lock.

use crate::domain::error::{GatewayError, GatewayResult};
use crate::domain::permissions::Manifest;
use crate::middleware::{AdminAuthConfig, AdminAuthLayer, TracingLayer};
use crate::service::{health_check, AppState};
use axum::{
    extract::{DefaultBodyLimit, Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;

/// Body of `POST /admin/register`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    /// Tagged identity material, standard base64
    pub entity: String,
    #[serde(default)]
    pub permissions: Manifest,
}

/// Reply of `POST /admin/register`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub key: String,
    pub vk: String,
}

/// Admin router
pub fn build_admin_router(state: AppState) -> Router {
    let middleware = ServiceBuilder::new()
        .layer(TracingLayer::new())
        .layer(AdminAuthLayer::new(AdminAuthConfig::from(&state.config.admin)));

    Router::new()
        .route("/admin/register", post(register))
        .route("/admin/keys/:key", delete(revoke))
        .route("/admin/entities", get(entities))
        .route("/admin/metrics", get(metrics))
        .route("/health", get(health_check))
        .layer(DefaultBodyLimit::max(state.config.limits.max_request_size))
        .layer(middleware)
        .with_state(state)
}

async fn register(
    State(state): State<AppState>,
    body: Bytes,
) -> GatewayResult<Json<RegisterResponse>> {
    let request: RegisterRequest = serde_json::from_slice(&body)
        .map_err(|e| GatewayError::InvalidRequest(format!("invalid register body: {}", e)))?;
    let material = STANDARD
        .decode(request.entity.trim())
        .map_err(|e| GatewayError::InvalidRequest(format!("entity is not base64: {}", e)))?;

    let (key, record) = state.registry.register(&material, request.permissions).await?;
    state.metrics.record_registration();

    Ok(Json(RegisterResponse {
        key,
        vk: record.vk,
    }))
}

async fn revoke(State(state): State<AppState>, Path(key): Path<String>) -> GatewayResult<StatusCode> {
    if state.registry.revoke(&key)? {
        state.metrics.record_revocation();
        Ok(StatusCode::NO_CONTENT)
    } else {
        Ok(StatusCode::NOT_FOUND)
    }
}

async fn entities(State(state): State<AppState>) -> GatewayResult<Json<serde_json::Value>> {
    let entities = state.registry.entities()?;
    let keys = state.registry.keys()?.len();
    Ok(Json(serde_json::json!({
        "entities": entities,
        "keys": keys,
        "connections": state.registry.connection_count(),
    })))
}

async fn metrics(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(state.metrics.to_json())
}
