// src/web/routes.rs

use super::AppState;
use super::webhook::{SECRET_HEADER, verify_secret};
use crate::dispatcher::UpdateData;
use crate::errors::WebError;
use crate::middlewares::request_id_text;
use crate::update::Update;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::{Extension, Json};
use serde_json::{Value, json};
use tower_http::request_id::RequestId;

pub const SERVICE_NAME: &str = "business-bot";

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn version(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "service": SERVICE_NAME,
        "mode": "webhook",
        "base_url": state.settings.web.base_url,
    }))
}

/// Platform push endpoint. Transport checks happen before anything reaches
/// the dispatcher.
pub async fn telegram_webhook(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, WebError> {
    let got = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok());
    verify_secret(state.settings.web.secret(), got)?;

    let update = Update::from_slice(&body).map_err(|e| WebError::MalformedPayload(e.to_string()))?;

    let runtime = &state.runtime;
    let data = UpdateData::new(runtime.bot()?.clone())
        .with_request_id(request_id_text(&request_id))
        .with_alert(state.alert.clone());
    runtime
        .dispatcher()?
        .feed_update(&update, data)
        .await
        .map_err(WebError::Dispatch)?;

    Ok(Json(json!({ "ok": true })))
}

/// Payment provider callback. Signature checks and idempotency are not done
/// here yet; the payload is acknowledged with its size.
pub async fn payment_callback(State(state): State<AppState>, body: Bytes) -> Result<Json<Value>, WebError> {
    let payload: Value =
        serde_json::from_slice(&body).map_err(|e| WebError::MalformedPayload(e.to_string()))?;
    let size = payload.to_string().len();
    state
        .logger
        .info("payment_callback_received", &[("size", size.into())]);
    Ok(Json(json!({ "received": true, "size": size })))
}
