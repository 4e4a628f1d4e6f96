// src/web/mod.rs

//! HTTP surface: health, version, the bot webhook and the payments stub.

pub mod lifespan;
pub mod routes;
pub mod webhook;

use crate::alerts::AlertSink;
use crate::config::Settings;
use crate::logger::Logger;
use crate::middlewares::{propagate_request_id_layer, request_id_middleware, set_request_id_layer};
use crate::runtime::Runtime;
use crate::storage::Database;
use axum::Router;
use axum::middleware;
use axum::routing::{get, post};
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;

pub use lifespan::{shutdown, startup};

pub const PAYMENTS_CALLBACK_PATH: &str = "/payments/callback";

/// Everything a route needs, shared across requests.
#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<Runtime>,
    pub settings: Arc<Settings>,
    pub logger: Logger,
    pub database: Database,
    pub alert: Option<Arc<dyn AlertSink>>,
}

/// Request-id handling wraps everything, so even CORS preflights and
/// recovered panics get an id, an echoed header and an access line.
pub fn router(state: AppState) -> Router {
    let webhook_path = state.settings.web.webhook_path();
    let logger = state.logger.clone();

    Router::new()
        .route("/health", get(routes::health))
        .route("/version", get(routes::version))
        .route(&webhook_path, post(routes::telegram_webhook))
        .route(PAYMENTS_CALLBACK_PATH, post(routes::payment_callback))
        .layer(CatchPanicLayer::new())
        .layer(CorsLayer::permissive())
        .layer(middleware::from_fn_with_state(logger, request_id_middleware))
        .layer(propagate_request_id_layer())
        .layer(set_request_id_layer())
        .with_state(state)
}
