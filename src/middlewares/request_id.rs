// src/middlewares/request_id.rs

use crate::context::{self, CorrelationContext, generate_request_id};
use crate::logger::{Logger, elapsed_ms};
use axum::extract::{Request, State};
use axum::http::{self, HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use std::time::Instant;
use tower_http::request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer};

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Ids for requests that arrive without one.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeCorrelationId;

impl MakeRequestId for MakeCorrelationId {
    fn make_request_id<B>(&mut self, _request: &http::Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&generate_request_id()).ok().map(RequestId::new)
    }
}

/// Keeps an inbound `X-Request-ID` or assigns a fresh one.
pub fn set_request_id_layer() -> SetRequestIdLayer<MakeCorrelationId> {
    SetRequestIdLayer::new(HeaderName::from_static(REQUEST_ID_HEADER), MakeCorrelationId)
}

/// Echoes the request's `X-Request-ID` on the response.
pub fn propagate_request_id_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::new(HeaderName::from_static(REQUEST_ID_HEADER))
}

/// Text form of the id [`set_request_id_layer`] attached to a request.
pub fn request_id_text(id: &RequestId) -> Option<String> {
    id.header_value().to_str().ok().map(str::to_owned)
}

/// Runs inside the request-id layers: exposes the id to everything
/// downstream and writes one `http_access` line per request, error
/// responses included.
pub async fn request_id_middleware(State(logger): State<Logger>, req: Request, next: Next) -> Response {
    let rid = req
        .extensions()
        .get::<RequestId>()
        .and_then(request_id_text)
        .unwrap_or_else(generate_request_id);

    let method = req.method().to_string();
    let path = req.uri().path().to_string();

    let start = Instant::now();
    let response = context::scope(CorrelationContext::new(Some(&rid)), next.run(req)).await;
    let duration_ms = elapsed_ms(start);

    logger.info(
        "http_access",
        &[
            ("method", method.into()),
            ("path", path.into()),
            ("status", response.status().as_u16().into()),
            ("duration_ms", duration_ms.into()),
            ("request_id", rid.into()),
        ],
    );
    response
}
