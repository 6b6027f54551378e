//! HTTP log interceptor
//!
//! axum middleware producing one sanitized `http` log event per request/response
//! pair. The response is passed through untouched; the event is built and shipped
//! on a detached task once the response body has finished (or was dropped).

use crate::body::{BodyOutcome, CaptureBuffer, ObservedBody};
use crate::event::{EventLogger, HttpExchange};
use crate::transport::detach;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::trace;

const FORWARDED_FOR: &str = "x-forwarded-for";

/// Middleware state for [`log_requests`]
#[derive(Clone)]
pub struct HttpLogger {
    logger: Arc<EventLogger>,
    max_capture_bytes: usize,
}

impl HttpLogger {
    pub fn new(logger: Arc<EventLogger>, max_capture_bytes: usize) -> Self {
        Self {
            logger,
            max_capture_bytes,
        }
    }
}

/// Log every exchange passing through the router
pub async fn log_requests(
    State(http_logger): State<HttpLogger>,
    request: Request,
    next: Next,
) -> Response {
    let authorized = request.headers().contains_key(header::AUTHORIZATION);
    let method = request.method().to_string();
    let path = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let ip = client_ip(&request);

    let request_capture = CaptureBuffer::new(http_logger.max_capture_bytes);
    let (parts, body) = request.into_parts();
    let body = ObservedBody::new(body)
        .capture_into(request_capture.clone())
        .into_body();

    let response = next.run(Request::from_parts(parts, body)).await;

    let status_code = response.status().as_u16();
    let logger = http_logger.logger;
    let (parts, body) = response.into_parts();
    let body = ObservedBody::new(body)
        .capture_into(CaptureBuffer::new(http_logger.max_capture_bytes))
        .on_finish(move |outcome: BodyOutcome, response_bytes| {
            let request_bytes = request_capture.snapshot();
            detach("http_log", async move {
                let exchange = HttpExchange {
                    authorized,
                    method,
                    path,
                    status_code,
                    ip,
                    req_body: parse_body(&request_bytes),
                    res_body: parse_body(&response_bytes),
                };
                trace!(
                    telemetry.event = "http_exchange",
                    method = %exchange.method,
                    path = %exchange.path,
                    status = exchange.status_code,
                    outcome = outcome.as_str(),
                    "Response finished"
                );
                logger.http(&exchange);
            });
        })
        .into_body();

    Response::from_parts(parts, body)
}

/// First `X-Forwarded-For` entry, else the socket peer address
pub fn client_ip(request: &Request) -> Option<String> {
    forwarded_for(request.headers()).or_else(|| {
        request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
    })
}

fn forwarded_for(headers: &HeaderMap) -> Option<String> {
    headers
        .get(FORWARDED_FOR)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
}

/// JSON when it parses, the (lossy) text otherwise, `null` when empty
pub fn parse_body(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}
