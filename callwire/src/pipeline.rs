//! HTTP call pipeline.
//!
//! For every request the pipeline:
//!
//! 1. detects the protocol from `Content-Type` and checks it against the
//!    route's call pattern,
//! 2. builds the [`CallContext`] from the effective timeout,
//! 3. spawns a task pumping the request body into the request channel and a
//!    task running the route,
//! 4. turns the response channel into the HTTP response.

use std::sync::Arc;

use axum::body::Body;
use axum::response::{IntoResponse, Response};
use callwire_core::Status;
use http::{Request, StatusCode};

use crate::channel::frame_channel;
use crate::context::{CONNECT_TIMEOUT_MS_HEADER, CallContext, compute_effective_timeout, parse_timeout_ms};
use crate::error::error_response;
use crate::handler::ServerCall;
use crate::protocol::RequestProtocol;
use crate::request::{pump_stream, pump_unary};
use crate::response::{stream_response, unary_response};
use crate::router::Route;
use crate::service_builder::ServerConfig;

pub(crate) async fn serve_http(
    route: Arc<Route>,
    config: ServerConfig,
    req: Request<Body>,
) -> Response {
    let protocol = RequestProtocol::from_headers(req.headers());
    if !protocol.is_valid() {
        return StatusCode::UNSUPPORTED_MEDIA_TYPE.into_response();
    }

    let descriptor = route.descriptor();
    if protocol.is_streaming() != descriptor.kind().is_streaming() {
        let status = Status::unimplemented(format!(
            "{} is a {} method and cannot be called with {}",
            descriptor.path(),
            descriptor.kind(),
            protocol.response_content_type(),
        ));
        return error_response(protocol, status);
    }

    let client_timeout = req
        .headers()
        .get(CONNECT_TIMEOUT_MS_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_timeout_ms);
    let timeout = compute_effective_timeout(config.server_timeout, client_timeout);
    let ctx = CallContext::with_timeout(timeout);

    let (request_tx, request_rx) = frame_channel(&ctx, config.stream_buffer);
    let (response_tx, response_rx) = frame_channel(&ctx, config.stream_buffer);

    let body = req.into_body();
    if protocol.is_streaming() {
        tokio::spawn(pump_stream(body, config.limits, request_tx));
    } else {
        tokio::spawn(pump_unary(body, config.limits, request_tx));
    }

    tokio::spawn(route.call(ServerCall {
        ctx: ctx.clone(),
        encoding: protocol.encoding(),
        requests: request_rx,
        responses: response_tx,
    }));

    if protocol.is_streaming() {
        stream_response(protocol, ctx, config.limits, response_rx)
    } else {
        unary_response(protocol, ctx, config.limits, response_rx).await
    }
}
