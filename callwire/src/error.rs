//! Error responses on the HTTP transport.
//!
//! Unary errors are a JSON body with an HTTP status derived from the code.
//! Streaming errors are always HTTP 200 with the error carried in the
//! end-of-stream frame.

use axum::Json;
use axum::body::Body;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use callwire_core::{Code, Frame, Status};
use http::StatusCode;
use http::header::CONTENT_TYPE;

use crate::protocol::RequestProtocol;

/// HTTP status used for a unary error with this code.
pub(crate) fn http_status(code: Code) -> StatusCode {
    match code {
        Code::Ok => StatusCode::OK,
        Code::Canceled => StatusCode::REQUEST_TIMEOUT,
        Code::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
        Code::InvalidArgument => StatusCode::BAD_REQUEST,
        Code::DeadlineExceeded => StatusCode::REQUEST_TIMEOUT,
        Code::NotFound => StatusCode::NOT_FOUND,
        Code::ResourceExhausted => StatusCode::TOO_MANY_REQUESTS,
        Code::Unimplemented => StatusCode::NOT_IMPLEMENTED,
        Code::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        Code::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
    }
}

pub(crate) fn unary_error_response(status: Status) -> Response {
    (http_status(status.code()), Json(status)).into_response()
}

/// End-of-stream frame used when the real terminal frame cannot be encoded.
const INTERNAL_END_STREAM: &[u8] = b"\x02\x00\x00\x00\x1d{\"error\":{\"code\":\"internal\"}}";

/// Encode a terminal frame for a streaming response body.
pub(crate) fn encode_frame(frame: &Frame) -> Bytes {
    frame.to_envelope().unwrap_or_else(|err| {
        tracing::error!(error = %err, "failed to encode end-of-stream frame");
        Bytes::from_static(INTERNAL_END_STREAM)
    })
}

pub(crate) fn stream_error_response(protocol: RequestProtocol, status: Status) -> Response {
    let body = encode_frame(&Frame::Error(status));
    (
        StatusCode::OK,
        [(CONTENT_TYPE, protocol.response_content_type())],
        Body::from(body),
    )
        .into_response()
}

/// Report `status` in the shape the request's protocol expects.
pub(crate) fn error_response(protocol: RequestProtocol, status: Status) -> Response {
    if protocol.is_streaming() {
        stream_error_response(protocol, status)
    } else {
        unary_error_response(status)
    }
}
