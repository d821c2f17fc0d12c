//! Outbound half of the HTTP transport: response frames to response body.
//!
//! While a response is still being produced it holds a [`CancelOnDrop`]
//! guard, so a client that disconnects (hyper drops the pending response or
//! the body) cancels the call's context.

use std::convert::Infallible;

use axum::body::Body;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use callwire_core::{Frame, MessageLimits, Status};
use http::StatusCode;
use http::header::CONTENT_TYPE;

use crate::channel::FrameReceiver;
use crate::context::CallContext;
use crate::error::{encode_frame, unary_error_response};
use crate::protocol::RequestProtocol;

/// Cancels the call when dropped before being disarmed.
pub(crate) struct CancelOnDrop {
    ctx: Option<CallContext>,
}

impl CancelOnDrop {
    pub fn new(ctx: CallContext) -> Self {
        Self { ctx: Some(ctx) }
    }

    pub fn disarm(mut self) {
        self.ctx = None;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if let Some(ctx) = self.ctx.take() {
            tracing::debug!("response dropped before completion, cancelling call");
            ctx.cancel();
        }
    }
}

/// Replace an outbound message over the size limit with an error frame.
fn enforce_limit(frame: Frame, limits: MessageLimits) -> Frame {
    match frame {
        Frame::Message(message) => match limits.check_size(message.len()) {
            Ok(()) => Frame::Message(message),
            Err(err) => {
                tracing::debug!(error = %err, "response message over the size limit");
                Frame::Error(err.to_status())
            }
        },
        other => other,
    }
}

/// Encode an outbound frame; a frame that cannot be encoded becomes an
/// `Internal` error frame.
fn envelope(frame: Frame) -> (Bytes, bool) {
    match frame.to_envelope() {
        Ok(bytes) => (bytes, frame.is_terminal()),
        Err(err) => {
            tracing::error!(error = %err, "failed to encode response frame");
            let status = Status::internal(format!("failed to encode response: {err}"));
            (encode_frame(&Frame::Error(status)), true)
        }
    }
}

/// Wait for the single response message (or the error) of a unary call.
pub(crate) async fn unary_response(
    protocol: RequestProtocol,
    ctx: CallContext,
    limits: MessageLimits,
    mut responses: FrameReceiver,
) -> Response {
    let guard = CancelOnDrop::new(ctx);
    let frame = enforce_limit(responses.next_frame().await, limits);
    guard.disarm();

    match frame {
        Frame::Message(message) => (
            StatusCode::OK,
            [(CONTENT_TYPE, protocol.response_content_type())],
            message,
        )
            .into_response(),
        Frame::Error(status) => unary_error_response(status),
        Frame::End => unary_error_response(Status::internal(
            "call finished without a response message",
        )),
    }
}

/// Stream every response frame as an envelope, ending after the terminal one.
///
/// A message over the size limit ends the stream with `ResourceExhausted`
/// and cancels the call.
pub(crate) fn stream_response(
    protocol: RequestProtocol,
    ctx: CallContext,
    limits: MessageLimits,
    responses: FrameReceiver,
) -> Response {
    let state = Some((responses, CancelOnDrop::new(ctx)));
    let body = futures::stream::unfold(state, move |state| async move {
        let (mut responses, guard) = state?;
        let received = responses.next_frame().await;
        let clean_end = received.is_terminal();
        let (bytes, terminal) = envelope(enforce_limit(received, limits));
        let next = match (terminal, clean_end) {
            (false, _) => Some((responses, guard)),
            (true, true) => {
                guard.disarm();
                None
            }
            // The handler is still producing; dropping the guard stops it.
            (true, false) => None,
        };
        Some((Ok::<_, Infallible>(bytes), next))
    });

    (
        StatusCode::OK,
        [(CONTENT_TYPE, protocol.response_content_type())],
        Body::from_stream(body),
    )
        .into_response()
}
