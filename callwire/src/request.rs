//! Inbound half of the HTTP transport: request body to request frames.

use axum::body::Body;
use bytes::Bytes;
use callwire_core::{Frame, FrameDecoder, MessageLimits, Status};
use futures::StreamExt;
use http_body_util::{BodyExt, LengthLimitError, Limited};

use crate::channel::FrameSender;

/// Read a unary body (one unframed message) and forward it.
pub(crate) async fn pump_unary(body: Body, limits: MessageLimits, requests: FrameSender) {
    let result = match read_unary_body(body, limits).await {
        Ok(message) => requests.send_message(message).await,
        Err(status) => Err(status),
    };
    requests.finish(result).await;
}

async fn read_unary_body(body: Body, limits: MessageLimits) -> Result<Bytes, Status> {
    let limit = limits.max_message_size().unwrap_or(usize::MAX);
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(err) if err.is::<LengthLimitError>() => Err(Status::resource_exhausted(format!(
            "request body exceeds maximum allowed size of {limit} bytes"
        ))),
        Err(err) => Err(Status::cancelled(format!(
            "failed to read request body: {err}"
        ))),
    }
}

/// Decode an envelope-framed body and forward its frames until the first
/// terminal frame, framing error or cancellation.
pub(crate) async fn pump_stream(body: Body, limits: MessageLimits, requests: FrameSender) {
    let ctx = requests.context().clone();
    let mut frames = FrameDecoder::new(body.into_data_stream(), limits);

    loop {
        let next = tokio::select! {
            biased;
            _ = ctx.cancelled() => return,
            next = frames.next() => next,
        };
        let result = match next {
            Some(Ok(Frame::Message(message))) => {
                if requests.send_message(message).await.is_err() {
                    return;
                }
                continue;
            }
            Some(Ok(Frame::End)) | None => Ok(()),
            Some(Ok(Frame::Error(status))) => Err(status),
            Some(Err(err)) => {
                tracing::debug!(error = %err, "malformed request stream");
                Err(err.to_status())
            }
        };
        requests.finish(result).await;
        return;
    }
}
