//! Assembling the HTTP service.
//!
//! [`MakeServiceBuilder`] collects [`RpcRouter`]s and server-wide settings and
//! builds an axum [`Router`] with one `POST` route per registered method.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::response::Response;
use axum::routing::post;
use callwire_core::{MessageLimits, Status};
use http::Request;

use crate::error::error_response;
use crate::pipeline::serve_http;
use crate::protocol::RequestProtocol;
use crate::router::RpcRouter;

/// Default number of frames queued per call direction.
pub const DEFAULT_STREAM_BUFFER: usize = 16;

/// Server-wide settings, applied to every call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    /// Upper bound on every call's duration; a client's
    /// `connect-timeout-ms` can only shorten it.
    pub server_timeout: Option<Duration>,
    /// Maximum size of one inbound message.
    pub limits: MessageLimits,
    /// Frames queued per call direction before senders wait.
    pub stream_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_timeout: None,
            limits: MessageLimits::default(),
            stream_buffer: DEFAULT_STREAM_BUFFER,
        }
    }
}

/// Builder for the HTTP service.
///
/// ```rust,ignore
/// let app = MakeServiceBuilder::new()
///     .add_router(greet_router)
///     .add_router(calculator_router)
///     .server_timeout(Duration::from_secs(30))
///     .build();
/// let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
/// axum::serve(listener, app).await?;
/// ```
#[derive(Debug, Default)]
pub struct MakeServiceBuilder {
    routers: Vec<RpcRouter>,
    config: ServerConfig,
}

impl MakeServiceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_router(mut self, router: RpcRouter) -> Self {
        self.routers.push(router);
        self
    }

    pub fn add_routers(mut self, routers: impl IntoIterator<Item = RpcRouter>) -> Self {
        self.routers.extend(routers);
        self
    }

    /// Replace all settings at once.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn server_timeout(mut self, timeout: Duration) -> Self {
        self.config.server_timeout = Some(timeout);
        self
    }

    pub fn message_limits(mut self, limits: MessageLimits) -> Self {
        self.config.limits = limits;
        self
    }

    pub fn stream_buffer(mut self, frames: usize) -> Self {
        self.config.stream_buffer = frames;
        self
    }

    /// Merge all routers into the RPC router without building the HTTP service.
    pub fn into_rpc_router(self) -> RpcRouter {
        self.routers
            .into_iter()
            .fold(RpcRouter::new(), RpcRouter::merge)
    }

    pub fn build(self) -> Router {
        let config = self.config;
        let rpc = self.into_rpc_router();

        let mut app = Router::new();
        for route in rpc.routes() {
            let route = Arc::new(route.clone());
            let path = route.descriptor().path().to_owned();
            tracing::debug!(%path, kind = %route.descriptor().kind(), "registering method");
            app = app.route(
                &path,
                post(move |req: Request<Body>| serve_http(route.clone(), config, req)),
            );
        }
        app.fallback(unknown_method)
    }
}

async fn unknown_method(req: Request<Body>) -> Response {
    let protocol = RequestProtocol::from_headers(req.headers());
    let status = Status::unimplemented(format!("unknown method {}", req.uri().path()));
    error_response(protocol, status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{Receiver, Sender};
    use crate::context::CallContext;
    use bytes::Bytes;
    use callwire_core::{Code, Frame, FrameDecoder, end_stream_frame, envelope_flags, wrap_envelope};
    use futures::StreamExt;
    use http::StatusCode;
    use http::header::CONTENT_TYPE;
    use http_body_util::BodyExt;
    use prost::Message as _;
    use std::convert::Infallible;
    use tower::ServiceExt;

    #[derive(Clone, PartialEq, prost::Message, serde::Serialize, serde::Deserialize)]
    #[serde(default)]
    struct Number {
        #[prost(int64, tag = "1")]
        value: i64,
    }

    fn router() -> RpcRouter {
        RpcRouter::new()
            .unary("test.Math", "Double", |_ctx: CallContext, req: Number| async move {
                if req.value < 0 {
                    return Err(Status::invalid_argument(format!("negative: {}", req.value)));
                }
                Ok(Number {
                    value: req.value * 2,
                })
            })
            .unary("test.Math", "Slow", |ctx: CallContext, req: Number| async move {
                ctx.sleep(Duration::from_secs(10)).await?;
                Ok::<_, Status>(req)
            })
            .server_stream(
                "test.Math",
                "Count",
                |_ctx: CallContext, req: Number, tx: Sender<Number>| async move {
                    for value in 1..=req.value {
                        tx.send(Number { value }).await?;
                    }
                    Ok::<_, Status>(())
                },
            )
            .server_stream(
                "test.Math",
                "Scale",
                |_ctx: CallContext, req: Number, tx: Sender<Number>| async move {
                    tx.send(req.clone()).await?;
                    tx.send(Number { value: req.value * 1_000_000 }).await?;
                    tx.send(req).await?;
                    Ok::<_, Status>(())
                },
            )
            .client_stream(
                "test.Math",
                "Total",
                |_ctx: CallContext, mut rx: Receiver<Number>| async move {
                    let mut value = 0;
                    while let Some(number) = rx.recv().await? {
                        value += number.value;
                    }
                    Ok::<_, Status>(Number { value })
                },
            )
            .bidi_stream(
                "test.Math",
                "Echo",
                |_ctx: CallContext, mut rx: Receiver<Number>, tx: Sender<Number>| async move {
                    while let Some(number) = rx.recv().await? {
                        tx.send(number).await?;
                    }
                    Ok::<_, Status>(())
                },
            )
    }

    fn app() -> Router {
        MakeServiceBuilder::new().add_router(router()).build()
    }

    fn post(path: &str, content_type: &str, body: impl Into<Body>) -> Request<Body> {
        Request::post(path)
            .header(CONTENT_TYPE, content_type)
            .body(body.into())
            .unwrap()
    }

    fn json_frame(value: i64) -> Vec<u8> {
        let payload = serde_json::to_vec(&Number { value }).unwrap();
        wrap_envelope(envelope_flags::MESSAGE, &payload).unwrap()
    }

    async fn body_bytes(response: Response) -> Bytes {
        response.into_body().collect().await.unwrap().to_bytes()
    }

    async fn frames(response: Response) -> Vec<Frame> {
        let bytes = body_bytes(response).await;
        let chunks = futures::stream::iter([Ok::<_, Infallible>(bytes)]);
        FrameDecoder::new(chunks, MessageLimits::unlimited())
            .map(|frame| frame.unwrap())
            .collect()
            .await
    }

    fn json_values(frames: &[Frame]) -> Vec<i64> {
        frames
            .iter()
            .filter_map(|frame| match frame {
                Frame::Message(bytes) => {
                    Some(serde_json::from_slice::<Number>(bytes).unwrap().value)
                }
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_unary_json() {
        let response = app()
            .oneshot(post("/test.Math/Double", "application/json", r#"{"value":21}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        let json: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(json, serde_json::json!({"value": 42}));
    }

    #[tokio::test]
    async fn test_unary_proto() {
        let body = Number { value: 5 }.encode_to_vec();
        let response = app()
            .oneshot(post("/test.Math/Double", "application/proto", body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let number = Number::decode(body_bytes(response).await).unwrap();
        assert_eq!(number.value, 10);
    }

    #[tokio::test]
    async fn test_unary_error_maps_to_http_status() {
        let response = app()
            .oneshot(post("/test.Math/Double", "application/json", r#"{"value":-3}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let status: Status = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(status.code(), Code::InvalidArgument);
        assert_eq!(status.message(), Some("negative: -3"));
    }

    #[tokio::test]
    async fn test_unary_rejects_undecodable_body() {
        let response = app()
            .oneshot(post("/test.Math/Double", "application/json", "{"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_timeout_header_sets_deadline() {
        let mut request = post("/test.Math/Slow", "application/json", r#"{"value":1}"#);
        request
            .headers_mut()
            .insert(crate::context::CONNECT_TIMEOUT_MS_HEADER, "50".parse().unwrap());

        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
        let status: Status = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(status.code(), Code::DeadlineExceeded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_timeout_applies_without_header() {
        let app = MakeServiceBuilder::new()
            .add_router(router())
            .server_timeout(Duration::from_millis(100))
            .build();

        let response = app
            .oneshot(post("/test.Math/Slow", "application/json", r#"{"value":1}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    }

    #[tokio::test]
    async fn test_oversized_unary_body() {
        let app = MakeServiceBuilder::new()
            .add_router(router())
            .message_limits(MessageLimits::new(8))
            .build();

        let response = app
            .oneshot(post("/test.Math/Double", "application/json", r#"{"value":123456789}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_oversized_unary_response() {
        let app = MakeServiceBuilder::new()
            .add_router(router())
            .message_limits(MessageLimits::new(2))
            .build();

        // 100 encodes in two bytes, 200 needs three.
        let body = Number { value: 100 }.encode_to_vec();
        let response = app
            .oneshot(post("/test.Math/Double", "application/proto", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_oversized_stream_response_ends_stream() {
        let app = MakeServiceBuilder::new()
            .add_router(router())
            .message_limits(MessageLimits::new(4))
            .build();

        let payload = Number { value: 5 }.encode_to_vec();
        let mut body = wrap_envelope(envelope_flags::MESSAGE, &payload).unwrap();
        body.extend(end_stream_frame(None).unwrap());

        let response = app
            .oneshot(post("/test.Math/Scale", "application/connect+proto", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let frames = frames(response).await;
        match frames.as_slice() {
            [Frame::Message(first), Frame::Error(status)] => {
                assert_eq!(Number::decode(first.clone()).unwrap().value, 5);
                assert_eq!(status.code(), Code::ResourceExhausted);
            }
            other => panic!("unexpected frames: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_server_stream() {
        let mut body = json_frame(3);
        body.extend(end_stream_frame(None).unwrap());

        let response = app()
            .oneshot(post("/test.Math/Count", "application/connect+json", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/connect+json");

        let frames = frames(response).await;
        assert_eq!(json_values(&frames), vec![1, 2, 3]);
        assert_eq!(frames.last(), Some(&Frame::End));
    }

    #[tokio::test]
    async fn test_client_stream_without_end_frame() {
        let mut body = json_frame(1);
        body.extend(json_frame(2));
        body.extend(json_frame(39));

        let response = app()
            .oneshot(post("/test.Math/Total", "application/connect+json", body))
            .await
            .unwrap();

        let frames = frames(response).await;
        assert_eq!(json_values(&frames), vec![42]);
        assert_eq!(frames.last(), Some(&Frame::End));
    }

    #[tokio::test]
    async fn test_bidi_stream() {
        let mut body = json_frame(7);
        body.extend(json_frame(8));
        body.extend(end_stream_frame(None).unwrap());

        let response = app()
            .oneshot(post("/test.Math/Echo", "application/connect+json", body))
            .await
            .unwrap();

        let frames = frames(response).await;
        assert_eq!(json_values(&frames), vec![7, 8]);
        assert_eq!(frames.last(), Some(&Frame::End));
    }

    #[tokio::test]
    async fn test_compressed_frame_fails_stream() {
        let body = wrap_envelope(envelope_flags::COMPRESSED, b"\x1f\x8b").unwrap();

        let response = app()
            .oneshot(post("/test.Math/Total", "application/connect+json", body))
            .await
            .unwrap();

        let frames = frames(response).await;
        match frames.as_slice() {
            [Frame::Error(status)] => assert_eq!(status.code(), Code::InvalidArgument),
            other => panic!("unexpected frames: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_call_pattern_mismatch_is_unimplemented() {
        let response = app()
            .oneshot(post("/test.Math/Count", "application/json", r#"{"value":1}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);

        let response = app()
            .oneshot(post("/test.Math/Double", "application/connect+json", json_frame(1)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        match frames(response).await.as_slice() {
            [Frame::Error(status)] => assert_eq!(status.code(), Code::Unimplemented),
            other => panic!("unexpected frames: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_method_and_content_type() {
        let response = app()
            .oneshot(post("/test.Math/Nope", "application/json", "{}"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);

        let response = app()
            .oneshot(post("/test.Math/Double", "text/plain", "{}"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }
}
